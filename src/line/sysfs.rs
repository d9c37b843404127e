/* Linux sysfs GPIO backend (/sys/class/gpio) */

use std::fs;
use std::io;
use std::os::unix::fs::FileExt;
use std::path::{
	Path,
	PathBuf,
};
use super::{
	Hardware,
	OutPins,
	TickPacer,
};

const GPIO_ROOT: &str = "/sys/class/gpio";

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum Drive {
	Low,
	High,
	Released,
}

impl Drive {
	fn direction(self) -> &'static [u8] {
		// "low"/"high" switch to output with the initial value atomically
		match self {
			Drive::Low => b"low",
			Drive::High => b"high",
			Drive::Released => b"in",
		}
	}
}

struct Gpio {
	number: u32,
	direction: fs::File,
	value: fs::File,
	drive: Option<Drive>,
}

impl Gpio {
	fn open(number: u32) -> crate::AResult<Self> {
		let dir = PathBuf::from(format!("{}/gpio{}", GPIO_ROOT, number));

		with_context!(("couldn't open GPIO {}", number), {
			if !dir.exists() {
				fs::OpenOptions::new()
					.write(true)
					.open(Path::new(GPIO_ROOT).join("export"))?
					.write_all_at(number.to_string().as_bytes(), 0)?;
			}

			let direction = fs::OpenOptions::new().read(true).write(true).open(dir.join("direction"))?;
			let value = fs::OpenOptions::new().read(true).write(true).open(dir.join("value"))?;

			Ok(Gpio {
				number,
				direction,
				value,
				drive: None,
			})
		})
	}

	fn set(&mut self, drive: Drive) -> io::Result<()> {
		if self.drive == Some(drive) {
			return Ok(());
		}
		self.direction.write_all_at(drive.direction(), 0)?;
		self.drive = Some(drive);
		Ok(())
	}

	fn read(&self) -> io::Result<bool> {
		let mut buf = [0u8; 2];
		let l = self.value.read_at(&mut buf, 0)?;
		if l == 0 {
			return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "empty GPIO value"));
		}
		Ok(buf[0] == b'1')
	}
}

/// BKGD (and optionally RESET) on sysfs GPIOs.
///
/// Both lines need external pull-ups; releasing a line switches the GPIO to
/// input.
pub struct SysfsGpio {
	bkgd: Gpio,
	reset: Option<Gpio>,
	pacer: TickPacer,
	io_errors: u64,
}

impl SysfsGpio {
	pub fn open(bkgd: u32, reset: Option<u32>, pacer: TickPacer) -> crate::AResult<Self> {
		let bkgd = Gpio::open(bkgd)?;
		let reset = match reset {
			None => None,
			Some(n) => Some(Gpio::open(n)?),
		};

		info!("BKGD on GPIO {}, RESET on {:?}, tick period {:?}",
			bkgd.number, reset.as_ref().map(|r| r.number), pacer.period());

		Ok(SysfsGpio {
			bkgd,
			reset,
			pacer,
			io_errors: 0,
		})
	}

	pub fn io_errors(&self) -> u64 {
		self.io_errors
	}

	pub fn overruns(&self) -> u64 {
		self.pacer.overruns()
	}

	fn io_error(&mut self, what: &str, e: io::Error) {
		// the line driver can't fail; count and report the first few
		self.io_errors += 1;
		if self.io_errors <= 3 {
			warn!("GPIO {} failed: {}", what, e);
		}
	}
}

impl Hardware for SysfsGpio {
	fn set_pins(&mut self, pins: OutPins) {
		let bkgd = match pins.driven_level() {
			None => Drive::Released,
			Some(false) => Drive::Low,
			Some(true) => Drive::High,
		};
		if let Err(e) = self.bkgd.set(bkgd) {
			self.io_error("BKGD write", e);
		}

		let reset = if pins.reset { Drive::Low } else { Drive::Released };
		let res = match self.reset {
			Some(ref mut gpio) => gpio.set(reset),
			None => Ok(()),
		};
		if let Err(e) = res {
			self.io_error("RESET write", e);
		}
	}

	fn read_pin(&mut self) -> bool {
		match self.bkgd.read() {
			Ok(level) => level,
			Err(e) => {
				self.io_error("BKGD read", e);
				true
			},
		}
	}

	fn has_reset(&self) -> bool {
		self.reset.is_some()
	}

	fn tick(&mut self) {
		self.pacer.wait();
	}
}

impl Drop for SysfsGpio {
	fn drop(&mut self) {
		let _ = self.bkgd.set(Drive::Released);
		if let Some(ref mut reset) = self.reset {
			let _ = reset.set(Drive::Released);
		}
	}
}
