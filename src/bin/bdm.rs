#[macro_use]
extern crate clap;
#[macro_use]
extern crate failure;
#[macro_use]
extern crate log;

extern crate bdm_bitbang;
use bdm_bitbang::*;

use std::fs;
use std::io::{
	self,
	Write,
};
use std::process::exit;

use bdm_bitbang::engine::Config;
use bdm_bitbang::interface::BdmInterface;
use bdm_bitbang::line::{
	Hardware,
	TickPacer,
};
use bdm_bitbang::line::sysfs::SysfsGpio;
use bdm_bitbang::target::SimulatedTarget;

const DEFAULT_SYS_CLK: u32 = 1_000_000;
const DEFAULT_MIN_FREQ: u32 = 100_000;
const DEFAULT_SIM_FREQ: u32 = 50_000;
// default --min-freq with --sim: this many target clocks per slowest clock
const SIM_MIN_FREQ_DIVIDER: u32 = 32;

// decimal or 0x-prefixed hex
fn parse_number(s: &str) -> AResult<u32> {
	let r = if s.starts_with("0x") || s.starts_with("0X") {
		u32::from_str_radix(&s[2..], 16)
	} else {
		s.parse::<u32>()
	};
	r.map_err(|e| format_err!("invalid number {:?}: {}", s, e))
}

fn get_param(matches: &clap::ArgMatches, name: &str) -> AResult<u32> {
	match matches.value_of(name) {
		Some(p) => parse_number(p),
		None => bail!("missing parameter {}", name),
	}
}

fn get_param_or(matches: &clap::ArgMatches, name: &str, default: u32) -> AResult<u32> {
	match matches.value_of(name) {
		Some(p) => parse_number(p),
		None => Ok(default),
	}
}

fn get_address_or(matches: &clap::ArgMatches, name: &str, default: u16) -> AResult<u16> {
	let address = get_param_or(matches, name, u32::from(default))?;
	ensure!(address <= 0xffff, "address out of range: 0x{:x}", address);
	Ok(address as u16)
}

fn hex_dump(start: u16, data: &[u8]) {
	for (i, b) in data.iter().enumerate() {
		let address = start.wrapping_add(i as u16);
		if 0 == i % 16 {
			if i > 0 {
				println!();
			}
			print!("{:04x} ", address);
		} else if 0 == i % 8 {
			print!(" ");
		}
		print!(" {:02x}", b);
	}
	if !data.is_empty() {
		println!();
	}
}

fn sim_setup(
	sys_clk: u32,
	min_freq: Option<u32>,
	freq: Option<u32>,
	sim_freq: u32,
) -> AResult<(Config, SimulatedTarget)> {
	ensure!(sim_freq > 0 && sim_freq <= sys_clk, "simulated BDM clock must be within 1..={} Hz", sys_clk);
	let clock = (sys_clk + sim_freq - 1) / sim_freq;
	let target = SimulatedTarget::new(clock).with_reset();

	let min_freq = match min_freq {
		Some(f) => f,
		None => (sys_clk / (SIM_MIN_FREQ_DIVIDER * clock)).max(1),
	};
	let config = Config::from_frequencies(sys_clk, min_freq, freq, true)?;
	if freq.is_none() {
		ensure!(config.max_cycles() >= target.sync_reply_window(),
			"--min-freq {} Hz too high to SYNC with the simulated target at {} Hz (needs at most {} Hz)",
			min_freq, sim_freq, sys_clk / target.sync_reply_window());
	}
	Ok((config, target))
}

fn run_commands<H: Hardware>(session: &mut Session<H>, sys_clk: u32, matches: &clap::ArgMatches) -> AResult<()> {
	let cycles = session.connect()?;

	match matches.subcommand() {
		("sync", _) => {
			println!("{} ticks per target clock (~{} Hz target clock)", cycles, sys_clk / cycles);
			Ok(())
		},
		("status", _) => {
			let status = BdmInterface::new(session).read_status()?;
			println!("BDCSCR: 0x{:02x}", status);
			Ok(())
		},
		("background", _) => {
			BdmInterface::new(session).background()
		},
		("read", Some(sub_m)) => {
			let address = get_address_or(sub_m, "ADDRESS", 0)?;
			let count = get_param_or(sub_m, "COUNT", 1)?;
			ensure!(count <= 0x1_0000, "can't read more than 64 KiB");
			let data = BdmInterface::new(session).read_bytes(address, count as usize)?;
			hex_dump(address, &data);
			Ok(())
		},
		("write", Some(sub_m)) => {
			let address = get_address_or(sub_m, "ADDRESS", 0)?;
			let value = get_param(sub_m, "VALUE")?;
			ensure!(value <= 0xff, "value out of range: 0x{:x}", value);
			BdmInterface::new(session).write_byte(address, value as u8)
		},
		("dump", Some(sub_m)) => {
			let start = get_address_or(sub_m, "start", 0)?;
			let count = get_param_or(sub_m, "count", 0x1_0000)?;
			ensure!(count <= 0x1_0000, "can't dump more than 64 KiB");

			info!("dumping {} bytes from 0x{:04x}", count, start);
			let data = BdmInterface::new(session).read_bytes(start, count as usize)?;
			match sub_m.value_of("OUTPUT") {
				Some(path) => fs::write(path, &data)
					.map_err(|e| format_err!("couldn't write {}: {}", path, e))?,
				None => io::stdout().write_all(&data)?,
			}
			Ok(())
		},
		("", _) => bail!("no subcommand"),
		(cmd, _) => bail!("not implemented subcommand {:?}", cmd),
	}
}

fn main_app() -> AResult<()> {
	let matches = clap_app!(@app (app_from_crate!())
		(@setting SubcommandRequiredElseHelp)
		(global_setting: clap::AppSettings::VersionlessSubcommands)
		(@arg sys_clk: --("sys-clk") +takes_value +global "controller tick rate in Hz (default: 1000000)")
		(@arg min_freq: --("min-freq") +takes_value +global "minimum BDM clock to allow, should be lower than the expected clock (default: 100000, with --sim: simulated clock / 32)")
		(@arg freq: --freq +takes_value +global "force a BDM clock in Hz, bypassing SYNC")
		(@arg bkgd: --bkgd +takes_value +global "sysfs GPIO number of BKGD")
		(@arg reset: --reset +takes_value +global "sysfs GPIO number of RESET (optional)")
		(@arg realtime: --realtime +global "lock memory and use SCHED_FIFO")
		(@arg sim: --sim +global "talk to a simulated target instead of GPIOs")
		(@arg sim_freq: --("sim-freq") +takes_value +global "BDM clock of the simulated target in Hz (default: 50000)")
		(@arg sim_image: --("sim-image") +takes_value +global "load file into memory of the simulated target at 0x0000")
		(@subcommand sync =>
			(about: "reset (if wired) and SYNC, show measured clock")
		)
		(@subcommand status =>
			(about: "read BDC status register")
		)
		(@subcommand background =>
			(about: "enter active background mode")
		)
		(@subcommand read =>
			(about: "hex dump target memory")
			(@arg ADDRESS: +required "start address")
			(@arg COUNT: "number of bytes (default: 1)")
		)
		(@subcommand write =>
			(about: "write one byte to target memory")
			(@arg ADDRESS: +required "address")
			(@arg VALUE: +required "byte value")
		)
		(@subcommand dump =>
			(about: "dump target memory as binary")
			(@arg start: --start +takes_value "start address (default: 0)")
			(@arg count: --count +takes_value "number of bytes (default: 65536)")
			(@arg OUTPUT: "output file (default: stdout)")
		)
	).get_matches();

	let sys_clk = get_param_or(&matches, "sys_clk", DEFAULT_SYS_CLK)?;
	let min_freq = match matches.value_of("min_freq") {
		None => None,
		Some(f) => Some(parse_number(f)?),
	};
	let freq = match matches.value_of("freq") {
		None => None,
		Some(f) => Some(parse_number(f)?),
	};

	if matches.is_present("realtime") {
		rt::enter();
	}

	if matches.is_present("sim") {
		let sim_freq = get_param_or(&matches, "sim_freq", DEFAULT_SIM_FREQ)?;
		let (config, mut target) = sim_setup(sys_clk, min_freq, freq, sim_freq)?;
		if let Some(path) = matches.value_of("sim_image") {
			let image = fs::read(path).map_err(|e| format_err!("couldn't read {}: {}", path, e))?;
			ensure!(image.len() <= 0x1_0000, "image too big for 64 KiB address space");
			target.write_memory(0, &image);
		}

		let mut session = Session::new(config, target)?;
		return run_commands(&mut session, sys_clk, &matches);
	}

	let bkgd = match matches.value_of("bkgd") {
		Some(_) => get_param(&matches, "bkgd")?,
		None => bail!("need --bkgd (or --sim)"),
	};
	let reset = match matches.value_of("reset") {
		None => None,
		Some(_) => Some(get_param(&matches, "reset")?),
	};

	let config = Config::from_frequencies(sys_clk, min_freq.unwrap_or(DEFAULT_MIN_FREQ), freq, reset.is_some())?;
	let gpio = SysfsGpio::open(bkgd, reset, TickPacer::from_frequency(sys_clk)?)?;
	let mut session = Session::new(config, gpio)?;
	let res = run_commands(&mut session, sys_clk, &matches);

	let gpio = session.hardware();
	if gpio.overruns() > 0 || gpio.io_errors() > 0 {
		warn!("{} late ticks, {} GPIO errors; lower --sys-clk if transfers fail", gpio.overruns(), gpio.io_errors());
	}
	res
}

fn main() {
	env_logger::from_env(env_logger::Env::default().default_filter_or("info")).init();

	if let Err(e) = main_app() {
		error!("Error: {}", e);
		exit(1);
	}
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn default_sim_connects() {
		let (config, target) = sim_setup(DEFAULT_SYS_CLK, None, None, DEFAULT_SIM_FREQ).unwrap();
		let mut session = Session::new(config, target).unwrap();
		assert_eq!(session.connect().unwrap(), 20);
		assert!(session.hardware().is_background());
	}

	#[test]
	fn sim_rejects_min_freq_above_reply_window() {
		assert!(sim_setup(DEFAULT_SYS_CLK, Some(DEFAULT_MIN_FREQ), None, DEFAULT_SIM_FREQ).is_err());
		assert!(sim_setup(DEFAULT_SYS_CLK, Some(50_000), None, DEFAULT_SIM_FREQ).is_err());
		assert!(sim_setup(DEFAULT_SYS_CLK, Some(2_500), None, DEFAULT_SIM_FREQ).is_ok());
		// no SYNC with a forced clock
		assert!(sim_setup(DEFAULT_SYS_CLK, Some(DEFAULT_MIN_FREQ), Some(DEFAULT_SIM_FREQ), DEFAULT_SIM_FREQ).is_ok());
	}

	#[test]
	fn sim_forced_slow_clock_reads() {
		let (config, target) = sim_setup(DEFAULT_SYS_CLK, Some(DEFAULT_MIN_FREQ), Some(10_000), 10_000).unwrap();
		let target = target.with_memory(0x0000, &[0x5a]);
		let mut session = Session::new(config, target).unwrap();
		assert_eq!(session.connect().unwrap(), 100);
		assert_eq!(BdmInterface::new(&mut session).read_bytes(0x0000, 1).unwrap(), vec![0x5a]);
	}

	#[test]
	fn numbers_decimal_or_hex() {
		assert_eq!(parse_number("4096").unwrap(), 4096);
		assert_eq!(parse_number("0x1000").unwrap(), 4096);
		assert!(parse_number("0xg").is_err());
	}
}
