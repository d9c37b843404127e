use failure::Fail;

use crate::engine::{
	Config,
	Engine,
	State,
};
use crate::fifo::{
	ByteSink,
	Fifo,
};
use crate::interface::Transport;
use crate::line::{
	Hardware,
	LineDriver,
};

const FIFO_SIZE: usize = 512;

#[derive(Debug, Fail, Clone, Copy, PartialEq, Eq)]
pub enum SessionError {
	#[fail(display = "target didn't answer BDM SYNC in time")]
	SyncTimeout,
	#[fail(display = "no response from BDM engine after {} ticks", ticks)]
	Stalled { ticks: u64 },
}

/// BDM engine with its line driver and both byte streams, ticked in-process.
pub struct Session<H: Hardware> {
	engine: Engine,
	line: LineDriver<H>,
	commands: Fifo,
	responses: Fifo,
	tick_budget: Option<u64>,
}

impl<H: Hardware> Session<H> {
	pub fn new(config: Config, hardware: H) -> crate::AResult<Self> {
		let line = LineDriver::new(hardware);
		ensure!(!config.has_reset() || line.has_reset(), "reset sequence configured, but no RESET line");

		Ok(Session {
			engine: Engine::new(config),
			line,
			commands: Fifo::new(FIFO_SIZE),
			responses: Fifo::new(FIFO_SIZE),
			tick_budget: None,
		})
	}

	/// ticks `write`/`read` may spend waiting for one byte
	pub fn set_tick_budget(&mut self, ticks: u64) {
		self.tick_budget = Some(ticks);
	}

	/// Unless set explicitly: a SYNC (with reset) plus a full frame, at the
	/// slower of the slowest accepted target clock and the current bit period.
	pub fn tick_budget(&self) -> u64 {
		if let Some(ticks) = self.tick_budget {
			return ticks;
		}
		let config = self.engine.config();
		let cycles = config.max_cycles().max(self.engine.cycles_per_clock().unwrap_or(0));
		4 * u64::from(config.sync_duration()) + 64 * 20 * u64::from(cycles)
	}

	pub fn engine(&self) -> &Engine {
		&self.engine
	}

	pub fn state(&self) -> State {
		self.engine.state()
	}

	pub fn cycles_per_clock(&self) -> Option<u32> {
		self.engine.cycles_per_clock()
	}

	pub fn hardware(&self) -> &H {
		self.line.hardware()
	}

	pub fn hardware_mut(&mut self) -> &mut H {
		self.line.hardware_mut()
	}

	pub fn tick(&mut self) {
		self.engine.tick(&mut self.line, &mut self.commands, &mut self.responses);
	}

	pub fn run(&mut self, ticks: u64) {
		for _ in 0..ticks {
			self.tick();
		}
	}

	// SYNC failures end up as a 255 on the response stream; report them
	// as an error instead of handing out the byte
	fn check_failed(&mut self) -> crate::AResult<()> {
		if !self.engine.is_failed() {
			return Ok(());
		}

		while self.engine.state() == State::Error {
			if !self.responses.writable() {
				self.responses.clear();
			}
			self.tick();
		}
		self.responses.clear();

		Err(SessionError::SyncTimeout.into())
	}

	/// Run until the engine waits for a command (reset and SYNC done).
	///
	/// Returns the ticks per target clock period.
	pub fn connect(&mut self) -> crate::AResult<u32> {
		let mut spent = 0u64;
		while !self.engine.is_awaiting_command() {
			self.check_failed()?;
			if spent >= self.tick_budget() {
				return Err(SessionError::Stalled { ticks: spent }.into());
			}
			self.tick();
			spent += 1;
		}

		match self.engine.cycles_per_clock() {
			Some(cycles) => {
				info!("BDM connected, {} ticks per target clock", cycles);
				Ok(cycles)
			},
			None => bail!("BDM engine accepts commands without a bit period"),
		}
	}

	/// Re-initialize the whole session: release the lines, drop pending
	/// bytes and restart the engine from `Idle`.
	pub fn rearm(&mut self) {
		self.line.release();
		self.commands.clear();
		self.responses.clear();
		self.engine.rearm();
	}
}

impl<H: Hardware> Transport for Session<H> {
	fn write(&mut self, data: &[u8]) -> crate::AResult<()> {
		self.check_failed()?;

		let mut pending = data;
		let mut spent = 0u64;
		loop {
			let n = self.commands.extend_from_slice(pending);
			pending = &pending[n..];
			if pending.is_empty() {
				return Ok(());
			}
			if n > 0 {
				spent = 0;
			}
			self.check_failed()?;
			if spent >= self.tick_budget() {
				return Err(SessionError::Stalled { ticks: spent }.into());
			}
			self.tick();
			spent += 1;
		}
	}

	fn read(&mut self, len: usize) -> crate::AResult<Vec<u8>> {
		let mut result = Vec::with_capacity(len);
		let mut spent = 0u64;
		loop {
			self.check_failed()?;

			let got = self.responses.drain_front(len - result.len());
			if !got.is_empty() {
				spent = 0;
				result.extend(got);
			}
			if result.len() == len {
				return Ok(result);
			}
			if spent >= self.tick_budget() {
				return Err(SessionError::Stalled { ticks: spent }.into());
			}
			self.tick();
			spent += 1;
		}
	}
}

impl<H: Hardware> Drop for Session<H> {
	fn drop(&mut self) {
		self.line.release();
	}
}

#[cfg(test)]
mod test {
	use super::*;
	use crate::interface::BdmInterface;
	use crate::target::{
		PulledUpLine,
		SimulatedTarget,
	};

	fn sim_session(k: u32) -> Session<SimulatedTarget> {
		let target = SimulatedTarget::new(k)
			.with_reset()
			.with_memory(0x1000, b"hello BDM");
		Session::new(Config::new(16 * k + 8, None, true).unwrap(), target).unwrap()
	}

	#[test]
	fn connect_calibrates() {
		let mut s = sim_session(20);
		assert_eq!(s.connect().unwrap(), 20);
		assert!(s.hardware().is_background());
		assert_eq!(s.hardware().syncs(), 1);
	}

	#[test]
	fn memory_access() {
		let mut s = sim_session(7);
		{
			let mut bdm = BdmInterface::new(&mut s);
			assert_eq!(bdm.read_bytes(0x1000, 9).unwrap(), b"hello BDM".to_vec());
			bdm.write_byte(0x2000, 0x5a).unwrap();
			assert_eq!(bdm.read_byte(0x2000).unwrap(), 0x5a);
		}
		assert_eq!(s.hardware().memory()[0x2000], 0x5a);
	}

	#[test]
	fn status_and_control() {
		let mut s = Session::new(Config::new(40, None, false).unwrap(), SimulatedTarget::new(2)).unwrap();
		let mut bdm = BdmInterface::new(&mut s);
		let status = bdm.read_status().unwrap();
		assert_eq!(status & crate::target::BDCSCR_BDMACT, 0);

		bdm.background().unwrap();
		bdm.write_control(0x88).unwrap();
		assert_eq!(bdm.read_status().unwrap(), 0x88 | crate::target::BDCSCR_BDMACT);
	}

	#[test]
	fn sync_timeout_is_an_error() {
		let mut s = Session::new(Config::new(50, None, false).unwrap(), PulledUpLine::new()).unwrap();
		let err = s.connect().unwrap_err();
		assert_eq!(err.downcast::<SessionError>().unwrap(), SessionError::SyncTimeout);

		// no sentinel passed through as data, and no further output
		let err = BdmInterface::new(&mut s).read_byte(0).unwrap_err();
		assert_eq!(err.downcast::<SessionError>().unwrap(), SessionError::SyncTimeout);
		assert_eq!(s.state(), State::Done);
	}

	#[test]
	fn sentinel_translated_on_read() {
		let mut s = Session::new(Config::new(50, None, false).unwrap(), PulledUpLine::new()).unwrap();
		s.write(&[0x00, 0x00, 0x02]).unwrap();
		let err = s.read(2).unwrap_err();
		assert_eq!(err.downcast::<SessionError>().unwrap(), SessionError::SyncTimeout);
	}

	#[test]
	fn rearm_after_timeout() {
		let mut s = sim_session(5);
		s.hardware_mut().set_responsive(false);
		assert!(s.connect().is_err());

		s.hardware_mut().set_responsive(true);
		s.rearm();
		assert_eq!(s.connect().unwrap(), 5);
		assert_eq!(BdmInterface::new(&mut s).read_byte(0x1004).unwrap(), b'o');
	}

	#[test]
	fn stalls_without_enough_bytes() {
		let mut s = Session::new(Config::new(8, Some(2), false).unwrap(), PulledUpLine::new()).unwrap();
		s.set_tick_budget(10_000);
		s.write(&[0x00, 0x00, 0x01]).unwrap();
		assert_eq!(s.read(1).unwrap(), vec![0xff]);
		let err = s.read(1).unwrap_err();
		assert_eq!(err.downcast::<SessionError>().unwrap(), SessionError::Stalled { ticks: 10_000 });

		// idle between frames, nothing is produced
		s.run(1_000);
		assert!(s.engine().is_awaiting_command());
		assert!(s.responses.is_empty());
	}

	#[test]
	fn budget_covers_slow_forced_clock() {
		// forced bit period ten times the slowest SYNC-able one
		let target = SimulatedTarget::new(100).with_memory(0x0040, &[0xC3]);
		let mut s = Session::new(Config::new(10, Some(100), false).unwrap(), target).unwrap();
		assert_eq!(s.tick_budget(), 4 * 1280 + 1280 * 100);
		assert_eq!(BdmInterface::new(&mut s).read_byte(0x0040).unwrap(), 0xC3);
	}

	fn constant_frames(frames: usize, reads: u8) -> Vec<u8> {
		let target = SimulatedTarget::new(3).with_constant_reply(0x1D);
		let mut s = Session::new(Config::new(3, Some(3), false).unwrap(), target).unwrap();
		let mut out = Vec::new();
		for _ in 0..frames {
			s.write(&[0x00, 0x00, reads]).unwrap();
			out.extend(s.read(reads as usize).unwrap());
		}
		out
	}

	#[test]
	fn repeated_frames_are_deterministic() {
		let first = constant_frames(4, 3);
		assert_eq!(first, vec![0x1D; 12]);
		assert_eq!(constant_frames(4, 3), first);
	}

	#[test]
	fn session_requires_reset_line() {
		assert!(Session::new(Config::new(8, None, true).unwrap(), PulledUpLine::new()).is_err());
	}
}
