/// BDM protocol engine
///
/// A synchronous state machine advanced one controller tick at a time. It
/// consumes command frames from a byte source:
///
/// - 1 byte: flags (0x01: wait a bit period between write and read phase)
/// - 1 byte: number of bytes to write (0..=7)
/// - n bytes: bytes to write
/// - 1 byte: number of bytes to read (0..=7)
///
/// and pushes the read bytes to a byte sink. Bits go MSB first, every bit
/// slot is started by the controller pulling BKGD low.
///
/// Before the first command the engine optionally resets the target (holding
/// BKGD low while RESET is released, which enters active background mode)
/// and, unless a bit rate is forced, measures the target clock with a SYNC:
/// - BKGD low for >= 128 target clocks (at the slowest accepted clock)
/// - target answers with a low pulse of 128 target clocks
///
/// A SYNC that isn't answered in time results in a single 255 byte on the
/// sink, after which the engine stays `Done` until `rearm`.

mod config;
pub mod timing;

pub use self::config::Config;

use crate::fifo::{
	ByteSink,
	ByteSource,
};
use crate::line::{
	Hardware,
	LineDriver,
};

use self::timing::*;

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub enum State {
	Idle,
	Reset,
	Sync,
	SyncWaitLow,
	SyncWaitHigh,
	SyncPostDelay,
	CommandFlags,
	CommandWriteCount,
	CommandWriteBytes,
	WriteByte,
	WriteBit,
	CommandReadDelay,
	CommandReadCount,
	CommandReadBytes,
	ReadByte,
	ReadBit,
	CommandReadByteSend,
	Error,
	Done,
}

// everything that changes per tick; committed atomically at the end of a tick
#[derive(Clone, Debug)]
struct Registers {
	state: State,
	cycles_per_clock: u32,
	// ticks within the current target clock period
	tick_counter: u32,
	// target clock periods since the counters were last cleared
	clock_counter: u32,
	// raw ticks, for SYNC / reset timing
	free_counter: u32,
	shreg: u8,
	bit_no: u8,
	bit: bool,
	delay_before_read: bool,
	write_count: u8,
	read_count: u8,
	output_level: bool,
	output_enable: bool,
	reset: bool,
}

impl Registers {
	fn initial(config: &Config) -> Self {
		Registers {
			state: State::Idle,
			cycles_per_clock: config.forced_cycles_per_clock().unwrap_or(0),
			tick_counter: 0,
			clock_counter: 0,
			free_counter: 0,
			shreg: 0,
			bit_no: 0,
			bit: false,
			delay_before_read: false,
			write_count: 0,
			read_count: 0,
			output_level: true,
			output_enable: false,
			reset: false,
		}
	}
}

pub struct Engine {
	config: Config,
	regs: Registers,
	failed: bool,
	ticks: u64,
}

impl Engine {
	pub fn new(config: Config) -> Self {
		Engine {
			regs: Registers::initial(&config),
			config,
			failed: false,
			ticks: 0,
		}
	}

	pub fn config(&self) -> &Config {
		&self.config
	}

	pub fn state(&self) -> State {
		self.regs.state
	}

	/// ticks per target clock period, once known
	pub fn cycles_per_clock(&self) -> Option<u32> {
		match self.regs.cycles_per_clock {
			0 => None,
			n => Some(n),
		}
	}

	/// SYNC failed; the sentinel was (or will be) emitted
	pub fn is_failed(&self) -> bool {
		self.failed
	}

	/// ready for (or blocked on) the first byte of the next command
	pub fn is_awaiting_command(&self) -> bool {
		self.regs.state == State::CommandFlags
	}

	pub fn ticks(&self) -> u64 {
		self.ticks
	}

	/// Start a new session from `Idle`: reset (if wired) and SYNC again.
	///
	/// This is the only way out of `Done`; a measured clock is dropped.
	pub fn rearm(&mut self) {
		debug!("re-arming BDM engine (was {:?})", self.regs.state);
		self.regs = Registers::initial(&self.config);
		self.failed = false;
	}

	/// Advance one tick: compute the next register values from the current
	/// ones and the synchronized input, then clock the line.
	pub fn tick<H, S, K>(&mut self, line: &mut LineDriver<H>, source: &mut S, sink: &mut K)
	where
		H: Hardware,
		S: ByteSource + ?Sized,
		K: ByteSink + ?Sized,
	{
		let cur = self.regs.clone();
		let mut next = cur.clone();
		let input = line.sample_input();

		next.free_counter = cur.free_counter.wrapping_add(1);
		if cur.cycles_per_clock != 0 {
			if cur.tick_counter + 1 >= cur.cycles_per_clock {
				next.tick_counter = 0;
				next.clock_counter = cur.clock_counter.wrapping_add(1);
			} else {
				next.tick_counter = cur.tick_counter + 1;
			}
		}

		self.step(&cur, &mut next, input, source, sink);

		line.set_output(next.output_level, next.output_enable);
		line.set_reset(next.reset);
		self.regs = next;
		self.ticks += 1;

		line.clock();
	}

	fn after_reset_state(&self) -> State {
		if self.config.forced_cycles_per_clock().is_some() {
			State::CommandFlags
		} else {
			State::Sync
		}
	}

	fn fail(&mut self, next: &mut Registers, what: &str) {
		warn!("BDM SYNC failed: {}", what);
		self.failed = true;
		next.state = State::Error;
	}

	fn step<S, K>(&mut self, cur: &Registers, next: &mut Registers, input: bool, source: &mut S, sink: &mut K)
	where
		S: ByteSource + ?Sized,
		K: ByteSink + ?Sized,
	{
		match cur.state {
			State::Idle => {
				next.tick_counter = 0;
				next.clock_counter = 0;
				next.free_counter = 0;
				next.output_level = true;
				next.output_enable = true;
				next.state = if self.config.has_reset() {
					State::Reset
				} else {
					self.after_reset_state()
				};
			},
			State::Reset => {
				let t = cur.free_counter;
				if t > self.config.reset_done() {
					debug!("target reset done");
					next.free_counter = 0;
					next.output_level = true;
					next.output_enable = true;
					next.state = self.after_reset_state();
				} else if t > self.config.reset_bkgd_release() {
					next.output_enable = false;
				} else if t > self.config.reset_release() {
					// BKGD stays low: target comes up in active background mode
					next.reset = false;
				} else {
					next.output_enable = true;
					next.output_level = false;
					next.reset = true;
				}
			},
			State::Sync => {
				let t = cur.free_counter;
				next.output_enable = true;
				next.output_level = t > self.config.sync_duration();
				if t > self.config.sync_duration() + 2 {
					next.output_enable = false;
					next.free_counter = 0;
					next.state = State::SyncWaitLow;
				}
			},
			State::SyncWaitLow => {
				if !input {
					// this tick already saw the first low sample
					next.free_counter = 1;
					next.state = State::SyncWaitHigh;
				} else if cur.free_counter + 1 >= self.config.max_cycles() {
					self.fail(next, "target didn't answer");
				}
			},
			State::SyncWaitHigh => {
				if input {
					let width = cur.free_counter;
					let cycles_per_clock = width >> SYNC_REPLY_SHIFT;
					debug!("SYNC reply: {} ticks low, {} ticks per target clock", width, cycles_per_clock);
					if cycles_per_clock == 0 {
						self.fail(next, "reply too short to time");
					} else {
						next.cycles_per_clock = cycles_per_clock;
						next.tick_counter = 0;
						next.clock_counter = 0;
						next.state = State::SyncPostDelay;
					}
				} else if cur.free_counter > self.config.sync_duration() {
					self.fail(next, "target didn't release BKGD");
				}
			},
			State::SyncPostDelay => {
				if cur.clock_counter > SYNC_POST_CLOCKS {
					next.state = State::CommandFlags;
				}
			},

			State::CommandFlags => {
				if let Some(flags) = source.pop() {
					next.delay_before_read = 0 != flags & FLAG_READ_DELAY;
					next.state = State::CommandWriteCount;
				}
			},
			State::CommandWriteCount => {
				if let Some(count) = source.pop() {
					next.write_count = count & COUNT_MASK;
					next.state = State::CommandWriteBytes;
				}
			},
			State::CommandWriteBytes => {
				if cur.write_count == 0 {
					if cur.delay_before_read {
						next.tick_counter = 0;
						next.clock_counter = 0;
						next.state = State::CommandReadDelay;
					} else {
						next.state = State::CommandReadCount;
					}
				} else if let Some(byte) = source.pop() {
					trace!("BDM write 0x{:02x}", byte);
					next.shreg = byte;
					next.write_count = cur.write_count - 1;
					next.state = State::WriteByte;
				}
			},
			State::CommandReadDelay => {
				if cur.clock_counter > CLOCKS_PER_BIT {
					next.state = State::CommandReadCount;
				}
			},
			State::CommandReadCount => {
				if let Some(count) = source.pop() {
					next.read_count = count & COUNT_MASK;
					next.state = State::CommandReadBytes;
				}
			},
			State::CommandReadBytes => {
				if cur.read_count == 0 {
					next.state = State::CommandFlags;
				} else {
					next.read_count = cur.read_count - 1;
					next.state = State::ReadByte;
				}
			},
			State::CommandReadByteSend => {
				if sink.push(cur.shreg) {
					trace!("BDM read 0x{:02x}", cur.shreg);
					next.state = State::CommandReadBytes;
				}
			},

			State::WriteByte => {
				if cur.bit_no == 8 {
					next.shreg = 0;
					next.bit_no = 0;
					next.state = State::CommandWriteBytes;
				} else {
					next.tick_counter = 0;
					next.clock_counter = 0;
					next.bit_no = cur.bit_no + 1;
					next.bit = 0 != cur.shreg & 0x80;
					next.shreg = cur.shreg << 1;
					next.state = State::WriteBit;
				}
			},
			State::WriteBit => {
				next.output_enable = true;
				let clock = cur.clock_counter;
				if clock > CLOCKS_PER_BIT {
					next.output_enable = false;
					next.state = State::WriteByte;
				} else if cur.bit {
					next.output_level = clock > CLOCKS_FOR_1;
				} else {
					next.output_level = clock > CLOCKS_FOR_0;
				}
			},

			State::ReadByte => {
				if cur.bit_no == 8 {
					next.bit_no = 0;
					next.state = State::CommandReadByteSend;
				} else {
					next.tick_counter = 0;
					next.clock_counter = 0;
					next.bit_no = cur.bit_no + 1;
					next.state = State::ReadBit;
				}
			},
			State::ReadBit => {
				let clock = cur.clock_counter;
				if clock < CLOCKS_FOR_READ {
					next.output_enable = true;
					next.output_level = false;
				} else {
					next.output_enable = false;
					if clock == CLOCKS_UNTIL_SAMPLE && cur.tick_counter == 0 {
						next.shreg = cur.shreg << 1 | input as u8;
					} else if clock > CLOCKS_PER_BIT {
						next.state = State::ReadByte;
					}
				}
			},

			State::Error => {
				if sink.push(SENTINEL) {
					next.state = State::Done;
				}
			},
			State::Done => {
			},
		}
	}
}
