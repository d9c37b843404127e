use std::collections::VecDeque;

use crate::engine::timing::{
	CLOCKS_UNTIL_SAMPLE,
	SYNC_REPLY_CLOCKS,
};
use crate::interface::{
	BDM_COMMAND_BACKGROUND,
	BDM_COMMAND_READ_BYTE,
	BDM_COMMAND_READ_STATUS,
	BDM_COMMAND_WRITE_BYTE,
	BDM_COMMAND_WRITE_CONTROL,
};
use crate::line::{
	Hardware,
	OutPins,
};

// BDC status and control register
pub const BDCSCR_ENBDM: u8 = 0x80;
pub const BDCSCR_BDMACT: u8 = 0x40;

// target clocks between the end of a SYNC request and the reply
const SYNC_REPLY_DELAY_CLOCKS: u64 = 16;
// target holds BKGD low this long to send a 0
const TARGET_LOW_CLOCKS: u64 = 13;

const MEMORY_SIZE: usize = 0x1_0000;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum Reply {
	Idle,
	Waiting { start: u64 },
	Pulse { end: u64 },
}

/// Tick-level model of a BDM target on BKGD (and RESET).
///
/// The target runs at `clock` ticks per target clock period. It answers a
/// SYNC request (BKGD low >= 128 target clocks) with a low pulse of 128
/// target clocks, after leaving the line high for 16 target clocks, samples written bits 10 target clocks
/// after the falling edge and answers read slots by holding BKGD low for 13
/// target clocks to send a 0.
///
/// Implemented commands: BACKGROUND, READ_STATUS, WRITE_CONTROL, READ_BYTE,
/// WRITE_BYTE.
pub struct SimulatedTarget {
	clock: u64,
	sync_reply: u64,
	responsive: bool,
	has_reset: bool,
	constant_reply: Option<u8>,

	pins: OutPins,
	now: u64,
	prev_low: bool,
	low_since: Option<u64>,
	write_slot: Option<u64>,
	reply: Reply,
	drive_low_until: u64,
	in_reset: bool,

	rx_bits: u8,
	rx_count: u8,
	command: Vec<u8>,
	tx: VecDeque<bool>,

	memory: Vec<u8>,
	status: u8,
	syncs: u32,
}

impl SimulatedTarget {
	pub fn new(clock: u32) -> Self {
		assert!(clock >= 1);
		let clock = u64::from(clock);

		SimulatedTarget {
			clock,
			sync_reply: clock * u64::from(SYNC_REPLY_CLOCKS),
			responsive: true,
			has_reset: false,
			constant_reply: None,

			pins: OutPins::released(),
			now: 0,
			prev_low: false,
			low_since: None,
			write_slot: None,
			reply: Reply::Idle,
			drive_low_until: 0,
			in_reset: false,

			rx_bits: 0,
			rx_count: 0,
			command: Vec::new(),
			tx: VecDeque::new(),

			memory: vec![0; MEMORY_SIZE],
			status: BDCSCR_ENBDM,
			syncs: 0,
		}
	}

	/// answer SYNC with a pulse of exactly `ticks` instead of 128 clocks
	pub fn with_sync_reply(mut self, ticks: u32) -> Self {
		self.sync_reply = u64::from(ticks);
		self
	}

	/// RESET is wired to the target
	pub fn with_reset(mut self) -> Self {
		self.has_reset = true;
		self
	}

	/// answer every bit slot with the bits of `byte` (MSB first), ignoring
	/// commands
	pub fn with_constant_reply(mut self, byte: u8) -> Self {
		self.constant_reply = Some(byte);
		self
	}

	pub fn with_memory(mut self, address: u16, data: &[u8]) -> Self {
		self.write_memory(address, data);
		self
	}

	pub fn write_memory(&mut self, address: u16, data: &[u8]) {
		for (i, &b) in data.iter().enumerate() {
			self.memory[(address as usize + i) % MEMORY_SIZE] = b;
		}
	}

	pub fn memory(&self) -> &[u8] {
		&self.memory
	}

	/// a target that stops responding still loads BKGD, but never drives it
	pub fn set_responsive(&mut self, responsive: bool) {
		self.responsive = responsive;
		if !responsive {
			self.reply = Reply::Idle;
			self.drive_low_until = 0;
		}
	}

	pub fn is_background(&self) -> bool {
		0 != self.status & BDCSCR_BDMACT
	}

	pub fn status(&self) -> u8 {
		self.status
	}

	/// number of SYNC requests seen
	pub fn syncs(&self) -> u32 {
		self.syncs
	}

	/// Smallest `max_cycles` a controller needs to see the SYNC reply: the
	/// reply delay plus a target clock and some ticks of input latency.
	pub fn sync_reply_window(&self) -> u32 {
		((SYNC_REPLY_DELAY_CLOCKS + 1) * self.clock + 8) as u32
	}

	fn target_low(&self) -> bool {
		match self.reply {
			Reply::Pulse { .. } => true,
			_ => self.now < self.drive_low_until,
		}
	}

	fn clear_link(&mut self) {
		self.rx_bits = 0;
		self.rx_count = 0;
		self.command.clear();
		self.tx.clear();
		self.write_slot = None;
	}

	fn next_tx_bit(&mut self) -> Option<bool> {
		if self.tx.is_empty() {
			if let Some(byte) = self.constant_reply {
				self.queue_byte(byte);
			}
		}
		self.tx.pop_front()
	}

	fn queue_byte(&mut self, byte: u8) {
		for bit in (0..8).rev() {
			self.tx.push_back(0 != byte & (1 << bit));
		}
	}

	fn receive_bit(&mut self, bit: bool) {
		self.rx_bits = self.rx_bits << 1 | bit as u8;
		self.rx_count += 1;
		if self.rx_count == 8 {
			let byte = self.rx_bits;
			self.rx_bits = 0;
			self.rx_count = 0;
			self.receive_byte(byte);
		}
	}

	fn receive_byte(&mut self, byte: u8) {
		self.command.push(byte);
		let c = &self.command;
		let address = |c: &[u8]| (c[1] as usize) << 8 | c[2] as usize;

		match (c[0], c.len()) {
			(BDM_COMMAND_BACKGROUND, 1) => {
				self.status |= BDCSCR_BDMACT;
			},
			(BDM_COMMAND_READ_STATUS, 1) => {
				let status = self.status;
				self.queue_byte(status);
			},
			(BDM_COMMAND_WRITE_CONTROL, 2) => {
				self.status = c[1] & !BDCSCR_BDMACT | self.status & BDCSCR_BDMACT;
			},
			(BDM_COMMAND_READ_BYTE, 3) => {
				let value = self.memory[address(c)];
				self.queue_byte(value);
			},
			(BDM_COMMAND_WRITE_BYTE, 4) => {
				let a = address(c);
				self.memory[a] = c[3];
			},
			(BDM_COMMAND_WRITE_CONTROL, _)
			| (BDM_COMMAND_READ_BYTE, _)
			| (BDM_COMMAND_WRITE_BYTE, _) => {
				// operands pending
				return;
			},
			(cmd, _) => {
				debug!("simulated target: ignoring unknown command 0x{:02x}", cmd);
			},
		}
		self.command.clear();
	}
}

impl Hardware for SimulatedTarget {
	fn set_pins(&mut self, pins: OutPins) {
		self.pins = pins;
	}

	fn read_pin(&mut self) -> bool {
		self.pins.driven_level() != Some(false) && !self.target_low()
	}

	fn has_reset(&self) -> bool {
		self.has_reset
	}

	fn tick(&mut self) {
		self.now += 1;
		let now = self.now;
		let low = self.pins.driven_level() == Some(false);

		if self.has_reset {
			if self.pins.reset {
				self.in_reset = true;
				self.clear_link();
				self.reply = Reply::Idle;
				self.drive_low_until = 0;
				self.low_since = None;
				self.status &= !BDCSCR_BDMACT;
				self.prev_low = low;
				return;
			}
			if self.in_reset {
				self.in_reset = false;
				if low {
					debug!("simulated target: reset with BKGD low, entering active background mode");
					self.status |= BDCSCR_BDMACT;
				}
			}
		}

		if !self.responsive {
			self.prev_low = low;
			return;
		}

		match self.reply {
			Reply::Waiting { start } if now >= start => {
				self.reply = Reply::Pulse { end: now + self.sync_reply };
			},
			Reply::Pulse { end } if now >= end => {
				self.reply = Reply::Idle;
			},
			_ => (),
		}

		if low && !self.prev_low {
			self.low_since = Some(now);
			match self.next_tx_bit() {
				Some(bit) => {
					if !bit {
						self.drive_low_until = now + TARGET_LOW_CLOCKS * self.clock;
					}
				},
				None => {
					self.write_slot = Some(now);
				},
			}
		} else if !low && self.prev_low {
			if let Some(start) = self.low_since.take() {
				if now - start >= u64::from(SYNC_REPLY_CLOCKS) * self.clock {
					self.syncs += 1;
					self.clear_link();
					self.reply = Reply::Waiting { start: now + SYNC_REPLY_DELAY_CLOCKS * self.clock };
				}
			}
		}

		if let Some(start) = self.write_slot {
			if now - start == u64::from(CLOCKS_UNTIL_SAMPLE) * self.clock {
				self.write_slot = None;
				self.receive_bit(!low);
			}
		}

		self.prev_low = low;
	}
}

#[cfg(test)]
mod test {
	use super::*;

	fn drive(target: &mut SimulatedTarget, level: Option<bool>, ticks: u64) {
		let pins = OutPins {
			bkgd: level.unwrap_or(true),
			bkgd_enable: level.is_some(),
			reset: false,
		};
		for _ in 0..ticks {
			target.set_pins(pins);
			target.tick();
		}
	}

	// controller side of one write slot, as the engine produces it
	fn write_bit(target: &mut SimulatedTarget, bit: bool, k: u64) {
		let low = if bit { 5 } else { 15 };
		drive(target, Some(false), low * k);
		drive(target, Some(true), (19 - low) * k);
		drive(target, None, 2);
	}

	fn write_byte(target: &mut SimulatedTarget, byte: u8, k: u64) {
		for bit in (0..8).rev() {
			write_bit(target, 0 != byte & (1 << bit), k);
		}
	}

	#[test]
	fn answers_sync() {
		let k = 3;
		let mut t = SimulatedTarget::new(k as u32);
		drive(&mut t, Some(false), 128 * k);
		drive(&mut t, None, 1);
		assert_eq!(t.syncs(), 1);

		// line stays high for 16 target clocks, counting the release tick
		let mut high = 0;
		while t.read_pin() {
			high += 1;
			assert!(high < 100 * k, "no SYNC reply");
			drive(&mut t, None, 1);
		}
		assert_eq!(high, 16 * k);

		let mut width = 0;
		while !t.read_pin() {
			drive(&mut t, None, 1);
			width += 1;
		}
		assert_eq!(width, 128 * k);
	}

	#[test]
	fn short_low_is_not_sync() {
		let mut t = SimulatedTarget::new(2);
		drive(&mut t, Some(false), 255);
		drive(&mut t, None, 200);
		assert_eq!(t.syncs(), 0);
	}

	#[test]
	fn write_byte_command() {
		let k = 2;
		let mut t = SimulatedTarget::new(k as u32);
		for &b in &[BDM_COMMAND_WRITE_BYTE, 0x12, 0x34, 0x5a] {
			write_byte(&mut t, b, k);
		}
		assert_eq!(t.memory()[0x1234], 0x5a);
	}

	#[test]
	fn background_command() {
		let mut t = SimulatedTarget::new(1);
		assert!(!t.is_background());
		write_byte(&mut t, BDM_COMMAND_BACKGROUND, 1);
		assert!(t.is_background());
	}

	#[test]
	fn read_slot_zero_holds_line() {
		let k = 4;
		let mut t = SimulatedTarget::new(k as u32).with_constant_reply(0x40);
		// first slot sends 0
		drive(&mut t, Some(false), 4 * k);
		drive(&mut t, None, 6 * k);
		assert!(!t.read_pin());
		drive(&mut t, None, 10 * k);
		assert!(t.read_pin());
		// second slot sends 1
		drive(&mut t, Some(false), 4 * k);
		drive(&mut t, None, 6 * k);
		assert!(t.read_pin());
	}
}
