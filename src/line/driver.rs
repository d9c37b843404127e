use super::{
	Hardware,
	OutPins,
};

/// number of flip-flops between the BKGD pin and the engine's view of it
pub const INPUT_SYNC_STAGES: usize = 2;

/// Registered view of the pins for the protocol engine.
///
/// Outputs set during a tick are applied at the following `clock` edge; the
/// input seen by `sample_input` is the pin level latched `INPUT_SYNC_STAGES`
/// edges ago.
pub struct LineDriver<H: Hardware> {
	hardware: H,
	pins: OutPins,
	sync: [bool; INPUT_SYNC_STAGES],
	has_reset: bool,
}

impl<H: Hardware> LineDriver<H> {
	pub fn new(mut hardware: H) -> Self {
		let pins = OutPins::released();
		let has_reset = hardware.has_reset();
		hardware.set_pins(pins);

		LineDriver {
			hardware,
			pins,
			// idle BKGD is pulled up
			sync: [true; INPUT_SYNC_STAGES],
			has_reset,
		}
	}

	pub fn has_reset(&self) -> bool {
		self.has_reset
	}

	/// drive BKGD to `level` when `enable`, release it otherwise
	pub fn set_output(&mut self, level: bool, enable: bool) {
		self.pins.bkgd = level;
		self.pins.bkgd_enable = enable;
	}

	/// assert or release the (active-low) RESET line; no-op without one
	pub fn set_reset(&mut self, active: bool) {
		if self.has_reset {
			self.pins.reset = active;
		}
	}

	pub fn sample_input(&self) -> bool {
		self.sync[INPUT_SYNC_STAGES - 1]
	}

	/// pins as they will be driven after the next clock edge
	pub fn pending_pins(&self) -> OutPins {
		self.pins
	}

	/// Clock edge: latch the pin into the synchronizer, then apply the
	/// outputs set since the last edge and let the hardware finish the tick.
	pub fn clock(&mut self) {
		let raw = self.hardware.read_pin();
		for stage in (1..INPUT_SYNC_STAGES).rev() {
			self.sync[stage] = self.sync[stage - 1];
		}
		self.sync[0] = raw;

		self.hardware.set_pins(self.pins);
		self.hardware.tick();
	}

	/// release all lines, reset the synchronizer to the idle level
	pub fn release(&mut self) {
		self.pins = OutPins::released();
		self.sync = [true; INPUT_SYNC_STAGES];
		self.hardware.set_pins(self.pins);
	}

	pub fn hardware(&self) -> &H {
		&self.hardware
	}

	pub fn hardware_mut(&mut self) -> &mut H {
		&mut self.hardware
	}
}

#[cfg(test)]
mod test {
	use super::*;

	struct Pin {
		level: bool,
		applied: Vec<OutPins>,
		reset: bool,
	}

	impl Hardware for Pin {
		fn set_pins(&mut self, pins: OutPins) {
			self.applied.push(pins);
		}

		fn read_pin(&mut self) -> bool {
			self.level
		}

		fn has_reset(&self) -> bool {
			self.reset
		}
	}

	fn pin(reset: bool) -> Pin {
		Pin {
			level: true,
			applied: Vec::new(),
			reset,
		}
	}

	#[test]
	fn input_is_delayed_by_sync_stages() {
		let mut line = LineDriver::new(pin(false));
		line.hardware_mut().level = false;

		for _ in 0..INPUT_SYNC_STAGES - 1 {
			line.clock();
			assert!(line.sample_input(), "input visible too early");
		}
		line.clock();
		assert!(!line.sample_input());

		line.hardware_mut().level = true;
		line.clock();
		assert!(!line.sample_input());
	}

	#[test]
	fn outputs_apply_on_clock_edge() {
		let mut line = LineDriver::new(pin(false));
		assert_eq!(line.hardware().applied, vec![OutPins::released()]);

		line.set_output(false, true);
		assert_eq!(line.hardware().applied.len(), 1);

		line.clock();
		assert_eq!(line.hardware().applied.last().unwrap().driven_level(), Some(false));
	}

	#[test]
	fn reset_requires_wired_line() {
		let mut line = LineDriver::new(pin(false));
		line.set_reset(true);
		assert!(!line.pending_pins().reset);

		let mut line = LineDriver::new(pin(true));
		line.set_reset(true);
		assert!(line.pending_pins().reset);
	}
}
