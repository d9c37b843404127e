use crate::line::{
	Hardware,
	OutPins,
};

/// BKGD with only a pull-up attached: reads back whatever the controller
/// drives, high when released.
#[derive(Clone, Debug)]
pub struct PulledUpLine {
	pins: OutPins,
}

impl PulledUpLine {
	pub fn new() -> Self {
		PulledUpLine {
			pins: OutPins::released(),
		}
	}
}

impl Default for PulledUpLine {
	fn default() -> Self {
		Self::new()
	}
}

impl Hardware for PulledUpLine {
	fn set_pins(&mut self, pins: OutPins) {
		self.pins = pins;
	}

	fn read_pin(&mut self) -> bool {
		self.pins.driven_level() != Some(false)
	}
}

/// Records every pin state applied to the wrapped hardware (one entry per
/// tick, plus the initial state).
pub struct Recorder<H: Hardware> {
	inner: H,
	pins: Vec<OutPins>,
}

impl<H: Hardware> Recorder<H> {
	pub fn new(inner: H) -> Self {
		Recorder {
			inner,
			pins: Vec::new(),
		}
	}

	pub fn pins(&self) -> &[OutPins] {
		&self.pins
	}

	pub fn inner(&self) -> &H {
		&self.inner
	}
}

impl<H: Hardware> Hardware for Recorder<H> {
	fn set_pins(&mut self, pins: OutPins) {
		self.pins.push(pins);
		self.inner.set_pins(pins);
	}

	fn read_pin(&mut self) -> bool {
		self.inner.read_pin()
	}

	fn has_reset(&self) -> bool {
		self.inner.has_reset()
	}

	fn tick(&mut self) {
		self.inner.tick();
	}
}
