use std::hint;
use std::time::{
	Duration,
	Instant,
};

#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct OutPins {
	/// output level of BKGD (only relevant while `bkgd_enable`)
	pub bkgd: bool,
	/// drive BKGD; released (pulled up / target driven) otherwise
	pub bkgd_enable: bool,
	/// assert (active-low) RESET
	pub reset: bool,
}

impl OutPins {
	pub fn released() -> Self {
		OutPins {
			bkgd: true,
			bkgd_enable: false,
			reset: false,
		}
	}

	/// level the controller forces onto BKGD, if any
	pub fn driven_level(&self) -> Option<bool> {
		if self.bkgd_enable {
			Some(self.bkgd)
		} else {
			None
		}
	}
}

pub trait Hardware {
	fn set_pins(&mut self, pins: OutPins);
	fn read_pin(&mut self) -> bool;

	fn has_reset(&self) -> bool {
		false
	}

	// end of one controller tick; outputs for the next tick are already set
	fn tick(&mut self) {
	}
}

impl<'a, H: ?Sized + Hardware> Hardware for &'a mut H {
	fn set_pins(&mut self, pins: OutPins) {
		H::set_pins(*self, pins)
	}

	fn read_pin(&mut self) -> bool {
		H::read_pin(*self)
	}

	fn has_reset(&self) -> bool {
		H::has_reset(*self)
	}

	fn tick(&mut self) {
		H::tick(*self)
	}
}

/// Paces a firmware loop to a fixed tick period.
///
/// Deadlines are absolute (`start + n * period`), so jitter in one tick
/// doesn't accumulate. Sleeping is too coarse for sub-bit timing, this
/// busy-waits.
#[derive(Debug)]
pub struct TickPacer {
	period: Duration,
	next: Option<Instant>,
	overruns: u64,
}

impl TickPacer {
	pub fn new(period: Duration) -> Self {
		TickPacer {
			period,
			next: None,
			overruns: 0,
		}
	}

	pub fn from_frequency(hz: u32) -> crate::AResult<Self> {
		ensure!(hz > 0, "tick rate must not be zero");
		ensure!(hz <= 1_000_000_000, "tick rate above 1 GHz: {} Hz", hz);
		Ok(Self::new(Duration::from_nanos(1_000_000_000 / u64::from(hz))))
	}

	pub fn period(&self) -> Duration {
		self.period
	}

	/// number of ticks which started late by more than a full period
	pub fn overruns(&self) -> u64 {
		self.overruns
	}

	pub fn wait(&mut self) {
		let now = Instant::now();
		let deadline = match self.next {
			None => now + self.period,
			Some(deadline) => deadline,
		};

		if now > deadline + self.period {
			// running late: restart the schedule instead of bursting ticks
			self.overruns += 1;
			self.next = Some(now + self.period);
			return;
		}

		while Instant::now() < deadline {
			hint::spin_loop();
		}
		self.next = Some(deadline + self.period);
	}
}

#[cfg(test)]
mod test {
	use super::*;

	#[test]
	fn pacer_period_from_frequency() {
		assert_eq!(TickPacer::from_frequency(1_000_000).unwrap().period(), Duration::from_micros(1));
		assert_eq!(TickPacer::from_frequency(3).unwrap().period(), Duration::from_nanos(333_333_333));
		assert!(TickPacer::from_frequency(0).is_err());
		assert!(TickPacer::from_frequency(2_000_000_000).is_err());
	}

	#[test]
	fn pacer_keeps_absolute_schedule() {
		let mut pacer = TickPacer::new(Duration::from_micros(200));
		let start = Instant::now();
		for _ in 0..10 {
			pacer.wait();
		}
		assert!(start.elapsed() >= Duration::from_millis(2));
	}
}
