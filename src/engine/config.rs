use super::timing::SYNC_REPLY_CLOCKS;

// keeps 1.5 * sync_duration within u32
const MAX_CYCLES_LIMIT: u32 = (u32::max_value() / 2) / SYNC_REPLY_CLOCKS;

/// Per-session configuration of the protocol engine.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Config {
	max_cycles: u32,
	sync_duration: u32,
	forced_cycles_per_clock: Option<u32>,
	has_reset: bool,
}

fn div_ceil(a: u32, b: u32) -> u32 {
	((u64::from(a) + u64::from(b) - 1) / u64::from(b)) as u32
}

impl Config {
	/// `max_cycles`: ticks per target clock period at the slowest target
	/// clock accepted; bounds SYNC waits.
	pub fn new(max_cycles: u32, forced_cycles_per_clock: Option<u32>, has_reset: bool) -> crate::AResult<Self> {
		ensure!(max_cycles >= 1, "max_cycles must be at least 1");
		ensure!(max_cycles <= MAX_CYCLES_LIMIT, "max_cycles too big: {} (limit {})", max_cycles, MAX_CYCLES_LIMIT);
		if let Some(cycles) = forced_cycles_per_clock {
			ensure!(cycles >= 1, "forced cycles per clock must be at least 1");
		}

		Ok(Config {
			max_cycles,
			sync_duration: max_cycles * SYNC_REPLY_CLOCKS,
			forced_cycles_per_clock,
			has_reset,
		})
	}

	/// Derive the configuration from the controller tick rate, the minimum
	/// expected target clock and optionally a known target clock.
	pub fn from_frequencies(
		sys_clk_hz: u32,
		min_freq_hz: u32,
		freq_hz: Option<u32>,
		has_reset: bool,
	) -> crate::AResult<Self> {
		ensure!(sys_clk_hz > 0, "system clock must not be zero");
		ensure!(min_freq_hz > 0, "minimum target frequency must not be zero");
		ensure!(min_freq_hz <= sys_clk_hz,
			"minimum target frequency {} Hz above system clock {} Hz", min_freq_hz, sys_clk_hz);

		let forced = match freq_hz {
			None => None,
			Some(freq) => {
				ensure!(freq > 0, "target frequency must not be zero");
				ensure!(freq <= sys_clk_hz, "target frequency {} Hz above system clock {} Hz", freq, sys_clk_hz);
				Some(div_ceil(sys_clk_hz, freq))
			},
		};

		let config = Config::new(div_ceil(sys_clk_hz, min_freq_hz), forced, has_reset)?;
		debug!("max_cycles: {}, sync_duration: {}, cycles_per_clock: {:?}",
			config.max_cycles, config.sync_duration, config.forced_cycles_per_clock);
		Ok(config)
	}

	pub fn max_cycles(&self) -> u32 {
		self.max_cycles
	}

	/// expected width of the SYNC request pulse (128 slowest target clocks)
	pub fn sync_duration(&self) -> u32 {
		self.sync_duration
	}

	pub fn forced_cycles_per_clock(&self) -> Option<u32> {
		self.forced_cycles_per_clock
	}

	pub fn has_reset(&self) -> bool {
		self.has_reset
	}

	/// tick at which the reset sequence releases RESET (BKGD still low)
	pub(super) fn reset_release(&self) -> u32 {
		self.sync_duration
	}

	/// tick at which the reset sequence releases BKGD
	pub(super) fn reset_bkgd_release(&self) -> u32 {
		self.sync_duration + self.sync_duration / 5
	}

	/// tick at which the reset sequence is done
	pub(super) fn reset_done(&self) -> u32 {
		self.sync_duration + self.sync_duration / 2
	}
}

#[cfg(test)]
mod test {
	use super::Config;

	#[test]
	fn derive_from_frequencies() {
		let c = Config::from_frequencies(48_000_000, 100_000, None, false).unwrap();
		assert_eq!(c.max_cycles(), 480);
		assert_eq!(c.sync_duration(), 480 * 128);
		assert_eq!(c.forced_cycles_per_clock(), None);

		// rounds up
		let c = Config::from_frequencies(48_000_000, 7_000_000, Some(7_000_000), true).unwrap();
		assert_eq!(c.max_cycles(), 7);
		assert_eq!(c.forced_cycles_per_clock(), Some(7));
		assert!(c.has_reset());
	}

	#[test]
	fn reset_phases() {
		let c = Config::new(10, None, true).unwrap();
		assert_eq!(c.reset_release(), 1280);
		assert_eq!(c.reset_bkgd_release(), 1536);
		assert_eq!(c.reset_done(), 1920);
	}

	#[test]
	fn reject_invalid() {
		assert!(Config::new(0, None, false).is_err());
		assert!(Config::new(10, Some(0), false).is_err());
		assert!(Config::new(u32::max_value(), None, false).is_err());
		assert!(Config::from_frequencies(0, 1, None, false).is_err());
		assert!(Config::from_frequencies(1_000, 0, None, false).is_err());
		assert!(Config::from_frequencies(1_000, 2_000, None, false).is_err());
		assert!(Config::from_frequencies(1_000, 100, Some(2_000), false).is_err());
	}
}
