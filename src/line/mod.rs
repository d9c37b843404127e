/// Line driver for the single-wire BDM interface (BKGD) and the optional
/// RESET line.
///
/// BKGD is a bidirectional open-drain-like line with a pull-up:
/// - the controller either drives it (low or high) or releases it
/// - the target can pull it low whenever the controller released it
///
/// RESET is active-low: asserting it drives the pin low, deasserting it
/// releases the pin (it is pulled up externally).
///
/// Inputs are registered through a chain of `INPUT_SYNC_STAGES` flip-flops
/// before the protocol engine sees them; all sampling offsets in the engine
/// include that delay.

mod driver;
mod hardware;
pub mod sysfs;

pub use self::driver::{
	INPUT_SYNC_STAGES,
	LineDriver,
};

pub use self::hardware::{
	Hardware,
	OutPins,
	TickPacer,
};
