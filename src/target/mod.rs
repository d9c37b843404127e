/// Stand-ins for the wire and the target chip, driven tick by tick through
/// the `Hardware` trait: a bare pulled-up line, a pin recorder, and a BDM
/// target model.

mod sim;
mod wire;

pub use self::sim::{
	BDCSCR_BDMACT,
	BDCSCR_ENBDM,
	SimulatedTarget,
};

pub use self::wire::{
	PulledUpLine,
	Recorder,
};
