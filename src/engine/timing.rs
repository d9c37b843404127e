//! Protocol timing, in target clock periods unless noted otherwise.
//!
//! One target clock period lasts `cycles_per_clock` controller ticks; the
//! slot/pulse widths below are what the engine produces for a calibrated
//! `cycles_per_clock` (see the tests in `engine`).

/// a written 0 is held low while the bit clock is <= this
pub const CLOCKS_FOR_0: u32 = 14;
/// a written 1 is held low while the bit clock is <= this
pub const CLOCKS_FOR_1: u32 = 4;
/// a bit slot ends once the bit clock exceeds this
pub const CLOCKS_PER_BIT: u32 = 18;
/// read slots sample BKGD at this bit clock
pub const CLOCKS_UNTIL_SAMPLE: u32 = 10;
/// read slots start with a low pulse while the bit clock is below this
pub const CLOCKS_FOR_READ: u32 = 4;

/// settling time after SYNC before the first command
pub const SYNC_POST_CLOCKS: u32 = 8;
/// the SYNC reply is 128 target clock periods long
pub const SYNC_REPLY_SHIFT: u32 = 7;
pub const SYNC_REPLY_CLOCKS: u32 = 1 << SYNC_REPLY_SHIFT;

/// released ticks between two bit slots of a byte
pub const SLOT_GAP_TICKS: u32 = 2;

/// response byte reporting a SYNC failure
pub const SENTINEL: u8 = 255;

/// command flags: wait a bit period between write and read phase
pub const FLAG_READ_DELAY: u8 = 0x01;
/// write/read counts are 3-bit fields
pub const COUNT_MASK: u8 = 0x07;

/// ticks BKGD is held low for a written bit
pub fn write_low_ticks(bit: bool, cycles_per_clock: u32) -> u32 {
	let clocks = if bit { CLOCKS_FOR_1 } else { CLOCKS_FOR_0 };
	(clocks + 1) * cycles_per_clock
}

/// ticks BKGD is driven (low, then high) for a written bit
pub fn write_drive_ticks(cycles_per_clock: u32) -> u32 {
	(CLOCKS_PER_BIT + 1) * cycles_per_clock
}

/// ticks the controller holds BKGD low to start a read slot
pub fn read_low_ticks(cycles_per_clock: u32) -> u32 {
	CLOCKS_FOR_READ * cycles_per_clock
}

/// ticks from one slot start to the next within a byte
pub fn slot_ticks(cycles_per_clock: u32) -> u32 {
	write_drive_ticks(cycles_per_clock) + SLOT_GAP_TICKS
}

/// ticks spent in the read delay of a command with `FLAG_READ_DELAY`
pub fn read_delay_ticks(cycles_per_clock: u32) -> u32 {
	(CLOCKS_PER_BIT + 1) * cycles_per_clock + 1
}
