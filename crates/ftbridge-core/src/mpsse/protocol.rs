//! MPSSE command processor constants
//!
//! Based on FTDI AN_108 "Command Processor for MPSSE and MCU Host Bus
//! Emulation Modes". Data-shifting opcodes are built from the flag bits
//! below rather than listed one by one.

// ============================================================================
// Data shifting flags (combine into opcodes 0x10..=0x3F)
// ============================================================================

/// Clock data out on the negative edge (otherwise positive)
pub const MPSSE_WRITE_NEG: u8 = 0x01;

/// Transfer bits instead of bytes
pub const MPSSE_BITMODE: u8 = 0x02;

/// Sample data in on the negative edge (otherwise positive)
pub const MPSSE_READ_NEG: u8 = 0x04;

/// LSB first (otherwise MSB first)
pub const MPSSE_LSB: u8 = 0x08;

/// Shift data out on TDI/DO
pub const MPSSE_DO_WRITE: u8 = 0x10;

/// Shift data in from TDO/DI
pub const MPSSE_DO_READ: u8 = 0x20;

/// Mask selecting opcodes that shift data
pub const MPSSE_SHIFT_MASK: u8 = 0xC0;

// ============================================================================
// Pin and engine commands
// ============================================================================

/// Set data bits low byte: `[0x80][value][direction]`
pub const SET_BITS_LOW: u8 = 0x80;

/// Read data bits low byte: `[0x81]` -> 1 byte
pub const GET_BITS_LOW: u8 = 0x81;

/// Set data bits high byte: `[0x82][value][direction]`
pub const SET_BITS_HIGH: u8 = 0x82;

/// Read data bits high byte: `[0x83]` -> 1 byte
pub const GET_BITS_HIGH: u8 = 0x83;

/// Connect TDI to TDO for loopback
pub const LOOPBACK_START: u8 = 0x84;

/// Disconnect TDI/TDO loopback
pub const LOOPBACK_END: u8 = 0x85;

/// Set clock divisor: `[0x86][divLo][divHi]`
pub const TCK_DIVISOR: u8 = 0x86;

/// Send immediate (flush the chip's read buffer back to the host)
pub const SEND_IMMEDIATE: u8 = 0x87;

/// Disable divide-by-5 prescaler (60 MHz master clock)
pub const DIS_DIV_5: u8 = 0x8A;

/// Enable divide-by-5 prescaler (12 MHz master clock)
pub const EN_DIV_5: u8 = 0x8B;

/// Enable 3-phase data clocking (data valid on both edges, for I2C)
pub const EN_3_PHASE: u8 = 0x8C;

/// Disable 3-phase data clocking
pub const DIS_3_PHASE: u8 = 0x8D;

/// Enable adaptive clocking
pub const CLK_ADAPTIVE: u8 = 0x96;

/// Disable adaptive clocking
pub const CLK_NO_ADAPTIVE: u8 = 0x97;

/// Drive-zero mode: `[0x9E][lowMask][highMask]`, masked pins only drive low
pub const DRIVE_ZERO_ONLY: u8 = 0x9E;

/// First byte of the echo the command processor sends for an invalid opcode
pub const BAD_COMMAND: u8 = 0xFA;

/// First synchronization probe (invalid opcode)
pub const SYNC_PROBE_1: u8 = 0xAA;

/// Second synchronization probe (invalid opcode)
pub const SYNC_PROBE_2: u8 = 0xAB;

// ============================================================================
// Clocking
// ============================================================================

/// Master clock in kHz with divide-by-5 disabled
pub const MASTER_CLOCK_KHZ: u32 = 60_000;

/// Largest byte count a single shifting command can carry
///
/// The 16-bit length field stores `len - 1`.
pub const MAX_TRANSFER_LEN: usize = 65_535;
