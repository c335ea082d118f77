//! MPSSE opcode protocol
//!
//! The bridge's command processor consumes a byte stream of opcodes with
//! inline operands. [`protocol`] lists the opcodes, [`command`] builds
//! sequences from them.

pub mod command;
pub mod protocol;

pub use command::{
    bad_command_echo, clock_divisor, clock_opcode, decode_set_pins, divisor_frequency_khz,
    encode_length, read_pins, set_clock_divisor, set_pins, BitOrder, ClockEdge, ClockUnit,
    Clocking, CommandBuffer, PinBank,
};
