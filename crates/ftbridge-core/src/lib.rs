//! ftbridge-core - Shared building blocks for MPSSE bridge drivers
//!
//! This crate holds everything that does not depend on a particular
//! bridge chip or on device state:
//!
//! - [`mpsse`] - opcode constants and the command encoder that turns bus
//!   intents (set pins, clock bytes, set divisor, ...) into the byte
//!   stream understood by the MPSSE command processor
//! - [`transport`] - the raw USB transport contract consumed by drivers
//! - [`error`] - the error taxonomy shared by every personality
//!
//! # Example
//!
//! ```
//! use ftbridge_core::mpsse::{BitOrder, ClockEdge, CommandBuffer};
//!
//! let mut cmd = CommandBuffer::new();
//! cmd.set_low_pins(0x05, 0x07)
//!     .clock_bytes_out(ClockEdge::Falling, BitOrder::MsbFirst, &[0xA5])?;
//! assert_eq!(cmd.as_bytes(), &[0x80, 0x05, 0x07, 0x11, 0x00, 0x00, 0xA5]);
//! # Ok::<(), ftbridge_core::Error>(())
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod error;
pub mod mpsse;
pub mod transport;

pub use error::{Error, IoError, Result};
pub use transport::Transport;
