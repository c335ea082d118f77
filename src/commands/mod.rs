//! CLI command implementations
//!
//! Each command opens the device itself, so every invocation starts from
//! released pins and leaves them released.

pub mod gpio;
pub mod i2c;
mod list;
pub mod spi;

pub use list::list_backends;

/// Format bytes as space-separated hex
pub fn hex_line(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect::<Vec<_>>()
        .join(" ")
}
