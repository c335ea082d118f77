//! ftbridge-ft232h - GPIO, I2C and SPI on an FT232H
//!
//! The FT232H's MPSSE engine drives 16 lines (ADBUS0-7 as pins 0-7,
//! ACBUS0-7 as pins 8-15). This crate turns it into three personalities
//! that share those lines:
//!
//! - [`I2cBus`] / [`I2cDevice`] - bit-banged I2C master on pins 0-2
//! - [`SpiDevice`] - SPI master on pins 0-2 with chip selects on 3-15
//! - [`Gpio`] / [`GpioPin`] - direct pin access
//!
//! I2C and SPI both need pins 0-2 and cannot be active at the same time;
//! GPIO 0-2 are only available while neither is. Every claim is checked
//! against the shared register state before anything goes on the wire.
//!
//! The facades implement the `embedded-hal` 1.0 traits, so sensor drivers
//! can use them directly.
//!
//! # Example
//!
//! ```
//! use ftbridge_dummy::DummyTransport;
//! use ftbridge_ft232h::{DeviceConfig, Ft232h, SpiConfig};
//!
//! let device = Ft232h::new(DummyTransport::new(), DeviceConfig::default());
//!
//! let spi = device.spi_device(SpiConfig::new(3).clock_frequency_hz(1_000_000))?;
//! let mut rx = [0u8; 2];
//! spi.write_read(&[0x9F, 0x00], &mut rx)?;
//!
//! // SPI owns pins 0-2, but other pins are free
//! let mut led = device.gpio().open_pin(8)?;
//! led.set_mode(ftbridge_ft232h::PinMode::Output)?;
//! led.write(true)?;
//! # Ok::<(), ftbridge_core::Error>(())
//! ```
//!
//! # Device Options
//!
//! When using the CLI, the following options are available:
//!
//! - `description=<string>` - name used in messages
//! - `timeout_ms=<N>` - read deadline in milliseconds (default: 1000)
//! - `i2c_khz=<N>` - I2C clock in kHz (default: 400)
//! - `vid=<hex>`, `pid=<hex>` - USB IDs (default: 0403:6014)
//! - `interface=<A|B|C|D>` - channel (default: A)

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

mod config;
mod device;
mod engine;
#[cfg(feature = "libftdi")]
mod ftdi_transport;
mod gpio;
mod i2c;
mod register;
mod spi;

pub use config::{
    parse_options, DeviceConfig, FtdiInterface, FtdiOpenOptions, DEFAULT_I2C_KHZ,
    DEFAULT_READ_TIMEOUT, FT232H_PID, FT232H_VID,
};
pub use device::Ft232h;
#[cfg(feature = "libftdi")]
pub use ftdi_transport::LibFtdiTransport;
pub use gpio::{Gpio, GpioPin, PinEdge, PinMode};
pub use i2c::{I2cBus, I2cDevice};
pub use register::{BusModes, PinOwner, PinRegister, RegisterState, PIN_COUNT};
pub use spi::{read_opcode, transfer_opcode, write_opcode, SpiConfig, SpiDevice, SpiMode};

pub use ftbridge_core::mpsse::BitOrder;
