//! Shared pin register and exclusivity rules
//!
//! The three personalities drive the same 16 lines. [`RegisterState`] owns
//! the pin values/directions, the active bus flags and the ownership bits,
//! and is the single gatekeeper every claim goes through.

use bitflags::bitflags;
use ftbridge_core::error::{Error, Result};
use ftbridge_core::mpsse::PinBank;

/// Number of logical pins (ADBUS0-7, ACBUS0-7)
pub const PIN_COUNT: u8 = 16;

/// Pins 0-2 are SCL/SDA for I2C and SCK/MOSI/MISO for SPI
pub const BUS_PINS: u16 = 0x0007;

/// Lowest pin usable as an SPI chip select
pub const FIRST_CHIP_SELECT: u8 = 3;

bitflags! {
    /// Bus personalities currently driving pins 0-2
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct BusModes: u8 {
        /// I2C engine initialized
        const I2C = 0x01;
        /// SPI engine initialized
        const SPI = 0x02;
    }
}

/// Values and directions of both pin banks
///
/// Bit n of the low byte is pin n, bit n of the high byte is pin n + 8.
/// A direction bit of 1 means output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PinRegister {
    /// Pins 0-7 output values
    pub low_data: u8,
    /// Pins 0-7 directions
    pub low_direction: u8,
    /// Pins 8-15 output values
    pub high_data: u8,
    /// Pins 8-15 directions
    pub high_direction: u8,
}

impl PinRegister {
    /// `(data, direction)` of one bank
    pub fn bank(&self, bank: PinBank) -> (u8, u8) {
        match bank {
            PinBank::Low => (self.low_data, self.low_direction),
            PinBank::High => (self.high_data, self.high_direction),
        }
    }

    /// Replace one bank
    pub fn set_bank(&mut self, bank: PinBank, data: u8, direction: u8) {
        match bank {
            PinBank::Low => {
                self.low_data = data;
                self.low_direction = direction;
            }
            PinBank::High => {
                self.high_data = data;
                self.high_direction = direction;
            }
        }
    }

    /// Set or clear the output value of `pin`
    pub fn set_level(&mut self, pin: u8, high: bool) {
        let (bank, bit) = PinBank::of_pin(pin);
        let (data, dir) = self.bank(bank);
        let data = if high { data | 1 << bit } else { data & !(1 << bit) };
        self.set_bank(bank, data, dir);
    }

    /// Make `pin` an output or an input
    pub fn set_output(&mut self, pin: u8, output: bool) {
        let (bank, bit) = PinBank::of_pin(pin);
        let (data, dir) = self.bank(bank);
        let dir = if output { dir | 1 << bit } else { dir & !(1 << bit) };
        self.set_bank(bank, data, dir);
    }

    /// Whether `pin` is configured as an output
    pub fn is_output(&self, pin: u8) -> bool {
        let (bank, bit) = PinBank::of_pin(pin);
        self.bank(bank).1 & (1 << bit) != 0
    }

    /// Last value written to `pin`
    pub fn level(&self, pin: u8) -> bool {
        let (bank, bit) = PinBank::of_pin(pin);
        self.bank(bank).0 & (1 << bit) != 0
    }
}

/// Who holds a logical pin
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinOwner {
    /// Opened through the GPIO controller
    Gpio,
    /// Registered as an SPI chip-select line
    ChipSelect,
}

/// Pin register, bus flags and pin ownership of one device
#[derive(Debug, Clone, Default)]
pub struct RegisterState {
    /// Current pin values and directions
    pub pins: PinRegister,
    modes: BusModes,
    gpio_open: u16,
    chip_selects: u16,
}

fn check_range(pin: u8) -> Result<()> {
    if pin >= PIN_COUNT {
        return Err(Error::InvalidArgument(format!(
            "Pin {} out of range 0..{}",
            pin, PIN_COUNT
        )));
    }
    Ok(())
}

impl RegisterState {
    /// Active bus personalities
    pub fn modes(&self) -> BusModes {
        self.modes
    }

    /// Mark a personality active or inactive
    pub fn set_mode(&mut self, mode: BusModes, active: bool) {
        self.modes.set(mode, active);
    }

    /// Current owner of `pin`, if any
    pub fn owner(&self, pin: u8) -> Option<PinOwner> {
        let mask = 1u16 << (pin % PIN_COUNT);
        if self.gpio_open & mask != 0 {
            Some(PinOwner::Gpio)
        } else if self.chip_selects & mask != 0 {
            Some(PinOwner::ChipSelect)
        } else {
            None
        }
    }

    /// Whether `pin` is claimed by anyone
    pub fn is_open(&self, pin: u8) -> bool {
        pin < PIN_COUNT && self.owner(pin).is_some()
    }

    /// Check that `pin` may be opened as a GPIO
    pub fn check_gpio(&self, pin: u8) -> Result<()> {
        check_range(pin)?;
        if BUS_PINS & (1 << pin) != 0 && !self.modes.is_empty() {
            return Err(Error::ResourceConflict(format!(
                "Pin {} is used by the active {:?} bus",
                pin, self.modes
            )));
        }
        match self.owner(pin) {
            Some(PinOwner::ChipSelect) => Err(Error::ResourceConflict(format!(
                "Pin {} is an SPI chip select",
                pin
            ))),
            Some(PinOwner::Gpio) => Err(Error::AlreadyInUse(format!("Pin {} is already open", pin))),
            None => Ok(()),
        }
    }

    /// Claim `pin` for the GPIO controller
    pub fn claim_gpio(&mut self, pin: u8) -> Result<()> {
        self.check_gpio(pin)?;
        self.gpio_open |= 1 << pin;
        Ok(())
    }

    /// Release a GPIO pin
    pub fn release_gpio(&mut self, pin: u8) -> Result<()> {
        check_range(pin)?;
        if self.gpio_open & (1 << pin) == 0 {
            return Err(Error::NotOpen(format!("Pin {} is not open", pin)));
        }
        self.gpio_open &= !(1 << pin);
        Ok(())
    }

    /// Check that `line` may be registered as a chip select
    pub fn check_chip_select(&self, line: u8) -> Result<()> {
        if !(FIRST_CHIP_SELECT..PIN_COUNT).contains(&line) {
            return Err(Error::InvalidArgument(format!(
                "Chip select line {} out of range {}..{}",
                line, FIRST_CHIP_SELECT, PIN_COUNT
            )));
        }
        match self.owner(line) {
            Some(PinOwner::ChipSelect) => Err(Error::InvalidArgument(format!(
                "Chip select line {} is already registered",
                line
            ))),
            Some(PinOwner::Gpio) => Err(Error::ResourceConflict(format!(
                "Chip select line {} is open as a GPIO",
                line
            ))),
            None => Ok(()),
        }
    }

    /// Claim `line` as a chip select
    pub fn claim_chip_select(&mut self, line: u8) -> Result<()> {
        self.check_chip_select(line)?;
        self.chip_selects |= 1 << line;
        Ok(())
    }

    /// Release a chip-select line
    pub fn release_chip_select(&mut self, line: u8) {
        if line < PIN_COUNT {
            self.chip_selects &= !(1 << line);
        }
    }

    /// Check that the I2C personality may start
    pub fn check_enter_i2c(&self) -> Result<()> {
        if self.modes.contains(BusModes::SPI) {
            return Err(Error::ResourceConflict(
                "I2C cannot start while SPI is active".into(),
            ));
        }
        if self.gpio_open & BUS_PINS != 0 {
            return Err(Error::ResourceConflict(
                "I2C cannot start while GPIO 0, 1 or 2 is open".into(),
            ));
        }
        Ok(())
    }

    /// Check that the SPI personality may start
    pub fn check_enter_spi(&self) -> Result<()> {
        if self.modes.contains(BusModes::I2C) {
            return Err(Error::ResourceConflict(
                "SPI cannot start while I2C is active".into(),
            ));
        }
        if self.gpio_open & BUS_PINS != 0 {
            return Err(Error::ResourceConflict(
                "SPI cannot start while GPIO 0, 1 or 2 is open".into(),
            ));
        }
        Ok(())
    }
}
