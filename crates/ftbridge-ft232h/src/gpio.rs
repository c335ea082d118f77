//! General-purpose pins
//!
//! All 16 lines can be used as GPIO. Pins 0-2 are only available while
//! neither I2C nor SPI is active, and chip-select lines of open SPI devices
//! are off limits.

use std::fmt;
use std::time::Duration;

use embedded_hal::digital::{ErrorType, InputPin, OutputPin, StatefulOutputPin};
use ftbridge_core::error::{Error, Result};
use ftbridge_core::mpsse::PinBank;

use crate::engine::{lock, Shared};
use crate::register::PIN_COUNT;

/// Direction of a pin
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinMode {
    /// Floating input
    Input,
    /// Push-pull output
    Output,
    /// Input with pull-up (not available on this chip)
    InputPullUp,
    /// Input with pull-down (not available on this chip)
    InputPullDown,
}

/// Edge that a pin-change subscription would trigger on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinEdge {
    /// Low to high
    Rising,
    /// High to low
    Falling,
}

/// GPIO controller of one device
#[derive(Clone)]
pub struct Gpio {
    engine: Shared,
}

impl Gpio {
    pub(crate) fn new(engine: Shared) -> Self {
        Gpio { engine }
    }

    /// Number of logical pins
    pub fn pin_count(&self) -> u8 {
        PIN_COUNT
    }

    /// Whether `mode` can be applied to `pin`
    pub fn is_pin_mode_supported(&self, pin: u8, mode: PinMode) -> bool {
        pin < PIN_COUNT && matches!(mode, PinMode::Input | PinMode::Output)
    }

    /// Whether `pin` is held by a GPIO handle or a chip select
    pub fn is_pin_open(&self, pin: u8) -> bool {
        lock(&self.engine).state.is_open(pin)
    }

    /// Claim `pin`
    pub fn open_pin(&self, pin: u8) -> Result<GpioPin> {
        lock(&self.engine).state.claim_gpio(pin)?;
        log::debug!("Opened GPIO {}", pin);
        Ok(GpioPin {
            engine: self.engine.clone(),
            pin,
            open: true,
        })
    }
}

/// One claimed pin
///
/// Dropping the handle releases the pin; its last level and direction
/// stay on the wire.
pub struct GpioPin {
    engine: Shared,
    pin: u8,
    open: bool,
}

impl GpioPin {
    /// Logical pin number
    pub fn pin(&self) -> u8 {
        self.pin
    }

    /// Change the direction
    pub fn set_mode(&mut self, mode: PinMode) -> Result<()> {
        let output = match mode {
            PinMode::Input => false,
            PinMode::Output => true,
            PinMode::InputPullUp | PinMode::InputPullDown => {
                return Err(Error::NotSupported("GPIO pull resistors"));
            }
        };
        let mut engine = lock(&self.engine);
        let mut pins = engine.state.pins;
        pins.set_output(self.pin, output);
        let (bank, _) = PinBank::of_pin(self.pin);
        engine.apply_bank(pins, bank)
    }

    /// Current direction
    pub fn mode(&self) -> PinMode {
        if lock(&self.engine).state.pins.is_output(self.pin) {
            PinMode::Output
        } else {
            PinMode::Input
        }
    }

    /// Drive the pin
    pub fn write(&mut self, high: bool) -> Result<()> {
        let mut engine = lock(&self.engine);
        let mut pins = engine.state.pins;
        pins.set_level(self.pin, high);
        let (bank, _) = PinBank::of_pin(self.pin);
        engine.apply_bank(pins, bank)
    }

    /// Sample the pin level
    pub fn read(&self) -> Result<bool> {
        let (bank, bit) = PinBank::of_pin(self.pin);
        let levels = lock(&self.engine).read_bank(bank)?;
        Ok(levels & (1 << bit) != 0)
    }

    /// Invert the driven level
    pub fn toggle(&mut self) -> Result<()> {
        let level = lock(&self.engine).state.pins.level(self.pin);
        self.write(!level)
    }

    /// Block until `edge` is seen on the pin
    pub fn wait_for_event(&self, _edge: PinEdge, _timeout: Duration) -> Result<()> {
        Err(Error::NotSupported("GPIO pin change events"))
    }

    /// Register `callback` for `edge`
    pub fn register_callback<F>(&self, _edge: PinEdge, _callback: F) -> Result<()>
    where
        F: FnMut(u8, PinEdge) + Send + 'static,
    {
        Err(Error::NotSupported("GPIO pin change callbacks"))
    }

    /// Release the pin
    pub fn close(mut self) -> Result<()> {
        self.release()
    }

    fn release(&mut self) -> Result<()> {
        if !self.open {
            return Ok(());
        }
        self.open = false;
        lock(&self.engine).state.release_gpio(self.pin)?;
        log::debug!("Closed GPIO {}", self.pin);
        Ok(())
    }
}

impl fmt::Debug for GpioPin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GpioPin").field("pin", &self.pin).finish()
    }
}

impl Drop for GpioPin {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            log::warn!("Failed to release GPIO {}: {}", self.pin, e);
        }
    }
}

impl ErrorType for GpioPin {
    type Error = Error;
}

impl InputPin for GpioPin {
    fn is_high(&mut self) -> Result<bool> {
        self.read()
    }

    fn is_low(&mut self) -> Result<bool> {
        self.read().map(|high| !high)
    }
}

impl OutputPin for GpioPin {
    fn set_low(&mut self) -> Result<()> {
        self.write(false)
    }

    fn set_high(&mut self) -> Result<()> {
        self.write(true)
    }
}

impl StatefulOutputPin for GpioPin {
    fn is_set_high(&mut self) -> Result<bool> {
        Ok(lock(&self.engine).state.pins.level(self.pin))
    }

    fn is_set_low(&mut self) -> Result<bool> {
        self.is_set_high().map(|high| !high)
    }
}
