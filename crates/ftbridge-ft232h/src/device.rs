//! FT232H device handle

use std::sync::{Arc, Mutex};

use ftbridge_core::error::Result;
use ftbridge_core::transport::Transport;

use crate::config::DeviceConfig;
use crate::engine::{lock, Engine, Shared};
use crate::gpio::Gpio;
use crate::i2c::I2cBus;
use crate::register::{BusModes, PinRegister};
use crate::spi::{SpiConfig, SpiDevice};

/// An FT232H bridge
///
/// Owns the transport and the shared pin register. Bus facades created
/// from it keep the device state alive; the pins are released when the
/// device and every facade have been dropped.
pub struct Ft232h {
    engine: Shared,
}

impl Ft232h {
    /// Wrap an already opened transport
    pub fn new(transport: impl Transport + 'static, config: DeviceConfig) -> Self {
        log::info!("Opened {}", config.name());
        Ft232h {
            engine: Arc::new(Mutex::new(Engine::new(Box::new(transport), config))),
        }
    }

    /// Open the chip through libftdi
    #[cfg(feature = "libftdi")]
    pub fn open(config: DeviceConfig) -> Result<Self> {
        let transport = crate::ftdi_transport::LibFtdiTransport::open(&config.open)?;
        Ok(Self::new(transport, config))
    }

    /// Create the I2C bus (pins 0-2)
    ///
    /// Fails with `ResourceConflict` while SPI is active or GPIO 0-2 is
    /// open, and with `AlreadyInUse` if a bus already exists.
    pub fn i2c_bus(&self) -> Result<I2cBus> {
        I2cBus::open(self.engine.clone())
    }

    /// Open an SPI device on `settings.chip_select_line`
    pub fn spi_device(&self, settings: SpiConfig) -> Result<SpiDevice> {
        SpiDevice::open(self.engine.clone(), settings)
    }

    /// GPIO controller for all 16 pins
    pub fn gpio(&self) -> Gpio {
        Gpio::new(self.engine.clone())
    }

    /// Active bus personalities
    pub fn bus_modes(&self) -> BusModes {
        lock(&self.engine).state.modes()
    }

    /// Last values written to the pin register
    pub fn pins(&self) -> PinRegister {
        lock(&self.engine).state.pins
    }

    /// Device configuration
    pub fn config(&self) -> DeviceConfig {
        lock(&self.engine).config.clone()
    }
}
