//! Device state and MPSSE mode initialization
//!
//! [`Engine`] owns the transport and the [`RegisterState`]. It is the only
//! code that writes to the wire; the personalities build command buffers
//! and hand them to [`Engine::send`] / [`Engine::query`].

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use ftbridge_core::error::{Error, IoError, Result};
use ftbridge_core::mpsse::protocol::{SYNC_PROBE_1, SYNC_PROBE_2};
use ftbridge_core::mpsse::{bad_command_echo, clock_divisor, CommandBuffer, PinBank};
use ftbridge_core::transport::{BitMode, FlowControl, SpecialChars, Transport};

use crate::config::DeviceConfig;
use crate::i2c::{I2C_DIRECTION, I2C_IDLE, LOW_BYTE_KEEP};
use crate::register::{BusModes, PinRegister, RegisterState};
use crate::spi::SpiConfig;

/// Repetitions of each pin pattern; the command queue has no delay opcode
pub(crate) const NUMBER_CYCLES: usize = 5;

/// Back-off between polls of the receive queue
const POLL_INTERVAL: Duration = Duration::from_micros(100);

/// USB settle time after switching to MPSSE before SPI setup
const SPI_USB_SETTLE: Duration = Duration::from_millis(50);

/// Settle time after the SPI setup sequence
const SPI_SETUP_SETTLE: Duration = Duration::from_millis(30);

/// Engine shared by every facade of one device
pub(crate) type Shared = Arc<Mutex<Engine>>;

/// Lock the shared engine
///
/// A panic while holding the lock leaves plain data behind, so poisoning
/// is ignored.
pub(crate) fn lock(shared: &Shared) -> MutexGuard<'_, Engine> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

fn unavailable(e: Error) -> Error {
    match e {
        Error::DeviceUnavailable(_) => e,
        other => Error::DeviceUnavailable(other.to_string()),
    }
}

pub(crate) struct Engine {
    transport: Box<dyn Transport>,
    pub(crate) state: RegisterState,
    pub(crate) config: DeviceConfig,
    /// Settings of every open SPI device, in registration order
    pub(crate) spi_settings: Vec<SpiConfig>,
    /// Whether an I2C bus facade exists
    pub(crate) i2c_bus_open: bool,
}

impl Engine {
    pub(crate) fn new(transport: Box<dyn Transport>, config: DeviceConfig) -> Self {
        Engine {
            transport,
            state: RegisterState::default(),
            config,
            spi_settings: Vec::new(),
            i2c_bus_open: false,
        }
    }

    /// Write a complete command sequence in one transfer
    pub(crate) fn send(&mut self, data: &[u8]) -> Result<()> {
        let written = self.transport.write(data)?;
        if written != data.len() {
            return Err(IoError::ShortWrite {
                written,
                expected: data.len(),
            }
            .into());
        }
        log::trace!("Sent {} bytes", data.len());
        Ok(())
    }

    /// Collect up to `buf.len()` bytes before the read deadline
    ///
    /// Returns how many bytes arrived.
    fn read_bounded(&mut self, buf: &mut [u8]) -> Result<usize> {
        let deadline = Instant::now() + self.config.read_timeout;
        let mut total = 0;

        while total < buf.len() {
            let available = self.transport.queued_bytes()?;
            if available > 0 {
                let end = buf.len().min(total + available);
                let n = self.transport.read(&mut buf[total..end])?;
                total += n;
                if n > 0 {
                    continue;
                }
            }
            if Instant::now() >= deadline {
                break;
            }
            thread::sleep(POLL_INTERVAL);
        }

        log::trace!("Received {} of {} bytes", total, buf.len());
        Ok(total)
    }

    /// Fill `buf` completely or fail with a short read
    ///
    /// On a short read the receive queue is purged so a late tail cannot
    /// be taken as the answer to the next query.
    pub(crate) fn recv_into(&mut self, buf: &mut [u8]) -> Result<()> {
        let read = self.read_bounded(buf)?;
        if read < buf.len() {
            if let Err(e) = self.transport.flush_input() {
                log::warn!("Failed to purge receive queue: {}", e);
            }
            return Err(IoError::ShortRead {
                read,
                expected: buf.len(),
            }
            .into());
        }
        Ok(())
    }

    /// Receive exactly `len` bytes
    pub(crate) fn recv(&mut self, len: usize) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; len];
        self.recv_into(&mut buf)?;
        Ok(buf)
    }

    /// Send a command sequence and receive its `len`-byte response
    pub(crate) fn query(&mut self, cmd: &[u8], len: usize) -> Result<Vec<u8>> {
        self.send(cmd)?;
        self.recv(len)
    }

    /// Send one bank of `pins` and adopt `pins` once the chip accepted it
    pub(crate) fn apply_bank(&mut self, pins: PinRegister, bank: PinBank) -> Result<()> {
        let (data, direction) = pins.bank(bank);
        let mut cmd = CommandBuffer::with_capacity(3);
        cmd.set_pins(bank, data, direction);
        self.send(cmd.as_bytes())?;
        self.state.pins = pins;
        Ok(())
    }

    /// Sample the levels of one bank
    pub(crate) fn read_bank(&mut self, bank: PinBank) -> Result<u8> {
        let mut cmd = CommandBuffer::with_capacity(2);
        cmd.read_pins(bank);
        let value = self.query(cmd.as_bytes(), 1)?;
        Ok(value[0])
    }

    /// Confirm the command processor is listening
    ///
    /// Each invalid probe opcode must come back as `[0xFA, probe]`.
    fn synchronize(&mut self) -> Result<()> {
        for probe in [SYNC_PROBE_1, SYNC_PROBE_2] {
            self.send(&[probe])?;
            let mut response = [0u8; 2];
            let n = self.read_bounded(&mut response)?;
            if response[..n] != bad_command_echo(probe) {
                return Err(Error::ProtocolSyncFailure {
                    probe,
                    response: response[..n].to_vec(),
                });
            }
            log::debug!("MPSSE sync 0x{:02X} OK", probe);
        }
        Ok(())
    }

    fn reset_to_mpsse(&mut self) -> Result<()> {
        self.transport
            .set_bit_mode(0x00, BitMode::Reset)
            .map_err(unavailable)?;
        self.transport
            .set_bit_mode(0x00, BitMode::Mpsse)
            .map_err(unavailable)
    }

    /// Bring up the I2C personality
    pub(crate) fn enter_i2c_mode(&mut self) -> Result<()> {
        self.state.check_enter_i2c()?;
        let divisor = clock_divisor(self.config.i2c_frequency_khz)?;

        log::info!(
            "Initializing I2C on {} at {:.1} kHz",
            self.config.name(),
            self.config.i2c_clock_khz()
        );

        let t = &mut self.transport;
        t.set_timeouts(Duration::from_millis(5000), Duration::from_millis(5000))
            .map_err(unavailable)?;
        t.set_latency_timer(16).map_err(unavailable)?;
        t.set_flow_control(FlowControl::RtsCts).map_err(unavailable)?;
        self.reset_to_mpsse()?;

        self.transport.flush_input()?;
        self.synchronize()?;

        let (data, direction) = self.state.pins.bank(PinBank::Low);
        let data = I2C_IDLE | (data & LOW_BYTE_KEEP);
        let direction = I2C_DIRECTION | (direction & LOW_BYTE_KEEP);
        log::debug!(
            "I2C setup: divisor={} low data=0x{:02X} dir=0x{:02X}",
            divisor,
            data,
            direction
        );

        let mut cmd = CommandBuffer::with_capacity(13);
        cmd.mode_setup(true)
            .clock_divisor(divisor)
            .loopback_off()
            .drive_zero_only(0x07, 0x00)
            .set_low_pins(data, direction);
        self.send(cmd.as_bytes())?;

        self.state.pins.set_bank(PinBank::Low, data, direction);
        self.state.set_mode(BusModes::I2C, true);
        Ok(())
    }

    /// Leave the bus idle and drop the I2C personality
    pub(crate) fn exit_i2c_mode(&mut self) -> Result<()> {
        if !self.state.modes().contains(BusModes::I2C) {
            return Ok(());
        }
        let mut pins = self.state.pins;
        let (data, direction) = pins.bank(PinBank::Low);
        pins.set_bank(
            PinBank::Low,
            I2C_IDLE | (data & LOW_BYTE_KEEP),
            I2C_DIRECTION | (direction & LOW_BYTE_KEEP),
        );
        // Cleared even if the idle write below fails
        self.state.set_mode(BusModes::I2C, false);
        log::info!("I2C released on {}", self.config.name());
        self.apply_bank(pins, PinBank::Low)
    }

    /// Bring up the SPI personality if it is not running yet
    ///
    /// The clock divisor comes from the first registered device.
    pub(crate) fn enter_spi_mode(&mut self) -> Result<()> {
        if self.state.modes().contains(BusModes::SPI) {
            return Ok(());
        }
        self.state.check_enter_spi()?;
        let first = self.spi_settings.first().ok_or_else(|| {
            Error::InvalidArgument("No SPI device registered".into())
        })?;
        let divisor = first.divisor()?;

        log::info!(
            "Initializing SPI on {} at {} Hz",
            self.config.name(),
            first.clock_frequency_hz
        );

        let t = &mut self.transport;
        t.set_latency_timer(1).map_err(unavailable)?;
        t.set_usb_parameters(65535, 65535).map_err(unavailable)?;
        t.set_special_chars(SpecialChars::default())
            .map_err(unavailable)?;
        t.set_timeouts(Duration::from_millis(3000), Duration::from_millis(3000))
            .map_err(unavailable)?;
        t.set_latency_timer(1).map_err(unavailable)?;
        self.reset_to_mpsse()?;

        thread::sleep(SPI_USB_SETTLE);
        self.transport.flush_input()?;
        self.synchronize()?;

        // Clock and MOSI out, MISO in, all three low
        let (data, direction) = self.state.pins.bank(PinBank::Low);
        let data = data & LOW_BYTE_KEEP;
        let direction = (direction & LOW_BYTE_KEEP) | 0x03;
        log::debug!(
            "SPI setup: divisor={} low data=0x{:02X} dir=0x{:02X}",
            divisor,
            data,
            direction
        );

        let mut cmd = CommandBuffer::with_capacity(10);
        cmd.mode_setup(false)
            .set_low_pins(data, direction)
            .clock_divisor(divisor)
            .loopback_off();
        self.send(cmd.as_bytes())?;
        thread::sleep(SPI_SETUP_SETTLE);

        self.state.pins.set_bank(PinBank::Low, data, direction);
        self.state.set_mode(BusModes::SPI, true);
        Ok(())
    }

    /// Drop the SPI personality once no device is registered
    pub(crate) fn exit_spi_mode(&mut self) {
        if self.spi_settings.is_empty() && self.state.modes().contains(BusModes::SPI) {
            self.state.set_mode(BusModes::SPI, false);
            log::info!("SPI released on {}", self.config.name());
        }
    }

    /// Set every pin to input
    fn release_pins(&mut self) -> Result<()> {
        let mut cmd = CommandBuffer::with_capacity(6);
        cmd.set_low_pins(0x00, 0x00).set_high_pins(0x00, 0x00);
        self.send(cmd.as_bytes())
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        // Release I/O pins on close
        if let Err(e) = self.release_pins() {
            log::warn!("Failed to release pins on close: {}", e);
        }
    }
}
