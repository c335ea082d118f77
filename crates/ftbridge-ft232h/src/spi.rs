//! SPI master
//!
//! Pin 0 is SCK, pin 1 MOSI, pin 2 MISO. Chip selects are any of pins
//! 3..=15, one per [`SpiDevice`]. Each transfer is framed as
//!
//! ```text
//! [CS active] x5, <opcode> <lenLo> <lenHi> [data], [CS inactive] x5, 0x87
//! ```
//!
//! and written in a single transfer.
//!
//! | Mode | Write | Read | Full duplex |
//! |------|-------|------|-------------|
//! | 0, 3 | out on falling (0x11 / 0x19) | in on rising (0x20 / 0x28) | 0x31 / 0x39 |
//! | 1, 2 | out on rising (0x10 / 0x18) | in on falling (0x24 / 0x2C) | 0x34 / 0x3C |
//!
//! The second opcode of each pair is the LSB-first variant.

use std::fmt;
use std::thread;
use std::time::Duration;

use embedded_hal::spi::{ErrorType, Operation, SpiDevice as HalSpiDevice};
use ftbridge_core::error::{Error, Result};
use ftbridge_core::mpsse::protocol::MAX_TRANSFER_LEN;
use ftbridge_core::mpsse::{
    clock_divisor, clock_opcode, BitOrder, ClockEdge, ClockUnit, Clocking, CommandBuffer, PinBank,
};

use crate::engine::{lock, Engine, Shared, NUMBER_CYCLES};
use crate::register::PinRegister;

/// Clock polarity and phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SpiMode {
    /// CPOL=0, CPHA=0
    #[default]
    Mode0,
    /// CPOL=0, CPHA=1
    Mode1,
    /// CPOL=1, CPHA=0
    Mode2,
    /// CPOL=1, CPHA=1
    Mode3,
}

impl SpiMode {
    /// Edge data is shifted out on
    pub fn out_edge(&self) -> ClockEdge {
        match self {
            SpiMode::Mode0 | SpiMode::Mode3 => ClockEdge::Falling,
            SpiMode::Mode1 | SpiMode::Mode2 => ClockEdge::Rising,
        }
    }

    /// Edge data is sampled on
    pub fn in_edge(&self) -> ClockEdge {
        self.out_edge().opposite()
    }
}

impl TryFrom<u8> for SpiMode {
    type Error = Error;

    fn try_from(mode: u8) -> Result<Self> {
        match mode {
            0 => Ok(SpiMode::Mode0),
            1 => Ok(SpiMode::Mode1),
            2 => Ok(SpiMode::Mode2),
            3 => Ok(SpiMode::Mode3),
            _ => Err(Error::InvalidArgument(format!(
                "SPI mode {} out of range 0..=3",
                mode
            ))),
        }
    }
}

/// Opcode for a write-only transfer
pub fn write_opcode(mode: SpiMode, order: BitOrder) -> u8 {
    clock_opcode(Clocking::Out(mode.out_edge()), order, ClockUnit::Bytes)
}

/// Opcode for a read-only transfer
pub fn read_opcode(mode: SpiMode, order: BitOrder) -> u8 {
    clock_opcode(Clocking::In(mode.in_edge()), order, ClockUnit::Bytes)
}

/// Opcode for a full-duplex transfer
pub fn transfer_opcode(mode: SpiMode, order: BitOrder) -> u8 {
    clock_opcode(
        Clocking::InOut {
            out: mode.out_edge(),
        },
        order,
        ClockUnit::Bytes,
    )
}

/// Settings of one SPI device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpiConfig {
    /// Chip-select pin, 3..=15
    pub chip_select_line: u8,
    /// Clock mode
    pub mode: SpiMode,
    /// Bit order
    pub data_flow: BitOrder,
    /// SCK frequency in Hz
    pub clock_frequency_hz: u32,
    /// Bits per word; only 8 is supported
    pub data_bit_length: u8,
    /// Level that selects the device
    pub chip_select_active_high: bool,
}

impl SpiConfig {
    /// Mode 0, MSB first, 1 MHz, 8-bit words, active-low chip select
    pub fn new(chip_select_line: u8) -> Self {
        SpiConfig {
            chip_select_line,
            mode: SpiMode::Mode0,
            data_flow: BitOrder::MsbFirst,
            clock_frequency_hz: 1_000_000,
            data_bit_length: 8,
            chip_select_active_high: false,
        }
    }

    /// Set the clock mode
    pub fn mode(mut self, mode: SpiMode) -> Self {
        self.mode = mode;
        self
    }

    /// Set the bit order
    pub fn data_flow(mut self, order: BitOrder) -> Self {
        self.data_flow = order;
        self
    }

    /// Set the clock frequency
    pub fn clock_frequency_hz(mut self, hz: u32) -> Self {
        self.clock_frequency_hz = hz;
        self
    }

    /// Select the chip-select polarity
    pub fn chip_select_active_high(mut self, active_high: bool) -> Self {
        self.chip_select_active_high = active_high;
        self
    }

    /// Clock divisor for these settings
    ///
    /// The frequency is truncated to whole kHz first.
    pub fn divisor(&self) -> Result<u16> {
        clock_divisor(self.clock_frequency_hz / 1000)
    }

    /// Check everything that does not depend on device state
    pub fn validate(&self) -> Result<()> {
        if self.data_bit_length != 8 {
            return Err(Error::InvalidArgument(format!(
                "Data bit length {} not supported, only 8",
                self.data_bit_length
            )));
        }
        self.divisor().map(|_| ())
    }
}

/// One shifting step inside a chip-select frame
pub(crate) enum Shift<'a> {
    Out(&'a [u8]),
    In(&'a mut [u8]),
    InOut(&'a [u8], &'a mut [u8]),
    Delay(Duration),
}

impl Shift<'_> {
    fn validate(&self) -> Result<()> {
        let len = match self {
            Shift::Out(data) => data.len(),
            Shift::In(buf) => buf.len(),
            Shift::InOut(data, buf) => {
                if data.len() != buf.len() {
                    return Err(Error::InvalidArgument(format!(
                        "Read buffer holds {} bytes, write buffer {}",
                        buf.len(),
                        data.len()
                    )));
                }
                data.len()
            }
            Shift::Delay(_) => 0,
        };
        if len > MAX_TRANSFER_LEN {
            return Err(Error::InvalidArgument(format!(
                "Buffer of {} bytes exceeds the {} byte limit",
                len, MAX_TRANSFER_LEN
            )));
        }
        Ok(())
    }

    fn is_empty(&self) -> bool {
        match self {
            Shift::Out(data) | Shift::InOut(data, _) => data.is_empty(),
            Shift::In(buf) => buf.is_empty(),
            Shift::Delay(delay) => delay.is_zero(),
        }
    }
}

/// Queue the chip-select pattern for `settings`, staging it in `pins`
fn chip_select(pins: &mut PinRegister, cmd: &mut CommandBuffer, settings: &SpiConfig, enable: bool) {
    let line = settings.chip_select_line;
    let level = settings.chip_select_active_high == enable;
    pins.set_output(line, true);
    pins.set_level(line, level);
    let (bank, _) = PinBank::of_pin(line);
    let (data, direction) = pins.bank(bank);
    cmd.hold_pins(bank, data, direction, NUMBER_CYCLES);
}

/// Send what is queued and scatter the response into `pending`
///
/// `pins` becomes the engine's register once the bytes are written.
fn flush(
    engine: &mut Engine,
    pins: PinRegister,
    cmd: &mut CommandBuffer,
    pending: &mut Vec<&mut [u8]>,
) -> Result<()> {
    if cmd.is_empty() {
        return Ok(());
    }
    let expected: usize = pending.iter().map(|buf| buf.len()).sum();
    if expected > 0 {
        cmd.send_immediate();
    }
    engine.send(cmd.as_bytes())?;
    engine.state.pins = pins;
    *cmd = CommandBuffer::new();

    if expected > 0 {
        let response = engine.recv(expected)?;
        let mut offset = 0;
        for buf in pending.drain(..) {
            buf.copy_from_slice(&response[offset..offset + buf.len()]);
            offset += buf.len();
        }
    }
    Ok(())
}

/// Run `shifts` inside one chip-select frame
///
/// Arguments are checked before anything is sent; a frame with nothing to
/// shift produces no traffic.
pub(crate) fn run(engine: &mut Engine, settings: &SpiConfig, shifts: &mut [Shift<'_>]) -> Result<()> {
    for shift in shifts.iter() {
        shift.validate()?;
    }
    if shifts.iter().all(Shift::is_empty) {
        return Ok(());
    }

    let out = settings.mode.out_edge();
    let order = settings.data_flow;
    let mut pins = engine.state.pins;
    let mut cmd = CommandBuffer::new();
    let mut pending: Vec<&mut [u8]> = Vec::new();

    chip_select(&mut pins, &mut cmd, settings, true);
    for shift in shifts.iter_mut() {
        match shift {
            Shift::Out(data) if !data.is_empty() => {
                cmd.clock_bytes_out(out, order, *data)?;
            }
            Shift::In(buf) if !buf.is_empty() => {
                cmd.clock_bytes_in(out.opposite(), order, buf.len())?;
                pending.push(&mut **buf);
            }
            Shift::InOut(data, buf) if !data.is_empty() => {
                cmd.clock_bytes_in_out(out, order, *data)?;
                pending.push(&mut **buf);
            }
            Shift::Delay(delay) if !delay.is_zero() => {
                flush(engine, pins, &mut cmd, &mut pending)?;
                thread::sleep(*delay);
            }
            _ => {}
        }
    }
    chip_select(&mut pins, &mut cmd, settings, false);
    flush(engine, pins, &mut cmd, &mut pending)
}

/// SPI device bound to one chip-select line
///
/// Created by [`Ft232h::spi_device`](crate::Ft232h::spi_device). Dropping
/// the last device on a chip leaves SPI mode.
pub struct SpiDevice {
    engine: Shared,
    settings: SpiConfig,
}

impl SpiDevice {
    pub(crate) fn open(engine: Shared, settings: SpiConfig) -> Result<Self> {
        settings.validate()?;
        {
            let mut guard = lock(&engine);
            let line = settings.chip_select_line;
            guard.state.check_enter_spi()?;
            guard.state.claim_chip_select(line)?;
            guard.spi_settings.push(settings.clone());

            // Park the new chip select at its inactive level
            let ready = match guard.enter_spi_mode() {
                Ok(()) => {
                    let mut pins = guard.state.pins;
                    let mut idle = CommandBuffer::new();
                    chip_select(&mut pins, &mut idle, &settings, false);
                    guard
                        .send(idle.as_bytes())
                        .map(|()| guard.state.pins = pins)
                }
                Err(e) => Err(e),
            };
            if let Err(e) = ready {
                guard.spi_settings.retain(|s| s.chip_select_line != line);
                guard.state.release_chip_select(line);
                guard.exit_spi_mode();
                return Err(e);
            }
            log::debug!(
                "SPI device on CS{} ({:?}, {:?}, {} Hz)",
                line,
                settings.mode,
                settings.data_flow,
                settings.clock_frequency_hz
            );
        }
        Ok(SpiDevice { engine, settings })
    }

    /// Settings this device was opened with
    pub fn settings(&self) -> &SpiConfig {
        &self.settings
    }

    fn exec(&self, shifts: &mut [Shift<'_>]) -> Result<()> {
        let mut engine = lock(&self.engine);
        run(&mut engine, &self.settings, shifts)
    }

    /// Shift `data` out, ignoring MISO
    pub fn write(&self, data: &[u8]) -> Result<()> {
        self.exec(&mut [Shift::Out(data)])
    }

    /// Shift `buf.len()` bytes in
    pub fn read(&self, buf: &mut [u8]) -> Result<()> {
        self.exec(&mut [Shift::In(buf)])
    }

    /// Full-duplex transfer; both buffers must have the same length
    pub fn write_read(&self, write: &[u8], read: &mut [u8]) -> Result<()> {
        self.exec(&mut [Shift::InOut(write, read)])
    }

    /// Write a single byte
    pub fn write_byte(&self, byte: u8) -> Result<()> {
        self.write(&[byte])
    }

    /// Read a single byte
    pub fn read_byte(&self) -> Result<u8> {
        let mut buf = [0u8; 1];
        self.read(&mut buf)?;
        Ok(buf[0])
    }
}

impl fmt::Debug for SpiDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpiDevice")
            .field("settings", &self.settings)
            .finish()
    }
}

impl Drop for SpiDevice {
    fn drop(&mut self) {
        let mut engine = lock(&self.engine);
        let line = self.settings.chip_select_line;
        engine.spi_settings.retain(|s| s.chip_select_line != line);
        engine.state.release_chip_select(line);
        engine.exit_spi_mode();
    }
}

impl ErrorType for SpiDevice {
    type Error = Error;
}

impl HalSpiDevice for SpiDevice {
    fn transaction(&mut self, operations: &mut [Operation<'_, u8>]) -> Result<()> {
        // Outgoing copies for in-place transfers
        let copies: Vec<Vec<u8>> = operations
            .iter()
            .map(|op| match op {
                Operation::TransferInPlace(buf) => buf.to_vec(),
                _ => Vec::new(),
            })
            .collect();

        let mut shifts: Vec<Shift<'_>> = Vec::with_capacity(operations.len());
        for (op, copy) in operations.iter_mut().zip(&copies) {
            match op {
                Operation::Read(buf) => shifts.push(Shift::In(&mut **buf)),
                Operation::Write(data) => shifts.push(Shift::Out(*data)),
                Operation::Transfer(read, write) => {
                    let write: &[u8] = *write;
                    if read.len() == write.len() {
                        shifts.push(Shift::InOut(write, &mut **read));
                    } else {
                        // The longer buffer's tail is shifted in one direction only
                        let common = read.len().min(write.len());
                        let (read_head, read_tail) = read.split_at_mut(common);
                        shifts.push(Shift::InOut(&write[..common], read_head));
                        if read_tail.is_empty() {
                            shifts.push(Shift::Out(&write[common..]));
                        } else {
                            shifts.push(Shift::In(read_tail));
                        }
                    }
                }
                Operation::TransferInPlace(buf) => {
                    shifts.push(Shift::InOut(copy, &mut **buf));
                }
                Operation::DelayNs(ns) => {
                    shifts.push(Shift::Delay(Duration::from_nanos(u64::from(*ns))));
                }
            }
        }
        self.exec(&mut shifts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opcode_table() {
        use BitOrder::*;
        use SpiMode::*;

        for mode in [Mode0, Mode3] {
            assert_eq!(write_opcode(mode, MsbFirst), 0x11);
            assert_eq!(write_opcode(mode, LsbFirst), 0x19);
            assert_eq!(read_opcode(mode, MsbFirst), 0x20);
            assert_eq!(read_opcode(mode, LsbFirst), 0x28);
            assert_eq!(transfer_opcode(mode, MsbFirst), 0x31);
            assert_eq!(transfer_opcode(mode, LsbFirst), 0x39);
        }
        for mode in [Mode1, Mode2] {
            assert_eq!(write_opcode(mode, MsbFirst), 0x10);
            assert_eq!(write_opcode(mode, LsbFirst), 0x18);
            assert_eq!(read_opcode(mode, MsbFirst), 0x24);
            assert_eq!(read_opcode(mode, LsbFirst), 0x2C);
            assert_eq!(transfer_opcode(mode, MsbFirst), 0x34);
            assert_eq!(transfer_opcode(mode, LsbFirst), 0x3C);
        }
    }

    #[test]
    fn test_mode_from_u8() {
        assert_eq!(SpiMode::try_from(3).unwrap(), SpiMode::Mode3);
        assert!(matches!(
            SpiMode::try_from(4),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_config_validation() {
        let config = SpiConfig::new(3);
        assert_eq!(config.divisor().unwrap(), 29);
        assert!(config.validate().is_ok());

        let mut wide = SpiConfig::new(3);
        wide.data_bit_length = 16;
        assert!(matches!(wide.validate(), Err(Error::InvalidArgument(_))));

        let slow = SpiConfig::new(3).clock_frequency_hz(500);
        assert!(matches!(slow.validate(), Err(Error::InvalidArgument(_))));

        let fast = SpiConfig::new(3).clock_frequency_hz(30_000_000);
        assert_eq!(fast.divisor().unwrap(), 0);
    }

    #[test]
    fn test_shift_validation() {
        let data = [0u8; 4];
        let mut short = [0u8; 3];
        assert!(Shift::InOut(&data, &mut short).validate().is_err());

        let big = vec![0u8; MAX_TRANSFER_LEN + 1];
        assert!(Shift::Out(&big).validate().is_err());
        assert!(Shift::Out(&big[..MAX_TRANSFER_LEN]).validate().is_ok());
        assert!(Shift::Out(&[]).is_empty());
        assert!(Shift::Delay(Duration::ZERO).is_empty());
        assert!(!Shift::Delay(Duration::from_micros(1)).is_empty());
    }
}
