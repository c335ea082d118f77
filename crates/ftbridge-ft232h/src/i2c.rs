//! Bit-banged I2C master
//!
//! SCL is pin 0, SDA out is pin 1 and SDA in is pin 2 (wire pins 1 and 2
//! together). The lines run in drive-zero mode, so writing a 1 releases
//! the line. Start and stop conditions are built from set-pins commands
//! repeated [`NUMBER_CYCLES`] times; bytes are shifted with the MPSSE
//! clocking opcodes and the ACK bit is sampled with a 1-bit read.
//!
//! # Wire sequences
//!
//! ```text
//! Start:      [SDA hi SCL hi] x5, [SDA lo SCL hi] x5, [SDA lo SCL lo] x5, [SDA hi SCL lo]
//! Stop:       [SDA lo SCL lo] x5, [SDA lo SCL hi] x5, [SDA hi SCL hi] x5
//! Byte out:   0x11 00 00 <byte>, [SDA hi SCL lo], 0x22 00, 0x87  -> 1 byte, bit 0 = NAK
//! Byte in:    0x20 00 00, 0x13 00 <00|FF>, [SDA hi SCL lo], 0x87 -> 1 byte
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use embedded_hal::i2c::{ErrorType, I2c, Operation};
use ftbridge_core::error::{Error, IoError, Result};
use ftbridge_core::mpsse::{BitOrder, ClockEdge, CommandBuffer, PinBank};

use crate::engine::{lock, Engine, Shared, NUMBER_CYCLES};
use crate::register::PinRegister;

/// SDA high, SCL high (bus idle)
pub(crate) const I2C_IDLE: u8 = 0x03;
const SDA_LO_SCL_HI: u8 = 0x01;
const SDA_LO_SCL_LO: u8 = 0x00;
const SDA_HI_SCL_LO: u8 = 0x02;

/// SCL and SDA out are outputs, SDA in is an input
pub(crate) const I2C_DIRECTION: u8 = 0x03;

/// Low-byte bits left untouched by the I2C engine
pub(crate) const LOW_BYTE_KEEP: u8 = 0xF8;

/// Highest 7-bit address
const MAX_ADDRESS: u8 = 0x7F;

/// First and last address probed by [`I2cBus::scan`]
const SCAN_RANGE: std::ops::RangeInclusive<u8> = 0x08..=0x77;

/// One start ... stop sequence
///
/// Holds the engine for its whole lifetime so no other traffic can be
/// interleaved. Dropping a session that was not finished still issues
/// a stop condition.
///
/// Pin patterns are staged in `pins` while a command is built and only
/// become the engine's register once the command was written.
pub(crate) struct I2cSession<'a> {
    engine: &'a mut Engine,
    pins: PinRegister,
    open: bool,
}

impl<'a> I2cSession<'a> {
    /// Issue a start condition
    pub(crate) fn start(engine: &'a mut Engine) -> Result<Self> {
        let pins = engine.state.pins;
        let mut session = I2cSession {
            engine,
            pins,
            open: true,
        };
        session.condition_start()?;
        Ok(session)
    }

    /// Queue `pattern` on SCL/SDA `cycles` times, keeping the other pins
    fn hold(&mut self, cmd: &mut CommandBuffer, pattern: u8, cycles: usize) {
        let (data, direction) = self.pins.bank(PinBank::Low);
        let data = pattern | (data & LOW_BYTE_KEEP);
        let direction = I2C_DIRECTION | (direction & LOW_BYTE_KEEP);
        self.pins.set_bank(PinBank::Low, data, direction);
        cmd.hold_pins(PinBank::Low, data, direction, cycles);
    }

    fn send(&mut self, cmd: &CommandBuffer) -> Result<()> {
        match self.engine.send(cmd.as_bytes()) {
            Ok(()) => {
                self.engine.state.pins = self.pins;
                Ok(())
            }
            Err(e) => {
                self.pins = self.engine.state.pins;
                Err(e)
            }
        }
    }

    fn query(&mut self, cmd: &CommandBuffer, len: usize) -> Result<Vec<u8>> {
        self.send(cmd)?;
        self.engine.recv(len)
    }

    fn condition_start(&mut self) -> Result<()> {
        let mut cmd = CommandBuffer::with_capacity(NUMBER_CYCLES * 9 + 3);
        self.hold(&mut cmd, I2C_IDLE, NUMBER_CYCLES);
        self.hold(&mut cmd, SDA_LO_SCL_HI, NUMBER_CYCLES);
        self.hold(&mut cmd, SDA_LO_SCL_LO, NUMBER_CYCLES);
        self.hold(&mut cmd, SDA_HI_SCL_LO, 1);
        self.send(&cmd)
    }

    fn condition_stop(&mut self) -> Result<()> {
        let mut cmd = CommandBuffer::with_capacity(NUMBER_CYCLES * 9);
        self.hold(&mut cmd, SDA_LO_SCL_LO, NUMBER_CYCLES);
        self.hold(&mut cmd, SDA_LO_SCL_HI, NUMBER_CYCLES);
        self.hold(&mut cmd, I2C_IDLE, NUMBER_CYCLES);
        self.send(&cmd)
    }

    /// Repeated start
    pub(crate) fn restart(&mut self) -> Result<()> {
        self.condition_start()
    }

    /// Shift out one byte and report whether it was acknowledged
    pub(crate) fn write_byte(&mut self, byte: u8) -> Result<bool> {
        let mut cmd = CommandBuffer::with_capacity(12);
        cmd.clock_bytes_out(ClockEdge::Falling, BitOrder::MsbFirst, &[byte])?;
        self.hold(&mut cmd, SDA_HI_SCL_LO, 1);
        cmd.clock_bits_in(ClockEdge::Rising, BitOrder::MsbFirst, 1)?
            .send_immediate();
        let response = self.query(&cmd, 1)?;
        Ok(response[0] & 0x01 == 0)
    }

    /// Send the address byte with the R/W bit
    pub(crate) fn address(&mut self, address: u8, read: bool) -> Result<bool> {
        self.write_byte(address << 1 | u8::from(read))
    }

    /// Shift in one byte, then send ACK or NAK
    pub(crate) fn read_byte(&mut self, ack: bool) -> Result<u8> {
        let mut cmd = CommandBuffer::with_capacity(10);
        cmd.clock_bytes_in(ClockEdge::Rising, BitOrder::MsbFirst, 1)?
            .clock_bits_out(
                ClockEdge::Falling,
                BitOrder::MsbFirst,
                if ack { 0x00 } else { 0xFF },
                1,
            )?;
        self.hold(&mut cmd, SDA_HI_SCL_LO, 1);
        cmd.send_immediate();
        let response = self.query(&cmd, 1)?;
        Ok(response[0])
    }

    /// Issue the stop condition
    pub(crate) fn finish(mut self) -> Result<()> {
        self.open = false;
        self.condition_stop()
    }

    /// Issue the stop condition after a NAK and hand back `nak`
    ///
    /// A failing stop is only logged so the caller still learns which
    /// byte was refused.
    fn abort(self, nak: IoError) -> Error {
        if let Err(e) = self.finish() {
            log::warn!("Failed to issue I2C stop after {}: {}", nak, e);
        }
        nak.into()
    }
}

impl Drop for I2cSession<'_> {
    fn drop(&mut self) {
        if self.open {
            if let Err(e) = self.condition_stop() {
                log::warn!("Failed to issue I2C stop: {}", e);
            }
        }
    }
}

/// Run a sequence of reads and writes between one start and one stop
///
/// The address is sent after the start and again after a repeated start
/// whenever the direction changes. Every read byte is acknowledged except
/// the last byte of a read run. The bus always ends with a stop, also when
/// the target does not acknowledge. Empty reads are rejected up front
/// since the target would keep driving SDA after its address.
pub(crate) fn transaction(
    engine: &mut Engine,
    address: u8,
    operations: &mut [Operation<'_>],
) -> Result<()> {
    if address > MAX_ADDRESS {
        return Err(Error::InvalidArgument(format!(
            "I2C address 0x{:02X} is not a 7-bit address",
            address
        )));
    }
    if operations
        .iter()
        .any(|op| matches!(op, Operation::Read(buf) if buf.is_empty()))
    {
        return Err(Error::InvalidArgument("I2C read of zero bytes".into()));
    }

    let mut session = I2cSession::start(engine)?;
    let mut direction: Option<bool> = None;

    for i in 0..operations.len() {
        let read = matches!(operations[i], Operation::Read(_));
        let next_read = operations
            .get(i + 1)
            .map(|op| matches!(op, Operation::Read(_)));

        if direction != Some(read) {
            if direction.is_some() {
                session.restart()?;
            }
            if !session.address(address, read)? {
                log::debug!("I2C address 0x{:02X} not acknowledged", address);
                return Err(session.abort(IoError::AddressNak { address }));
            }
            direction = Some(read);
        }

        match &mut operations[i] {
            Operation::Write(data) => {
                for (index, &byte) in data.iter().enumerate() {
                    if !session.write_byte(byte)? {
                        log::debug!("I2C 0x{:02X}: byte {} not acknowledged", address, index);
                        return Err(session.abort(IoError::DataNak { index }));
                    }
                }
            }
            Operation::Read(buf) => {
                let len = buf.len();
                let run_continues = next_read == Some(true);
                for (index, slot) in buf.iter_mut().enumerate() {
                    let last = index + 1 == len && !run_continues;
                    *slot = session.read_byte(!last)?;
                }
            }
        }
    }

    session.finish()
}

struct BusInner {
    engine: Shared,
    /// Claimed addresses and the id of the handle holding each
    devices: Mutex<HashMap<u8, u64>>,
    next_id: AtomicU64,
}

impl Drop for BusInner {
    fn drop(&mut self) {
        let mut engine = lock(&self.engine);
        engine.i2c_bus_open = false;
        if let Err(e) = engine.exit_i2c_mode() {
            log::warn!("Failed to idle I2C bus on close: {}", e);
        }
    }
}

/// I2C bus on pins 0-2
///
/// Clones share the bus. I2C mode stays active until the last clone and
/// the last [`I2cDevice`] are dropped.
#[derive(Clone)]
pub struct I2cBus {
    inner: Arc<BusInner>,
}

impl fmt::Debug for I2cBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut claimed: Vec<u8> = self.devices().keys().copied().collect();
        claimed.sort_unstable();
        f.debug_struct("I2cBus").field("claimed", &claimed).finish()
    }
}

impl I2cBus {
    pub(crate) fn open(engine: Shared) -> Result<Self> {
        {
            let mut guard = lock(&engine);
            if guard.i2c_bus_open {
                return Err(Error::AlreadyInUse("I2C bus is already open".into()));
            }
            guard.enter_i2c_mode()?;
            guard.i2c_bus_open = true;
        }
        Ok(I2cBus {
            inner: Arc::new(BusInner {
                engine,
                devices: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(0),
            }),
        })
    }

    fn devices(&self) -> std::sync::MutexGuard<'_, HashMap<u8, u64>> {
        self.inner
            .devices
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Claim `address` and return a handle bound to it
    pub fn create_device(&self, address: u8) -> Result<I2cDevice> {
        if address > MAX_ADDRESS {
            return Err(Error::InvalidArgument(format!(
                "I2C address 0x{:02X} is not a 7-bit address",
                address
            )));
        }
        let mut devices = self.devices();
        if devices.contains_key(&address) {
            return Err(Error::AlreadyInUse(format!(
                "I2C address 0x{:02X} is already claimed",
                address
            )));
        }
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        devices.insert(address, id);
        log::debug!("Claimed I2C address 0x{:02X}", address);

        Ok(I2cDevice {
            bus: self.clone(),
            address,
            id,
        })
    }

    /// Release a claimed address
    pub fn remove_device(&self, address: u8) -> Result<()> {
        match self.devices().remove(&address) {
            Some(_) => Ok(()),
            None => Err(Error::NotOpen(format!(
                "I2C address 0x{:02X} is not claimed",
                address
            ))),
        }
    }

    /// Whether `address` is claimed by a device handle
    pub fn is_claimed(&self, address: u8) -> bool {
        self.devices().contains_key(&address)
    }

    /// Write `data` to `address`
    pub fn write(&self, address: u8, data: &[u8]) -> Result<()> {
        self.run(address, &mut [Operation::Write(data)])
    }

    /// Read `buf.len()` bytes from `address`
    pub fn read(&self, address: u8, buf: &mut [u8]) -> Result<()> {
        self.run(address, &mut [Operation::Read(buf)])
    }

    /// Write then read with a repeated start in between
    pub fn write_read(&self, address: u8, write: &[u8], read: &mut [u8]) -> Result<()> {
        self.run(address, &mut [Operation::Write(write), Operation::Read(read)])
    }

    /// Addresses in 0x08..=0x77 that acknowledge an empty write
    pub fn scan(&self) -> Result<Vec<u8>> {
        let mut found = Vec::new();
        for address in SCAN_RANGE {
            match self.write(address, &[]) {
                Ok(()) => found.push(address),
                Err(Error::Io(IoError::AddressNak { .. })) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(found)
    }

    fn run(&self, address: u8, operations: &mut [Operation<'_>]) -> Result<()> {
        let mut engine = lock(&self.inner.engine);
        transaction(&mut engine, address, operations)
    }
}

/// Handle to one claimed address on an [`I2cBus`]
///
/// Dropping the handle releases the address.
pub struct I2cDevice {
    bus: I2cBus,
    address: u8,
    id: u64,
}

impl I2cDevice {
    /// The 7-bit address this handle talks to
    pub fn address(&self) -> u8 {
        self.address
    }

    /// Write `data` to the device
    pub fn write(&self, data: &[u8]) -> Result<()> {
        self.bus.write(self.address, data)
    }

    /// Read `buf.len()` bytes from the device
    pub fn read(&self, buf: &mut [u8]) -> Result<()> {
        self.bus.read(self.address, buf)
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

    /// Write then read with a repeated start in between
    pub fn write_read(&self, write: &[u8], read: &mut [u8]) -> Result<()> {
        self.bus.write_read(self.address, write, read)
    }
}

impl fmt::Debug for I2cDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("I2cDevice")
            .field("address", &self.address)
            .finish()
    }
}

impl Drop for I2cDevice {
    fn drop(&mut self) {
        let mut devices = self.bus.devices();
        if devices.get(&self.address) == Some(&self.id) {
            devices.remove(&self.address);
            log::debug!("Released I2C address 0x{:02X}", self.address);
        }
    }
}

impl ErrorType for I2cBus {
    type Error = Error;
}

impl I2c for I2cBus {
    fn transaction(&mut self, address: u8, operations: &mut [Operation<'_>]) -> Result<()> {
        self.run(address, operations)
    }
}

impl ErrorType for I2cDevice {
    type Error = Error;
}

impl I2c for I2cDevice {
    fn transaction(&mut self, address: u8, operations: &mut [Operation<'_>]) -> Result<()> {
        if address != self.address {
            return Err(Error::InvalidArgument(format!(
                "Device handle is bound to 0x{:02X}, not 0x{:02X}",
                self.address, address
            )));
        }
        self.bus.run(address, operations)
    }
}
