//! ftbridge-dummy - In-memory MPSSE command processor emulator
//!
//! This crate provides a [`Transport`] that parses the MPSSE byte stream the
//! way the bridge's command processor does, keeps the 16-line pin register,
//! answers read commands and records everything it saw. It is useful for
//! testing drivers and for trying the CLI without hardware.
//!
//! The emulator also watches pins 0 (SCL) and 1 (SDA) and logs an I2C
//! start or stop whenever SDA changes while SCL is held high, like a logic
//! analyzer attached to the bus.
//!
//! # Example
//!
//! ```
//! use ftbridge_core::Transport;
//! use ftbridge_dummy::DummyTransport;
//!
//! let mut dummy = DummyTransport::new();
//! // An invalid opcode is echoed back as [0xFA, opcode]
//! dummy.write(&[0xAA])?;
//! let mut echo = [0u8; 2];
//! dummy.read(&mut echo)?;
//! assert_eq!(echo, [0xFA, 0xAA]);
//! # Ok::<(), ftbridge_core::Error>(())
//! ```

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use ftbridge_core::error::{Error, Result};
use ftbridge_core::mpsse::protocol::*;
use ftbridge_core::mpsse::PinBank;
use ftbridge_core::transport::{BitMode, FlowControl, SpecialChars, Transport};

/// Behaviour switches for the emulator
#[derive(Debug, Clone)]
pub struct DummyConfig {
    /// Answer invalid opcodes with `[0xFA, opcode]`
    pub echo_bad_commands: bool,
    /// Full-duplex shifts return the written bytes when nothing is scripted
    pub loopback: bool,
    /// Configuration primitives fail with `DeviceUnavailable`
    pub fail_configuration: bool,
}

impl Default for DummyConfig {
    fn default() -> Self {
        Self {
            echo_bad_commands: true,
            loopback: false,
            fail_configuration: false,
        }
    }
}

/// A configuration primitive invoked on the transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigCall {
    /// `set_timeouts`
    Timeouts {
        /// Read timeout
        read: Duration,
        /// Write timeout
        write: Duration,
    },
    /// `set_latency_timer`
    Latency(u8),
    /// `set_flow_control`
    FlowControl(FlowControl),
    /// `set_bit_mode`
    BitMode(u8, BitMode),
    /// `set_usb_parameters`
    UsbParameters(u32, u32),
    /// `set_special_chars`
    SpecialChars(SpecialChars),
}

/// Something the emulated command processor observed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// Transport configuration call
    Config(ConfigCall),
    /// Set pins of one bank
    SetPins {
        /// Bank that was written
        bank: PinBank,
        /// Output values
        data: u8,
        /// Direction mask (1 = output)
        direction: u8,
    },
    /// Read pins of one bank
    ReadPins(PinBank),
    /// Bytes shifted out
    ClockBytesOut {
        /// Shifting opcode
        opcode: u8,
        /// Payload
        data: Vec<u8>,
    },
    /// Bytes sampled in
    ClockBytesIn {
        /// Shifting opcode
        opcode: u8,
        /// Byte count
        len: usize,
    },
    /// Bytes shifted out and sampled in at once
    ClockBytesInOut {
        /// Shifting opcode
        opcode: u8,
        /// Payload
        data: Vec<u8>,
    },
    /// Bits shifted out
    ClockBitsOut {
        /// Shifting opcode
        opcode: u8,
        /// Bit pattern
        bits: u8,
        /// Number of bits (1..=8)
        count: u8,
    },
    /// Bits sampled in
    ClockBitsIn {
        /// Shifting opcode
        opcode: u8,
        /// Number of bits (1..=8)
        count: u8,
    },
    /// Clock divisor programmed
    Divisor(u16),
    /// Drive-zero masks programmed
    DriveZero {
        /// Low byte mask
        low: u8,
        /// High byte mask
        high: u8,
    },
    /// Single-byte engine command (clocking, loopback, send immediate)
    Engine(u8),
    /// Invalid opcode
    BadCommand(u8),
    /// SDA fell while SCL was high
    I2cStart,
    /// SDA rose while SCL was high
    I2cStop,
}

/// Snapshot of the emulated pin register
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PinSnapshot {
    /// Low byte output values
    pub low_data: u8,
    /// Low byte directions
    pub low_direction: u8,
    /// High byte output values
    pub high_data: u8,
    /// High byte directions
    pub high_direction: u8,
}

#[derive(Debug, Default)]
struct Emulator {
    config: DummyConfig,
    /// Bytes of a command still waiting for its operands
    pending: Vec<u8>,
    /// Bytes waiting for the host to read
    rx: VecDeque<u8>,
    /// Scripted bytes returned by sampling commands
    script: VecDeque<u8>,
    pins: PinSnapshot,
    low_inputs: u8,
    high_inputs: u8,
    scl: bool,
    sda: bool,
    stalled: bool,
    write_limit: Option<usize>,
    /// Bytes still accepted across all writes
    write_budget: Option<usize>,
    /// Response bytes the host may still collect; the rest stays queued
    delivery_limit: Option<usize>,
    events: Vec<Event>,
    writes: Vec<Vec<u8>>,
}

fn is_shift(op: u8) -> bool {
    op & MPSSE_SHIFT_MASK == 0 && op & (MPSSE_DO_WRITE | MPSSE_DO_READ) != 0
}

/// Length of the command at the start of `buf`, or `None` if incomplete
fn command_len(buf: &[u8]) -> Option<usize> {
    let op = *buf.first()?;
    let len = match op {
        SET_BITS_LOW | SET_BITS_HIGH | TCK_DIVISOR | DRIVE_ZERO_ONLY => 3,
        op if is_shift(op) => {
            let write = op & MPSSE_DO_WRITE != 0;
            if op & MPSSE_BITMODE != 0 {
                if write {
                    3
                } else {
                    2
                }
            } else if write {
                if buf.len() < 3 {
                    return None;
                }
                3 + u16::from_le_bytes([buf[1], buf[2]]) as usize + 1
            } else {
                3
            }
        }
        _ => 1,
    };
    (buf.len() >= len).then_some(len)
}

impl Emulator {
    fn new(config: DummyConfig) -> Self {
        Emulator {
            config,
            ..Default::default()
        }
    }

    fn feed(&mut self, data: &[u8]) {
        self.pending.extend_from_slice(data);
        while let Some(len) = command_len(&self.pending) {
            let cmd: Vec<u8> = self.pending.drain(..len).collect();
            self.execute(&cmd);
        }
    }

    fn execute(&mut self, cmd: &[u8]) {
        let op = cmd[0];
        match op {
            SET_BITS_LOW => {
                self.pins.low_data = cmd[1];
                self.pins.low_direction = cmd[2];
                self.events.push(Event::SetPins {
                    bank: PinBank::Low,
                    data: cmd[1],
                    direction: cmd[2],
                });
                self.watch_lines();
            }
            SET_BITS_HIGH => {
                self.pins.high_data = cmd[1];
                self.pins.high_direction = cmd[2];
                self.events.push(Event::SetPins {
                    bank: PinBank::High,
                    data: cmd[1],
                    direction: cmd[2],
                });
            }
            GET_BITS_LOW => {
                self.events.push(Event::ReadPins(PinBank::Low));
                let level = self.level(PinBank::Low);
                self.respond(&[level]);
            }
            GET_BITS_HIGH => {
                self.events.push(Event::ReadPins(PinBank::High));
                let level = self.level(PinBank::High);
                self.respond(&[level]);
            }
            TCK_DIVISOR => {
                self.events
                    .push(Event::Divisor(u16::from_le_bytes([cmd[1], cmd[2]])));
            }
            DRIVE_ZERO_ONLY => {
                self.events.push(Event::DriveZero {
                    low: cmd[1],
                    high: cmd[2],
                });
            }
            SEND_IMMEDIATE | LOOPBACK_START | LOOPBACK_END | DIS_DIV_5 | EN_DIV_5 | EN_3_PHASE
            | DIS_3_PHASE | CLK_ADAPTIVE | CLK_NO_ADAPTIVE => {
                self.events.push(Event::Engine(op));
            }
            op if is_shift(op) => self.shift(cmd),
            op => {
                log::debug!("Dummy: bad command 0x{:02X}", op);
                self.events.push(Event::BadCommand(op));
                if self.config.echo_bad_commands {
                    self.respond(&[BAD_COMMAND, op]);
                }
            }
        }
    }

    fn shift(&mut self, cmd: &[u8]) {
        let op = cmd[0];
        let write = op & MPSSE_DO_WRITE != 0;
        let read = op & MPSSE_DO_READ != 0;

        if op & MPSSE_BITMODE != 0 {
            let count = cmd[1] + 1;
            if write {
                self.events.push(Event::ClockBitsOut {
                    opcode: op,
                    bits: cmd[2],
                    count,
                });
            }
            if read {
                self.events.push(Event::ClockBitsIn { opcode: op, count });
                let reply = self.scripted(1, None);
                self.respond(&reply);
            }
        } else {
            let len = u16::from_le_bytes([cmd[1], cmd[2]]) as usize + 1;
            match (write, read) {
                (true, false) => self.events.push(Event::ClockBytesOut {
                    opcode: op,
                    data: cmd[3..].to_vec(),
                }),
                (false, _) => {
                    self.events.push(Event::ClockBytesIn { opcode: op, len });
                    let reply = self.scripted(len, None);
                    self.respond(&reply);
                }
                (true, true) => {
                    let data = cmd[3..].to_vec();
                    let reply = self.scripted(len, Some(&data));
                    self.events.push(Event::ClockBytesInOut { opcode: op, data });
                    self.respond(&reply);
                }
            }
        }
        // The clock idles low after shifting
        self.scl = false;
    }

    fn scripted(&mut self, len: usize, written: Option<&[u8]>) -> Vec<u8> {
        (0..len)
            .map(|i| match self.script.pop_front() {
                Some(b) => b,
                None => match written {
                    Some(data) if self.config.loopback => data[i],
                    _ => 0x00,
                },
            })
            .collect()
    }

    fn level(&self, bank: PinBank) -> u8 {
        let (data, dir, inputs) = match bank {
            PinBank::Low => (self.pins.low_data, self.pins.low_direction, self.low_inputs),
            PinBank::High => (
                self.pins.high_data,
                self.pins.high_direction,
                self.high_inputs,
            ),
        };
        (data & dir) | (inputs & !dir)
    }

    fn respond(&mut self, bytes: &[u8]) {
        if self.stalled {
            log::trace!("Dummy: stalled, dropping {} response bytes", bytes.len());
            return;
        }
        self.rx.extend(bytes);
    }

    /// Response bytes visible to the host right now
    fn deliverable(&self) -> usize {
        self.delivery_limit
            .map_or(self.rx.len(), |l| l.min(self.rx.len()))
    }

    fn watch_lines(&mut self) {
        if self.pins.low_direction & 0x03 != 0x03 {
            return;
        }
        let scl = self.pins.low_data & 0x01 != 0;
        let sda = self.pins.low_data & 0x02 != 0;
        if self.scl && scl {
            if self.sda && !sda {
                self.events.push(Event::I2cStart);
            } else if !self.sda && sda {
                self.events.push(Event::I2cStop);
            }
        }
        self.scl = scl;
        self.sda = sda;
    }

    fn configure(&mut self, call: ConfigCall) -> Result<()> {
        if self.config.fail_configuration {
            return Err(Error::DeviceUnavailable(format!(
                "dummy configuration failure on {:?}",
                call
            )));
        }
        if matches!(call, ConfigCall::BitMode(_, BitMode::Reset)) {
            self.pending.clear();
        }
        self.events.push(Event::Config(call));
        Ok(())
    }
}

/// Emulated bridge implementing [`Transport`]
///
/// Clones share the same emulator, so a test can keep one handle for
/// inspection while the driver owns another.
#[derive(Debug, Clone)]
pub struct DummyTransport {
    inner: Arc<Mutex<Emulator>>,
}

impl Default for DummyTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl DummyTransport {
    /// Create an emulator with default behaviour
    pub fn new() -> Self {
        Self::with_config(DummyConfig::default())
    }

    /// Create an emulator with the given behaviour
    pub fn with_config(config: DummyConfig) -> Self {
        DummyTransport {
            inner: Arc::new(Mutex::new(Emulator::new(config))),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Emulator> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queue bytes returned by subsequent sampling commands
    ///
    /// Sampling commands take bytes from this queue first; once it is
    /// empty they return `0x00` (which an I2C master reads as ACK).
    pub fn queue_response(&self, bytes: &[u8]) {
        self.lock().script.extend(bytes);
    }

    /// Levels seen on pins configured as inputs
    pub fn set_input_levels(&self, bank: PinBank, levels: u8) {
        let mut emu = self.lock();
        match bank {
            PinBank::Low => emu.low_inputs = levels,
            PinBank::High => emu.high_inputs = levels,
        }
    }

    /// Stop answering read commands (simulates a hung device)
    pub fn set_stalled(&self, stalled: bool) {
        self.lock().stalled = stalled;
    }

    /// Accept at most `limit` bytes per write call
    pub fn set_write_limit(&self, limit: Option<usize>) {
        self.lock().write_limit = limit;
    }

    /// Accept `budget` more bytes in total, then cut every write short
    pub fn set_write_budget(&self, budget: Option<usize>) {
        self.lock().write_budget = budget;
    }

    /// Hand out at most `limit` more response bytes
    ///
    /// Bytes past the limit stay queued and arrive once the limit is
    /// lifted, like a reply that shows up after the host gave up waiting.
    pub fn set_delivery_limit(&self, limit: Option<usize>) {
        self.lock().delivery_limit = limit;
    }

    /// Response bytes queued for the host, including held-back ones
    pub fn pending_response(&self) -> usize {
        self.lock().rx.len()
    }

    /// Everything observed so far
    pub fn events(&self) -> Vec<Event> {
        self.lock().events.clone()
    }

    /// Forget the recorded events and writes
    pub fn clear_events(&self) {
        let mut emu = self.lock();
        emu.events.clear();
        emu.writes.clear();
    }

    /// Raw buffers passed to each `write` call
    pub fn writes(&self) -> Vec<Vec<u8>> {
        self.lock().writes.clone()
    }

    /// Current pin register
    pub fn pins(&self) -> PinSnapshot {
        self.lock().pins
    }
}

impl Transport for DummyTransport {
    fn write(&mut self, data: &[u8]) -> Result<usize> {
        let mut emu = self.lock();
        let accepted = [emu.write_limit, emu.write_budget]
            .into_iter()
            .flatten()
            .fold(data.len(), usize::min);
        if let Some(budget) = emu.write_budget.as_mut() {
            *budget -= accepted;
        }
        emu.writes.push(data[..accepted].to_vec());
        emu.feed(&data[..accepted]);
        log::trace!("Dummy: accepted {} of {} bytes", accepted, data.len());
        Ok(accepted)
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let mut emu = self.lock();
        let n = buf.len().min(emu.deliverable());
        for (slot, byte) in buf.iter_mut().zip(emu.rx.drain(..n)) {
            *slot = byte;
        }
        if let Some(limit) = emu.delivery_limit.as_mut() {
            *limit -= n;
        }
        Ok(n)
    }

    fn queued_bytes(&mut self) -> Result<usize> {
        Ok(self.lock().deliverable())
    }

    fn flush_input(&mut self) -> Result<usize> {
        let mut emu = self.lock();
        let n = emu.rx.len();
        emu.rx.clear();
        log::trace!("Dummy: purged {} response bytes", n);
        Ok(n)
    }

    fn set_timeouts(&mut self, read: Duration, write: Duration) -> Result<()> {
        self.lock().configure(ConfigCall::Timeouts { read, write })
    }

    fn set_latency_timer(&mut self, ms: u8) -> Result<()> {
        self.lock().configure(ConfigCall::Latency(ms))
    }

    fn set_flow_control(&mut self, flow: FlowControl) -> Result<()> {
        self.lock().configure(ConfigCall::FlowControl(flow))
    }

    fn set_bit_mode(&mut self, mask: u8, mode: BitMode) -> Result<()> {
        self.lock().configure(ConfigCall::BitMode(mask, mode))
    }

    fn set_usb_parameters(&mut self, in_transfer: u32, out_transfer: u32) -> Result<()> {
        self.lock()
            .configure(ConfigCall::UsbParameters(in_transfer, out_transfer))
    }

    fn set_special_chars(&mut self, chars: SpecialChars) -> Result<()> {
        self.lock().configure(ConfigCall::SpecialChars(chars))
    }
}
