//! MPSSE command encoder
//!
//! Pure translation of bus intents into opcode byte sequences. Nothing in
//! here touches a device; callers queue commands into a [`CommandBuffer`]
//! and hand the finished buffer to the transport in one write.

use super::protocol::*;
use crate::error::{Error, Result};

/// Clock edge on which data is shifted out or sampled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockEdge {
    /// Positive (rising) edge
    Rising,
    /// Negative (falling) edge
    Falling,
}

impl ClockEdge {
    /// The other edge
    pub fn opposite(&self) -> Self {
        match self {
            ClockEdge::Rising => ClockEdge::Falling,
            ClockEdge::Falling => ClockEdge::Rising,
        }
    }
}

/// Bit order of shifted data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BitOrder {
    /// Most significant bit first
    #[default]
    MsbFirst,
    /// Least significant bit first
    LsbFirst,
}

/// Direction and edges of a shifting command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Clocking {
    /// Shift data out on the given edge
    Out(ClockEdge),
    /// Sample data in on the given edge
    In(ClockEdge),
    /// Full duplex: shift out on `out`, sample on the opposite edge
    InOut {
        /// Edge data is shifted out on
        out: ClockEdge,
    },
}

/// Transfer unit of a shifting command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockUnit {
    /// Whole bytes, 16-bit length field
    Bytes,
    /// 1..=8 bits, 8-bit length field
    Bits,
}

/// One half of the 16-line pin register
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinBank {
    /// Pins 0-7 (ADBUS)
    Low,
    /// Pins 8-15 (ACBUS)
    High,
}

impl PinBank {
    /// Bank and bit position of a logical pin 0..=15
    pub fn of_pin(pin: u8) -> (PinBank, u8) {
        if pin < 8 {
            (PinBank::Low, pin)
        } else {
            (PinBank::High, pin - 8)
        }
    }

    fn set_opcode(&self) -> u8 {
        match self {
            PinBank::Low => SET_BITS_LOW,
            PinBank::High => SET_BITS_HIGH,
        }
    }

    fn get_opcode(&self) -> u8 {
        match self {
            PinBank::Low => GET_BITS_LOW,
            PinBank::High => GET_BITS_HIGH,
        }
    }
}

/// Select the shifting opcode for a direction/edge/order/unit combination
pub fn clock_opcode(clocking: Clocking, order: BitOrder, unit: ClockUnit) -> u8 {
    let mut op = match clocking {
        Clocking::Out(edge) => {
            MPSSE_DO_WRITE
                | match edge {
                    ClockEdge::Falling => MPSSE_WRITE_NEG,
                    ClockEdge::Rising => 0,
                }
        }
        Clocking::In(edge) => {
            MPSSE_DO_READ
                | match edge {
                    ClockEdge::Falling => MPSSE_READ_NEG,
                    ClockEdge::Rising => 0,
                }
        }
        Clocking::InOut { out } => {
            MPSSE_DO_WRITE
                | MPSSE_DO_READ
                | match out {
                    ClockEdge::Falling => MPSSE_WRITE_NEG,
                    ClockEdge::Rising => MPSSE_READ_NEG,
                }
        }
    };
    if order == BitOrder::LsbFirst {
        op |= MPSSE_LSB;
    }
    if unit == ClockUnit::Bits {
        op |= MPSSE_BITMODE;
    }
    op
}

/// Encode a byte count as the little-endian `len - 1` length field
pub fn encode_length(len: usize) -> Result<[u8; 2]> {
    if len == 0 || len > MAX_TRANSFER_LEN {
        return Err(Error::InvalidArgument(format!(
            "Transfer length {} out of range 1..={}",
            len, MAX_TRANSFER_LEN
        )));
    }
    let field = (len - 1) as u16;
    Ok(field.to_le_bytes())
}

/// Clock divisor for a bus frequency in kHz
///
/// `divisor = 60000 / (2 * frequency_khz) - 1` with truncating division,
/// exactly as the command processor expects.
pub fn clock_divisor(frequency_khz: u32) -> Result<u16> {
    let max_khz = MASTER_CLOCK_KHZ / 2;
    if frequency_khz == 0 || frequency_khz > max_khz {
        return Err(Error::InvalidArgument(format!(
            "Clock frequency {} kHz out of range 1..={} kHz",
            frequency_khz, max_khz
        )));
    }
    // Bounded above by 29999 for 1 kHz
    Ok((MASTER_CLOCK_KHZ / (2 * frequency_khz) - 1) as u16)
}

/// Bus frequency in kHz produced by a divisor (inverse of [`clock_divisor`])
pub fn divisor_frequency_khz(divisor: u16) -> f64 {
    MASTER_CLOCK_KHZ as f64 / ((1.0 + divisor as f64) * 2.0)
}

/// `[0x80|0x82][data][direction]`
pub fn set_pins(bank: PinBank, data: u8, direction: u8) -> [u8; 3] {
    [bank.set_opcode(), data, direction]
}

/// `[0x81|0x83][0x87]`, answered by one byte
pub fn read_pins(bank: PinBank) -> [u8; 2] {
    [bank.get_opcode(), SEND_IMMEDIATE]
}

/// `[0x86][divLo][divHi]`
pub fn set_clock_divisor(divisor: u16) -> [u8; 3] {
    let [lo, hi] = divisor.to_le_bytes();
    [TCK_DIVISOR, lo, hi]
}

/// Decode a set-pins command back into `(bank, data, direction)`
pub fn decode_set_pins(bytes: &[u8]) -> Option<(PinBank, u8, u8)> {
    match bytes {
        [SET_BITS_LOW, data, dir, ..] => Some((PinBank::Low, *data, *dir)),
        [SET_BITS_HIGH, data, dir, ..] => Some((PinBank::High, *data, *dir)),
        _ => None,
    }
}

/// Response the command processor sends for an invalid opcode
pub fn bad_command_echo(probe: u8) -> [u8; 2] {
    [BAD_COMMAND, probe]
}

/// Growable MPSSE command stream
///
/// Commands are appended in order and sent with a single transport write.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandBuffer {
    buf: Vec<u8>,
}

impl CommandBuffer {
    /// Create an empty buffer
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty buffer with room for `capacity` bytes
    pub fn with_capacity(capacity: usize) -> Self {
        CommandBuffer {
            buf: Vec::with_capacity(capacity),
        }
    }

    /// Append a raw opcode
    pub fn push(&mut self, opcode: u8) -> &mut Self {
        self.buf.push(opcode);
        self
    }

    /// Drive the low byte pins
    pub fn set_low_pins(&mut self, data: u8, direction: u8) -> &mut Self {
        self.set_pins(PinBank::Low, data, direction)
    }

    /// Drive the high byte pins
    pub fn set_high_pins(&mut self, data: u8, direction: u8) -> &mut Self {
        self.set_pins(PinBank::High, data, direction)
    }

    /// Drive one bank of pins
    pub fn set_pins(&mut self, bank: PinBank, data: u8, direction: u8) -> &mut Self {
        self.buf.extend_from_slice(&set_pins(bank, data, direction));
        self
    }

    /// Repeat a set-pins command `cycles` times
    ///
    /// The command queue has no delay primitive; repetition holds the
    /// pattern on the wire for a predictable time.
    pub fn hold_pins(&mut self, bank: PinBank, data: u8, direction: u8, cycles: usize) -> &mut Self {
        for _ in 0..cycles {
            self.set_pins(bank, data, direction);
        }
        self
    }

    /// Request a pin bank read followed by send-immediate
    pub fn read_pins(&mut self, bank: PinBank) -> &mut Self {
        self.buf.extend_from_slice(&read_pins(bank));
        self
    }

    /// Flush the chip's read buffer back to the host
    pub fn send_immediate(&mut self) -> &mut Self {
        self.push(SEND_IMMEDIATE)
    }

    /// Program the clock divisor
    pub fn clock_divisor(&mut self, divisor: u16) -> &mut Self {
        self.buf.extend_from_slice(&set_clock_divisor(divisor));
        self
    }

    /// Clock setup common to every personality
    ///
    /// Disables divide-by-5 and adaptive clocking, then enables or disables
    /// 3-phase data clocking.
    pub fn mode_setup(&mut self, three_phase: bool) -> &mut Self {
        self.push(DIS_DIV_5).push(CLK_NO_ADAPTIVE).push(if three_phase {
            EN_3_PHASE
        } else {
            DIS_3_PHASE
        })
    }

    /// Disconnect the TDI/TDO loopback
    pub fn loopback_off(&mut self) -> &mut Self {
        self.push(LOOPBACK_END)
    }

    /// Restrict the masked pins to driving low only (open drain)
    pub fn drive_zero_only(&mut self, low_mask: u8, high_mask: u8) -> &mut Self {
        self.buf.extend_from_slice(&[DRIVE_ZERO_ONLY, low_mask, high_mask]);
        self
    }

    /// Shift `data` out on `edge`
    pub fn clock_bytes_out(
        &mut self,
        edge: ClockEdge,
        order: BitOrder,
        data: &[u8],
    ) -> Result<&mut Self> {
        let len = encode_length(data.len())?;
        self.buf
            .push(clock_opcode(Clocking::Out(edge), order, ClockUnit::Bytes));
        self.buf.extend_from_slice(&len);
        self.buf.extend_from_slice(data);
        Ok(self)
    }

    /// Sample `len` bytes in on `edge`
    pub fn clock_bytes_in(&mut self, edge: ClockEdge, order: BitOrder, len: usize) -> Result<&mut Self> {
        let field = encode_length(len)?;
        self.buf
            .push(clock_opcode(Clocking::In(edge), order, ClockUnit::Bytes));
        self.buf.extend_from_slice(&field);
        Ok(self)
    }

    /// Shift `data` out on `out_edge` while sampling on the opposite edge
    pub fn clock_bytes_in_out(
        &mut self,
        out_edge: ClockEdge,
        order: BitOrder,
        data: &[u8],
    ) -> Result<&mut Self> {
        let len = encode_length(data.len())?;
        self.buf.push(clock_opcode(
            Clocking::InOut { out: out_edge },
            order,
            ClockUnit::Bytes,
        ));
        self.buf.extend_from_slice(&len);
        self.buf.extend_from_slice(data);
        Ok(self)
    }

    /// Shift the first `count` bits of `bits` out on `edge`
    pub fn clock_bits_out(
        &mut self,
        edge: ClockEdge,
        order: BitOrder,
        bits: u8,
        count: u8,
    ) -> Result<&mut Self> {
        let field = bit_count_field(count)?;
        self.buf
            .extend_from_slice(&[clock_opcode(Clocking::Out(edge), order, ClockUnit::Bits), field, bits]);
        Ok(self)
    }

    /// Sample `count` bits in on `edge`
    pub fn clock_bits_in(&mut self, edge: ClockEdge, order: BitOrder, count: u8) -> Result<&mut Self> {
        let field = bit_count_field(count)?;
        self.buf
            .extend_from_slice(&[clock_opcode(Clocking::In(edge), order, ClockUnit::Bits), field]);
        Ok(self)
    }

    /// Encoded bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    /// Number of encoded bytes
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Whether nothing has been queued
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Take the encoded bytes
    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}

fn bit_count_field(count: u8) -> Result<u8> {
    if !(1..=8).contains(&count) {
        return Err(Error::InvalidArgument(format!(
            "Bit count {} out of range 1..=8",
            count
        )));
    }
    Ok(count - 1)
}
