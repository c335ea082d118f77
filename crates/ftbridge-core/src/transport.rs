//! Raw transport contract
//!
//! A [`Transport`] is an already-opened handle to the bridge. Drivers only
//! push opaque command bytes through it and read responses back; they never
//! see USB details. The configuration primitives are invoked only while a
//! bus personality initializes.

use std::time::Duration;

use crate::error::Result;

/// Flow control setting for the bridge's UART engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FlowControl {
    /// No flow control
    #[default]
    Disabled,
    /// RTS/CTS hardware handshake
    RtsCts,
    /// DTR/DSR hardware handshake
    DtrDsr,
    /// XON/XOFF software handshake
    XonXoff {
        /// XON character
        xon: u8,
        /// XOFF character
        xoff: u8,
    },
}

/// Bit mode of the bridge's I/O engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BitMode {
    /// Reset to the default (UART) engine
    Reset,
    /// Multi-protocol synchronous serial engine
    Mpsse,
}

impl BitMode {
    /// Raw mode value as used by the vendor API
    pub fn raw(&self) -> u8 {
        match self {
            BitMode::Reset => 0x00,
            BitMode::Mpsse => 0x02,
        }
    }
}

/// Event and error character configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SpecialChars {
    /// Event character
    pub event_char: u8,
    /// Whether the event character is enabled
    pub event_enabled: bool,
    /// Error character
    pub error_char: u8,
    /// Whether the error character is enabled
    pub error_enabled: bool,
}

/// Opened byte-stream handle to a bridge chip
///
/// Implementations must write each buffer as a single contiguous transfer:
/// a command split across two USB transactions is a protocol violation.
pub trait Transport: Send {
    /// Write `data`, returning how many bytes the backend accepted
    fn write(&mut self, data: &[u8]) -> Result<usize>;

    /// Read up to `buf.len()` already-queued bytes without blocking
    fn read(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// Number of received bytes waiting to be read
    fn queued_bytes(&mut self) -> Result<usize>;

    /// Set the backend read and write timeouts
    fn set_timeouts(&mut self, read: Duration, write: Duration) -> Result<()>;

    /// Set the USB latency timer in milliseconds
    fn set_latency_timer(&mut self, ms: u8) -> Result<()>;

    /// Configure flow control
    fn set_flow_control(&mut self, flow: FlowControl) -> Result<()>;

    /// Switch the I/O engine bit mode
    fn set_bit_mode(&mut self, mask: u8, mode: BitMode) -> Result<()>;

    /// Set USB IN/OUT transfer sizes in bytes
    fn set_usb_parameters(&mut self, in_transfer: u32, out_transfer: u32) -> Result<()>;

    /// Configure event and error characters
    fn set_special_chars(&mut self, chars: SpecialChars) -> Result<()>;

    /// Drop any stale bytes waiting in the receive queue
    ///
    /// Returns the number of bytes discarded.
    fn flush_input(&mut self) -> Result<usize> {
        let available = self.queued_bytes()?;
        if available == 0 {
            return Ok(0);
        }
        let mut scratch = vec![0u8; available];
        let n = self.read(&mut scratch)?;
        log::trace!("Discarded {} stale bytes", n);
        Ok(n)
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn write(&mut self, data: &[u8]) -> Result<usize> {
        (**self).write(data)
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        (**self).read(buf)
    }

    fn queued_bytes(&mut self) -> Result<usize> {
        (**self).queued_bytes()
    }

    fn set_timeouts(&mut self, read: Duration, write: Duration) -> Result<()> {
        (**self).set_timeouts(read, write)
    }

    fn set_latency_timer(&mut self, ms: u8) -> Result<()> {
        (**self).set_latency_timer(ms)
    }

    fn set_flow_control(&mut self, flow: FlowControl) -> Result<()> {
        (**self).set_flow_control(flow)
    }

    fn set_bit_mode(&mut self, mask: u8, mode: BitMode) -> Result<()> {
        (**self).set_bit_mode(mask, mode)
    }

    fn set_usb_parameters(&mut self, in_transfer: u32, out_transfer: u32) -> Result<()> {
        (**self).set_usb_parameters(in_transfer, out_transfer)
    }

    fn set_special_chars(&mut self, chars: SpecialChars) -> Result<()> {
        (**self).set_special_chars(chars)
    }

    fn flush_input(&mut self) -> Result<usize> {
        (**self).flush_input()
    }
}
