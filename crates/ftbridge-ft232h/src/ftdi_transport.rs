//! Transport backed by libftdi1
//!
//! libftdi has no "queued byte count" query; bytes are pulled into a local
//! FIFO instead and counted there.

use std::collections::VecDeque;
use std::io::{Read, Write};
use std::time::Duration;

use ftdi::{find_by_vid_pid, BitMode as FtdiBitMode, Device, Interface};
use ftbridge_core::error::{Error, Result};
use ftbridge_core::transport::{BitMode, FlowControl, SpecialChars, Transport};

use crate::config::{FtdiInterface, FtdiOpenOptions};

/// Size of one pull from the chip into the FIFO
const READ_CHUNK: usize = 4096;

fn config_error(what: &str, e: ftdi::Error) -> Error {
    Error::DeviceUnavailable(format!("{} failed: {}", what, e))
}

/// libftdi-backed [`Transport`]
pub struct LibFtdiTransport {
    device: Device,
    fifo: VecDeque<u8>,
}

// SAFETY: the libftdi context is only touched through `&mut self`, and the
// driver keeps the transport behind a mutex.
unsafe impl Send for LibFtdiTransport {}

impl LibFtdiTransport {
    /// Open the first chip matching `options`
    pub fn open(options: &FtdiOpenOptions) -> Result<Self> {
        let interface = match options.interface {
            FtdiInterface::A => Interface::A,
            FtdiInterface::B => Interface::B,
            FtdiInterface::C => Interface::C,
            FtdiInterface::D => Interface::D,
        };

        log::debug!(
            "Looking for FTDI device VID={:04X} PID={:04X} interface {}",
            options.vendor_id,
            options.product_id,
            options.interface.letter()
        );

        let mut device = find_by_vid_pid(options.vendor_id, options.product_id)
            .interface(interface)
            .open()
            .map_err(|e| Error::DeviceUnavailable(format!("{}", e)))?;

        device.usb_reset().map_err(|e| config_error("USB reset", e))?;

        log::info!(
            "Opened FTDI device {:04X}:{:04X}",
            options.vendor_id,
            options.product_id
        );

        Ok(LibFtdiTransport {
            device,
            fifo: VecDeque::new(),
        })
    }

    /// Move whatever the chip has buffered into the FIFO
    fn pull(&mut self) -> Result<()> {
        let mut chunk = [0u8; READ_CHUNK];
        let n = self
            .device
            .read(&mut chunk)
            .map_err(|e| Error::backend(format!("Read failed: {}", e)))?;
        self.fifo.extend(&chunk[..n]);
        Ok(())
    }
}

impl Transport for LibFtdiTransport {
    fn write(&mut self, data: &[u8]) -> Result<usize> {
        let mut written = 0;
        while written < data.len() {
            let n = self
                .device
                .write(&data[written..])
                .map_err(|e| Error::backend(format!("Write failed: {}", e)))?;
            if n == 0 {
                break;
            }
            written += n;
        }
        log::trace!("libftdi wrote {} bytes", written);
        Ok(written)
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        if self.fifo.is_empty() {
            self.pull()?;
        }
        let n = buf.len().min(self.fifo.len());
        for (slot, byte) in buf.iter_mut().zip(self.fifo.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }

    fn queued_bytes(&mut self) -> Result<usize> {
        if self.fifo.is_empty() {
            self.pull()?;
        }
        Ok(self.fifo.len())
    }

    fn set_timeouts(&mut self, read: Duration, write: Duration) -> Result<()> {
        // libftdi keeps its own USB timeouts; the driver enforces the read deadline
        log::debug!("Timeouts read={:?} write={:?}", read, write);
        Ok(())
    }

    fn set_latency_timer(&mut self, ms: u8) -> Result<()> {
        self.device
            .set_latency_timer(ms)
            .map_err(|e| config_error("Set latency timer", e))
    }

    fn set_flow_control(&mut self, flow: FlowControl) -> Result<()> {
        let flow = match flow {
            FlowControl::Disabled => ftdi::FlowControl::Disabled,
            FlowControl::RtsCts => ftdi::FlowControl::RtsCts,
            FlowControl::DtrDsr => ftdi::FlowControl::DtrDsr,
            FlowControl::XonXoff { .. } => ftdi::FlowControl::XonXoff,
        };
        self.device
            .set_flow_control(flow)
            .map_err(|e| config_error("Set flow control", e))
    }

    fn set_bit_mode(&mut self, mask: u8, mode: BitMode) -> Result<()> {
        let mode = match mode {
            BitMode::Reset => FtdiBitMode::Reset,
            BitMode::Mpsse => FtdiBitMode::Mpsse,
        };
        self.device
            .set_bitmode(mask, mode)
            .map_err(|e| config_error("Set bit mode", e))
    }

    fn set_usb_parameters(&mut self, in_transfer: u32, out_transfer: u32) -> Result<()> {
        self.device.set_read_chunksize(in_transfer);
        self.device.set_write_chunksize(out_transfer);
        Ok(())
    }

    fn set_special_chars(&mut self, chars: SpecialChars) -> Result<()> {
        if chars.event_enabled || chars.error_enabled {
            return Err(Error::NotSupported("event/error characters on libftdi"));
        }
        Ok(())
    }

    fn flush_input(&mut self) -> Result<usize> {
        let discarded = self.fifo.len();
        self.fifo.clear();
        self.device
            .usb_purge_rx_buffer()
            .map_err(|e| Error::backend(format!("Purge failed: {}", e)))?;
        log::trace!("Discarded {} stale bytes", discarded);
        Ok(discarded)
    }
}
