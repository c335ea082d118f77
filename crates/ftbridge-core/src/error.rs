//! Error types shared by every bus personality
//!
//! All errors are surfaced synchronously to the immediate caller. Nothing
//! below the facades retries or swallows a failure.

use thiserror::Error;

/// Result type for bridge operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while driving the bridge
#[derive(Debug, Error)]
pub enum Error {
    /// The transport could not be opened or configured
    #[error("Device unavailable: {0}")]
    DeviceUnavailable(String),

    /// The MPSSE bad-command echo did not match the probe that was sent
    #[error("MPSSE synchronization failed: probe 0x{probe:02X}, response {response:02X?}")]
    ProtocolSyncFailure {
        /// Invalid opcode that was sent
        probe: u8,
        /// Bytes received instead of `[0xFA, probe]`
        response: Vec<u8>,
    },

    /// A pin or bus is already owned by another personality
    #[error("Resource conflict: {0}")]
    ResourceConflict(String),

    /// Out-of-range pin, chip select, frequency or buffer length
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Address or pin is already claimed
    #[error("Already in use: {0}")]
    AlreadyInUse(String),

    /// Address or pin was never claimed
    #[error("Not open: {0}")]
    NotOpen(String),

    /// Capability the driver does not provide
    #[error("Not supported: {0}")]
    NotSupported(&'static str),

    /// Wire-level failure
    #[error(transparent)]
    Io(#[from] IoError),
}

/// Wire-level failures
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IoError {
    /// The transport accepted fewer bytes than were queued
    #[error("Short write: {written} of {expected} bytes accepted")]
    ShortWrite {
        /// Bytes accepted by the transport
        written: usize,
        /// Bytes that should have been written
        expected: usize,
    },

    /// The read deadline passed before the requested byte count arrived
    #[error("Short read: {read} of {expected} bytes before timeout")]
    ShortRead {
        /// Bytes received before the deadline
        read: usize,
        /// Bytes requested
        expected: usize,
    },

    /// The target did not acknowledge its address
    #[error("No acknowledge for address 0x{address:02X}")]
    AddressNak {
        /// 7-bit target address
        address: u8,
    },

    /// The target did not acknowledge a payload byte
    #[error("No acknowledge on data byte {index}")]
    DataNak {
        /// Index of the first payload byte that was not acknowledged
        index: usize,
    },

    /// The transport backend reported an error
    #[error("Transport error: {0}")]
    Backend(String),
}

impl Error {
    /// Shorthand for an [`IoError::Backend`] error
    pub fn backend(msg: impl Into<String>) -> Self {
        Error::Io(IoError::Backend(msg.into()))
    }

    /// Whether this error is an I2C acknowledge failure
    pub fn is_nak(&self) -> bool {
        matches!(
            self,
            Error::Io(IoError::AddressNak { .. }) | Error::Io(IoError::DataNak { .. })
        )
    }
}

impl embedded_hal::i2c::Error for Error {
    fn kind(&self) -> embedded_hal::i2c::ErrorKind {
        use embedded_hal::i2c::{ErrorKind, NoAcknowledgeSource};

        match self {
            Error::Io(IoError::AddressNak { .. }) => {
                ErrorKind::NoAcknowledge(NoAcknowledgeSource::Address)
            }
            Error::Io(IoError::DataNak { .. }) => ErrorKind::NoAcknowledge(NoAcknowledgeSource::Data),
            _ => ErrorKind::Other,
        }
    }
}

impl embedded_hal::spi::Error for Error {
    fn kind(&self) -> embedded_hal::spi::ErrorKind {
        embedded_hal::spi::ErrorKind::Other
    }
}

impl embedded_hal::digital::Error for Error {
    fn kind(&self) -> embedded_hal::digital::ErrorKind {
        embedded_hal::digital::ErrorKind::Other
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embedded_hal::i2c::{Error as _, ErrorKind, NoAcknowledgeSource};

    #[test]
    fn test_nak_kinds() {
        let addr = Error::from(IoError::AddressNak { address: 0x76 });
        let data = Error::from(IoError::DataNak { index: 2 });
        assert!(addr.is_nak());
        assert!(data.is_nak());
        assert_eq!(
            addr.kind(),
            ErrorKind::NoAcknowledge(NoAcknowledgeSource::Address)
        );
        assert_eq!(data.kind(), ErrorKind::NoAcknowledge(NoAcknowledgeSource::Data));
        assert_eq!(Error::backend("gone").kind(), ErrorKind::Other);
    }

    #[test]
    fn test_display() {
        let e = Error::ProtocolSyncFailure {
            probe: 0xAA,
            response: vec![0x00],
        };
        assert_eq!(
            e.to_string(),
            "MPSSE synchronization failed: probe 0xAA, response [00]"
        );
        let e = Error::from(IoError::DataNak { index: 3 });
        assert_eq!(e.to_string(), "No acknowledge on data byte 3");
    }
}
