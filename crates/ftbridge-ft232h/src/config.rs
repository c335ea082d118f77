//! Device configuration and programmer-style option parsing

use std::time::Duration;

use ftbridge_core::error::{Error, Result};
use ftbridge_core::mpsse::{clock_divisor, divisor_frequency_khz};

/// FT232H USB vendor ID
pub const FT232H_VID: u16 = 0x0403;

/// FT232H USB product ID
pub const FT232H_PID: u16 = 0x6014;

/// Default deadline for a single response read
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(1);

/// Default I2C bus frequency
pub const DEFAULT_I2C_KHZ: u32 = 400;

/// FTDI interface/channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FtdiInterface {
    /// Channel A (the only one on FT232H)
    #[default]
    A,
    /// Channel B
    B,
    /// Channel C
    C,
    /// Channel D
    D,
}

impl FtdiInterface {
    /// Parse from a character (A, B, C, D)
    pub fn from_char(c: char) -> Option<Self> {
        match c.to_ascii_uppercase() {
            'A' => Some(FtdiInterface::A),
            'B' => Some(FtdiInterface::B),
            'C' => Some(FtdiInterface::C),
            'D' => Some(FtdiInterface::D),
            _ => None,
        }
    }

    /// Channel letter
    pub fn letter(&self) -> char {
        match self {
            FtdiInterface::A => 'A',
            FtdiInterface::B => 'B',
            FtdiInterface::C => 'C',
            FtdiInterface::D => 'D',
        }
    }
}

/// How the libftdi backend locates the chip
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FtdiOpenOptions {
    /// USB vendor ID
    pub vendor_id: u16,
    /// USB product ID
    pub product_id: u16,
    /// Channel to open
    pub interface: FtdiInterface,
}

impl Default for FtdiOpenOptions {
    fn default() -> Self {
        FtdiOpenOptions {
            vendor_id: FT232H_VID,
            product_id: FT232H_PID,
            interface: FtdiInterface::A,
        }
    }
}

/// Configuration for an FT232H device
#[derive(Debug, Clone)]
pub struct DeviceConfig {
    /// Human-readable name used in log and error messages
    pub description: Option<String>,
    /// Deadline for collecting a response before reporting a short read
    pub read_timeout: Duration,
    /// I2C clock in kHz
    pub i2c_frequency_khz: u32,
    /// USB lookup parameters for the libftdi backend
    pub open: FtdiOpenOptions,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        DeviceConfig {
            description: None,
            read_timeout: DEFAULT_READ_TIMEOUT,
            i2c_frequency_khz: DEFAULT_I2C_KHZ,
            open: FtdiOpenOptions::default(),
        }
    }
}

impl DeviceConfig {
    /// Set the description
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Set the read deadline
    pub fn read_timeout(mut self, timeout: Duration) -> Result<Self> {
        if timeout.is_zero() {
            return Err(Error::InvalidArgument(
                "Read timeout must be non-zero".into(),
            ));
        }
        self.read_timeout = timeout;
        Ok(self)
    }

    /// Set the I2C clock frequency
    pub fn i2c_frequency_khz(mut self, khz: u32) -> Result<Self> {
        clock_divisor(khz)?;
        self.i2c_frequency_khz = khz;
        Ok(self)
    }

    /// Set the USB lookup parameters
    pub fn open_options(mut self, open: FtdiOpenOptions) -> Self {
        self.open = open;
        self
    }

    /// Name for log messages
    pub fn name(&self) -> &str {
        self.description.as_deref().unwrap_or("FT232H")
    }

    /// Actual I2C clock after divisor truncation, in kHz
    pub fn i2c_clock_khz(&self) -> f64 {
        clock_divisor(self.i2c_frequency_khz)
            .map(divisor_frequency_khz)
            .unwrap_or(0.0)
    }
}

fn parse_hex_u16(key: &str, value: &str) -> Result<u16> {
    let digits = value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
        .unwrap_or(value);
    u16::from_str_radix(digits, 16)
        .map_err(|_| Error::InvalidArgument(format!("Invalid {} '{}'", key, value)))
}

/// Parse programmer options into a `DeviceConfig`
///
/// Supported options:
/// - `description=<string>` - name used in messages
/// - `timeout_ms=<N>` - read deadline in milliseconds (default 1000)
/// - `i2c_khz=<N>` - I2C clock in kHz (default 400)
/// - `vid=<hex>` / `pid=<hex>` - USB IDs for the libftdi backend
/// - `interface=<A|B|C|D>` - channel for the libftdi backend
pub fn parse_options(options: &[(&str, &str)]) -> Result<DeviceConfig> {
    let mut config = DeviceConfig::default();

    for (key, value) in options {
        match *key {
            "description" => {
                config = config.description(*value);
            }
            "timeout_ms" => {
                let ms: u64 = value.parse().map_err(|_| {
                    Error::InvalidArgument(format!("Invalid timeout '{}'", value))
                })?;
                config = config.read_timeout(Duration::from_millis(ms))?;
            }
            "i2c_khz" => {
                let khz: u32 = value.parse().map_err(|_| {
                    Error::InvalidArgument(format!("Invalid I2C frequency '{}'", value))
                })?;
                config = config.i2c_frequency_khz(khz)?;
            }
            "vid" => {
                config.open.vendor_id = parse_hex_u16(key, value)?;
            }
            "pid" => {
                config.open.product_id = parse_hex_u16(key, value)?;
            }
            "interface" | "port" => {
                let mut chars = value.chars();
                config.open.interface = match (chars.next(), chars.next()) {
                    (Some(c), None) => FtdiInterface::from_char(c),
                    _ => None,
                }
                .ok_or_else(|| {
                    Error::InvalidArgument(format!(
                        "Invalid interface '{}': must be A, B, C, or D",
                        value
                    ))
                })?;
            }
            _ => {
                log::warn!("Unknown FT232H option: {}={}", key, value);
            }
        }
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = DeviceConfig::default();
        assert_eq!(config.read_timeout, Duration::from_secs(1));
        assert_eq!(config.i2c_frequency_khz, 400);
        assert_eq!(config.i2c_clock_khz(), 400.0);
        assert_eq!(config.name(), "FT232H");
        assert_eq!(config.open.vendor_id, 0x0403);
        assert_eq!(config.open.product_id, 0x6014);
    }

    #[test]
    fn test_parse_options() {
        let config = parse_options(&[
            ("description", "bench"),
            ("timeout_ms", "50"),
            ("i2c_khz", "100"),
            ("vid", "0x1234"),
            ("pid", "abcd"),
            ("interface", "b"),
            ("bogus", "1"),
        ])
        .unwrap();
        assert_eq!(config.name(), "bench");
        assert_eq!(config.read_timeout, Duration::from_millis(50));
        assert_eq!(config.i2c_frequency_khz, 100);
        assert_eq!(config.open.vendor_id, 0x1234);
        assert_eq!(config.open.product_id, 0xABCD);
        assert_eq!(config.open.interface, FtdiInterface::B);
    }

    #[test]
    fn test_parse_options_rejects() {
        assert!(parse_options(&[("i2c_khz", "0")]).is_err());
        assert!(parse_options(&[("i2c_khz", "40000")]).is_err());
        assert!(parse_options(&[("timeout_ms", "0")]).is_err());
        assert!(parse_options(&[("timeout_ms", "soon")]).is_err());
        assert!(parse_options(&[("interface", "E")]).is_err());
        assert!(parse_options(&[("interface", "AB")]).is_err());
        assert!(parse_options(&[("vid", "xyz")]).is_err());
    }
}
