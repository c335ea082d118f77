//! CLI argument parsing

use crate::backends;
use clap::{Parser, Subcommand, ValueEnum};

/// Parse a string as a hex (`0x` prefix) or decimal u8
fn parse_u8(s: &str) -> Result<u8, String> {
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u8::from_str_radix(hex, 16).map_err(|e| format!("Invalid hex value: {}", e))
    } else {
        s.parse::<u8>().map_err(|e| format!("Invalid number: {}", e))
    }
}

/// Parse a hex byte string such as `9f00`, `9f 00` or `0x9f,0x00`
pub fn parse_hex_bytes(s: &str) -> Result<Vec<u8>, String> {
    let digits: String = s
        .split(|c: char| c == ',' || c.is_whitespace())
        .map(|tok| tok.trim_start_matches("0x").trim_start_matches("0X"))
        .collect();
    if digits.len() % 2 != 0 {
        return Err(format!("Odd number of hex digits in '{}'", s));
    }
    (0..digits.len())
        .step_by(2)
        .map(|i| {
            digits
                .get(i..i + 2)
                .and_then(|pair| u8::from_str_radix(pair, 16).ok())
                .ok_or_else(|| format!("Invalid hex byte in '{}'", s))
        })
        .collect()
}

/// Byte string argument
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HexBytes(pub Vec<u8>);

fn parse_hex_arg(s: &str) -> Result<HexBytes, String> {
    parse_hex_bytes(s).map(HexBytes)
}

/// Generate dynamic help text for the backend argument
fn backend_help() -> String {
    format!(
        "Backend to use, with options as name:key=value,... [available: {}]",
        backends::backend_names_short()
    )
}

#[derive(Parser)]
#[command(name = "ftbridge")]
#[command(author, version, about = "GPIO, I2C and SPI over an FT232H", long_about = None)]
pub struct Cli {
    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

/// SPI clock mode argument
#[derive(ValueEnum, Clone, Copy, Debug)]
pub enum ModeArg {
    /// CPOL=0, CPHA=0
    #[value(name = "0")]
    Mode0,
    /// CPOL=0, CPHA=1
    #[value(name = "1")]
    Mode1,
    /// CPOL=1, CPHA=0
    #[value(name = "2")]
    Mode2,
    /// CPOL=1, CPHA=1
    #[value(name = "3")]
    Mode3,
}

/// Logic level argument
#[derive(ValueEnum, Clone, Copy, Debug)]
pub enum LevelArg {
    /// Drive high
    High,
    /// Drive low
    Low,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Full-duplex SPI transfer; prints the bytes read back
    SpiTransfer {
        /// Backend to use
        #[arg(short, long, help = backend_help())]
        device: String,

        /// Chip-select pin (3-15)
        #[arg(long, default_value = "3")]
        cs: u8,

        /// Clock mode
        #[arg(long, value_enum, default_value = "0")]
        mode: ModeArg,

        /// Clock frequency in Hz
        #[arg(long, default_value = "1000000")]
        frequency: u32,

        /// Shift least significant bit first
        #[arg(long)]
        lsb_first: bool,

        /// Chip select is active high
        #[arg(long)]
        cs_active_high: bool,

        /// Bytes to send (hex, e.g. "9f000000")
        #[arg(value_parser = parse_hex_arg)]
        data: HexBytes,
    },

    /// Read from an I2C device, optionally after writing a register address
    I2cRead {
        /// Backend to use
        #[arg(short, long, help = backend_help())]
        device: String,

        /// 7-bit device address (hex or decimal)
        #[arg(short, long, value_parser = parse_u8)]
        address: u8,

        /// Register bytes written before the read (hex)
        #[arg(short, long, value_parser = parse_hex_arg)]
        register: Option<HexBytes>,

        /// Number of bytes to read
        #[arg(short, long, default_value = "1")]
        length: usize,
    },

    /// Write bytes to an I2C device
    I2cWrite {
        /// Backend to use
        #[arg(short, long, help = backend_help())]
        device: String,

        /// 7-bit device address (hex or decimal)
        #[arg(short, long, value_parser = parse_u8)]
        address: u8,

        /// Bytes to write (hex)
        #[arg(value_parser = parse_hex_arg)]
        data: HexBytes,
    },

    /// List responding I2C addresses
    I2cScan {
        /// Backend to use
        #[arg(short, long, help = backend_help())]
        device: String,
    },

    /// Sample a pin
    GpioRead {
        /// Backend to use
        #[arg(short, long, help = backend_help())]
        device: String,

        /// Pin number (0-15)
        #[arg(short, long)]
        pin: u8,
    },

    /// Drive a pin; all pins are released again when the command exits
    GpioWrite {
        /// Backend to use
        #[arg(short, long, help = backend_help())]
        device: String,

        /// Pin number (0-15)
        #[arg(short, long)]
        pin: u8,

        /// Level to drive
        #[arg(value_enum)]
        level: LevelArg,

        /// Keep driving for this many milliseconds before exiting
        #[arg(long, default_value = "0")]
        hold_ms: u64,
    },

    /// List supported backends
    ListBackends,
}
