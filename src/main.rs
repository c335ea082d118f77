//! ftbridge - GPIO, I2C and SPI over an FT232H
//!
//! Small command-line harness around the `ftbridge-ft232h` driver. Every
//! command takes a backend string:
//!
//! - `dummy` - in-memory MPSSE emulator, useful to try the commands and
//!   to watch the generated traffic with `-vv`
//! - `ft232h[:options]` - real hardware through libftdi1 (build with
//!   `--features libftdi`)

mod backends;
mod cli;
mod commands;

use std::time::Duration;

use clap::Parser;
use cli::{Cli, Commands, LevelArg};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logger
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    // Set log level based on verbosity
    match cli.verbose {
        0 => {} // default (info)
        1 => log::set_max_level(log::LevelFilter::Debug),
        _ => log::set_max_level(log::LevelFilter::Trace),
    }

    match cli.command {
        Commands::SpiTransfer {
            device,
            cs,
            mode,
            frequency,
            lsb_first,
            cs_active_high,
            data,
        } => {
            let dev = backends::open_device(&device)?;
            let args = commands::spi::TransferArgs {
                cs,
                mode,
                frequency,
                lsb_first,
                cs_active_high,
            };
            commands::spi::run_transfer(&dev, &args, &data.0)
        }
        Commands::I2cRead {
            device,
            address,
            register,
            length,
        } => {
            let dev = backends::open_device(&device)?;
            let register = register.as_ref().map(|r| r.0.as_slice());
            commands::i2c::run_read(&dev, address, register, length)
        }
        Commands::I2cWrite {
            device,
            address,
            data,
        } => {
            let dev = backends::open_device(&device)?;
            commands::i2c::run_write(&dev, address, &data.0)
        }
        Commands::I2cScan { device } => {
            let dev = backends::open_device(&device)?;
            commands::i2c::run_scan(&dev)
        }
        Commands::GpioRead { device, pin } => {
            let dev = backends::open_device(&device)?;
            commands::gpio::run_read(&dev, pin)
        }
        Commands::GpioWrite {
            device,
            pin,
            level,
            hold_ms,
        } => {
            let dev = backends::open_device(&device)?;
            let high = matches!(level, LevelArg::High);
            commands::gpio::run_write(&dev, pin, high, Duration::from_millis(hold_ms))
        }
        Commands::ListBackends => {
            commands::list_backends();
            Ok(())
        }
    }
}
