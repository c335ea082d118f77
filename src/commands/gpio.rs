//! GPIO command implementations

use std::thread;
use std::time::Duration;

use ftbridge_ft232h::{Ft232h, PinMode};

/// Sample `pin` as an input and print its level
pub fn run_read(device: &Ft232h, pin: u8) -> Result<(), Box<dyn std::error::Error>> {
    let mut gpio = device.gpio().open_pin(pin)?;
    gpio.set_mode(PinMode::Input)?;
    let high = gpio.read()?;
    println!("{}", if high { "high" } else { "low" });
    Ok(())
}

/// Drive `pin` to `high` for `hold`
pub fn run_write(
    device: &Ft232h,
    pin: u8,
    high: bool,
    hold: Duration,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut gpio = device.gpio().open_pin(pin)?;
    gpio.set_mode(PinMode::Output)?;
    gpio.write(high)?;
    log::info!("GPIO {} set {}", pin, if high { "high" } else { "low" });
    thread::sleep(hold);
    Ok(())
}
