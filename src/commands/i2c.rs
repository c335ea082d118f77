//! I2C command implementations

use ftbridge_ft232h::Ft232h;

use super::hex_line;

/// Read `length` bytes, after writing `register` if given
pub fn run_read(
    device: &Ft232h,
    address: u8,
    register: Option<&[u8]>,
    length: usize,
) -> Result<(), Box<dyn std::error::Error>> {
    let bus = device.i2c_bus()?;
    let dev = bus.create_device(address)?;
    let mut buf = vec![0u8; length];

    match register {
        Some(reg) if !reg.is_empty() => dev.write_read(reg, &mut buf)?,
        _ => dev.read(&mut buf)?,
    }

    println!("{}", hex_line(&buf));
    Ok(())
}

/// Write `data` to the device at `address`
pub fn run_write(
    device: &Ft232h,
    address: u8,
    data: &[u8],
) -> Result<(), Box<dyn std::error::Error>> {
    let bus = device.i2c_bus()?;
    let dev = bus.create_device(address)?;
    dev.write(data)?;
    log::info!("Wrote {} bytes to 0x{:02X}", data.len(), address);
    Ok(())
}

/// Print a table of responding addresses, i2cdetect style
pub fn run_scan(device: &Ft232h) -> Result<(), Box<dyn std::error::Error>> {
    let bus = device.i2c_bus()?;
    let found = bus.scan()?;

    println!("     0  1  2  3  4  5  6  7  8  9  a  b  c  d  e  f");
    for row in (0u8..0x80).step_by(16) {
        let mut line = format!("{:02x}:", row);
        for address in row..row + 16 {
            if found.contains(&address) {
                line.push_str(&format!(" {:02x}", address));
            } else if (0x08..=0x77).contains(&address) {
                line.push_str(" --");
            } else {
                line.push_str("   ");
            }
        }
        println!("{}", line);
    }

    log::info!("{} device(s) found", found.len());
    Ok(())
}
