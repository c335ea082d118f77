//! SPI command implementation

use ftbridge_ft232h::{BitOrder, Ft232h, SpiConfig, SpiMode};

use super::hex_line;
use crate::cli::ModeArg;

/// Options of the `spi-transfer` command
pub struct TransferArgs {
    pub cs: u8,
    pub mode: ModeArg,
    pub frequency: u32,
    pub lsb_first: bool,
    pub cs_active_high: bool,
}

impl From<ModeArg> for SpiMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Mode0 => SpiMode::Mode0,
            ModeArg::Mode1 => SpiMode::Mode1,
            ModeArg::Mode2 => SpiMode::Mode2,
            ModeArg::Mode3 => SpiMode::Mode3,
        }
    }
}

/// Run a full-duplex transfer and print what came back
pub fn run_transfer(
    device: &Ft232h,
    args: &TransferArgs,
    data: &[u8],
) -> Result<(), Box<dyn std::error::Error>> {
    let order = if args.lsb_first {
        BitOrder::LsbFirst
    } else {
        BitOrder::MsbFirst
    };
    let config = SpiConfig::new(args.cs)
        .mode(args.mode.into())
        .data_flow(order)
        .clock_frequency_hz(args.frequency)
        .chip_select_active_high(args.cs_active_high);

    let spi = device.spi_device(config)?;
    let mut rx = vec![0u8; data.len()];
    spi.write_read(data, &mut rx)?;

    log::info!("Transferred {} bytes on CS{}", data.len(), args.cs);
    println!("{}", hex_line(&rx));
    Ok(())
}
