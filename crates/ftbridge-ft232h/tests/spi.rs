mod common;

use std::time::Duration;

use common::{count, setup, setup_with};
use ftbridge_core::mpsse::PinBank;
use ftbridge_core::transport::{BitMode, SpecialChars};
use ftbridge_core::{Error, IoError};
use ftbridge_dummy::{ConfigCall, DummyConfig, Event};
use ftbridge_ft232h::{BitOrder, BusModes, SpiConfig, SpiMode};

fn opcodes(events: &[Event]) -> Vec<u8> {
    events
        .iter()
        .filter_map(|e| match e {
            Event::ClockBytesOut { opcode, .. }
            | Event::ClockBytesIn { opcode, .. }
            | Event::ClockBytesInOut { opcode, .. } => Some(*opcode),
            _ => None,
        })
        .collect()
}

#[test]
fn test_init_sequence() {
    let (device, dummy) = setup();
    let _spi = device.spi_device(SpiConfig::new(3)).unwrap();

    let events = dummy.events();
    assert_eq!(
        events[..17],
        [
            Event::Config(ConfigCall::Latency(1)),
            Event::Config(ConfigCall::UsbParameters(65535, 65535)),
            Event::Config(ConfigCall::SpecialChars(SpecialChars::default())),
            Event::Config(ConfigCall::Timeouts {
                read: Duration::from_millis(3000),
                write: Duration::from_millis(3000),
            }),
            Event::Config(ConfigCall::Latency(1)),
            Event::Config(ConfigCall::BitMode(0, BitMode::Reset)),
            Event::Config(ConfigCall::BitMode(0, BitMode::Mpsse)),
            Event::BadCommand(0xAA),
            Event::BadCommand(0xAB),
            Event::Engine(0x8A),
            Event::Engine(0x97),
            Event::Engine(0x8D),
            Event::SetPins {
                bank: PinBank::Low,
                data: 0x00,
                direction: 0x03
            },
            Event::Divisor(29),
            Event::Engine(0x85),
            // Chip select parked inactive (high)
            Event::SetPins {
                bank: PinBank::Low,
                data: 0x08,
                direction: 0x0B
            },
            Event::SetPins {
                bank: PinBank::Low,
                data: 0x08,
                direction: 0x0B
            },
        ]
    );
    assert_eq!(events.len(), 15 + 5);
    assert_eq!(device.bus_modes(), BusModes::SPI);
}

#[test]
fn test_divisor_from_first_device() {
    let (device, dummy) = setup();
    let _a = device
        .spi_device(SpiConfig::new(3).clock_frequency_hz(400_000))
        .unwrap();
    let _b = device
        .spi_device(SpiConfig::new(4).clock_frequency_hz(10_000_000))
        .unwrap();
    let divisors: Vec<_> = dummy
        .events()
        .into_iter()
        .filter(|e| matches!(e, Event::Divisor(_)))
        .collect();
    assert_eq!(divisors, vec![Event::Divisor(74)]);
}

#[test]
fn test_opcode_table_on_wire() {
    let modes = [SpiMode::Mode0, SpiMode::Mode1, SpiMode::Mode2, SpiMode::Mode3];
    let expected = |mode: SpiMode, order: BitOrder| -> [u8; 3] {
        let lsb = if order == BitOrder::LsbFirst { 0x08 } else { 0x00 };
        match mode {
            SpiMode::Mode0 | SpiMode::Mode3 => [0x11 | lsb, 0x20 | lsb, 0x31 | lsb],
            SpiMode::Mode1 | SpiMode::Mode2 => [0x10 | lsb, 0x24 | lsb, 0x34 | lsb],
        }
    };

    let (device, dummy) = setup();
    for mode in modes {
        for order in [BitOrder::MsbFirst, BitOrder::LsbFirst] {
            let spi = device
                .spi_device(SpiConfig::new(3).mode(mode).data_flow(order))
                .unwrap();
            dummy.clear_events();

            spi.write(&[0xA5]).unwrap();
            let mut rx = [0u8; 1];
            spi.read(&mut rx).unwrap();
            spi.write_read(&[0x5A], &mut rx).unwrap();

            assert_eq!(opcodes(&dummy.events()), expected(mode, order));
        }
    }
}

#[test]
fn test_write_framing() {
    let (device, dummy) = setup();
    let spi = device.spi_device(SpiConfig::new(3)).unwrap();
    dummy.clear_events();

    spi.write(&[0xDE, 0xAD]).unwrap();

    let mut expected = Vec::new();
    for _ in 0..5 {
        expected.extend_from_slice(&[0x80, 0x00, 0x0B]);
    }
    expected.extend_from_slice(&[0x11, 0x01, 0x00, 0xDE, 0xAD]);
    for _ in 0..5 {
        expected.extend_from_slice(&[0x80, 0x08, 0x0B]);
    }
    assert_eq!(dummy.writes(), vec![expected]);
}

#[test]
fn test_read_framing() {
    let (device, dummy) = setup();
    let spi = device.spi_device(SpiConfig::new(4)).unwrap();
    dummy.clear_events();
    dummy.queue_response(&[0x12, 0x34, 0x56]);

    let mut rx = [0u8; 3];
    spi.read(&mut rx).unwrap();
    assert_eq!(rx, [0x12, 0x34, 0x56]);

    let writes = dummy.writes();
    assert_eq!(writes.len(), 1);
    let frame = &writes[0];
    assert_eq!(&frame[15..18], &[0x20, 0x02, 0x00]);
    assert_eq!(frame.last(), Some(&0x87));
    assert_eq!(frame.len(), 15 + 3 + 15 + 1);
}

#[test]
fn test_write_read_loopback() {
    let (device, _dummy) = setup_with(DummyConfig {
        loopback: true,
        ..Default::default()
    });
    let spi = device.spi_device(SpiConfig::new(3)).unwrap();

    let tx = [0x01, 0x02, 0x03, 0x04];
    let mut rx = [0u8; 4];
    spi.write_read(&tx, &mut rx).unwrap();
    assert_eq!(rx, tx);
}

#[test]
fn test_single_byte_helpers() {
    let (device, dummy) = setup();
    let spi = device.spi_device(SpiConfig::new(3)).unwrap();
    dummy.clear_events();
    dummy.queue_response(&[0x42]);

    spi.write_byte(0x06).unwrap();
    assert_eq!(spi.read_byte().unwrap(), 0x42);
    assert_eq!(opcodes(&dummy.events()), vec![0x11, 0x20]);
}

#[test]
fn test_chip_select_high_bank() {
    let (device, dummy) = setup();
    let spi = device.spi_device(SpiConfig::new(9)).unwrap();
    dummy.clear_events();

    spi.write(&[0x00]).unwrap();

    let events = dummy.events();
    let pins: Vec<_> = events
        .iter()
        .filter_map(|e| match e {
            Event::SetPins {
                bank,
                data,
                direction,
            } => Some((*bank, *data, *direction)),
            _ => None,
        })
        .collect();
    assert_eq!(pins.len(), 10);
    assert!(pins[..5]
        .iter()
        .all(|p| *p == (PinBank::High, 0x00, 0x02)));
    assert!(pins[5..]
        .iter()
        .all(|p| *p == (PinBank::High, 0x02, 0x02)));
}

#[test]
fn test_active_high_chip_select() {
    let (device, dummy) = setup();
    let spi = device
        .spi_device(SpiConfig::new(5).chip_select_active_high(true))
        .unwrap();
    assert_eq!(device.pins().low_data & 0x20, 0x00);
    dummy.clear_events();

    spi.write(&[0x00]).unwrap();
    let frame = &dummy.writes()[0];
    assert_eq!(&frame[..3], &[0x80, 0x20, 0x23]);
    assert_eq!(&frame[frame.len() - 3..], &[0x80, 0x00, 0x23]);
}

#[test]
fn test_invalid_chip_selects() {
    let (device, _dummy) = setup();
    assert!(matches!(
        device.spi_device(SpiConfig::new(2)),
        Err(Error::InvalidArgument(_))
    ));
    assert!(matches!(
        device.spi_device(SpiConfig::new(16)),
        Err(Error::InvalidArgument(_))
    ));

    let _spi = device.spi_device(SpiConfig::new(3)).unwrap();
    assert!(matches!(
        device.spi_device(SpiConfig::new(3)),
        Err(Error::InvalidArgument(_))
    ));

    let _pin = device.gpio().open_pin(6).unwrap();
    assert!(matches!(
        device.spi_device(SpiConfig::new(6)),
        Err(Error::ResourceConflict(_))
    ));
}

#[test]
fn test_invalid_settings() {
    let (device, dummy) = setup();
    let mut config = SpiConfig::new(3);
    config.data_bit_length = 9;
    assert!(matches!(
        device.spi_device(config),
        Err(Error::InvalidArgument(_))
    ));
    assert!(matches!(
        device.spi_device(SpiConfig::new(3).clock_frequency_hz(100)),
        Err(Error::InvalidArgument(_))
    ));
    // Rejected before any traffic
    assert!(dummy.events().is_empty());
    assert!(!device.gpio().is_pin_open(3));
}

#[test]
fn test_buffer_checks() {
    let (device, dummy) = setup();
    let spi = device.spi_device(SpiConfig::new(3)).unwrap();
    dummy.clear_events();

    let mut rx = [0u8; 3];
    assert!(matches!(
        spi.write_read(&[0u8; 4], &mut rx),
        Err(Error::InvalidArgument(_))
    ));
    let big = vec![0u8; 65_536];
    assert!(matches!(spi.write(&big), Err(Error::InvalidArgument(_))));
    assert!(spi.write(&big[..65_535]).is_ok());

    dummy.clear_events();
    spi.write(&[]).unwrap();
    spi.read(&mut []).unwrap();
    assert!(dummy.writes().is_empty());
}

#[test]
fn test_spi_blocks_i2c_until_last_device_dropped() {
    let (device, _dummy) = setup();
    let a = device.spi_device(SpiConfig::new(3)).unwrap();
    let b = device.spi_device(SpiConfig::new(4)).unwrap();

    assert!(matches!(device.i2c_bus(), Err(Error::ResourceConflict(_))));
    assert!(matches!(
        device.gpio().open_pin(0),
        Err(Error::ResourceConflict(_))
    ));

    drop(a);
    assert_eq!(device.bus_modes(), BusModes::SPI);
    assert!(!device.gpio().is_pin_open(3));
    drop(b);
    assert!(device.bus_modes().is_empty());

    let bus = device.i2c_bus().unwrap();
    assert!(matches!(
        device.spi_device(SpiConfig::new(3)),
        Err(Error::ResourceConflict(_))
    ));
    drop(bus);
    assert!(device.spi_device(SpiConfig::new(3)).is_ok());
}

#[test]
fn test_stalled_read_is_short_read() {
    let (device, dummy) = setup();
    let spi = device.spi_device(SpiConfig::new(3)).unwrap();
    dummy.set_stalled(true);

    let mut rx = [0u8; 4];
    let err = spi.read(&mut rx).unwrap_err();
    assert!(matches!(
        err,
        Error::Io(IoError::ShortRead {
            read: 0,
            expected: 4
        })
    ));
}

#[test]
fn test_partial_read_is_short_read() {
    let (device, dummy) = setup();
    let spi = device.spi_device(SpiConfig::new(3)).unwrap();
    dummy.queue_response(&[0x01, 0x02, 0x03]);
    dummy.set_delivery_limit(Some(1));

    let mut rx = [0u8; 3];
    assert!(matches!(
        spi.read(&mut rx),
        Err(Error::Io(IoError::ShortRead {
            read: 1,
            expected: 3
        }))
    ));
    // The late tail is discarded
    assert_eq!(dummy.pending_response(), 0);

    dummy.set_delivery_limit(None);
    dummy.queue_response(&[0x42]);
    assert_eq!(spi.read_byte().unwrap(), 0x42);
}

#[test]
fn test_partial_sync_echo() {
    let (device, dummy) = setup();
    dummy.set_delivery_limit(Some(1));

    match device.spi_device(SpiConfig::new(3)).unwrap_err() {
        Error::ProtocolSyncFailure { probe, response } => {
            assert_eq!(probe, 0xAA);
            assert_eq!(response, vec![0xFA]);
        }
        other => panic!("unexpected error: {}", other),
    }
    assert!(device.bus_modes().is_empty());
    assert!(!device.gpio().is_pin_open(3));
}

#[test]
fn test_failed_park_leaves_register_unchanged() {
    let (device, dummy) = setup();
    let _first = device.spi_device(SpiConfig::new(3)).unwrap();
    let before = device.pins();
    dummy.set_write_limit(Some(0));

    assert!(matches!(
        device.spi_device(SpiConfig::new(4).chip_select_active_high(true)),
        Err(Error::Io(IoError::ShortWrite { .. }))
    ));
    assert_eq!(device.pins(), before);
    assert!(!device.gpio().is_pin_open(4));

    dummy.set_write_limit(None);
    let _second = device.spi_device(SpiConfig::new(5)).unwrap();
    assert_eq!(dummy.pins().low_direction, 0x2B);
    assert_eq!(dummy.pins().low_data, 0x28);
}

#[test]
fn test_short_write() {
    let (device, dummy) = setup();
    let spi = device.spi_device(SpiConfig::new(3)).unwrap();
    dummy.set_write_limit(Some(8));

    assert!(matches!(
        spi.write(&[0x00]),
        Err(Error::Io(IoError::ShortWrite {
            written: 8,
            expected: 34
        }))
    ));
}

#[test]
fn test_hal_transaction_single_frame() {
    use embedded_hal::spi::{Operation, SpiDevice as _};

    let (device, dummy) = setup();
    let mut spi = device.spi_device(SpiConfig::new(3)).unwrap();
    dummy.clear_events();
    dummy.queue_response(&[0xC2, 0x20, 0x18]);

    let mut id = [0u8; 3];
    spi.transaction(&mut [Operation::Write(&[0x9F]), Operation::Read(&mut id)])
        .unwrap();
    assert_eq!(id, [0xC2, 0x20, 0x18]);

    let events = dummy.events();
    assert_eq!(dummy.writes().len(), 1);
    assert_eq!(opcodes(&events), vec![0x11, 0x20]);
    assert_eq!(
        count(&events, |e| matches!(e, Event::SetPins { .. })),
        10
    );
}

#[test]
fn test_hal_delay_splits_frame() {
    use embedded_hal::spi::{Operation, SpiDevice as _};

    let (device, dummy) = setup();
    let mut spi = device.spi_device(SpiConfig::new(3)).unwrap();
    dummy.clear_events();
    dummy.queue_response(&[0xC2, 0x20, 0x18]);

    let mut id = [0u8; 3];
    spi.transaction(&mut [
        Operation::Write(&[0x9F]),
        Operation::DelayNs(1_000),
        Operation::Read(&mut id),
    ])
    .unwrap();
    assert_eq!(id, [0xC2, 0x20, 0x18]);

    let writes = dummy.writes();
    assert_eq!(writes.len(), 2);
    let mut head: Vec<u8> = [0x80, 0x00, 0x0B].repeat(5);
    head.extend_from_slice(&[0x11, 0x00, 0x00, 0x9F]);
    assert_eq!(writes[0], head);
    let mut tail: Vec<u8> = vec![0x20, 0x02, 0x00];
    tail.extend([0x80, 0x08, 0x0B].repeat(5));
    tail.push(0x87);
    assert_eq!(writes[1], tail);
}

#[test]
fn test_hal_delay_only_transaction() {
    use embedded_hal::spi::{Operation, SpiDevice as _};

    let (device, dummy) = setup();
    let mut spi = device.spi_device(SpiConfig::new(3)).unwrap();
    dummy.clear_events();

    spi.transaction(&mut [Operation::DelayNs(1_000)]).unwrap();
    assert_eq!(
        dummy.writes(),
        vec![[0x80u8, 0x00, 0x0B].repeat(5), [0x80u8, 0x08, 0x0B].repeat(5)]
    );

    dummy.clear_events();
    spi.transaction(&mut [Operation::DelayNs(0)]).unwrap();
    assert!(dummy.writes().is_empty());
}

#[test]
fn test_hal_transfer_in_place() {
    use embedded_hal::spi::SpiDevice as _;

    let (device, _dummy) = setup_with(DummyConfig {
        loopback: true,
        ..Default::default()
    });
    let mut spi = device.spi_device(SpiConfig::new(3)).unwrap();

    let mut buf = [0x10, 0x20, 0x30];
    spi.transfer_in_place(&mut buf).unwrap();
    assert_eq!(buf, [0x10, 0x20, 0x30]);

    let mut rx = [0u8; 4];
    spi.transfer(&mut rx, &[0xAA, 0xBB]).unwrap();
    assert_eq!(rx[..2], [0xAA, 0xBB]);
}
