mod common;

use std::time::Duration;

use common::setup;
use ftbridge_core::mpsse::{decode_set_pins, PinBank};
use ftbridge_core::{Error, IoError};
use ftbridge_dummy::PinSnapshot;
use ftbridge_ft232h::{PinEdge, PinMode, SpiConfig, PIN_COUNT};

#[test]
fn test_output_on_wire() {
    let (device, dummy) = setup();
    let gpio = device.gpio();
    let mut pin = gpio.open_pin(4).unwrap();

    pin.set_mode(PinMode::Output).unwrap();
    pin.write(true).unwrap();
    pin.write(false).unwrap();

    let writes = dummy.writes();
    let decoded: Vec<_> = writes.iter().filter_map(|w| decode_set_pins(w)).collect();
    assert_eq!(
        decoded,
        vec![
            (PinBank::Low, 0x00, 0x10),
            (PinBank::Low, 0x10, 0x10),
            (PinBank::Low, 0x00, 0x10),
        ]
    );
    assert_eq!(dummy.pins().low_direction, 0x10);
    assert_eq!(pin.mode(), PinMode::Output);
}

#[test]
fn test_high_bank_pin() {
    let (device, dummy) = setup();
    let mut pin = device.gpio().open_pin(9).unwrap();
    pin.set_mode(PinMode::Output).unwrap();
    dummy.clear_events();

    pin.write(true).unwrap();
    assert_eq!(dummy.writes(), vec![vec![0x82, 0x02, 0x02]]);
}

#[test]
fn test_pins_keep_each_other() {
    let (device, dummy) = setup();
    let gpio = device.gpio();
    let mut a = gpio.open_pin(5).unwrap();
    let mut b = gpio.open_pin(7).unwrap();
    a.set_mode(PinMode::Output).unwrap();
    b.set_mode(PinMode::Output).unwrap();
    a.write(true).unwrap();
    b.write(true).unwrap();
    a.write(false).unwrap();

    let snapshot = dummy.pins();
    assert_eq!(snapshot.low_data, 0x80);
    assert_eq!(snapshot.low_direction, 0xA0);
}

#[test]
fn test_toggle_and_stateful() {
    use embedded_hal::digital::{OutputPin, StatefulOutputPin};

    let (device, dummy) = setup();
    let mut pin = device.gpio().open_pin(12).unwrap();
    pin.set_mode(PinMode::Output).unwrap();

    pin.set_high().unwrap();
    assert!(pin.is_set_high().unwrap());
    pin.toggle().unwrap();
    assert!(pin.is_set_low().unwrap());
    assert_eq!(dummy.pins().high_data, 0x00);
    assert_eq!(dummy.pins().high_direction, 0x10);
}

#[test]
fn test_read_input() {
    use embedded_hal::digital::InputPin;

    let (device, dummy) = setup();
    let mut pin = device.gpio().open_pin(3).unwrap();
    pin.set_mode(PinMode::Input).unwrap();

    dummy.set_input_levels(PinBank::Low, 0x08);
    assert!(pin.read().unwrap());
    dummy.set_input_levels(PinBank::Low, 0x00);
    assert!(pin.is_low().unwrap());

    let reads = dummy
        .events()
        .into_iter()
        .filter(|e| matches!(e, ftbridge_dummy::Event::ReadPins(PinBank::Low)))
        .count();
    assert_eq!(reads, 2);
}

#[test]
fn test_read_high_bank_input() {
    let (device, dummy) = setup();
    let pin = device.gpio().open_pin(15).unwrap();
    dummy.set_input_levels(PinBank::High, 0x80);
    assert!(pin.read().unwrap());
}

#[test]
fn test_output_reads_back_driven_level() {
    let (device, dummy) = setup();
    let mut pin = device.gpio().open_pin(6).unwrap();
    pin.set_mode(PinMode::Output).unwrap();
    pin.write(true).unwrap();
    dummy.set_input_levels(PinBank::Low, 0x00);
    assert!(pin.read().unwrap());
}

#[test]
fn test_unsupported_features() {
    let (device, _dummy) = setup();
    let gpio = device.gpio();
    assert_eq!(gpio.pin_count(), PIN_COUNT);
    assert!(gpio.is_pin_mode_supported(0, PinMode::Output));
    assert!(!gpio.is_pin_mode_supported(0, PinMode::InputPullUp));
    assert!(!gpio.is_pin_mode_supported(16, PinMode::Input));

    let mut pin = gpio.open_pin(10).unwrap();
    assert!(matches!(
        pin.set_mode(PinMode::InputPullDown),
        Err(Error::NotSupported(_))
    ));
    assert!(matches!(
        pin.wait_for_event(PinEdge::Rising, Duration::from_millis(1)),
        Err(Error::NotSupported(_))
    ));
    assert!(matches!(
        pin.register_callback(PinEdge::Falling, |_, _| {}),
        Err(Error::NotSupported(_))
    ));
}

#[test]
fn test_claim_rules() {
    let (device, _dummy) = setup();
    let gpio = device.gpio();

    let _pin = gpio.open_pin(4).unwrap();
    assert!(gpio.is_pin_open(4));
    assert!(matches!(gpio.open_pin(4), Err(Error::AlreadyInUse(_))));
    assert!(matches!(gpio.open_pin(16), Err(Error::InvalidArgument(_))));

    let _spi = device.spi_device(SpiConfig::new(11)).unwrap();
    assert!(gpio.is_pin_open(11));
    assert!(matches!(gpio.open_pin(11), Err(Error::ResourceConflict(_))));
    assert!(matches!(gpio.open_pin(2), Err(Error::ResourceConflict(_))));
}

#[test]
fn test_close_and_drop_release() {
    let (device, _dummy) = setup();
    let gpio = device.gpio();

    let pin = gpio.open_pin(1).unwrap();
    pin.close().unwrap();
    assert!(!gpio.is_pin_open(1));

    {
        let _pin = gpio.open_pin(1).unwrap();
        assert!(gpio.is_pin_open(1));
    }
    assert!(!gpio.is_pin_open(1));
    assert!(gpio.open_pin(1).is_ok());
}

#[test]
fn test_bus_pins_free_without_bus() {
    let (device, _dummy) = setup();
    let gpio = device.gpio();
    let pins: Vec<_> = (0..3).map(|n| gpio.open_pin(n).unwrap()).collect();
    assert!(matches!(device.i2c_bus(), Err(Error::ResourceConflict(_))));
    drop(pins);
    assert!(device.i2c_bus().is_ok());
}

#[test]
fn test_device_drop_releases_pins() {
    let (device, dummy) = setup();
    {
        let mut pin = device.gpio().open_pin(8).unwrap();
        pin.set_mode(PinMode::Output).unwrap();
        pin.write(true).unwrap();
    }
    dummy.clear_events();
    drop(device);

    assert_eq!(dummy.writes(), vec![vec![0x80, 0x00, 0x00, 0x82, 0x00, 0x00]]);
    assert_eq!(dummy.pins(), PinSnapshot::default());
}

#[test]
fn test_short_write() {
    let (device, dummy) = setup();
    let mut pin = device.gpio().open_pin(5).unwrap();
    dummy.set_write_limit(Some(2));

    assert!(matches!(
        pin.set_mode(PinMode::Output),
        Err(Error::Io(IoError::ShortWrite {
            written: 2,
            expected: 3
        }))
    ));
    dummy.set_write_limit(None);
}

#[test]
fn test_failed_write_leaves_register_unchanged() {
    use embedded_hal::digital::StatefulOutputPin;

    let (device, dummy) = setup();
    let gpio = device.gpio();
    let mut a = gpio.open_pin(4).unwrap();
    let mut b = gpio.open_pin(5).unwrap();
    a.set_mode(PinMode::Output).unwrap();
    b.set_mode(PinMode::Output).unwrap();

    dummy.set_write_limit(Some(0));
    assert!(matches!(
        a.write(true),
        Err(Error::Io(IoError::ShortWrite {
            written: 0,
            expected: 3
        }))
    ));
    assert!(matches!(
        b.set_mode(PinMode::Input),
        Err(Error::Io(IoError::ShortWrite { .. }))
    ));
    assert_eq!(device.pins().low_data, 0x00);
    assert_eq!(device.pins().low_direction, 0x30);
    assert!(a.is_set_low().unwrap());

    dummy.set_write_limit(None);
    dummy.clear_events();
    b.write(true).unwrap();
    // Pin 4 stays low
    assert_eq!(dummy.writes(), vec![vec![0x80, 0x20, 0x30]]);
}

#[test]
fn test_stalled_read() {
    let (device, dummy) = setup();
    let pin = device.gpio().open_pin(5).unwrap();
    dummy.set_stalled(true);

    assert!(matches!(
        pin.read(),
        Err(Error::Io(IoError::ShortRead {
            read: 0,
            expected: 1
        }))
    ));
}
