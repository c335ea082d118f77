#![allow(dead_code)]

use std::time::Duration;

use ftbridge_dummy::{DummyConfig, DummyTransport, Event};
use ftbridge_ft232h::{DeviceConfig, Ft232h};

/// Device on a default emulator with a short read deadline
pub fn setup() -> (Ft232h, DummyTransport) {
    setup_with(DummyConfig::default())
}

pub fn setup_with(config: DummyConfig) -> (Ft232h, DummyTransport) {
    let dummy = DummyTransport::with_config(config);
    let config = DeviceConfig::default()
        .description("test")
        .read_timeout(Duration::from_millis(20))
        .unwrap();
    (Ft232h::new(dummy.clone(), config), dummy)
}

pub fn count(events: &[Event], pred: impl Fn(&Event) -> bool) -> usize {
    events.iter().filter(|e| pred(e)).count()
}

pub fn starts(events: &[Event]) -> usize {
    count(events, |e| matches!(e, Event::I2cStart))
}

pub fn stops(events: &[Event]) -> usize {
    count(events, |e| matches!(e, Event::I2cStop))
}
