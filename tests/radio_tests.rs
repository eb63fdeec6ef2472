#![no_std]

mod mock;

use lora_sync::radio::{airtime, Radio, RadioError, RadioParameters, SetupError};
use mock::{Air, SimRadio};

fn linked_pair(air: &Air) -> (SimRadio<'_>, SimRadio<'_>) {
    let (mut tx, mut rx) = air.endpoints();
    tx.init().unwrap();
    rx.init().unwrap();
    let params = RadioParameters::default();
    tx.configure(&params).unwrap();
    rx.configure(&params).unwrap();
    (tx, rx)
}

#[test]
fn round_trip_preserves_payloads() {
    let air = Air::new();
    let (mut tx, mut rx) = linked_pair(&air);

    for &len in &[1usize, 10, 128, 255] {
        let mut payload = [0u8; 255];
        for (i, b) in payload.iter_mut().enumerate() {
            *b = (i * 7 + len) as u8;
        }

        tx.send(&payload[..len], 1_000).unwrap();

        let mut buffer = [0u8; 255];
        assert_eq!(rx.receive(&mut buffer, 1_000), Ok(len));
        assert_eq!(&buffer[..len], &payload[..len]);
    }
}

#[test]
fn truncation_is_not_an_error() {
    let air = Air::new();
    let (mut tx, mut rx) = linked_pair(&air);

    let payload = [0x5A; 100];
    tx.send(&payload, 1_000).unwrap();

    // Receive into the first 32 bytes of a sentinel-filled buffer; the
    // excess is discarded without touching anything past the window.
    let mut storage = [0xEE; 64];
    assert_eq!(rx.receive(&mut storage[..32], 1_000), Ok(32));
    assert_eq!(&storage[..32], &[0x5A; 32]);
    assert_eq!(&storage[32..], &[0xEE; 32]);
}

#[test]
fn empty_window_times_out() {
    let air = Air::new();
    let (_tx, mut rx) = linked_pair(&air);

    let mut buffer = [0u8; 16];
    assert_eq!(rx.receive(&mut buffer, 100), Err(RadioError::Timeout));
}

#[test]
fn mismatched_sync_words_do_not_deliver() {
    let air = Air::new();
    let (mut tx, mut rx) = linked_pair(&air);

    let foreign = RadioParameters {
        sync_word: 0x34,
        ..RadioParameters::default()
    };
    rx.configure(&foreign).unwrap();

    tx.send(b"beacon", 1_000).unwrap();
    let mut buffer = [0u8; 16];
    assert_eq!(rx.receive(&mut buffer, 100), Err(RadioError::Timeout));
}

#[test]
fn configuration_rejects_invalid_modulation() {
    let air = Air::new();
    let (mut radio, _) = air.endpoints();
    radio.init().unwrap();

    let params = RadioParameters {
        spreading_factor: 4,
        ..RadioParameters::default()
    };
    assert_eq!(radio.configure(&params), Err(SetupError::SpreadingFactor(4)));

    let params = RadioParameters {
        spreading_factor: 13,
        ..RadioParameters::default()
    };
    assert_eq!(radio.configure(&params), Err(SetupError::SpreadingFactor(13)));

    let params = RadioParameters {
        coding_rate: 3,
        ..RadioParameters::default()
    };
    assert_eq!(radio.configure(&params), Err(SetupError::CodingRate(3)));

    let params = RadioParameters {
        coding_rate: 9,
        ..RadioParameters::default()
    };
    assert_eq!(radio.configure(&params), Err(SetupError::CodingRate(9)));
}

#[test]
fn link_metrics_follow_a_receive() {
    let air = Air::new();
    let (mut tx, mut rx) = linked_pair(&air);

    tx.send(b"ping", 1_000).unwrap();
    let mut buffer = [0u8; 16];
    rx.receive(&mut buffer, 1_000).unwrap();

    assert_eq!(rx.rssi(), -42);
    assert_eq!(rx.snr(), 9.75);
}

#[test]
fn on_air_time_uses_configured_parameters() {
    let air = Air::new();
    let (mut radio, _) = air.endpoints();
    radio.init().unwrap();

    let params = RadioParameters::default();
    radio.configure(&params).unwrap();

    assert_eq!(radio.time_on_air_us(10), 41_216);
    assert_eq!(radio.time_on_air_us(10), airtime::time_on_air_us(&params, 10));
}
