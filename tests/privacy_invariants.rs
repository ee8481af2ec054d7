//! Privacy-barrier integration tests.
//!
//! These exercise the properties the engine exists to guarantee: addresses
//! never survive ingestion, tokens die with their session, retention is
//! bounded, and everything that leaves the engine is coarse and aggregate.

use rand::rngs::StdRng;
use rand::SeedableRng;

use rf_presence_core::session::{KeyValueStore, StoreError};
use rf_presence_core::token::{derive_token, TOKEN_STORE_CAPACITY};
use rf_presence_core::{RfPresenceEngine, RfState};

// ── Helpers ──────────────────────────────────────────────────────────────────

/// In-memory stand-in for the platform's NVS flash.
#[derive(Default)]
struct MemStore {
    secret: Option<[u8; 32]>,
    epoch: Option<u32>,
    settings: Option<Vec<u8>>,
}

impl KeyValueStore for MemStore {
    fn get_blob(&mut self, key: &str, out: &mut [u8]) -> Result<usize, StoreError> {
        let stored: Option<&[u8]> = match key {
            "rf_secret" => self.secret.as_ref().map(|s| s.as_slice()),
            "rf_settings" => self.settings.as_deref(),
            _ => None,
        };
        match stored {
            Some(bytes) => {
                out[..bytes.len()].copy_from_slice(bytes);
                Ok(bytes.len())
            }
            None => Err(StoreError::Missing),
        }
    }

    fn put_blob(&mut self, key: &str, value: &[u8]) -> Result<(), StoreError> {
        match key {
            "rf_secret" => {
                let mut s = [0u8; 32];
                s.copy_from_slice(value);
                self.secret = Some(s);
                Ok(())
            }
            "rf_settings" => {
                self.settings = Some(value.to_vec());
                Ok(())
            }
            _ => Err(StoreError::Backend),
        }
    }

    fn get_u32(&mut self, key: &str) -> Result<u32, StoreError> {
        match (key, self.epoch) {
            ("rf_epoch", Some(e)) => Ok(e),
            _ => Err(StoreError::Missing),
        }
    }

    fn put_u32(&mut self, key: &str, value: u32) -> Result<(), StoreError> {
        if key == "rf_epoch" {
            self.epoch = Some(value);
            Ok(())
        } else {
            Err(StoreError::Backend)
        }
    }
}

fn engine() -> RfPresenceEngine<MemStore, StdRng> {
    RfPresenceEngine::new(MemStore::default(), StdRng::seed_from_u64(0xBEEF), 0)
}

// ── Token derivation ─────────────────────────────────────────────────────────

#[test]
fn test_token_is_deterministic_within_a_session() {
    let secret = [7u8; 32];
    let addr = [0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF];
    assert_eq!(derive_token(&secret, 3, &addr), derive_token(&secret, 3, &addr));
}

#[test]
fn test_token_changes_with_every_input() {
    let secret = [7u8; 32];
    let other_secret = [8u8; 32];
    let addr = [0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF];
    let mut other_addr = addr;
    other_addr[5] ^= 1;

    let base = derive_token(&secret, 3, &addr);
    assert_ne!(base, derive_token(&secret, 4, &addr), "epoch must mix in");
    assert_ne!(base, derive_token(&other_secret, 3, &addr), "secret must mix in");
    assert_ne!(base, derive_token(&secret, 3, &other_addr), "address must mix in");
}

#[test]
fn test_token_is_not_a_function_of_address_alone() {
    // Two devices with different secrets see unrelated tokens for the same
    // address, so tokens cannot be joined across devices.
    let addr = [0x10, 0x20, 0x30, 0x40, 0x50, 0x60];
    let a = derive_token(&[1u8; 32], 0, &addr);
    let b = derive_token(&[2u8; 32], 0, &addr);
    assert_ne!(a, b);
}

// ── Rotation ─────────────────────────────────────────────────────────────────

#[test]
fn test_rotation_severs_token_continuity() {
    let mut eng = engine();
    let addr = [0x01, 0x02, 0x03, 0x04, 0x05, 0x06];
    eng.feed_ble_scan(&addr, -50, true, 1_000);
    assert_eq!(eng.active_device_count(1_000), 1);

    eng.rotate_session(2_000);

    // The same device reappearing derives a fresh token into an empty store.
    assert_eq!(eng.active_device_count(2_000), 0);
    eng.feed_ble_scan(&addr, -50, true, 3_000);
    assert_eq!(eng.active_device_count(3_000), 1);
}

#[test]
fn test_conformance_suite_passes() {
    let mut eng = engine();
    let addr = [0x0A, 0x0B, 0x0C, 0x0D, 0x0E, 0x0F];
    // Populate some working state first so the audits look at real data.
    let mut now = 0u32;
    while now <= 20_000 {
        eng.feed_ble_scan(&addr, -55, true, now);
        eng.feed_wifi_probe(&addr, -62);
        eng.update(now, &mut rf_presence_core::event::NullSink);
        now += 500;
    }
    assert!(eng.run_conformance(now));
}

// ── Bounded retention ────────────────────────────────────────────────────────

#[test]
fn test_token_store_is_capacity_bounded() {
    let mut eng = engine();
    // A bus stop's worth of phones: more distinct addresses than slots.
    for i in 0..(TOKEN_STORE_CAPACITY as u8 + 10) {
        let addr = [0x40, 0x00, 0x00, 0x00, 0x00, i];
        eng.feed_ble_scan(&addr, -70, true, 1_000 + u32::from(i));
    }
    assert_eq!(
        eng.active_device_count(2_000),
        TOKEN_STORE_CAPACITY as u8,
        "oldest entries evicted, never grown"
    );
}

#[test]
fn test_disable_leaves_no_working_state() {
    let mut eng = engine();
    let addr = [0x77; 6];
    let mut now = 0u32;
    while now <= 5_000 {
        eng.feed_ble_scan(&addr, -50, true, now);
        eng.update(now, &mut rf_presence_core::event::NullSink);
        now += 500;
    }
    assert!(eng.active_device_count(5_000) > 0);
    assert!(eng.observation_count() > 0);

    eng.disable(6_000);
    assert_eq!(eng.active_device_count(6_000), 0);
    assert_eq!(eng.observation_count(), 0);
    assert_eq!(eng.state(), RfState::Empty);
}

// ── Exported surfaces are aggregate-only ─────────────────────────────────────

#[cfg(feature = "serde")]
#[test]
fn test_serialized_event_carries_no_identifiers() {
    use rf_presence_core::RfEvent;

    let mut eng = engine();
    let addr = [0x31, 0x41, 0x59, 0x26, 0x53, 0x58];
    let mut events: Vec<RfEvent> = Vec::new();
    let mut now = 0u32;
    while now <= 12_000 {
        eng.feed_ble_scan(&addr, -45, true, now);
        let mut sink = |e: &RfEvent| events.push(*e);
        eng.update(now, &mut sink);
        now += 500;
    }
    assert!(!events.is_empty());

    let json = serde_json::to_string(&events[0]).unwrap();
    // No field of the wire form can carry an address, token, or RSSI sample.
    for forbidden in ["address", "mac", "token", "rssi", "31", "41"] {
        assert!(
            !json.to_lowercase().contains(forbidden),
            "serialized event leaked `{forbidden}`: {json}"
        );
    }
}

#[cfg(feature = "serde")]
#[test]
fn test_serialized_snapshot_is_coarse() {
    let mut eng = engine();
    let addr = [0x31, 0x41, 0x59, 0x26, 0x53, 0x58];
    let mut now = 0u32;
    while now <= 12_000 {
        eng.feed_ble_scan(&addr, -45, true, now);
        eng.update(now, &mut rf_presence_core::event::NullSink);
        now += 500;
    }

    let json = serde_json::to_string(&eng.get_snapshot(now)).unwrap();
    for forbidden in ["address", "mac", "token", "secret"] {
        assert!(
            !json.to_lowercase().contains(forbidden),
            "serialized snapshot leaked `{forbidden}`: {json}"
        );
    }
}

#[test]
fn test_event_vocabulary_is_closed() {
    use rf_presence_core::RfEventKind;
    let names: Vec<&str> = [
        RfEventKind::Impulse,
        RfEventKind::PresenceStarted,
        RfEventKind::DwellStarted,
        RfEventKind::Departing,
        RfEventKind::PresenceEnded,
    ]
    .iter()
    .map(|k| k.as_str())
    .collect();
    assert_eq!(
        names,
        [
            "rf_impulse",
            "rf_presence_started",
            "rf_dwell_started",
            "rf_departing",
            "rf_presence_ended",
        ]
    );
}
