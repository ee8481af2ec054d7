//! The presence engine: the single owner of every subsystem.
//!
//! `RfPresenceEngine` wires the ingestion paths (BLE scans, WiFi probes,
//! temperature, power events) through the token store and signal
//! aggregators into the state machine, and emits sanitized events from
//! `update()`. The platform drives it from its main loop:
//!
//! ```text
//! scan callback ──▶ feed_ble_scan ─┐
//! sniffer cb    ──▶ feed_wifi_probe ├─▶ update(now, sink) ─▶ RfEvent
//! sensor task   ──▶ feed_temperature┘        │
//!                                            ▼
//!                                      get_snapshot(now)
//! ```
//!
//! Invariants:
//! - Raw addresses cross the privacy barrier inside `feed_ble_scan` and
//!   exist nowhere past that call.
//! - WiFi probes are counted without ever receiving an address.
//! - All methods take `&mut self`; single-caller discipline is the
//!   concurrency contract, as with any peripheral driver.

use rand_core::RngCore;

use crate::event::{
    time_bucket, ConfidenceClass, DwellClass, EventSink, NarrativeHint, RfEvent,
};
use crate::fsm::{PendingEvent, PresenceFsm, RfState, SignalSummary};
use crate::observation::{ObservationRing, RfObservation, OBSERVATION_TTL_MS};
use crate::session::{KeyValueStore, SessionState, KEY_SETTINGS};
use crate::settings::{RfPresenceSettings, SettingsError, SETTINGS_BLOB_LEN};
use crate::signals::{SignalAggregators, RSSI_NOISE_FLOOR};
use crate::timer::Millis;
use crate::token::{derive_token, TokenStore, ADDRESS_LEN};

// ─── Snapshot ───────────────────────────────────────────────────────────────

/// Point-in-time engine state for diagnostics and UI.
///
/// Every field is aggregate; the snapshot is safe to serialize off-device.
/// Serialize-only: snapshots leave the engine and never come back.
#[derive(Clone, Copy, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct RfStateSnapshot {
    /// Current FSM state.
    pub state: RfState,
    /// Confidence classification over the live aggregates.
    pub confidence: ConfidenceClass,
    /// Active ephemeral-token count.
    pub device_count: u8,
    /// Mean RSSI over active tokens, dBm.
    pub rssi_mean: i8,
    /// Time spent in the current state, milliseconds.
    pub state_duration_ms: u32,
    /// Dwell classification of the current state duration.
    pub dwell: DwellClass,
    /// Stable lowercase state name.
    pub state_name: &'static str,
    /// Seconds since the monotonic clock began.
    pub uptime_s: u32,
    /// Name of the most recently emitted event, `"boot"` before any.
    pub last_event: &'static str,
}

// ─── RfPresenceEngine ───────────────────────────────────────────────────────

/// The complete presence-detection pipeline behind one `&mut self` surface.
#[derive(Debug)]
pub struct RfPresenceEngine<S: KeyValueStore, R: RngCore> {
    store: S,
    rng: R,
    session: SessionState,
    tokens: TokenStore,
    observations: ObservationRing,
    signals: SignalAggregators,
    fsm: PresenceFsm,
    settings: RfPresenceSettings,
    last_event: &'static str,
}

impl<S: KeyValueStore, R: RngCore> RfPresenceEngine<S, R> {
    /// Bring the engine up: load (or create) the session secret and epoch,
    /// load persisted settings, start the FSM in `Empty`.
    pub fn new(mut store: S, mut rng: R, now_ms: Millis) -> Self {
        let session = SessionState::load_or_create(&mut store, &mut rng, now_ms);
        let settings = Self::load_settings(&mut store);
        log::info!(
            target: "rf_presence",
            "engine up: epoch={} enabled={}",
            session.epoch(),
            settings.enabled
        );
        Self {
            store,
            rng,
            session,
            tokens: TokenStore::new(),
            observations: ObservationRing::new(),
            signals: SignalAggregators::new(),
            fsm: PresenceFsm::new(now_ms),
            settings,
            last_event: "boot",
        }
    }

    fn load_settings(store: &mut S) -> RfPresenceSettings {
        let mut blob = [0u8; SETTINGS_BLOB_LEN];
        match store.get_blob(KEY_SETTINGS, &mut blob) {
            Ok(n) => match RfPresenceSettings::from_bytes(&blob[..n]) {
                Ok(s) => s,
                Err(err) => {
                    log::warn!(
                        target: "rf_presence",
                        "stored settings rejected ({}), using defaults",
                        err
                    );
                    RfPresenceSettings::default()
                }
            },
            Err(_) => RfPresenceSettings::default(),
        }
    }

    // ── ingestion ─────────────────────────────────────────────────────────

    /// Feed one BLE advertisement sighting.
    ///
    /// The raw `address` is consumed here: it is hashed into an ephemeral
    /// token on the stack and never stored. Every above-floor sighting
    /// mints a token; `_connectable` is accepted from the scan callback
    /// but not consulted.
    pub fn feed_ble_scan(
        &mut self,
        address: &[u8; ADDRESS_LEN],
        rssi: i8,
        _connectable: bool,
        now_ms: Millis,
    ) {
        if !self.settings.enabled || rssi < RSSI_NOISE_FLOOR {
            return;
        }
        self.signals.record_advertisement(now_ms);
        let token = derive_token(self.session.secret(), self.session.epoch(), address);
        if token == 0 {
            // The zero sentinel marks a failed derivation; drop the sighting
            // rather than admit an unkeyed entry.
            log::error!(target: "rf_presence", "token derivation yielded sentinel, dropped");
            return;
        }
        self.tokens.touch(token, now_ms, rssi);
    }

    /// Feed one WiFi probe-request sighting.
    ///
    /// Probes carry randomized source addresses, so `_address` is
    /// deliberately ignored: no token is derived, only the burst counter
    /// and peak RSSI move.
    pub fn feed_wifi_probe(&mut self, _address: &[u8; ADDRESS_LEN], rssi: i8) {
        if !self.settings.enabled || rssi < RSSI_NOISE_FLOOR {
            return;
        }
        self.signals.record_probe(rssi);
    }

    /// Feed an ambient temperature reading, in °C.
    pub fn feed_temperature(&mut self, celsius: f32) {
        if !self.settings.enabled {
            return;
        }
        self.signals.record_temperature(celsius);
    }

    /// Feed power-rail event flags (`signals::POWER_FLAG_*`).
    pub fn feed_power_event(&mut self, flags: u8, now_ms: Millis) {
        if !self.settings.enabled {
            return;
        }
        self.signals.record_power_event(flags, now_ms);
    }

    // ── the update cycle ──────────────────────────────────────────────────

    /// Run one engine cycle: maintenance, one FSM tick, at most one event.
    ///
    /// Call at a steady cadence (100–1000 ms) from the platform main loop.
    /// Events reach `sink` synchronously before this returns.
    pub fn update(&mut self, now_ms: Millis, sink: &mut dyn EventSink) {
        if !self.settings.enabled {
            return;
        }
        if self.session.due_for_rotation(now_ms) {
            self.rotate_session(now_ms);
        }

        self.signals.decay_probes(now_ms);
        self.signals.clear_stale_power_flags(now_ms);
        self.observations.evict_expired(now_ms, OBSERVATION_TTL_MS);

        // A token counts as nearby for the observation TTL after its last
        // sighting; the FSM's own timeouts layer on top of that window.
        let summary = SignalSummary {
            device_count: self.tokens.count_active(now_ms, OBSERVATION_TTL_MS),
            probe_bursts: self.signals.probe_bursts(),
        };

        if let Some(pending) = self.fsm.tick(now_ms, summary, &self.settings) {
            let event = self.build_event(&pending, summary, now_ms);
            self.last_event = event.kind.as_str();
            sink.on_event(&event);
        }

        // One observation per wall-second; the density counter belongs to
        // the second that just closed, so capture it before the roll.
        let density = self.signals.adv_density();
        if self.signals.roll_second(now_ms) {
            self.observations.push(self.make_observation(summary, density, now_ms));
        }
    }

    fn build_event(
        &self,
        pending: &PendingEvent,
        summary: SignalSummary,
        now_ms: Millis,
    ) -> RfEvent {
        let stats = self.tokens.rssi_stats(now_ms, OBSERVATION_TTL_MS);
        let dwell = DwellClass::from_duration_ms(pending.dwelled_ms);
        let bucket = time_bucket(now_ms);
        let hint = if self.settings.emit_narrative_hints {
            NarrativeHint::select(self.fsm.state(), dwell, bucket)
        } else {
            None
        };
        RfEvent {
            kind: pending.kind,
            signal: pending.signal,
            confidence: ConfidenceClass::classify(
                summary.device_count,
                summary.probe_bursts,
                stats.mean,
            ),
            count_delta: pending.count_delta,
            dwell,
            time_bucket: bucket,
            hint,
        }
    }

    fn make_observation(
        &self,
        summary: SignalSummary,
        density: u8,
        now_ms: Millis,
    ) -> RfObservation {
        let stats = self.tokens.rssi_stats(now_ms, OBSERVATION_TTL_MS);
        RfObservation {
            timestamp_ms: now_ms,
            ble_device_count: summary.device_count,
            ble_rssi_max: stats.max,
            ble_rssi_mean: stats.mean,
            ble_rssi_min: stats.min,
            ble_adv_density: density,
            wifi_probe_count: self.signals.probe_bursts(),
            wifi_rssi_peak: self.signals.probe_rssi_peak(),
            temp_delta_c10: self.signals.temp_delta_c10(),
            power_flags: self.signals.power_flags(),
        }
    }

    // ── session control ───────────────────────────────────────────────────

    /// Rotate the session now: bump the epoch and forget everything derived
    /// under the old one.
    ///
    /// Every token from the previous epoch becomes underivable; the token
    /// store, observation buffer and signal counters are cleared so no
    /// pre-rotation state survives.
    pub fn rotate_session(&mut self, now_ms: Millis) {
        self.session.advance_epoch(&mut self.store, now_ms);
        self.tokens.clear();
        self.observations.clear();
        self.signals.reset();
        self.last_event = "session_rotated";
        log::info!(
            target: "rf_presence",
            "session rotated, epoch={}",
            self.session.epoch()
        );
    }

    /// Current session epoch.
    pub fn session_epoch(&self) -> u32 {
        self.session.epoch()
    }

    // ── enable / disable ──────────────────────────────────────────────────

    /// Resume processing. The FSM restarts from `Empty`.
    pub fn enable(&mut self, now_ms: Millis) {
        if self.settings.enabled {
            return;
        }
        self.settings.enabled = true;
        self.fsm.reset(now_ms);
        self.persist_settings();
        log::info!(target: "rf_presence", "engine enabled");
    }

    /// Stop processing and drop all working state.
    ///
    /// The token store, observation buffer and signal counters are cleared
    /// so nothing gathered while enabled lingers while disabled.
    pub fn disable(&mut self, now_ms: Millis) {
        if !self.settings.enabled {
            return;
        }
        self.settings.enabled = false;
        self.tokens.clear();
        self.observations.clear();
        self.signals.reset();
        self.fsm.reset(now_ms);
        self.persist_settings();
        log::info!(target: "rf_presence", "engine disabled");
    }

    /// Whether the engine is currently processing.
    pub fn is_enabled(&self) -> bool {
        self.settings.enabled
    }

    // ── settings ──────────────────────────────────────────────────────────

    /// Current settings.
    pub fn get_settings(&self) -> RfPresenceSettings {
        self.settings
    }

    /// Validate, apply and persist new settings.
    ///
    /// A flipped `enabled` flag goes through [`enable`](Self::enable) /
    /// [`disable`](Self::disable) semantics, including the state wipe.
    pub fn set_settings(
        &mut self,
        new: RfPresenceSettings,
        now_ms: Millis,
    ) -> Result<(), SettingsError> {
        new.validate()?;
        let was_enabled = self.settings.enabled;
        self.settings = new;
        if was_enabled && !new.enabled {
            self.tokens.clear();
            self.observations.clear();
            self.signals.reset();
            self.fsm.reset(now_ms);
        } else if !was_enabled && new.enabled {
            self.fsm.reset(now_ms);
        }
        self.persist_settings();
        Ok(())
    }

    fn persist_settings(&mut self) {
        let blob = self.settings.to_bytes();
        if self.store.put_blob(KEY_SETTINGS, &blob).is_err() {
            log::warn!(target: "rf_presence", "failed to persist settings");
        }
    }

    // ── inspection ────────────────────────────────────────────────────────

    /// Current FSM state.
    pub fn state(&self) -> RfState {
        self.fsm.state()
    }

    /// Build a diagnostic snapshot of the live aggregates.
    pub fn get_snapshot(&self, now_ms: Millis) -> RfStateSnapshot {
        let device_count = self.tokens.count_active(now_ms, OBSERVATION_TTL_MS);
        let stats = self.tokens.rssi_stats(now_ms, OBSERVATION_TTL_MS);
        let duration = self.fsm.time_in_state(now_ms);
        RfStateSnapshot {
            state: self.fsm.state(),
            confidence: ConfidenceClass::classify(
                device_count,
                self.signals.probe_bursts(),
                stats.mean,
            ),
            device_count,
            rssi_mean: stats.mean,
            state_duration_ms: duration,
            dwell: DwellClass::from_duration_ms(duration),
            state_name: self.fsm.state().as_str(),
            uptime_s: now_ms / 1_000,
            last_event: self.last_event,
        }
    }

    /// Observations currently buffered (diagnostics).
    pub fn observation_count(&self) -> usize {
        self.observations.len()
    }

    /// Active ephemeral tokens (diagnostics).
    pub fn active_device_count(&self, now_ms: Millis) -> u8 {
        self.tokens.count_active(now_ms, OBSERVATION_TTL_MS)
    }

    // conformance.rs adds the self-check methods in a second impl block;
    // these give it read access to the internals it audits.
    pub(crate) fn session_ref(&self) -> &SessionState {
        &self.session
    }

    pub(crate) fn tokens_ref(&self) -> &TokenStore {
        &self.tokens
    }

    pub(crate) fn observations_ref(&self) -> &ObservationRing {
        &self.observations
    }

    pub(crate) fn rng_mut(&mut self) -> &mut R {
        &mut self.rng
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::RfEventKind;
    use crate::session::{StoreError, KEY_EPOCH, KEY_SECRET};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    /// In-memory key-value store standing in for NVS flash.
    #[derive(Default)]
    struct MemStore {
        secret: Option<[u8; 32]>,
        epoch: Option<u32>,
        settings: Option<[u8; SETTINGS_BLOB_LEN]>,
    }

    impl KeyValueStore for MemStore {
        fn get_blob(&mut self, key: &str, out: &mut [u8]) -> Result<usize, StoreError> {
            match key {
                KEY_SECRET => self.secret.map_or(Err(StoreError::Missing), |s| {
                    out[..32].copy_from_slice(&s);
                    Ok(32)
                }),
                KEY_SETTINGS => self.settings.map_or(Err(StoreError::Missing), |s| {
                    out[..s.len()].copy_from_slice(&s);
                    Ok(s.len())
                }),
                _ => Err(StoreError::Missing),
            }
        }
        fn put_blob(&mut self, key: &str, value: &[u8]) -> Result<(), StoreError> {
            match key {
                KEY_SECRET => {
                    let mut s = [0u8; 32];
                    s.copy_from_slice(value);
                    self.secret = Some(s);
                    Ok(())
                }
                KEY_SETTINGS => {
                    let mut s = [0u8; SETTINGS_BLOB_LEN];
                    s.copy_from_slice(value);
                    self.settings = Some(s);
                    Ok(())
                }
                _ => Err(StoreError::Backend),
            }
        }
        fn get_u32(&mut self, key: &str) -> Result<u32, StoreError> {
            match (key, self.epoch) {
                (KEY_EPOCH, Some(e)) => Ok(e),
                _ => Err(StoreError::Missing),
            }
        }
        fn put_u32(&mut self, key: &str, value: u32) -> Result<(), StoreError> {
            if key == KEY_EPOCH {
                self.epoch = Some(value);
                Ok(())
            } else {
                Err(StoreError::Backend)
            }
        }
    }

    fn engine() -> RfPresenceEngine<MemStore, StdRng> {
        RfPresenceEngine::new(MemStore::default(), StdRng::seed_from_u64(7), 0)
    }

    const PHONE: [u8; 6] = [0x12, 0x34, 0x56, 0x78, 0x9A, 0xBC];

    #[test]
    fn test_boot_snapshot() {
        let eng = engine();
        let snap = eng.get_snapshot(0);
        assert_eq!(snap.state, RfState::Empty);
        assert_eq!(snap.device_count, 0);
        assert_eq!(snap.state_name, "empty");
        assert_eq!(snap.last_event, "boot");
    }

    #[test]
    fn test_ble_scan_registers_anonymous_device() {
        let mut eng = engine();
        eng.feed_ble_scan(&PHONE, -55, true, 1_000);
        assert_eq!(eng.active_device_count(1_000), 1);
        // Same address again refreshes, never duplicates.
        eng.feed_ble_scan(&PHONE, -52, true, 2_000);
        assert_eq!(eng.active_device_count(2_000), 1);
    }

    #[test]
    fn test_noise_floor_sightings_rejected() {
        let mut eng = engine();
        eng.feed_ble_scan(&PHONE, RSSI_NOISE_FLOOR - 1, true, 1_000);
        eng.feed_ble_scan(&PHONE, -120, true, 1_000);
        assert_eq!(eng.active_device_count(1_000), 0);
        // Exactly at the floor still counts.
        eng.feed_ble_scan(&PHONE, RSSI_NOISE_FLOOR, true, 1_000);
        assert_eq!(eng.active_device_count(1_000), 1);
    }

    #[test]
    fn test_nonconnectable_advertisement_also_tracked() {
        // The connectable flag comes in from the scan callback but every
        // above-floor sighting mints a token.
        let mut eng = engine();
        eng.feed_ble_scan(&PHONE, -50, false, 1_000);
        assert_eq!(eng.active_device_count(1_000), 1);
    }

    #[test]
    fn test_presence_lifecycle_emits_expected_events() {
        let mut eng = engine();
        let mut kinds = heapless::Vec::<RfEventKind, 8>::new();

        let mut now = 0u32;
        // Device in range for 15 s of 500 ms ticks.
        while now <= 15_000 {
            eng.feed_ble_scan(&PHONE, -55, true, now);
            let mut sink = |e: &RfEvent| {
                kinds.push(e.kind).unwrap();
            };
            eng.update(now, &mut sink);
            now += 500;
        }
        assert_eq!(
            kinds.as_slice(),
            &[RfEventKind::PresenceStarted],
            "impulse events are off by default"
        );
        assert_eq!(eng.state(), RfState::Presence);

        // Device gone at 15 s, but its token stays nearby for the 60 s
        // activity window: dwell confirms at 70.5 s, departing fires when
        // the window closes at 75 s, ended after the 15 s confirm.
        while now <= 91_000 {
            let mut sink = |e: &RfEvent| {
                kinds.push(e.kind).unwrap();
            };
            eng.update(now, &mut sink);
            now += 500;
        }
        assert_eq!(eng.state(), RfState::Empty);
        assert_eq!(
            kinds.as_slice(),
            &[
                RfEventKind::PresenceStarted,
                RfEventKind::DwellStarted,
                RfEventKind::Departing,
                RfEventKind::PresenceEnded,
            ]
        );
        let snap = eng.get_snapshot(now);
        assert_eq!(snap.last_event, "rf_presence_ended");
    }

    #[test]
    fn test_rotation_clears_working_state() {
        let mut eng = engine();
        eng.feed_ble_scan(&PHONE, -55, true, 1_000);
        eng.update(1_000, &mut crate::event::NullSink);
        assert_eq!(eng.active_device_count(1_000), 1);

        let epoch_before = eng.session_epoch();
        eng.rotate_session(2_000);
        assert_eq!(eng.session_epoch(), epoch_before + 1);
        assert_eq!(eng.active_device_count(2_000), 0);
        assert_eq!(eng.observation_count(), 0);
        assert_eq!(eng.get_snapshot(2_000).last_event, "session_rotated");
    }

    #[test]
    fn test_disable_wipes_and_blocks_ingestion() {
        let mut eng = engine();
        eng.feed_ble_scan(&PHONE, -55, true, 1_000);
        eng.disable(1_500);
        assert!(!eng.is_enabled());
        assert_eq!(eng.active_device_count(1_500), 0);

        eng.feed_ble_scan(&PHONE, -55, true, 2_000);
        eng.feed_wifi_probe(&PHONE, -50);
        assert_eq!(eng.active_device_count(2_000), 0);

        eng.enable(3_000);
        assert!(eng.is_enabled());
        eng.feed_ble_scan(&PHONE, -55, true, 3_500);
        assert_eq!(eng.active_device_count(3_500), 1);
    }

    #[test]
    fn test_settings_round_trip_through_store() {
        let mut store = MemStore::default();
        {
            let mut eng =
                RfPresenceEngine::new(core::mem::take(&mut store), StdRng::seed_from_u64(7), 0);
            let mut s = eng.get_settings();
            s.presence_threshold_ms = 20_000;
            s.emit_impulse_events = true;
            eng.set_settings(s, 0).unwrap();
            store = eng.store;
        }
        let eng = RfPresenceEngine::new(store, StdRng::seed_from_u64(8), 0);
        let s = eng.get_settings();
        assert_eq!(s.presence_threshold_ms, 20_000);
        assert!(s.emit_impulse_events);
    }

    #[test]
    fn test_invalid_settings_rejected_atomically() {
        let mut eng = engine();
        let mut s = eng.get_settings();
        s.presence_threshold_ms = 100; // below the 1 s floor
        assert!(eng.set_settings(s, 0).is_err());
        assert_eq!(
            eng.get_settings().presence_threshold_ms,
            crate::settings::PRESENCE_THRESHOLD_MS
        );
    }

    #[test]
    fn test_observations_accumulate_once_per_second() {
        let mut eng = engine();
        let mut now = 0u32;
        while now <= 5_000 {
            eng.feed_ble_scan(&PHONE, -55, true, now);
            eng.update(now, &mut crate::event::NullSink);
            now += 250;
        }
        // Seconds 1..=5 each produced exactly one snapshot.
        assert_eq!(eng.observation_count(), 5);
    }

    #[test]
    fn test_automatic_rotation_after_interval() {
        let mut eng = engine();
        let epoch = eng.session_epoch();
        eng.update(crate::settings::SESSION_ROTATE_MS + 1, &mut crate::event::NullSink);
        assert_eq!(eng.session_epoch(), epoch + 1);
    }
}
