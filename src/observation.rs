//! Aggregated, anonymized observation snapshots in a fixed-capacity ring.
//!
//! An [`RfObservation`] carries only aggregate values — counts, RSSI extremes,
//! densities, an environmental delta — plus an internal timestamp that never
//! leaves the engine. Expired entries are wiped **in place** rather than
//! logically marked: a stale timestamp paired with an RSSI value is itself
//! privacy-relevant (coarse timing correlation) and must not linger in memory.

use zeroize::Zeroize;

use crate::timer::{has_elapsed, Millis};

/// Number of ring slots.
pub const OBSERVATION_BUFFER_CAPACITY: usize = 64;

/// Milliseconds an observation (or token) stays live before TTL eviction.
pub const OBSERVATION_TTL_MS: u32 = 60_000;

// ─── RfObservation ──────────────────────────────────────────────────────────

/// One per-cycle aggregate snapshot. Contains no identifiers of any kind;
/// the conformance layer asserts the size bound at compile time so a 6-byte
/// address cannot hide in the field set.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Zeroize)]
pub struct RfObservation {
    /// When this snapshot was taken. Internal only, never exported.
    pub timestamp_ms: Millis,
    /// Distinct ephemeral tokens active in the window.
    pub ble_device_count: u8,
    /// Strongest advertisement RSSI, dBm.
    pub ble_rssi_max: i8,
    /// Mean advertisement RSSI, dBm.
    pub ble_rssi_mean: i8,
    /// Weakest advertisement RSSI, dBm.
    pub ble_rssi_min: i8,
    /// Advertisements observed in the current wall-second.
    pub ble_adv_density: u8,
    /// Probe-burst counter value (decaying).
    pub wifi_probe_count: u8,
    /// Peak probe RSSI while the burst counter is nonzero, dBm.
    pub wifi_rssi_peak: i8,
    /// Temperature change in 0.1 °C steps, saturating.
    pub temp_delta_c10: i8,
    /// Power-event flag bits (see `signals::POWER_FLAG_*`).
    pub power_flags: u8,
}

// ─── ObservationRing ────────────────────────────────────────────────────────

/// Fixed-capacity ring of observations with wipe-on-overwrite and in-place
/// TTL eviction.
#[derive(Debug)]
pub struct ObservationRing {
    slots: [RfObservation; OBSERVATION_BUFFER_CAPACITY],
    head: usize,
    count: usize,
}

impl ObservationRing {
    /// Construct an empty ring.
    pub const fn new() -> Self {
        Self {
            slots: [RfObservation {
                timestamp_ms: 0,
                ble_device_count: 0,
                ble_rssi_max: 0,
                ble_rssi_mean: 0,
                ble_rssi_min: 0,
                ble_adv_density: 0,
                wifi_probe_count: 0,
                wifi_rssi_peak: 0,
                temp_delta_c10: 0,
                power_flags: 0,
            }; OBSERVATION_BUFFER_CAPACITY],
            head: 0,
            count: 0,
        }
    }

    /// Append an observation, wiping the slot about to be overwritten first.
    pub fn push(&mut self, obs: RfObservation) {
        self.slots[self.head].zeroize();
        self.slots[self.head] = obs;
        self.head = (self.head + 1) % OBSERVATION_BUFFER_CAPACITY;
        if self.count < OBSERVATION_BUFFER_CAPACITY {
            self.count += 1;
        }
    }

    /// Wipe, in place, every entry whose age has reached `ttl_ms`.
    ///
    /// Walks back from the head over the occupied slots. Wiped entries keep
    /// their slot (the ring never compacts); they simply hold zeros.
    pub fn evict_expired(&mut self, now_ms: Millis, ttl_ms: u32) {
        for i in 0..self.count {
            let idx = (self.head + OBSERVATION_BUFFER_CAPACITY - 1 - i)
                % OBSERVATION_BUFFER_CAPACITY;
            if has_elapsed(self.slots[idx].timestamp_ms, now_ms, ttl_ms) {
                self.slots[idx].zeroize();
            }
        }
    }

    /// Wipe every slot and reset the ring. Used on session rotation.
    pub fn clear(&mut self) {
        for slot in self.slots.iter_mut() {
            slot.zeroize();
        }
        self.head = 0;
        self.count = 0;
    }

    /// The most recently pushed observation, if any has been pushed.
    pub fn latest(&self) -> Option<&RfObservation> {
        if self.count == 0 {
            return None;
        }
        let idx = (self.head + OBSERVATION_BUFFER_CAPACITY - 1) % OBSERVATION_BUFFER_CAPACITY;
        Some(&self.slots[idx])
    }

    /// Number of occupied slots (including wiped-in-place ones).
    pub fn len(&self) -> usize {
        self.count
    }

    /// `true` when nothing has been pushed since the last clear.
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Iterate over the occupied slots, newest first. Conformance-test hook.
    pub(crate) fn iter_newest_first(&self) -> impl Iterator<Item = &RfObservation> {
        (0..self.count).map(move |i| {
            let idx = (self.head + OBSERVATION_BUFFER_CAPACITY - 1 - i)
                % OBSERVATION_BUFFER_CAPACITY;
            &self.slots[idx]
        })
    }
}

impl Default for ObservationRing {
    fn default() -> Self {
        Self::new()
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────
