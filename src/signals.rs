//! Per-cycle signal aggregators: advertisement density, probe bursts,
//! temperature delta and power events.
//!
//! Nothing in here is keyed by a device. Advertisements are counted per
//! wall-second; WiFi probe requests are treated as a *burst intensity* signal
//! that decays over time rather than a deduplicated per-device signal, so no
//! token is ever derived for a probe. Power-event flags are point-in-time
//! facts and clear themselves after a short TTL.

use crate::timer::{has_elapsed, Millis};

/// RSSI below this is treated as noise and rejected at the boundary.
pub const RSSI_NOISE_FLOOR: i8 = -90;

/// The probe-burst counter decays by one every this many milliseconds.
pub const PROBE_DECAY_INTERVAL_MS: u32 = 5_000;

/// Power-event flags clear themselves after this long.
pub const POWER_FLAG_TTL_MS: u32 = 10_000;

/// Supply brownout detected.
pub const POWER_FLAG_BROWNOUT: u8 = 0x01;
/// Supply voltage below the low-voltage threshold.
pub const POWER_FLAG_LOW_VOLTAGE: u8 = 0x02;
/// Sudden load spike on the supply rail.
pub const POWER_FLAG_LOAD_SPIKE: u8 = 0x04;

// ─── SignalAggregators ──────────────────────────────────────────────────────

/// Per-cycle counters for every non-token signal the engine consumes.
#[derive(Debug, Default)]
pub struct SignalAggregators {
    adv_count_this_second: u8,
    last_adv_second: u32,

    probe_burst_count: u8,
    probe_rssi_peak: i8,
    last_probe_decay_ms: Millis,

    prev_temp_c: f32,
    current_temp_c: f32,
    have_temp: bool,

    power_flags: u8,
    last_power_event_ms: Millis,
}

impl SignalAggregators {
    /// Construct with everything at rest.
    pub fn new() -> Self {
        Self {
            probe_rssi_peak: RSSI_NOISE_FLOOR,
            ..Self::default()
        }
    }

    // ── ingestion ─────────────────────────────────────────────────────────

    /// Count one advertisement toward the current wall-second's density.
    pub fn record_advertisement(&mut self, _now_ms: Millis) {
        self.adv_count_this_second = self.adv_count_this_second.saturating_add(1);
    }

    /// Count one probe sighting: bump the burst counter and track peak RSSI.
    pub fn record_probe(&mut self, rssi: i8) {
        self.probe_burst_count = self.probe_burst_count.saturating_add(1);
        if rssi > self.probe_rssi_peak {
            self.probe_rssi_peak = rssi;
        }
    }

    /// Record the most recent ambient temperature reading.
    pub fn record_temperature(&mut self, celsius: f32) {
        if self.have_temp {
            self.prev_temp_c = self.current_temp_c;
        } else {
            self.prev_temp_c = celsius;
            self.have_temp = true;
        }
        self.current_temp_c = celsius;
    }

    /// OR new power-event flags in and restart their TTL.
    pub fn record_power_event(&mut self, flags: u8, now_ms: Millis) {
        if flags != 0 {
            self.power_flags |= flags;
            self.last_power_event_ms = now_ms;
        }
    }

    // ── per-tick maintenance ──────────────────────────────────────────────

    /// Decay the probe-burst counter by one per elapsed decay interval.
    ///
    /// Decay models burst intensity fading rather than a hard on/off signal.
    /// When the counter reaches zero the peak-RSSI tracker resets too.
    pub fn decay_probes(&mut self, now_ms: Millis) {
        if has_elapsed(self.last_probe_decay_ms, now_ms, PROBE_DECAY_INTERVAL_MS) {
            self.probe_burst_count = self.probe_burst_count.saturating_sub(1);
            if self.probe_burst_count == 0 {
                self.probe_rssi_peak = RSSI_NOISE_FLOOR;
            }
            self.last_probe_decay_ms = now_ms;
        }
    }

    /// Clear power flags once their TTL has passed. Power events are
    /// point-in-time, not sustained state.
    pub fn clear_stale_power_flags(&mut self, now_ms: Millis) {
        if self.power_flags != 0
            && has_elapsed(self.last_power_event_ms, now_ms, POWER_FLAG_TTL_MS)
        {
            self.power_flags = 0;
        }
    }

    /// Reset the advertisement counter when the wall-second advances.
    ///
    /// Returns `true` when a new second began (the engine snapshots one
    /// observation per second on this edge).
    pub fn roll_second(&mut self, now_ms: Millis) -> bool {
        let current_second = now_ms / 1_000;
        if current_second != self.last_adv_second {
            self.adv_count_this_second = 0;
            self.last_adv_second = current_second;
            true
        } else {
            false
        }
    }

    /// Clear every counter and tracker. Used on rotation and disable.
    pub fn reset(&mut self) {
        self.adv_count_this_second = 0;
        self.last_adv_second = 0;
        self.probe_burst_count = 0;
        self.probe_rssi_peak = RSSI_NOISE_FLOOR;
        self.last_probe_decay_ms = 0;
        self.prev_temp_c = 0.0;
        self.current_temp_c = 0.0;
        self.have_temp = false;
        self.power_flags = 0;
        self.last_power_event_ms = 0;
    }

    // ── read accessors ────────────────────────────────────────────────────

    /// Advertisements counted in the current wall-second.
    pub fn adv_density(&self) -> u8 {
        self.adv_count_this_second
    }

    /// Current (decaying) probe-burst counter.
    pub fn probe_bursts(&self) -> u8 {
        self.probe_burst_count
    }

    /// Peak probe RSSI while the burst counter is nonzero.
    pub fn probe_rssi_peak(&self) -> i8 {
        self.probe_rssi_peak
    }

    /// Currently latched power-event flags.
    pub fn power_flags(&self) -> u8 {
        self.power_flags
    }

    /// Temperature change since the previous reading, in 0.1 °C steps,
    /// saturating at ±12.7 °C. Zero until two readings exist.
    pub fn temp_delta_c10(&self) -> i8 {
        if !self.have_temp {
            return 0;
        }
        let delta = (self.current_temp_c - self.prev_temp_c) * 10.0;
        if delta >= 127.0 {
            127
        } else if delta <= -128.0 {
            -128
        } else {
            delta as i8
        }
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────
