//! Engine settings: validated thresholds and the persisted binary blob.
//!
//! Settings arrive from the configuration UI through [`set_settings`] and are
//! persisted to the key-value collaborator as a small versioned binary blob
//! with a documented layout. A stored blob that fails the magic/version check
//! or the bounds validation falls back to defaults with a logged warning —
//! bad persisted state must never brick the engine.
//!
//! # Binary layout (big-endian)
//!
//! ```text
//! [0..2]   magic:    0x5250 ("RP")
//! [2..3]   version:  u8 = 1
//! [3..4]   flags:    bit0 enabled, bit1 emit_impulse_events, bit2 emit_narrative_hints
//! [4..8]   presence_threshold_ms: u32
//! [8..12]  dwell_threshold_ms:    u32
//! [12..16] lost_timeout_ms:       u32
//! [16..17] min_presence_count:    u8
//! ```
//!
//! [`set_settings`]: crate::engine::RfPresenceEngine::set_settings

// ─── Defaults and fixed intervals ───────────────────────────────────────────

/// Default sustained-signal duration before IMPULSE confirms as PRESENCE.
pub const PRESENCE_THRESHOLD_MS: u32 = 10_000;
/// Default sustained-presence duration before PRESENCE becomes DWELLING.
pub const DWELL_THRESHOLD_MS: u32 = 60_000;
/// Default signal-lost duration before presence is declared over.
pub const LOST_TIMEOUT_MS: u32 = 30_000;
/// Default minimum active-device count for presence.
pub const MIN_PRESENCE_COUNT: u8 = 1;

/// Maximum IMPULSE duration before an unconfirmed impulse returns to EMPTY.
pub const IMPULSE_TIMEOUT_MS: u32 = 5_000;
/// Time DEPARTING must persist with no recovery before EMPTY is confirmed.
pub const DEPARTING_CONFIRM_MS: u32 = 15_000;
/// Global minimum interval between FSM transitions (event-flood guard).
pub const MIN_TRANSITION_INTERVAL_MS: u32 = 500;
/// Automatic session-rotation interval.
pub const SESSION_ROTATE_MS: u32 = 4 * 60 * 60 * 1000;

// Validation bounds for the configurable thresholds.

/// Lower bound for `presence_threshold_ms` (1 s).
pub const MIN_PRESENCE_THRESHOLD_MS: u32 = 1_000;
/// Upper bound for `presence_threshold_ms` (5 min).
pub const MAX_PRESENCE_THRESHOLD_MS: u32 = 300_000;
/// Lower bound for `dwell_threshold_ms` (5 s).
pub const MIN_DWELL_THRESHOLD_MS: u32 = 5_000;
/// Upper bound for `dwell_threshold_ms` (10 min).
pub const MAX_DWELL_THRESHOLD_MS: u32 = 600_000;
/// Lower bound for `lost_timeout_ms` (5 s).
pub const MIN_LOST_TIMEOUT_MS: u32 = 5_000;
/// Upper bound for `lost_timeout_ms` (5 min).
pub const MAX_LOST_TIMEOUT_MS: u32 = 300_000;
/// Lower bound for `min_presence_count`.
pub const MIN_PRESENCE_COUNT_SETTING: u8 = 1;
/// Upper bound for `min_presence_count`.
pub const MAX_PRESENCE_COUNT_SETTING: u8 = 50;

/// Length of the persisted settings blob.
pub const SETTINGS_BLOB_LEN: usize = 17;

const SETTINGS_MAGIC: u16 = 0x5250; // "RP"
const SETTINGS_VERSION: u8 = 1;

// ─── Errors ─────────────────────────────────────────────────────────────────

/// Why a settings value (or persisted blob) was rejected.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SettingsError {
    /// `presence_threshold_ms` outside [1 s, 5 min].
    PresenceThresholdOutOfRange,
    /// `dwell_threshold_ms` outside [5 s, 10 min].
    DwellThresholdOutOfRange,
    /// `lost_timeout_ms` outside [5 s, 5 min].
    LostTimeoutOutOfRange,
    /// `min_presence_count` outside [1, 50].
    MinPresenceCountOutOfRange,
    /// Persisted blob has the wrong length, magic or version.
    MalformedBlob,
}

impl core::fmt::Display for SettingsError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::PresenceThresholdOutOfRange => f.write_str("presence threshold out of range"),
            Self::DwellThresholdOutOfRange => f.write_str("dwell threshold out of range"),
            Self::LostTimeoutOutOfRange => f.write_str("lost timeout out of range"),
            Self::MinPresenceCountOutOfRange => f.write_str("min presence count out of range"),
            Self::MalformedBlob => f.write_str("malformed settings blob"),
        }
    }
}

// ─── RfPresenceSettings ─────────────────────────────────────────────────────

/// User-configurable engine settings.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RfPresenceSettings {
    /// Whether the engine processes signals at all.
    pub enabled: bool,
    /// Sustained-signal duration before IMPULSE confirms as PRESENCE.
    pub presence_threshold_ms: u32,
    /// Sustained-presence duration before PRESENCE becomes DWELLING.
    pub dwell_threshold_ms: u32,
    /// Signal-lost duration before presence is declared over.
    pub lost_timeout_ms: u32,
    /// Minimum active-device count for presence.
    pub min_presence_count: u8,
    /// Emit an event on EMPTY → IMPULSE transitions.
    pub emit_impulse_events: bool,
    /// Attach conservative narrative hints to events.
    pub emit_narrative_hints: bool,
}

impl Default for RfPresenceSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            presence_threshold_ms: PRESENCE_THRESHOLD_MS,
            dwell_threshold_ms: DWELL_THRESHOLD_MS,
            lost_timeout_ms: LOST_TIMEOUT_MS,
            min_presence_count: MIN_PRESENCE_COUNT,
            emit_impulse_events: false,
            emit_narrative_hints: true,
        }
    }
}

impl RfPresenceSettings {
    /// Check every configurable value against its documented bounds.
    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.presence_threshold_ms < MIN_PRESENCE_THRESHOLD_MS
            || self.presence_threshold_ms > MAX_PRESENCE_THRESHOLD_MS
        {
            return Err(SettingsError::PresenceThresholdOutOfRange);
        }
        if self.dwell_threshold_ms < MIN_DWELL_THRESHOLD_MS
            || self.dwell_threshold_ms > MAX_DWELL_THRESHOLD_MS
        {
            return Err(SettingsError::DwellThresholdOutOfRange);
        }
        if self.lost_timeout_ms < MIN_LOST_TIMEOUT_MS
            || self.lost_timeout_ms > MAX_LOST_TIMEOUT_MS
        {
            return Err(SettingsError::LostTimeoutOutOfRange);
        }
        if self.min_presence_count < MIN_PRESENCE_COUNT_SETTING
            || self.min_presence_count > MAX_PRESENCE_COUNT_SETTING
        {
            return Err(SettingsError::MinPresenceCountOutOfRange);
        }
        Ok(())
    }

    /// Encode into the persisted blob layout.
    pub fn to_bytes(&self) -> [u8; SETTINGS_BLOB_LEN] {
        let mut out = [0u8; SETTINGS_BLOB_LEN];
        out[0..2].copy_from_slice(&SETTINGS_MAGIC.to_be_bytes());
        out[2] = SETTINGS_VERSION;
        out[3] = (self.enabled as u8)
            | ((self.emit_impulse_events as u8) << 1)
            | ((self.emit_narrative_hints as u8) << 2);
        out[4..8].copy_from_slice(&self.presence_threshold_ms.to_be_bytes());
        out[8..12].copy_from_slice(&self.dwell_threshold_ms.to_be_bytes());
        out[12..16].copy_from_slice(&self.lost_timeout_ms.to_be_bytes());
        out[16] = self.min_presence_count;
        out
    }

    /// Decode and validate a persisted blob.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, SettingsError> {
        if bytes.len() != SETTINGS_BLOB_LEN {
            return Err(SettingsError::MalformedBlob);
        }
        if u16::from_be_bytes([bytes[0], bytes[1]]) != SETTINGS_MAGIC
            || bytes[2] != SETTINGS_VERSION
        {
            return Err(SettingsError::MalformedBlob);
        }
        let flags = bytes[3];
        let settings = Self {
            enabled: flags & 0x01 != 0,
            emit_impulse_events: flags & 0x02 != 0,
            emit_narrative_hints: flags & 0x04 != 0,
            presence_threshold_ms: u32::from_be_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]),
            dwell_threshold_ms: u32::from_be_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]),
            lost_timeout_ms: u32::from_be_bytes([bytes[12], bytes[13], bytes[14], bytes[15]]),
            min_presence_count: bytes[16],
        };
        settings.validate()?;
        Ok(settings)
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────
