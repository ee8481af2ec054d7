//! The closed event vocabulary and its emission-time classifications.
//!
//! Events are transient, callback-only values: nothing here is ever stored.
//! Confidence, dwell class, the coarse time bucket and the optional narrative
//! hint are all computed at emission time from aggregates, and every field is
//! drawn from a closed enum — there is no channel through which an identifier
//! or a precise timestamp could leave the engine.

use crate::fsm::RfState;
use crate::timer::Millis;

// ─── Vocabulary ─────────────────────────────────────────────────────────────

/// The five event names the engine can ever emit.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum RfEventKind {
    /// Brief signal detected, awaiting confirmation (optional, off by default).
    Impulse,
    /// Sustained signal confirmed as presence.
    PresenceStarted,
    /// Presence has persisted into dwelling.
    DwellStarted,
    /// Signals weakening; presence may be ending.
    Departing,
    /// Presence confirmed over.
    PresenceEnded,
}

impl RfEventKind {
    /// Stable wire name for this event.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Impulse => "rf_impulse",
            Self::PresenceStarted => "rf_presence_started",
            Self::DwellStarted => "rf_dwell_started",
            Self::Departing => "rf_departing",
            Self::PresenceEnded => "rf_presence_ended",
        }
    }
}

/// Which radio produced the signal behind an event.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SignalSource {
    /// No signal (placeholder, unused by live events).
    None,
    /// BLE advertisements.
    Ble,
    /// WiFi probe requests.
    Wifi,
    /// Multiple signals combined.
    Fused,
}

// ─── Confidence ─────────────────────────────────────────────────────────────

/// Coarse confidence classification for an event or snapshot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ConfidenceClass {
    /// Weighted score below 0.2.
    Uncertain,
    /// Score in [0.2, 0.5).
    Low,
    /// Score in [0.5, 0.8).
    Moderate,
    /// Score at or above 0.8.
    High,
}

impl ConfidenceClass {
    /// Classify from the weighted signal score.
    ///
    /// Active BLE device count is the dominant term, probe bursts secondary,
    /// with a small bonus for strong mean RSSI:
    ///
    /// ```text
    /// score = [ble > 0] × (0.5 + min(ble, 3+) × 0.15, capped at 1.0 term)
    ///       + [probes > 0] × (0.3 + min(probes, 2+) × 0.1, capped at 0.5 term)
    ///       + [rssi_mean > −60 dBm] × 0.1
    /// ```
    pub fn classify(ble_count: u8, probe_bursts: u8, rssi_mean: i8) -> Self {
        let mut score = 0.0f32;

        if ble_count > 0 {
            score += 0.5
                + if ble_count > 3 {
                    0.5
                } else {
                    f32::from(ble_count) * 0.15
                };
        }
        if probe_bursts > 0 {
            score += 0.3
                + if probe_bursts > 2 {
                    0.2
                } else {
                    f32::from(probe_bursts) * 0.1
                };
        }
        if rssi_mean > -60 {
            score += 0.1;
        }

        if score >= 0.8 {
            Self::High
        } else if score >= 0.5 {
            Self::Moderate
        } else if score >= 0.2 {
            Self::Low
        } else {
            Self::Uncertain
        }
    }

    /// Stable wire name for this class.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Uncertain => "uncertain",
            Self::Low => "low",
            Self::Moderate => "moderate",
            Self::High => "high",
        }
    }
}

// ─── Dwell class ────────────────────────────────────────────────────────────

/// Coarse classification of how long presence has persisted.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum DwellClass {
    /// Under 30 seconds.
    Transient,
    /// 30–120 seconds.
    Lingering,
    /// Over 120 seconds.
    Sustained,
}

impl DwellClass {
    /// Classify a time-in-state duration.
    pub fn from_duration_ms(duration_ms: u32) -> Self {
        if duration_ms >= 120_000 {
            Self::Sustained
        } else if duration_ms >= 30_000 {
            Self::Lingering
        } else {
            Self::Transient
        }
    }

    /// Stable wire name for this class.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Transient => "transient",
            Self::Lingering => "lingering",
            Self::Sustained => "sustained",
        }
    }
}

// ─── Time bucket ────────────────────────────────────────────────────────────

/// Coarse time bucket: 10-minute granularity, wrapping every 24 hours
/// (144 buckets). The only temporal information an event ever carries.
pub fn time_bucket(now_ms: Millis) -> u8 {
    ((now_ms / (10 * 60 * 1_000)) % 144) as u8
}

// ─── Narrative hints ────────────────────────────────────────────────────────

/// Conservative hedge phrases optionally attached to an event.
///
/// A hint never asserts anything the signal cannot support; it is chosen only
/// for specific `(state, dwell)` combinations and suppressed entirely during
/// unusual hours (roughly 10 pm – 1 am), when guessing would be reckless.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum NarrativeHint {
    /// Brief presence during ordinary hours.
    PasserbyLike,
    /// Lingering dwell during ordinary hours.
    DeliveryLike,
    /// Presence sustained beyond two minutes.
    SustainedPresence,
}

impl NarrativeHint {
    /// Select a hint for a `(state, dwell, time bucket)` combination, or
    /// `None` when no conservative phrase applies.
    pub fn select(state: RfState, dwell: DwellClass, bucket: u8) -> Option<Self> {
        let unusual_hour = bucket < 6 || bucket > 132;
        match (state, dwell) {
            (RfState::Presence, DwellClass::Transient) if !unusual_hour => {
                Some(Self::PasserbyLike)
            }
            (RfState::Dwelling, DwellClass::Lingering) if !unusual_hour => {
                Some(Self::DeliveryLike)
            }
            (RfState::Dwelling, DwellClass::Sustained) => Some(Self::SustainedPresence),
            _ => None,
        }
    }

    /// Stable wire name for this hint.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PasserbyLike => "passerby_like",
            Self::DeliveryLike => "delivery_like",
            Self::SustainedPresence => "sustained_presence",
        }
    }
}

// ─── RfEvent ────────────────────────────────────────────────────────────────

/// A sanitized presence event, handed to the sink synchronously from
/// `update()` and never persisted.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RfEvent {
    /// Event name from the closed vocabulary.
    pub kind: RfEventKind,
    /// Primary signal source behind the transition.
    pub signal: SignalSource,
    /// Confidence classification at emission time.
    pub confidence: ConfidenceClass,
    /// Signed change in anonymous device count; the only count an event carries.
    pub count_delta: i8,
    /// Dwell classification of the state being left.
    pub dwell: DwellClass,
    /// Coarse 10-minute time bucket.
    pub time_bucket: u8,
    /// Optional conservative hedge phrase.
    pub hint: Option<NarrativeHint>,
}

// ─── EventSink ──────────────────────────────────────────────────────────────

/// Receives events synchronously during `update()`.
///
/// Implementations must not block; the engine runs in the platform's main
/// loop and a slow sink stalls every other subsystem.
pub trait EventSink {
    /// Handle one emitted event. The reference is only valid for the call.
    fn on_event(&mut self, event: &RfEvent);
}

impl<F: FnMut(&RfEvent)> EventSink for F {
    fn on_event(&mut self, event: &RfEvent) {
        self(event)
    }
}

/// A sink that discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl EventSink for NullSink {
    fn on_event(&mut self, _event: &RfEvent) {}
}

// ─── Tests ──────────────────────────────────────────────────────────────────
