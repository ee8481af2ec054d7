//! The five-state presence classifier.
//!
//! The transition table lives in one `match` inside [`PresenceFsm::tick`] —
//! the single source of truth for what moves the machine. Each tick evaluates
//! the table exactly once against a [`SignalSummary`] and returns at most one
//! transition.
//!
//! ```text
//! EMPTY → IMPULSE → PRESENCE → DWELLING
//!              ↘        ↕          ↓
//!              EMPTY  DEPARTING ←──┘
//!                        ↓
//!                      EMPTY
//! ```
//!
//! A global 500 ms inter-transition gate guards against event flooding from
//! noisy signals: a transition request arriving before the gate opens is
//! simply deferred to a later tick, never dropped on the floor as state.

use crate::event::{RfEventKind, SignalSource};
use crate::settings::{
    RfPresenceSettings, DEPARTING_CONFIRM_MS, IMPULSE_TIMEOUT_MS, MIN_TRANSITION_INTERVAL_MS,
};
use crate::timer::{elapsed, has_elapsed, Millis};

// ─── RfState ────────────────────────────────────────────────────────────────

/// Occupancy state of the monitored space.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum RfState {
    /// No RF presence detected.
    #[default]
    Empty,
    /// Brief signal, awaiting confirmation.
    Impulse,
    /// Confirmed RF activity.
    Presence,
    /// Stable, sustained presence.
    Dwelling,
    /// Signals weakening, count dropping.
    Departing,
}

impl RfState {
    /// Human-readable state name for status surfaces.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Empty => "empty",
            Self::Impulse => "impulse",
            Self::Presence => "presence",
            Self::Dwelling => "dwelling",
            Self::Departing => "departing",
        }
    }
}

// ─── Tick inputs and outputs ────────────────────────────────────────────────

/// The aggregate inputs one tick evaluates. No identifiers, just counts.
#[derive(Clone, Copy, Debug, Default)]
pub struct SignalSummary {
    /// Active ephemeral-token count (devices currently nearby).
    pub device_count: u8,
    /// Current decaying probe-burst counter.
    pub probe_bursts: u8,
}

/// An event the engine should emit for a transition that just happened.
///
/// The FSM knows nothing about confidence or hints; it reports the bare
/// transition facts and the emitter fills in the rest.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PendingEvent {
    /// Which vocabulary entry to emit.
    pub kind: RfEventKind,
    /// Primary signal source behind the transition.
    pub signal: SignalSource,
    /// Signed change in device count across the transition.
    pub count_delta: i8,
    /// How long the machine sat in the state it just left.
    pub dwelled_ms: u32,
}

// ─── PresenceFsm ────────────────────────────────────────────────────────────

/// The presence state machine. Owns nothing but its own clockwork.
#[derive(Debug)]
pub struct PresenceFsm {
    state: RfState,
    state_enter_ms: Millis,
    last_transition_ms: Millis,
    prev_device_count: u8,
}

impl PresenceFsm {
    /// Construct in `Empty`, entered at `now_ms`.
    pub fn new(now_ms: Millis) -> Self {
        Self {
            state: RfState::Empty,
            state_enter_ms: now_ms,
            last_transition_ms: 0,
            prev_device_count: 0,
        }
    }

    /// Current state.
    pub fn state(&self) -> RfState {
        self.state
    }

    /// Milliseconds spent in the current state as of `now_ms`.
    pub fn time_in_state(&self, now_ms: Millis) -> u32 {
        elapsed(self.state_enter_ms, now_ms)
    }

    /// Force the machine back to `Empty` without emitting an event.
    ///
    /// Rotation does not call this (it clears the signals and lets the
    /// machine walk itself down); full disable does.
    pub fn reset(&mut self, now_ms: Millis) {
        self.state = RfState::Empty;
        self.state_enter_ms = now_ms;
        self.prev_device_count = 0;
    }

    /// Evaluate the transition table exactly once.
    ///
    /// Returns the event to emit, if the transition that fired carries one.
    /// While the 500 ms gate is closed the machine holds still and the
    /// request is re-evaluated next tick.
    pub fn tick(
        &mut self,
        now_ms: Millis,
        summary: SignalSummary,
        settings: &RfPresenceSettings,
    ) -> Option<PendingEvent> {
        let count = summary.device_count;
        let probes = summary.probe_bursts;
        let prev = self.prev_device_count;
        self.prev_device_count = count;

        if !has_elapsed(self.last_transition_ms, now_ms, MIN_TRANSITION_INTERVAL_MS) {
            return None;
        }

        let duration = elapsed(self.state_enter_ms, now_ms);
        let quiet = count < settings.min_presence_count;

        let (next, pending) = match self.state {
            RfState::Empty => {
                if !quiet || probes > 0 {
                    let signal = if probes > 0 {
                        SignalSource::Wifi
                    } else {
                        SignalSource::Ble
                    };
                    let emit = settings.emit_impulse_events.then_some(PendingEvent {
                        kind: RfEventKind::Impulse,
                        signal,
                        count_delta: delta(count, prev),
                        dwelled_ms: duration,
                    });
                    (Some(RfState::Impulse), emit)
                } else {
                    (None, None)
                }
            }

            RfState::Impulse => {
                if quiet && probes == 0 {
                    (Some(RfState::Empty), None)
                } else if duration >= settings.presence_threshold_ms {
                    let emit = Some(PendingEvent {
                        kind: RfEventKind::PresenceStarted,
                        signal: SignalSource::Fused,
                        count_delta: delta(count, 0),
                        dwelled_ms: duration,
                    });
                    (Some(RfState::Presence), emit)
                } else if duration >= IMPULSE_TIMEOUT_MS && quiet && probes == 0 {
                    // Probe bursts are signal: they must keep the impulse
                    // alive toward confirmation, not let it lapse and re-arm.
                    (Some(RfState::Empty), None)
                } else {
                    (None, None)
                }
            }

            RfState::Presence => {
                if quiet {
                    if duration >= settings.lost_timeout_ms {
                        let emit = Some(PendingEvent {
                            kind: RfEventKind::PresenceEnded,
                            signal: SignalSource::Fused,
                            count_delta: delta(0, prev),
                            dwelled_ms: duration,
                        });
                        (Some(RfState::Empty), emit)
                    } else {
                        let emit = Some(PendingEvent {
                            kind: RfEventKind::Departing,
                            signal: SignalSource::Ble,
                            count_delta: delta(count, prev),
                            dwelled_ms: duration,
                        });
                        (Some(RfState::Departing), emit)
                    }
                } else if duration >= settings.dwell_threshold_ms {
                    let emit = Some(PendingEvent {
                        kind: RfEventKind::DwellStarted,
                        signal: SignalSource::Ble,
                        count_delta: 0,
                        dwelled_ms: duration,
                    });
                    (Some(RfState::Dwelling), emit)
                } else {
                    (None, None)
                }
            }

            RfState::Dwelling => {
                if quiet {
                    let emit = Some(PendingEvent {
                        kind: RfEventKind::Departing,
                        signal: SignalSource::Ble,
                        count_delta: delta(count, prev),
                        dwelled_ms: duration,
                    });
                    (Some(RfState::Departing), emit)
                } else {
                    (None, None)
                }
            }

            RfState::Departing => {
                if !quiet {
                    // False departure: recover without ceremony.
                    (Some(RfState::Presence), None)
                } else if duration >= DEPARTING_CONFIRM_MS {
                    let emit = Some(PendingEvent {
                        kind: RfEventKind::PresenceEnded,
                        signal: SignalSource::Fused,
                        count_delta: delta(0, prev),
                        dwelled_ms: duration,
                    });
                    (Some(RfState::Empty), emit)
                } else {
                    (None, None)
                }
            }
        };

        if let Some(next) = next {
            log::info!(
                target: "rf_presence",
                "FSM: {} -> {}",
                self.state.as_str(),
                next.as_str()
            );
            self.state = next;
            self.state_enter_ms = now_ms;
            self.last_transition_ms = now_ms;
        }
        pending
    }
}

/// Saturating signed device-count delta.
fn delta(now: u8, before: u8) -> i8 {
    (i16::from(now) - i16::from(before)).clamp(-127, 127) as i8
}

// ─── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> RfPresenceSettings {
        RfPresenceSettings::default()
    }

    fn quiet() -> SignalSummary {
        SignalSummary::default()
    }

    fn devices(n: u8) -> SignalSummary {
        SignalSummary {
            device_count: n,
            probe_bursts: 0,
        }
    }

    fn probes(n: u8) -> SignalSummary {
        SignalSummary {
            device_count: 0,
            probe_bursts: n,
        }
    }

    /// Drive the machine with `summary` every 500 ms over `[from, to)`.
    fn run(
        fsm: &mut PresenceFsm,
        from: Millis,
        to: Millis,
        summary: SignalSummary,
        s: &RfPresenceSettings,
    ) -> heapless::Vec<PendingEvent, 16> {
        let mut events = heapless::Vec::new();
        let mut t = from;
        while t < to {
            if let Some(e) = fsm.tick(t, summary, s) {
                events.push(e).unwrap();
            }
            t += 500;
        }
        events
    }

    // ── basic transitions ─────────────────────────────────────────────────

    #[test]
    fn test_empty_holds_with_no_signal() {
        let mut fsm = PresenceFsm::new(0);
        run(&mut fsm, 500, 10_000, quiet(), &settings());
        assert_eq!(fsm.state(), RfState::Empty);
    }

    #[test]
    fn test_empty_to_impulse_on_device() {
        let mut fsm = PresenceFsm::new(0);
        assert!(fsm.tick(1_000, devices(1), &settings()).is_none(), "impulse events off by default");
        assert_eq!(fsm.state(), RfState::Impulse);
    }

    #[test]
    fn test_empty_to_impulse_on_probe_burst() {
        let mut fsm = PresenceFsm::new(0);
        fsm.tick(1_000, probes(2), &settings());
        assert_eq!(fsm.state(), RfState::Impulse);
    }

    #[test]
    fn test_impulse_event_emitted_when_enabled() {
        let mut s = settings();
        s.emit_impulse_events = true;
        let mut fsm = PresenceFsm::new(0);
        let e = fsm.tick(1_000, probes(1), &s).unwrap();
        assert_eq!(e.kind, RfEventKind::Impulse);
        assert_eq!(e.signal, SignalSource::Wifi);
    }

    #[test]
    fn test_impulse_collapses_when_signal_vanishes() {
        let mut fsm = PresenceFsm::new(0);
        fsm.tick(1_000, devices(1), &settings());
        assert_eq!(fsm.state(), RfState::Impulse);
        fsm.tick(2_000, quiet(), &settings());
        assert_eq!(fsm.state(), RfState::Empty);
    }

    #[test]
    fn test_probe_sustained_impulse_survives_timeout() {
        // Probes with no resolvable devices must carry the impulse past the
        // 5 s timeout to confirmation, without lapsing to Empty and
        // re-entering (which would re-emit rf_impulse).
        let mut s = settings();
        s.emit_impulse_events = true;
        let mut fsm = PresenceFsm::new(0);
        let events = run(&mut fsm, 500, 11_000, probes(2), &s);

        assert_eq!(fsm.state(), RfState::Presence);
        let kinds: heapless::Vec<_, 16> = events.iter().map(|e| e.kind).collect();
        assert_eq!(
            kinds.as_slice(),
            &[RfEventKind::Impulse, RfEventKind::PresenceStarted]
        );
    }

    #[test]
    fn test_scenario_a_empty_impulse_presence() {
        // One device sighted continuously for 12 s with default settings.
        let s = settings();
        let mut fsm = PresenceFsm::new(0);
        let events = run(&mut fsm, 500, 12_500, devices(1), &s);

        assert_eq!(fsm.state(), RfState::Presence);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, RfEventKind::PresenceStarted);
        assert!(events[0].dwelled_ms >= s.presence_threshold_ms);
    }

    #[test]
    fn test_presence_to_dwelling() {
        let s = settings();
        let mut fsm = PresenceFsm::new(0);
        // 500..80_000 covers impulse (10s) + dwell threshold (60s in presence)
        let events = run(&mut fsm, 500, 80_000, devices(2), &s);
        assert_eq!(fsm.state(), RfState::Dwelling);
        let kinds: heapless::Vec<_, 16> = events.iter().map(|e| e.kind).collect();
        assert_eq!(
            kinds.as_slice(),
            &[RfEventKind::PresenceStarted, RfEventKind::DwellStarted]
        );
    }

    #[test]
    fn test_scenario_b_presence_lost_departing_then_empty() {
        let s = settings();
        let mut fsm = PresenceFsm::new(0);
        run(&mut fsm, 500, 15_000, devices(1), &s);
        assert_eq!(fsm.state(), RfState::Presence);

        // Count drops to zero and stays there.
        let events = run(&mut fsm, 15_000, 50_000, quiet(), &s);
        assert_eq!(fsm.state(), RfState::Empty);
        let kinds: heapless::Vec<_, 16> = events.iter().map(|e| e.kind).collect();
        assert_eq!(
            kinds.as_slice(),
            &[RfEventKind::Departing, RfEventKind::PresenceEnded]
        );
    }

    #[test]
    fn test_scenario_c_departing_recovers_without_ended_event() {
        let s = settings();
        let mut fsm = PresenceFsm::new(0);
        run(&mut fsm, 500, 15_000, devices(1), &s);
        assert_eq!(fsm.state(), RfState::Presence);

        // Brief dropout.
        let events = run(&mut fsm, 15_000, 20_000, quiet(), &s);
        assert_eq!(fsm.state(), RfState::Departing);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, RfEventKind::Departing);

        // Recovery before departing_confirm (15 s).
        let events = run(&mut fsm, 20_000, 22_000, devices(1), &s);
        assert_eq!(fsm.state(), RfState::Presence);
        assert!(
            events.iter().all(|e| e.kind != RfEventKind::PresenceEnded),
            "false departure must not emit rf_presence_ended"
        );
    }

    #[test]
    fn test_dwelling_to_departing_to_empty() {
        let s = settings();
        let mut fsm = PresenceFsm::new(0);
        run(&mut fsm, 500, 80_000, devices(2), &s);
        assert_eq!(fsm.state(), RfState::Dwelling);

        let events = run(&mut fsm, 80_000, 100_000, quiet(), &s);
        assert_eq!(fsm.state(), RfState::Empty);
        let kinds: heapless::Vec<_, 16> = events.iter().map(|e| e.kind).collect();
        assert_eq!(
            kinds.as_slice(),
            &[RfEventKind::Departing, RfEventKind::PresenceEnded]
        );
        // Departing carries the dwell duration of the state it left.
        assert!(events[0].dwelled_ms >= 9_000);
    }

    // ── transition gate ───────────────────────────────────────────────────

    #[test]
    fn test_transition_gate_defers_rapid_flapping() {
        let s = settings();
        let mut fsm = PresenceFsm::new(0);
        fsm.tick(1_000, devices(1), &s);
        assert_eq!(fsm.state(), RfState::Impulse);

        // 100 ms later the signal vanishes: gate still closed, state holds.
        fsm.tick(1_100, quiet(), &s);
        assert_eq!(fsm.state(), RfState::Impulse);

        // Deferred request fires once the gate opens.
        fsm.tick(1_500, quiet(), &s);
        assert_eq!(fsm.state(), RfState::Empty);
    }

    #[test]
    fn test_count_delta_signs() {
        let s = settings();
        let mut fsm = PresenceFsm::new(0);
        run(&mut fsm, 500, 15_000, devices(3), &s);

        let events = run(&mut fsm, 15_000, 50_000, quiet(), &s);
        let departing = events.iter().find(|e| e.kind == RfEventKind::Departing).unwrap();
        assert_eq!(departing.count_delta, -3);
        let ended = events.iter().find(|e| e.kind == RfEventKind::PresenceEnded).unwrap();
        assert!(ended.count_delta <= 0);
    }

    #[test]
    fn test_time_in_state_tracks_entry() {
        let mut fsm = PresenceFsm::new(1_000);
        assert_eq!(fsm.time_in_state(4_000), 3_000);
        fsm.tick(5_000, devices(1), &settings());
        assert_eq!(fsm.time_in_state(5_500), 500);
    }
}
