//! # rf-presence-core
//!
//! Privacy-preserving RF presence detection — the sensing core of a
//! battery-powered witness device.
//!
//! ---
//!
//! ## A witness, not an analyst
//!
//! The engine answers one question — *is someone here, and roughly how
//! engaged are they?* — from ambient radio activity, without ever learning
//! *who*. Three mechanisms make that a structural property rather than a
//! policy:
//!
//! **The privacy barrier** — every BLE address is consumed at the ingestion
//! boundary, hashed through a one-way derivation keyed by a device-local
//! secret, and discarded. What survives is a 32-bit ephemeral token that is
//! meaningless off-device and worthless after the next rotation.
//!
//! **Session rotation** — every four hours (or on demand) the session epoch
//! advances, every prior token becomes underivable, and all working state is
//! wiped. Long-term tracking is impossible because nothing long-term exists.
//!
//! **Bounded, aggregate-only retention** — the only retained records are a
//! 32-entry token store and a 64-slot ring of per-second aggregates, both
//! fixed-capacity, both securely wiped on eviction, both size-capped at
//! compile time so an address cannot hide in either.
//!
//! On top of that substrate a five-state hysteresis machine (`EMPTY`,
//! `IMPULSE`, `PRESENCE`, `DWELLING`, `DEPARTING`) turns raw sightings into
//! a handful of calm, sanitized events.
//!
//! ## The pipeline
//!
//! ```text
//! BLE scan ────▶ derive_token ──▶ TokenStore ──────┐
//! WiFi probe ──▶ (no address) ──▶ SignalAggregators ├─▶ PresenceFsm ─▶ RfEvent
//! temp / power ─────────────────▶ ObservationRing ─┘
//!                     ▲
//!              SessionState (secret + epoch, rotates)
//! ```
//!
//! ## Module overview
//!
//! | Module | Key types | What it does |
//! |--------|-----------|--------------|
//! | [`timer`] | [`timer::Millis`] | Wrap-safe monotonic time arithmetic |
//! | [`wipe`] | — | Secure memory erasure primitive |
//! | [`token`] | [`token::TokenStore`] | One-way token derivation and the bounded token store |
//! | [`observation`] | [`observation::ObservationRing`] | Aggregate-only snapshot ring with TTL eviction |
//! | [`session`] | [`session::SessionState`], [`session::KeyValueStore`] | Device secret, epoch, persistence boundary |
//! | [`signals`] | [`signals::SignalAggregators`] | Probe bursts, advertisement density, temperature, power flags |
//! | [`settings`] | [`settings::RfPresenceSettings`] | Validated, persistable configuration |
//! | [`fsm`] | [`fsm::PresenceFsm`] | Five-state hysteresis machine with a uniform transition gate |
//! | [`event`] | [`event::RfEvent`], [`event::EventSink`] | Closed event vocabulary, confidence and dwell classes, hints |
//! | [`engine`] | [`engine::RfPresenceEngine`] | The assembled pipeline behind one `&mut self` surface |
//! | [`conformance`] | — | On-device privacy self-checks |
//!
//! ## `no_std`
//!
//! The crate is `#![no_std]` by default with no heap required. Enable the
//! `std` feature on hosted targets. Enable the `serde` feature to serialize
//! events and snapshots for a transport layer.
//!
//! ## Platform integration
//!
//! The engine is platform-agnostic: the host supplies a
//! [`session::KeyValueStore`] (e.g. NVS flash), a [`rand_core::RngCore`]
//! (the hardware TRNG), a millisecond monotonic clock, and an
//! [`event::EventSink`]. All engine methods take `&mut self`; drive it from
//! one task.

#![cfg_attr(not(any(feature = "std", test)), no_std)]
#![deny(unsafe_code)]
#![deny(missing_docs)]

pub mod conformance;
pub mod engine;
pub mod event;
pub mod fsm;
pub mod observation;
pub mod session;
pub mod settings;
pub mod signals;
pub mod timer;
pub mod token;
pub mod wipe;

pub use engine::{RfPresenceEngine, RfStateSnapshot};
pub use event::{ConfidenceClass, DwellClass, EventSink, NarrativeHint, RfEvent, RfEventKind};
pub use fsm::RfState;
pub use session::{KeyValueStore, SessionState, StoreError};
pub use settings::{RfPresenceSettings, SettingsError};
