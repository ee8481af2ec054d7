//! Wrap-safe elapsed-time arithmetic.
//!
//! The engine timestamps everything with a `u32` millisecond monotonic clock
//! that wraps after ~49.7 days. Naive subtraction silently breaks at the wrap
//! boundary, so every age and timeout check in this crate routes through the
//! two functions here — ad hoc `now - start` is forbidden.
//!
//! # Invariants
//!
//! - `elapsed(start, now)` is the correct non-negative duration even when
//!   `now` has wrapped past `u32::MAX` since `start`.
//! - No timestamp is ever exported; timestamps stay internal to the engine.

/// Millisecond timestamp from the platform's monotonic clock.
///
/// Wraps modulo 2^32 (~49.7 days at millisecond resolution).
pub type Millis = u32;

/// Milliseconds elapsed between `start` and `now`.
///
/// Wrapping unsigned subtraction: modular arithmetic yields the correct
/// duration across the clock wrap boundary.
#[inline]
pub fn elapsed(start: Millis, now: Millis) -> u32 {
    now.wrapping_sub(start)
}

/// `true` once at least `duration` milliseconds have elapsed since `start`.
#[inline]
pub fn has_elapsed(start: Millis, now: Millis, duration: u32) -> bool {
    elapsed(start, now) >= duration
}

// ─── Tests ──────────────────────────────────────────────────────────────────
