//! The privacy barrier: ephemeral token derivation and the bounded token store.
//!
//! A raw radio address crosses into this module exactly once, as an argument
//! to [`derive_token`], and never comes out: the derivation is a one-way
//! SHA-256 over `{domain tag, device secret, session epoch, address}` and only
//! the first 32 bits of the digest survive. Every structure downstream of the
//! barrier holds tokens, never addresses.
//!
//! # Invariants
//!
//! - A token is reproducible only from `{secret, epoch, address}` and is
//!   computationally worthless without the secret.
//! - Rotating the epoch invalidates every previously issued token, including
//!   for the same physical address.
//! - The store never exceeds [`TOKEN_STORE_CAPACITY`] entries; when full, the
//!   entry with the largest age is wiped and reused (oldest-wins, not
//!   insertion order).
//! - The all-zero token is a rejected sentinel and is never stored.

use sha2::{Digest, Sha256};
use zeroize::Zeroize;

use crate::signals::RSSI_NOISE_FLOOR;
use crate::timer::{elapsed, Millis};

/// Maximum number of ephemeral tokens tracked at once.
pub const TOKEN_STORE_CAPACITY: usize = 32;

/// Domain-separation tag prepended to every token derivation input.
pub const TOKEN_DOMAIN_TAG: &[u8; 13] = b"rfp:token:v1:";

/// Length of a raw proximity-radio address, in bytes.
pub const ADDRESS_LEN: usize = 6;

const DERIVE_INPUT_LEN: usize = TOKEN_DOMAIN_TAG.len() + 32 + 4 + ADDRESS_LEN;

// ─── Token derivation ───────────────────────────────────────────────────────

/// Derive a session-scoped 32-bit token from a raw radio address.
///
/// Deterministic for a fixed `{secret, epoch, address}` triple; changes
/// whenever the epoch changes. The assembled input buffer and the full digest
/// are wiped before returning — neither should be retained anywhere, but the
/// wipe costs nothing and removes the question.
///
/// Returns `0` only in the astronomically unlikely case that the digest
/// prefix is all-zero; callers treat `0` as an invalid sentinel and must not
/// insert it into the store.
pub fn derive_token(secret: &[u8; 32], epoch: u32, address: &[u8; ADDRESS_LEN]) -> u32 {
    let mut input = [0u8; DERIVE_INPUT_LEN];
    let mut off = 0;
    input[off..off + TOKEN_DOMAIN_TAG.len()].copy_from_slice(TOKEN_DOMAIN_TAG);
    off += TOKEN_DOMAIN_TAG.len();
    input[off..off + 32].copy_from_slice(secret);
    off += 32;
    input[off..off + 4].copy_from_slice(&epoch.to_le_bytes());
    off += 4;
    input[off..off + ADDRESS_LEN].copy_from_slice(address);

    let mut digest = Sha256::digest(&input);
    let token = u32::from_le_bytes([digest[0], digest[1], digest[2], digest[3]]);

    input.zeroize();
    digest.as_mut_slice().zeroize();

    token
}

// ─── SessionToken ───────────────────────────────────────────────────────────

/// One active ephemeral token. Created on first sighting within a session
/// epoch, refreshed on re-sighting, destroyed on eviction, rotation or
/// disable.
///
/// The field set is deliberately minimal: a 6-byte address cannot hide in it,
/// and the conformance layer asserts the size bound at compile time.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Zeroize)]
pub struct SessionToken {
    /// Token value derived by [`derive_token`]. Never zero for a live entry.
    pub token: u32,
    /// Monotonic timestamp of the most recent sighting.
    pub last_seen_ms: Millis,
    /// RSSI of the most recent sighting, in dBm.
    pub rssi: i8,
}

/// Aggregate RSSI statistics over the active tokens.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RssiStats {
    /// Strongest active signal, in dBm.
    pub max: i8,
    /// Mean active signal, in dBm.
    pub mean: i8,
    /// Weakest active signal, in dBm.
    pub min: i8,
}

impl Default for RssiStats {
    fn default() -> Self {
        Self {
            max: RSSI_NOISE_FLOOR,
            mean: RSSI_NOISE_FLOOR,
            min: RSSI_NOISE_FLOOR,
        }
    }
}

// ─── TokenStore ─────────────────────────────────────────────────────────────

/// Fixed-capacity store of active ephemeral tokens with oldest-wins eviction.
///
/// Lookup is a linear scan — at 32 entries that is cheaper and more
/// predictable on a microcontroller than any hashed structure, and it keeps
/// the memory footprint statically bounded.
#[derive(Debug, Default)]
pub struct TokenStore {
    entries: heapless::Vec<SessionToken, TOKEN_STORE_CAPACITY>,
}

impl TokenStore {
    /// Construct an empty store.
    pub const fn new() -> Self {
        Self {
            entries: heapless::Vec::new(),
        }
    }

    /// Record a sighting of `token`: refresh an existing entry, append if
    /// space remains, or evict the entry with the largest age and reuse its
    /// slot (after wiping it).
    ///
    /// Returns `false` for the zero sentinel, which is never stored.
    pub fn touch(&mut self, token: u32, now_ms: Millis, rssi: i8) -> bool {
        if token == 0 {
            return false;
        }

        if let Some(entry) = self.entries.iter_mut().find(|e| e.token == token) {
            entry.last_seen_ms = now_ms;
            entry.rssi = rssi;
            return true;
        }

        let fresh = SessionToken {
            token,
            last_seen_ms: now_ms,
            rssi,
        };
        if self.entries.push(fresh).is_ok() {
            return true;
        }

        // Full: evict the oldest by elapsed age (wrap-safe), wipe before reuse.
        let mut oldest_idx = 0;
        let mut oldest_age = 0u32;
        for (i, entry) in self.entries.iter().enumerate() {
            let age = elapsed(entry.last_seen_ms, now_ms);
            if age >= oldest_age {
                oldest_age = age;
                oldest_idx = i;
            }
        }
        let slot = &mut self.entries[oldest_idx];
        slot.zeroize();
        *slot = fresh;
        true
    }

    /// Number of tokens seen within the last `ttl_ms` milliseconds — the
    /// engine's proxy for "distinct devices currently nearby".
    pub fn count_active(&self, now_ms: Millis, ttl_ms: u32) -> u8 {
        self.entries
            .iter()
            .filter(|e| elapsed(e.last_seen_ms, now_ms) < ttl_ms)
            .count() as u8
    }

    /// RSSI max/mean/min over the active tokens.
    ///
    /// Uses a wide accumulator for the mean; returns noise-floor defaults
    /// when no token is active.
    pub fn rssi_stats(&self, now_ms: Millis, ttl_ms: u32) -> RssiStats {
        let mut sum: i32 = 0;
        let mut max = RSSI_NOISE_FLOOR;
        let mut min = 0i8;
        let mut count = 0u32;

        for entry in &self.entries {
            if elapsed(entry.last_seen_ms, now_ms) < ttl_ms {
                sum += i32::from(entry.rssi);
                if entry.rssi > max {
                    max = entry.rssi;
                }
                if count == 0 || entry.rssi < min {
                    min = entry.rssi;
                }
                count += 1;
            }
        }

        if count == 0 {
            RssiStats::default()
        } else {
            RssiStats {
                max,
                mean: (sum / count as i32) as i8,
                min,
            }
        }
    }

    /// Wipe every entry and empty the store. Used on rotation and disable.
    pub fn clear(&mut self) {
        for entry in self.entries.iter_mut() {
            entry.zeroize();
        }
        self.entries.clear();
    }

    /// Number of stored entries (active or stale).
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// `true` when no entries are stored.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether `token` currently has an entry.
    #[cfg(test)]
    pub(crate) fn contains(&self, token: u32) -> bool {
        self.entries.iter().any(|e| e.token == token)
    }

    /// Iterate stored entries. Conformance-audit hook.
    pub(crate) fn entries(&self) -> impl Iterator<Item = &SessionToken> {
        self.entries.iter()
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────
