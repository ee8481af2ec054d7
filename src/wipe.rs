//! Secure memory erasure.
//!
//! Discarded tokens, observations and the device secret are privacy-relevant
//! even after they stop being referenced: stale timestamps and RSSI values in
//! freed slots could support coarse timing correlation, and the secret must
//! never outlive its use. Everything sensitive is therefore *overwritten*, not
//! merely dropped.
//!
//! The actual clearing is delegated to the [`zeroize`] crate, which performs
//! the writes through a volatile pointer followed by a compiler fence so the
//! optimizer cannot elide them as dead stores. This crate stays
//! `#![deny(unsafe_code)]`; the one unavoidable volatile write lives in
//! `zeroize`, behind its audited API.
//!
//! Sensitive structs derive [`Zeroize`] and are cleared in place wherever a
//! slot is reused; [`wipe_bytes`] covers raw scratch buffers (hash inputs,
//! digest output, the secret on teardown).

pub use zeroize::Zeroize;

/// Overwrite a byte buffer with zeros, guaranteed not to be optimized away.
///
/// Equivalent to `buf.zeroize()`; provided as a named entry point so callers
/// that wipe raw scratch buffers read as what they are doing.
#[inline]
pub fn wipe_bytes(buf: &mut [u8]) {
    buf.zeroize();
}

// ─── Tests ──────────────────────────────────────────────────────────────────
