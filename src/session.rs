//! Session secret, epoch, and the persistence boundary.
//!
//! The device secret and session epoch are the only long-lived inputs to
//! token derivation. The secret is generated once from the platform's
//! hardware RNG and lives in the key-value collaborator; the epoch counts
//! session rotations. Rotating the epoch is the mechanism that bounds
//! cross-session correlation: no token computed before a rotation matches any
//! token computed after, even for the same physical address.
//!
//! Storage failures degrade, never crash: a secret that cannot be persisted
//! is still valid for the current power cycle, and a missing epoch starts
//! at zero.

use rand_core::RngCore;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::settings::SESSION_ROTATE_MS;
use crate::timer::{has_elapsed, Millis};

/// Key for the persisted 32-byte device secret.
pub const KEY_SECRET: &str = "rf_secret";
/// Key for the persisted session epoch.
pub const KEY_EPOCH: &str = "rf_epoch";
/// Key for the persisted settings blob.
pub const KEY_SETTINGS: &str = "rf_settings";

// ─── Persistence boundary ───────────────────────────────────────────────────

/// Why a key-value operation failed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StoreError {
    /// No value stored under the key.
    Missing,
    /// The backend rejected or lost the operation.
    Backend,
}

impl core::fmt::Display for StoreError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Missing => f.write_str("key not found"),
            Self::Backend => f.write_str("storage backend error"),
        }
    }
}

/// Durable key-value storage, implemented by the platform (e.g. NVS flash).
///
/// The engine stores three things: the device secret, the epoch, and the
/// settings blob. Implementations need not be transactional; the engine
/// tolerates lost writes by design.
pub trait KeyValueStore {
    /// Read a blob into `out`. Returns the number of bytes read.
    fn get_blob(&mut self, key: &str, out: &mut [u8]) -> Result<usize, StoreError>;
    /// Write a blob.
    fn put_blob(&mut self, key: &str, value: &[u8]) -> Result<(), StoreError>;
    /// Read a `u32`.
    fn get_u32(&mut self, key: &str) -> Result<u32, StoreError>;
    /// Write a `u32`.
    fn put_u32(&mut self, key: &str, value: u32) -> Result<(), StoreError>;
}

// ─── DeviceSecret ───────────────────────────────────────────────────────────

/// The per-device 32-byte random secret behind token derivation.
///
/// Wiped automatically on drop. An all-zero secret is treated as corrupt
/// (it is the value an erased flash page reads back as) and regenerated.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct DeviceSecret([u8; 32]);

impl DeviceSecret {
    /// Generate a fresh secret from the hardware RNG.
    pub fn generate<R: RngCore>(rng: &mut R) -> Self {
        let mut bytes = [0u8; 32];
        rng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Wrap previously persisted secret bytes.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Borrow the raw bytes for token derivation.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// `true` when every byte is zero — uninitialized or corrupt storage.
    pub fn is_all_zero(&self) -> bool {
        self.0.iter().all(|&b| b == 0)
    }
}

impl core::fmt::Debug for DeviceSecret {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        // The secret never appears in logs or debug output.
        f.write_str("DeviceSecret(..)")
    }
}

// ─── SessionState ───────────────────────────────────────────────────────────

/// The rotating session scope: secret, epoch, and rotation clock.
#[derive(Debug)]
pub struct SessionState {
    /// Monotonically increasing rotation counter.
    epoch: u32,
    /// When the current session began.
    session_start_ms: Millis,
    secret: DeviceSecret,
}

impl SessionState {
    /// Load the secret and epoch from storage, generating and persisting a
    /// fresh secret when storage is empty or reads back all-zero.
    pub fn load_or_create<S: KeyValueStore, R: RngCore>(
        store: &mut S,
        rng: &mut R,
        now_ms: Millis,
    ) -> Self {
        let mut bytes = [0u8; 32];
        let loaded = matches!(store.get_blob(KEY_SECRET, &mut bytes), Ok(32));
        let mut secret = DeviceSecret::from_bytes(bytes);
        bytes.zeroize();

        if !loaded || secret.is_all_zero() {
            if loaded {
                log::error!(
                    target: "rf_presence",
                    "device secret is all-zero (corrupt storage), regenerating"
                );
            }
            secret = DeviceSecret::generate(rng);
            if store.put_blob(KEY_SECRET, secret.as_bytes()).is_err() {
                // Valid for this power cycle even if it cannot be persisted.
                log::warn!(target: "rf_presence", "failed to persist device secret");
            }
        }

        let epoch = store.get_u32(KEY_EPOCH).unwrap_or(0);
        Self {
            epoch,
            session_start_ms: now_ms,
            secret,
        }
    }

    /// Current session epoch.
    pub fn epoch(&self) -> u32 {
        self.epoch
    }

    /// Borrow the secret bytes for token derivation.
    pub fn secret(&self) -> &[u8; 32] {
        self.secret.as_bytes()
    }

    /// `true` once the automatic rotation interval has elapsed.
    pub fn due_for_rotation(&self, now_ms: Millis) -> bool {
        has_elapsed(self.session_start_ms, now_ms, SESSION_ROTATE_MS)
    }

    /// Increment and persist the epoch; restart the session clock.
    ///
    /// The caller (the engine) is responsible for clearing the token store,
    /// observation buffer and signal counters alongside this.
    pub fn advance_epoch<S: KeyValueStore>(&mut self, store: &mut S, now_ms: Millis) {
        self.epoch = self.epoch.wrapping_add(1);
        self.session_start_ms = now_ms;
        if store.put_u32(KEY_EPOCH, self.epoch).is_err() {
            log::warn!(target: "rf_presence", "failed to persist session epoch");
        }
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────
