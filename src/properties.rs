//! Process-wide string property store.
//!
//! The patched handshake and authentication methods communicate through a
//! single well-known key: the handshake patch writes the fingerprint it
//! extracted from the referral token, and the fingerprint patch prefers that
//! value over the original computation. The store mirrors the host's system
//! property semantics: string keys, string values, process lifetime, no
//! expiry, last-write-wins.
//!
//! The store is a single global slot with no per-connection scoping.
//! Concurrent handshakes from different peers therefore race on the same key;
//! the host protocol orders the grant exchange before the fingerprint query
//! for each logical connection, which is the only ordering this design relies
//! on. See DESIGN.md for the decision to preserve this shape.

use std::sync::OnceLock;

use dashmap::DashMap;

/// Well-known key carrying the proxy certificate fingerprint between the
/// handshake injection and the fingerprint override.
pub const PROXY_FINGERPRINT_KEY: &str = "lineage.proxy.fingerprint";

/// A string-keyed, string-valued mutable property map.
///
/// Use [`PropertyStore::global`] for the process-wide instance that patched
/// method bodies consult at runtime. Separate instances can be constructed for
/// tests that need isolated state.
///
/// # Examples
///
/// ```rust
/// use lineage_agent::properties::{PropertyStore, PROXY_FINGERPRINT_KEY};
///
/// let store = PropertyStore::new();
/// assert_eq!(store.get(PROXY_FINGERPRINT_KEY), None);
///
/// store.set(PROXY_FINGERPRINT_KEY, "abc123");
/// assert_eq!(store.get(PROXY_FINGERPRINT_KEY).as_deref(), Some("abc123"));
/// ```
pub struct PropertyStore {
    entries: DashMap<String, String>,
}

impl PropertyStore {
    /// Creates an empty property store.
    #[must_use]
    pub fn new() -> Self {
        PropertyStore {
            entries: DashMap::new(),
        }
    }

    /// Returns the process-wide store instance.
    ///
    /// The instance lives for the remainder of the process once touched.
    #[must_use]
    pub fn global() -> &'static PropertyStore {
        static GLOBAL: OnceLock<PropertyStore> = OnceLock::new();
        GLOBAL.get_or_init(PropertyStore::new)
    }

    /// Looks up the value stored under `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<String> {
        self.entries.get(key).map(|entry| entry.value().clone())
    }

    /// Stores `value` under `key`, replacing any previous value.
    ///
    /// Concurrent writers to the same key race with last-write-wins semantics;
    /// no ordering is guaranteed beyond what callers impose externally.
    pub fn set(&self, key: &str, value: &str) {
        self.entries.insert(key.to_string(), value.to_string());
    }

    /// Removes the value stored under `key`, returning it if present.
    pub fn remove(&self, key: &str) -> Option<String> {
        self.entries.remove(key).map(|(_, value)| value)
    }
}

impl Default for PropertyStore {
    fn default() -> Self {
        Self::new()
    }
}
