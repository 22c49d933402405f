//! Process-wide holder of the current bearer credential.
//!
//! This module provides:
//! - [`Credential`] - An opaque bearer token that never prints its value
//! - [`CredentialStore`] - A guarded single-value holder with a generation counter
//!
//! Every `set` bumps the generation. The request pipeline records the
//! generation a call was sent with so a late 401 can tell whether the
//! credential has already been replaced since the call left.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

/// An opaque bearer token proving an authenticated session to the API.
///
/// The inner value is only accessible via [`expose()`](Credential::expose).
/// Debug and Display implementations show `[REDACTED]` instead of the value,
/// and the buffer is zeroed on drop.
#[derive(Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Credential(String);

impl Credential {
    /// Wrap a raw token value.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Expose the token value.
    ///
    /// Use sparingly and never log the result.
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Value for the `Authorization` header.
    pub fn bearer_header(&self) -> String {
        format!("Bearer {}", self.0)
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Credential([REDACTED])")
    }
}

impl std::fmt::Display for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl PartialEq for Credential {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl Eq for Credential {}

impl Drop for Credential {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

/// The credential as observed at one instant, tagged with its generation.
#[derive(Debug, Clone)]
pub struct CredentialSnapshot {
    pub credential: Option<Credential>,
    pub generation: u64,
}

/// Guarded holder of the current credential.
///
/// Readers always observe the most recently set value; nothing is cached
/// across calls. Writes happen through the refresh coordinator, which owns
/// the store alongside the refresh state.
///
/// # Thread Safety
///
/// Uses a `parking_lot::RwLock` and is safe to share via `Arc`.
pub struct CredentialStore {
    inner: RwLock<CredentialSnapshot>,
}

impl CredentialStore {
    /// Create an empty store (no credential, generation 0).
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(CredentialSnapshot {
                credential: None,
                generation: 0,
            }),
        }
    }

    /// Current credential, if any.
    pub fn get(&self) -> Option<Credential> {
        self.inner.read().credential.clone()
    }

    /// Replace the credential. Visible to every call built after this returns.
    pub fn set(&self, credential: Option<Credential>) {
        let mut inner = self.inner.write();
        inner.credential = credential;
        inner.generation += 1;
    }

    /// Credential and generation read atomically.
    pub fn snapshot(&self) -> CredentialSnapshot {
        self.inner.read().clone()
    }

    pub fn generation(&self) -> u64 {
        self.inner.read().generation
    }

    pub fn is_present(&self) -> bool {
        self.inner.read().credential.is_some()
    }
}

impl Default for CredentialStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CredentialStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.read();
        f.debug_struct("CredentialStore")
            .field("present", &inner.credential.is_some())
            .field("generation", &inner.generation)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credential_debug_redacted() {
        let credential = Credential::new("super-secret");
        let debug = format!("{:?}", credential);
        assert!(!debug.contains("super-secret"));
        assert!(debug.contains("REDACTED"));
    }

    #[test]
    fn test_credential_display_redacted() {
        let credential = Credential::new("super-secret");
        assert_eq!(format!("{}", credential), "[REDACTED]");
    }

    #[test]
    fn test_bearer_header() {
        assert_eq!(Credential::new("T1").bearer_header(), "Bearer T1");
    }

    #[test]
    fn test_store_starts_empty() {
        let store = CredentialStore::new();
        assert!(store.get().is_none());
        assert!(!store.is_present());
        assert_eq!(store.generation(), 0);
    }

    #[test]
    fn test_store_reads_latest_value() {
        let store = CredentialStore::new();
        store.set(Some(Credential::new("T1")));
        assert_eq!(store.get().unwrap().expose(), "T1");

        store.set(Some(Credential::new("T2")));
        assert_eq!(store.get().unwrap().expose(), "T2");

        store.set(None);
        assert!(store.get().is_none());
    }

    #[test]
    fn test_every_set_bumps_generation() {
        let store = CredentialStore::new();
        store.set(Some(Credential::new("T1")));
        store.set(Some(Credential::new("T1")));
        store.set(None);
        assert_eq!(store.generation(), 3);

        let snapshot = store.snapshot();
        assert!(snapshot.credential.is_none());
        assert_eq!(snapshot.generation, 3);
    }

    #[test]
    fn test_store_debug_hides_token() {
        let store = CredentialStore::new();
        store.set(Some(Credential::new("hidden-token")));
        let debug = format!("{:?}", store);
        assert!(!debug.contains("hidden-token"));
        assert!(debug.contains("present: true"));
    }
}
