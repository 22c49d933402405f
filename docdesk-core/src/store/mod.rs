//! Persistence for the durable refresh cookie.
//!
//! The server keeps the long-lived refresh credential in an httpOnly cookie.
//! A command-line process does not outlive one command, so the cookie header
//! is kept in a [`SessionVault`] between runs:
//! - [`MemoryVault`] - In-memory implementation for tests and one-shot use
//! - [`KeyringVault`] - OS keyring implementation (with `keyring-store` feature)
//! - [`create_vault`] - Helper to select backend based on availability
//!
//! # Example
//!
//! ```rust,ignore
//! use docdesk_core::store::{create_vault, VaultCookie};
//!
//! let vault = create_vault(true, "docdesk");
//! vault.save(&VaultCookie::new("refresh_token=abc")).await?;
//! let restored = vault.load().await?;
//! ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use zeroize::Zeroize;

mod memory;
#[cfg(feature = "keyring-store")]
mod keyring;

pub use memory::MemoryVault;
#[cfg(feature = "keyring-store")]
pub use keyring::KeyringVault;

/// A cookie header value (`name=value; name2=value2`) carrying the durable
/// refresh credential.
///
/// Debug and Display implementations show `[REDACTED]` instead of the value.
#[derive(Clone, Serialize, Deserialize)]
pub struct VaultCookie(String);

impl VaultCookie {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Expose the cookie header.
    ///
    /// Use sparingly and never log the result.
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Individual `name=value` pairs of the header.
    pub fn pairs(&self) -> impl Iterator<Item = &str> {
        self.0
            .split(';')
            .map(str::trim)
            .filter(|pair| !pair.is_empty() && pair.contains('='))
    }
}

impl std::fmt::Debug for VaultCookie {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "VaultCookie([REDACTED])")
    }
}

impl std::fmt::Display for VaultCookie {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl PartialEq for VaultCookie {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl Eq for VaultCookie {}

impl Drop for VaultCookie {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

/// Error type for vault operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The storage backend encountered an error.
    #[error("backend error: {message}")]
    BackendError { message: String },

    /// The keyring backend is not available.
    #[error("keyring not available: {message}")]
    KeyringUnavailable { message: String },
}

/// Storage for the durable refresh cookie.
#[async_trait]
pub trait SessionVault: Send + Sync {
    /// Load the saved cookie.
    ///
    /// Returns `Ok(None)` if nothing was saved.
    async fn load(&self) -> Result<Option<VaultCookie>, StoreError>;

    /// Save the cookie, overwriting any previous value.
    async fn save(&self, cookie: &VaultCookie) -> Result<(), StoreError>;

    /// Forget the cookie.
    ///
    /// Returns `Ok(())` even if nothing was saved.
    async fn clear(&self) -> Result<(), StoreError>;
}

/// Create a session vault with automatic backend selection.
///
/// - If `prefer_keyring` is `true` and the `keyring-store` feature is enabled:
///   - Attempts to create a [`KeyringVault`] under `service_name`
///   - Falls back to [`MemoryVault`] with a warning if keyring is unavailable
/// - Otherwise: Returns [`MemoryVault`]
pub fn create_vault(prefer_keyring: bool, service_name: &str) -> Box<dyn SessionVault> {
    #[cfg(feature = "keyring-store")]
    if prefer_keyring {
        match KeyringVault::try_new(service_name) {
            Ok(vault) => {
                tracing::info!("Using OS keyring for the session vault");
                return Box::new(vault);
            }
            Err(e) => {
                tracing::warn!(
                    "Keyring unavailable ({}), falling back to memory vault. \
                     Sessions will not survive across runs.",
                    e
                );
            }
        }
    }

    #[cfg(not(feature = "keyring-store"))]
    if prefer_keyring {
        tracing::warn!(
            service = service_name,
            "Keyring vault requested but keyring-store feature not enabled. \
             Sessions will not survive across runs."
        );
    }

    tracing::debug!("Using in-memory session vault");
    Box::new(MemoryVault::new())
}
