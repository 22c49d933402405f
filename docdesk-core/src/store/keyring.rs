//! OS keyring-backed session vault.

use async_trait::async_trait;
use keyring::Entry;

use super::{SessionVault, StoreError, VaultCookie};

/// Keyring user under which the refresh cookie is stored.
const COOKIE_ENTRY: &str = "refresh-cookie";

/// OS keyring-backed session vault.
///
/// This vault uses the platform's native keyring service:
/// - macOS: Keychain
/// - Linux: kernel keyutils (session keyring)
/// - Windows: Credential Manager
///
/// The cookie is stored as the password of entry `{service_name}` /
/// `refresh-cookie`.
pub struct KeyringVault {
    service_name: String,
}

impl KeyringVault {
    /// Try to create a new keyring vault.
    ///
    /// Returns an error if the keyring backend is not available on this platform.
    pub fn try_new(service_name: &str) -> Result<Self, StoreError> {
        match Entry::new(service_name, COOKIE_ENTRY) {
            Ok(_) => Ok(Self {
                service_name: service_name.to_string(),
            }),
            Err(e) => Err(StoreError::KeyringUnavailable {
                message: format!("keyring backend not available: {}", e),
            }),
        }
    }

    fn entry(&self) -> Result<Entry, StoreError> {
        Entry::new(&self.service_name, COOKIE_ENTRY).map_err(|e| StoreError::BackendError {
            message: format!("failed to create keyring entry: {}", e),
        })
    }
}

impl std::fmt::Debug for KeyringVault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyringVault")
            .field("service_name", &self.service_name)
            .finish()
    }
}

#[async_trait]
impl SessionVault for KeyringVault {
    async fn load(&self) -> Result<Option<VaultCookie>, StoreError> {
        match self.entry()?.get_password() {
            Ok(value) => Ok(Some(VaultCookie::new(value))),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(keyring::Error::PlatformFailure(e)) => Err(StoreError::BackendError {
                message: format!("platform keyring failure: {}", e),
            }),
            Err(e) => Err(StoreError::BackendError {
                message: format!("keyring error: {}", e),
            }),
        }
    }

    async fn save(&self, cookie: &VaultCookie) -> Result<(), StoreError> {
        self.entry()?
            .set_password(cookie.expose())
            .map_err(|e| StoreError::BackendError {
                message: format!("failed to set keyring password: {}", e),
            })
    }

    async fn clear(&self) -> Result<(), StoreError> {
        match self.entry()?.delete_credential() {
            Ok(()) => Ok(()),
            Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(StoreError::BackendError {
                message: format!("failed to delete keyring entry: {}", e),
            }),
        }
    }
}
