//! In-memory session vault.

use async_trait::async_trait;
use parking_lot::RwLock;

use super::{SessionVault, StoreError, VaultCookie};

/// In-memory vault for testing and single-process use.
///
/// This vault is not persistent; the cookie is lost when the process exits.
pub struct MemoryVault {
    cookie: RwLock<Option<VaultCookie>>,
}

impl MemoryVault {
    /// Create an empty vault.
    pub fn new() -> Self {
        Self {
            cookie: RwLock::new(None),
        }
    }

    /// Create a vault that already holds a cookie.
    pub fn with_cookie(cookie: VaultCookie) -> Self {
        Self {
            cookie: RwLock::new(Some(cookie)),
        }
    }
}

impl Default for MemoryVault {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MemoryVault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryVault")
            .field("has_cookie", &self.cookie.read().is_some())
            .finish()
    }
}

#[async_trait]
impl SessionVault for MemoryVault {
    async fn load(&self) -> Result<Option<VaultCookie>, StoreError> {
        Ok(self.cookie.read().clone())
    }

    async fn save(&self, cookie: &VaultCookie) -> Result<(), StoreError> {
        *self.cookie.write() = Some(cookie.clone());
        Ok(())
    }

    async fn clear(&self) -> Result<(), StoreError> {
        *self.cookie.write() = None;
        Ok(())
    }
}
