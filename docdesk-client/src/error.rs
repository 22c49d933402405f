//! Error type for the docdesk client.

use docdesk_core::{ApiError, TransportError};
use thiserror::Error;

use crate::config::ConfigError;

/// Errors returned by [`DocdeskClient`](crate::DocdeskClient).
#[derive(Debug, Error)]
pub enum ClientError {
    /// An API call failed.
    #[error(transparent)]
    Api(#[from] ApiError),

    /// The configuration could not be loaded or is invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The HTTP transport could not be built.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
}

impl ClientError {
    /// Whether the user has to sign in again before retrying.
    pub fn requires_login(&self) -> bool {
        matches!(self, ClientError::Api(e) if e.requires_login())
    }
}

/// Result type for client operations.
pub type Result<T> = std::result::Result<T, ClientError>;

#[cfg(test)]
mod tests {
    use super::*;
    use docdesk_core::RefreshError;

    #[test]
    fn test_only_expired_sessions_require_login() {
        let expired = ClientError::from(ApiError::from(RefreshError::Abandoned));
        assert!(expired.requires_login());

        let config = ClientError::from(ConfigError::Invalid {
            message: "base_url must be http or https".into(),
        });
        assert!(!config.requires_login());
        assert!(config.to_string().contains("base_url"));
    }
}
