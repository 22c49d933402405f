//! # Docdesk Core
//!
//! Authenticated request pipeline for the docdesk admin API.
//!
//! This crate provides:
//! - A process-wide [`CredentialStore`] holding the current bearer token
//! - A [`RequestPipeline`] that attaches the token and detects 401s
//! - A single-flight [`RefreshCoordinator`] that refreshes once for any number
//!   of concurrently rejected calls and replays them with the new token
//! - A [`SessionManager`] that bootstraps, signs in, and signs out
//! - Session vaults that keep the durable refresh cookie between runs
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use docdesk_core::{HttpTransport, LoginPayload, MemoryVault, SessionManager, ApiRequest};
//!
//! let base = url::Url::parse("http://localhost:8000/api")?;
//! let manager = SessionManager::new(
//!     &base,
//!     Arc::new(HttpTransport::new()?),
//!     Arc::new(MemoryVault::new()),
//!     docdesk_core::DEFAULT_REFRESH_TIMEOUT,
//! )?;
//!
//! manager.bootstrap().await;
//! manager.login(&LoginPayload::new("alice", "secret")).await?;
//! let users = manager.execute(ApiRequest::get(manager.endpoint("admin/users")?)).await?;
//! ```

pub mod auth;
pub mod coordinator;
pub mod credential;
pub mod error;
pub mod model;
pub mod pipeline;
pub mod request;
pub mod session;
pub mod store;
pub mod transport;

// Re-export commonly used types at crate root
pub use auth::{AuthApi, AuthEndpoints, Refresher};

pub use coordinator::{
    DEFAULT_REFRESH_TIMEOUT,
    RefreshCoordinator,
    RefreshState,
    TerminationCallback,
};

pub use credential::{Credential, CredentialSnapshot, CredentialStore};

pub use error::{
    ApiError,
    FieldError,
    RefreshError,
    TransportError,
};

pub use model::{
    LoginPayload,
    LogoutResponse,
    Organization,
    OrganizationRole,
    RegisterPayload,
    Role,
    SessionGrant,
    UserIdentity,
};

pub use pipeline::RequestPipeline;

pub use request::{ApiRequest, ApiResponse, Call};

pub use session::{Session, SessionManager};

pub use store::{
    MemoryVault,
    SessionVault,
    StoreError,
    VaultCookie,
    create_vault,
};

#[cfg(feature = "keyring-store")]
pub use store::KeyringVault;

pub use transport::{DEFAULT_REQUEST_TIMEOUT, HttpTransport, Transport};
