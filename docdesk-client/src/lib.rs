//! Docdesk Client Library
//!
//! A typed client for the docdesk admin API built on the authenticated
//! request pipeline in `docdesk-core`.
//!
//! # Features
//!
//! - **Transparent refresh**: expired access tokens are refreshed once for
//!   all calls in flight, and the calls are replayed
//! - **Durable sessions**: the refresh cookie is kept in the OS keyring
//!   between runs (feature `keyring-store`, on by default)
//! - **Configuration**: `config.toml` plus environment overrides
//! - **Admin wrappers**: users, organizations, departments, and roles
//!
//! # Quick Start
//!
//! ```no_run
//! use docdesk_client::{DocdeskClient, PageQuery};
//!
//! #[tokio::main]
//! async fn main() -> docdesk_client::Result<()> {
//!     let client = DocdeskClient::builder()
//!         .base_url("http://localhost:8000/api".parse().unwrap())
//!         .build()?;
//!
//!     client.login("alice", "secret").await?;
//!     let organizations = client.organizations(&PageQuery::new(1, 50)).await?;
//!     for organization in organizations.items {
//!         println!("{}", organization.name);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Session Termination
//!
//! When a refresh fails the session is over. Register a callback to react:
//!
//! ```no_run
//! # let client = docdesk_client::DocdeskClient::builder().build().unwrap();
//! client.on_session_terminated(|error| {
//!     eprintln!("signed out: {}", error);
//! });
//! ```

mod client;
pub mod config;
mod error;
pub mod resources;

pub use client::{DocdeskClient, DocdeskClientBuilder};
pub use config::{ClientConfig, ConfigError, VaultBackend};
pub use error::{ClientError, Result};
pub use resources::{Department, Page, PageQuery};

pub use docdesk_core::{
    ApiError, Organization, RefreshError, RegisterPayload, Role, Session, UserIdentity,
};
