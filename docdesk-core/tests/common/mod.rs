//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use docdesk_core::{HttpTransport, MemoryVault, SessionManager};
use serde_json::{Value, json};
use url::Url;
use wiremock::MockServer;

pub const USER_ID: &str = "5f0c6b8e-3f43-4d8a-9a52-0f4b1c7d2e11";

/// Body of a login or refresh response carrying `token`.
pub fn grant(token: &str) -> Value {
    json!({
        "access_token": token,
        "token_type": "bearer",
        "user": {
            "id": USER_ID,
            "username": "alice",
            "email": "alice@example.com",
            "is_active": true,
            "is_superuser": false,
            "role": {"id": "0b7f2f2e-5d6a-4c1b-9f0e-3a2b1c0d9e8f", "name": "admin"},
            "organization_roles": [],
            "additional_organizations": []
        }
    })
}

pub fn base_url(server: &MockServer) -> Url {
    Url::parse(&format!("{}/api", server.uri())).unwrap()
}

/// Manager over a real HTTP transport pointed at `server`.
pub fn manager(
    server: &MockServer,
    vault: Arc<MemoryVault>,
    refresh_timeout: Duration,
) -> Arc<SessionManager> {
    let transport = HttpTransport::with_timeout(Duration::from_secs(5)).unwrap();
    Arc::new(
        SessionManager::new(&base_url(server), Arc::new(transport), vault, refresh_timeout)
            .unwrap(),
    )
}
