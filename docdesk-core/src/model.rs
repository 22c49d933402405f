//! Domain model types for docdesk.
//!
//! This module defines the wire types exchanged with the auth endpoints:
//! - [`UserIdentity`] - The signed-in user as returned by login and refresh
//! - [`Organization`] / [`Role`] / [`OrganizationRole`] - Identity details
//! - [`SessionGrant`] - `{access_token, token_type, user}` from login/refresh/register
//! - [`LoginPayload`] / [`RegisterPayload`] - Request bodies

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::credential::Credential;

/// Login provider used when none is given.
pub const DEFAULT_PROVIDER: &str = "local";

/// An organization the user belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Organization {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub domain: Option<String>,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

fn default_true() -> bool {
    true
}

/// A named role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

/// One organization/role assignment of a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrganizationRole {
    pub id: Uuid,
    #[serde(default, alias = "organization")]
    pub organization_name: Option<String>,
    #[serde(default, alias = "role")]
    pub role_name: Option<String>,
    pub is_primary: bool,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// The authenticated user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserIdentity {
    pub id: Uuid,
    pub username: String,
    #[serde(default)]
    pub email: Option<String>,
    pub is_active: bool,
    #[serde(default)]
    pub is_superuser: Option<bool>,
    #[serde(default)]
    pub role: Option<Role>,
    #[serde(default)]
    pub organization_roles: Vec<OrganizationRole>,
    #[serde(default)]
    pub primary_organization: Option<Organization>,
    #[serde(default)]
    pub additional_organizations: Vec<Organization>,
}

impl UserIdentity {
    pub fn is_superuser(&self) -> bool {
        self.is_superuser.unwrap_or(false)
    }

    /// Names of every role the user holds across organizations.
    pub fn role_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .organization_roles
            .iter()
            .filter_map(|r| r.role_name.as_deref())
            .collect();
        if let Some(role) = &self.role {
            names.push(role.name.as_str());
        }
        names.sort_unstable();
        names.dedup();
        names
    }
}

impl fmt::Display for UserIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.username, self.id)
    }
}

/// Response of login, register, and the durable refresh endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionGrant {
    pub access_token: Credential,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    pub user: UserIdentity,
}

fn default_token_type() -> String {
    "bearer".to_string()
}

/// Body of `POST /auth/login`.
#[derive(Debug, Clone, Serialize)]
pub struct LoginPayload {
    pub username: String,
    pub password: String,
    pub provider: String,
}

impl LoginPayload {
    /// Password login against the default provider.
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            provider: DEFAULT_PROVIDER.to_string(),
        }
    }

    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = provider.into();
        self
    }
}

/// Body of `POST /auth/register`.
#[derive(Debug, Clone, Serialize)]
pub struct RegisterPayload {
    pub username: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub password: String,
}

/// Body of the logout acknowledgement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogoutResponse {
    pub message: String,
}
