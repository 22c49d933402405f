//! Calls to the `/auth` endpoints.
//!
//! These calls go straight to the transport and never through the request
//! pipeline: a 401 from login or from the refresh endpoint itself must not be
//! queued behind a refresh.
//!
//! After every grant (login, register, refresh) the refresh cookie the
//! server set is copied into the [`SessionVault`]; logout clears it.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};
use url::Url;

use crate::error::{ApiError, RefreshError, TransportError, parse_detail};
use crate::model::{LoginPayload, LogoutResponse, RegisterPayload, SessionGrant};
use crate::request::{ApiRequest, ApiResponse};
use crate::store::SessionVault;
use crate::transport::Transport;

/// Mints a new access credential from the durable refresh mechanism.
#[async_trait]
pub trait Refresher: Send + Sync {
    async fn refresh(&self) -> Result<SessionGrant, RefreshError>;
}

/// URLs of the auth endpoints under one API base.
#[derive(Debug, Clone)]
pub struct AuthEndpoints {
    pub login: Url,
    pub logout: Url,
    pub refresh: Url,
    pub register: Url,
}

impl AuthEndpoints {
    /// Resolve the endpoints under `base` (for example `http://host/api`).
    pub fn under(base: &Url) -> Result<Self, TransportError> {
        let root = with_trailing_slash(base);
        let join = |path: &str| {
            root.join(path).map_err(|e| TransportError::InvalidRequest {
                message: format!("invalid auth endpoint {}: {}", path, e),
            })
        };
        Ok(Self {
            login: join("auth/login")?,
            logout: join("auth/logout")?,
            refresh: join("auth/refresh")?,
            register: join("auth/register")?,
        })
    }
}

/// Ensure `base` ends with `/` so relative joins keep its last segment.
pub fn with_trailing_slash(base: &Url) -> Url {
    let mut root = base.clone();
    if !root.path().ends_with('/') {
        let path = format!("{}/", root.path());
        root.set_path(&path);
    }
    root
}

/// Client for the `/auth` endpoints.
pub struct AuthApi {
    transport: Arc<dyn Transport>,
    endpoints: AuthEndpoints,
    vault: Arc<dyn SessionVault>,
}

impl AuthApi {
    pub fn new(
        transport: Arc<dyn Transport>,
        endpoints: AuthEndpoints,
        vault: Arc<dyn SessionVault>,
    ) -> Self {
        Self {
            transport,
            endpoints,
            vault,
        }
    }

    pub fn endpoints(&self) -> &AuthEndpoints {
        &self.endpoints
    }

    /// Exchange a username and password for a session grant.
    pub async fn login(&self, payload: &LoginPayload) -> Result<SessionGrant, ApiError> {
        let request = ApiRequest::post(self.endpoints.login.clone()).json(payload)?;
        let grant = self.grant_from(self.transport.send(request).await?)?;
        self.persist_cookie().await;
        Ok(grant)
    }

    /// Create an account and sign in as it.
    pub async fn register(&self, payload: &RegisterPayload) -> Result<SessionGrant, ApiError> {
        let request = ApiRequest::post(self.endpoints.register.clone()).json(payload)?;
        let grant = self.grant_from(self.transport.send(request).await?)?;
        self.persist_cookie().await;
        Ok(grant)
    }

    /// Ask the server to drop the refresh cookie, then forget the local copy.
    ///
    /// The vault is cleared even when the server call fails.
    pub async fn logout(&self) -> Result<LogoutResponse, ApiError> {
        let request = ApiRequest::post(self.endpoints.logout.clone());
        let result = match self.transport.send(request).await {
            Ok(response) => response.error_for_status().and_then(|r| r.json()),
            Err(e) => Err(ApiError::from(e)),
        };
        self.forget_cookie().await;
        result
    }

    /// Load the saved refresh cookie into the transport.
    ///
    /// Returns whether a cookie was restored.
    pub async fn restore_cookie(&self) -> bool {
        match self.vault.load().await {
            Ok(Some(cookie)) => {
                self.transport
                    .restore_cookies(&self.endpoints.refresh, &cookie);
                debug!("restored refresh cookie from vault");
                true
            }
            Ok(None) => false,
            Err(e) => {
                warn!(error = %e, "failed to load refresh cookie from vault");
                false
            }
        }
    }

    /// Drop the saved refresh cookie.
    pub async fn forget_cookie(&self) {
        if let Err(e) = self.vault.clear().await {
            warn!(error = %e, "failed to clear refresh cookie from vault");
        }
    }

    /// Copy the refresh cookie the transport holds into the vault.
    pub async fn persist_cookie(&self) {
        let Some(cookie) = self.transport.cookies_for(&self.endpoints.refresh) else {
            return;
        };
        if let Err(e) = self.vault.save(&cookie).await {
            warn!(error = %e, "failed to persist refresh cookie");
        }
    }

    fn grant_from(&self, response: ApiResponse) -> Result<SessionGrant, ApiError> {
        response.error_for_status()?.json()
    }
}

#[async_trait]
impl Refresher for AuthApi {
    async fn refresh(&self) -> Result<SessionGrant, RefreshError> {
        let request = ApiRequest::get(self.endpoints.refresh.clone());
        let response = self.transport.send(request).await?;

        if !response.is_success() {
            let (detail, _) = parse_detail(&response.body);
            if response.is_auth_failure() {
                // The saved cookie is dead; do not offer it again next run.
                self.forget_cookie().await;
            }
            return Err(RefreshError::Rejected {
                status: response.status.as_u16(),
                detail,
            });
        }

        let grant: SessionGrant =
            serde_json::from_slice(&response.body).map_err(|e| RefreshError::Malformed {
                message: e.to_string(),
            })?;
        self.persist_cookie().await;
        Ok(grant)
    }
}
