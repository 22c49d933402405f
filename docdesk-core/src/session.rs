//! Session lifecycle: bootstrap, login, logout, and the consumer view.
//!
//! [`SessionManager`] wires the auth endpoints, the refresh coordinator, and
//! the request pipeline together over one transport and one vault.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::OnceCell;
use tracing::{debug, info, warn};
use url::Url;

use crate::auth::{AuthApi, AuthEndpoints, Refresher, with_trailing_slash};
use crate::coordinator::RefreshCoordinator;
use crate::credential::{Credential, CredentialStore};
use crate::error::{ApiError, RefreshError, TransportError};
use crate::model::{LoginPayload, RegisterPayload, UserIdentity};
use crate::pipeline::RequestPipeline;
use crate::request::{ApiRequest, ApiResponse};
use crate::store::SessionVault;
use crate::transport::Transport;

/// What route guards and other consumers see.
#[derive(Debug, Clone)]
pub struct Session {
    pub credential: Option<Credential>,
    pub user: Option<UserIdentity>,
    /// True until the load-time bootstrap has settled.
    pub is_bootstrapping: bool,
}

impl Session {
    pub fn is_authenticated(&self) -> bool {
        self.credential.is_some() && self.user.is_some()
    }

    /// Send the user to the login surface. Never while bootstrap is pending.
    pub fn should_redirect_to_login(&self) -> bool {
        !self.is_bootstrapping && !self.is_authenticated()
    }
}

/// Owns one authenticated session against one API base URL.
pub struct SessionManager {
    base_url: Url,
    auth: Arc<AuthApi>,
    coordinator: Arc<RefreshCoordinator>,
    pipeline: RequestPipeline,
    bootstrapped: OnceCell<()>,
    refresh_timeout: Duration,
}

impl SessionManager {
    pub fn new(
        base_url: &Url,
        transport: Arc<dyn Transport>,
        vault: Arc<dyn SessionVault>,
        refresh_timeout: Duration,
    ) -> Result<Self, TransportError> {
        let endpoints = AuthEndpoints::under(base_url)?;
        let auth = Arc::new(AuthApi::new(transport.clone(), endpoints, vault));
        let coordinator = Arc::new(RefreshCoordinator::new(
            Arc::new(CredentialStore::new()),
            auth.clone(),
            refresh_timeout,
        ));
        let pipeline = RequestPipeline::new(transport, coordinator.clone());

        Ok(Self {
            base_url: with_trailing_slash(base_url),
            auth,
            coordinator,
            pipeline,
            bootstrapped: OnceCell::new(),
            refresh_timeout,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Resolve an API path (`admin/users` or `/admin/users`) under the base URL.
    pub fn endpoint(&self, path: &str) -> Result<Url, ApiError> {
        self.base_url
            .join(path.trim_start_matches('/'))
            .map_err(|e| {
                ApiError::from(TransportError::InvalidRequest {
                    message: format!("invalid path {}: {}", path, e),
                })
            })
    }

    pub fn coordinator(&self) -> &Arc<RefreshCoordinator> {
        &self.coordinator
    }

    /// Send a request through the authenticated pipeline.
    pub async fn execute(&self, request: ApiRequest) -> Result<ApiResponse, ApiError> {
        self.pipeline.execute(request).await
    }

    /// Resolve the session from the durable refresh cookie.
    ///
    /// Runs the refresh at most once per manager; concurrent and later
    /// callers share that outcome. Never fails: any refresh error leaves an
    /// anonymous session. A failed bootstrap does not count as a session
    /// termination. A login, register, or logout that lands while the
    /// refresh is in flight wins over its outcome.
    pub async fn bootstrap(&self) -> Session {
        self.bootstrapped
            .get_or_init(|| async {
                let epoch = self.coordinator.epoch();
                let restored = self.auth.restore_cookie().await;
                debug!(restored, "bootstrapping session");

                let outcome =
                    match tokio::time::timeout(self.refresh_timeout, self.auth.refresh()).await {
                        Ok(result) => result,
                        Err(_) => Err(RefreshError::Timeout {
                            after_ms: self.refresh_timeout.as_millis() as u64,
                        }),
                    };

                let installed = match outcome {
                    Ok(grant) => {
                        let username = grant.user.username.clone();
                        let installed = self.coordinator.establish_if(epoch, Some(grant));
                        if installed {
                            info!(user = %username, "session restored");
                        }
                        installed
                    }
                    Err(e) => {
                        debug!(error = %e, "no session to restore");
                        self.coordinator.establish_if(epoch, None)
                    }
                };
                if !installed {
                    debug!("session changed during bootstrap, keeping it");
                    // A rejected bootstrap refresh cleared the vault.
                    self.auth.persist_cookie().await;
                }
            })
            .await;
        self.get_session()
    }

    pub fn get_session(&self) -> Session {
        let (credential, user) = self.coordinator.session();
        Session {
            credential,
            user,
            is_bootstrapping: !self.bootstrapped.initialized(),
        }
    }

    pub async fn login(&self, credentials: &LoginPayload) -> Result<Session, ApiError> {
        let grant = self.auth.login(credentials).await?;
        info!(user = %grant.user.username, "signed in");
        self.coordinator.establish(Some(grant));
        self.settle_bootstrap();
        Ok(self.get_session())
    }

    pub async fn register(&self, payload: &RegisterPayload) -> Result<Session, ApiError> {
        let grant = self.auth.register(payload).await?;
        info!(user = %grant.user.username, "registered and signed in");
        self.coordinator.establish(Some(grant));
        self.settle_bootstrap();
        Ok(self.get_session())
    }

    /// Sign out. Local state and the vault are cleared even when the server
    /// call fails.
    pub async fn logout(&self) {
        if let Err(e) = self.auth.logout().await {
            warn!(error = %e, "logout request failed, clearing local session anyway");
        }
        self.coordinator.establish(None);
        self.settle_bootstrap();
        info!("signed out");
    }

    /// Register a callback for terminal refresh failures.
    pub fn on_session_terminated(&self, callback: impl Fn(&RefreshError) + Send + Sync + 'static) {
        self.coordinator.on_session_terminated(callback);
    }

    pub fn terminated_count(&self) -> u64 {
        self.coordinator.terminations()
    }

    fn settle_bootstrap(&self) {
        // Already set, or a bootstrap is running and will set it.
        let _ = self.bootstrapped.set(());
    }
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("base_url", &self.base_url.as_str())
            .field("coordinator", &self.coordinator)
            .field("bootstrapped", &self.bootstrapped.initialized())
            .finish()
    }
}
