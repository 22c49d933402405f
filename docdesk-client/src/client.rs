use std::sync::Arc;
use std::time::Duration;

use docdesk_core::{
    ApiRequest, ApiResponse, DEFAULT_REFRESH_TIMEOUT, DEFAULT_REQUEST_TIMEOUT, HttpTransport,
    LoginPayload, MemoryVault, RefreshError, RegisterPayload, Session, SessionManager,
    SessionVault, Transport, create_vault,
};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;
use url::Url;

use crate::config::{ClientConfig, VaultBackend};
use crate::error::Result;

/// Client for the docdesk API.
///
/// Every call goes through the authenticated pipeline: an expired access
/// token is refreshed once, shared by all calls in flight, and the call is
/// replayed. Only when the refresh itself fails does a call return an error
/// for which [`ClientError::requires_login`](crate::ClientError::requires_login)
/// is true.
///
/// # Example
///
/// ```no_run
/// use docdesk_client::{ClientConfig, DocdeskClient, PageQuery};
///
/// #[tokio::main]
/// async fn main() -> docdesk_client::Result<()> {
///     let config = ClientConfig::load(None)?;
///     let client = DocdeskClient::from_config(&config)?;
///
///     let session = client.bootstrap().await;
///     if session.should_redirect_to_login() {
///         client.login("alice", "secret").await?;
///     }
///
///     let users = client.users(&PageQuery::default(), None).await?;
///     println!("{} users", users.total);
///     Ok(())
/// }
/// ```
pub struct DocdeskClient {
    session: SessionManager,
}

impl DocdeskClient {
    pub fn builder() -> DocdeskClientBuilder {
        DocdeskClientBuilder::default()
    }

    /// Build a client over HTTP from loaded configuration.
    pub fn from_config(config: &ClientConfig) -> Result<Self> {
        let vault: Arc<dyn SessionVault> = Arc::from(create_vault(
            config.vault == VaultBackend::Keyring,
            &config.keyring_service,
        ));
        Self::builder()
            .base_url(config.base_url()?)
            .vault(vault)
            .request_timeout(config.request_timeout())
            .refresh_timeout(config.refresh_timeout())
            .build()
    }

    pub fn session_manager(&self) -> &SessionManager {
        &self.session
    }

    /// Restore the session from the saved refresh cookie, once.
    pub async fn bootstrap(&self) -> Session {
        self.session.bootstrap().await
    }

    pub fn session(&self) -> Session {
        self.session.get_session()
    }

    pub async fn login(&self, username: &str, password: &str) -> Result<Session> {
        Ok(self
            .session
            .login(&LoginPayload::new(username, password))
            .await?)
    }

    pub async fn register(&self, payload: &RegisterPayload) -> Result<Session> {
        Ok(self.session.register(payload).await?)
    }

    pub async fn logout(&self) {
        self.session.logout().await
    }

    pub fn on_session_terminated(&self, callback: impl Fn(&RefreshError) + Send + Sync + 'static) {
        self.session.on_session_terminated(callback)
    }

    pub fn terminated_count(&self) -> u64 {
        self.session.terminated_count()
    }

    /// `GET` an API path and decode the JSON body.
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.get_json_with(path, Vec::<(String, String)>::new()).await
    }

    /// `GET` with query parameters.
    pub async fn get_json_with<T, K, V>(
        &self,
        path: &str,
        query: impl IntoIterator<Item = (K, V)>,
    ) -> Result<T>
    where
        T: DeserializeOwned,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let request = self.request(ApiRequest::get, path)?.query(query);
        Ok(self.send(request).await?.json()?)
    }

    pub async fn post_json<B, T>(&self, path: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let request = self.request(ApiRequest::post, path)?.json(body)?;
        Ok(self.send(request).await?.json()?)
    }

    pub async fn put_json<B, T>(&self, path: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let request = self.request(ApiRequest::put, path)?.json(body)?;
        Ok(self.send(request).await?.json()?)
    }

    /// `POST` without a body, ignoring the response body.
    pub async fn post_action(&self, path: &str) -> Result<()> {
        let request = self.request(ApiRequest::post, path)?;
        self.send(request).await?;
        Ok(())
    }

    /// `DELETE` an API path, ignoring the response body.
    pub async fn delete(&self, path: &str) -> Result<()> {
        let request = self.request(ApiRequest::delete, path)?;
        self.send(request).await?;
        Ok(())
    }

    fn request(&self, build: fn(Url) -> ApiRequest, path: &str) -> Result<ApiRequest> {
        Ok(build(self.session.endpoint(path)?))
    }

    async fn send(&self, request: ApiRequest) -> Result<ApiResponse> {
        debug!(request = %request.describe(), "calling api");
        Ok(self.session.execute(request).await?)
    }
}

impl std::fmt::Debug for DocdeskClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocdeskClient")
            .field("session", &self.session)
            .finish()
    }
}

/// Builder for [`DocdeskClient`].
///
/// Defaults: `http://localhost:8000/api`, an HTTP transport, and a memory
/// vault.
pub struct DocdeskClientBuilder {
    base_url: Option<Url>,
    transport: Option<Arc<dyn Transport>>,
    vault: Option<Arc<dyn SessionVault>>,
    request_timeout: Duration,
    refresh_timeout: Duration,
}

impl Default for DocdeskClientBuilder {
    fn default() -> Self {
        Self {
            base_url: None,
            transport: None,
            vault: None,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            refresh_timeout: DEFAULT_REFRESH_TIMEOUT,
        }
    }
}

impl DocdeskClientBuilder {
    pub fn base_url(mut self, base_url: Url) -> Self {
        self.base_url = Some(base_url);
        self
    }

    /// Use a custom transport instead of HTTP.
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn vault(mut self, vault: Arc<dyn SessionVault>) -> Self {
        self.vault = Some(vault);
        self
    }

    /// Per-call timeout of the default HTTP transport.
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn refresh_timeout(mut self, timeout: Duration) -> Self {
        self.refresh_timeout = timeout;
        self
    }

    pub fn build(self) -> Result<DocdeskClient> {
        let base_url = match self.base_url {
            Some(url) => url,
            None => ClientConfig::default().base_url()?,
        };
        let transport: Arc<dyn Transport> = match self.transport {
            Some(transport) => transport,
            None => Arc::new(HttpTransport::with_timeout(self.request_timeout)?),
        };
        let vault: Arc<dyn SessionVault> = match self.vault {
            Some(vault) => vault,
            None => Arc::new(MemoryVault::new()),
        };

        let session = SessionManager::new(&base_url, transport, vault, self.refresh_timeout)?;
        Ok(DocdeskClient { session })
    }
}
