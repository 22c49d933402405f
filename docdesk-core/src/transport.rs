//! Sending requests over the wire.
//!
//! [`Transport`] is the seam between the pipeline and the network. The
//! production implementation, [`HttpTransport`], wraps a `reqwest::Client`
//! with a cookie jar so the server-set refresh cookie rides along on the
//! refresh call, exactly like a browser would send it.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use reqwest::cookie::{CookieStore, Jar};
use tracing::{debug, trace};
use url::Url;

use crate::error::TransportError;
use crate::request::{ApiRequest, ApiResponse};
use crate::store::VaultCookie;

/// Default per-call timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Sends fully prepared requests.
///
/// Implementations must not add or strip the `Authorization` header; the
/// pipeline owns credential attachment.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send a request and return whatever status the server answered with.
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse, TransportError>;

    /// Cookie header the transport would send to `url`, if it keeps cookies.
    fn cookies_for(&self, _url: &Url) -> Option<VaultCookie> {
        None
    }

    /// Seed the transport's cookies for `url`.
    fn restore_cookies(&self, _url: &Url, _cookie: &VaultCookie) {}
}

/// `reqwest`-backed transport with a shared cookie jar.
///
/// Clone is cheap: the client and jar are reference counted.
#[derive(Clone)]
pub struct HttpTransport {
    client: Client,
    jar: Arc<Jar>,
}

impl HttpTransport {
    /// Create a transport with the default timeout.
    pub fn new() -> Result<Self, TransportError> {
        Self::with_timeout(DEFAULT_REQUEST_TIMEOUT)
    }

    /// Create a transport whose calls are bounded by `timeout`.
    pub fn with_timeout(timeout: Duration) -> Result<Self, TransportError> {
        let jar = Arc::new(Jar::default());
        let client = Client::builder()
            .timeout(timeout)
            .cookie_provider(jar.clone())
            .build()
            .map_err(|e| TransportError::InvalidRequest {
                message: format!("failed to build HTTP client: {}", e),
            })?;
        Ok(Self { client, jar })
    }
}

impl std::fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpTransport").finish_non_exhaustive()
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse, TransportError> {
        trace!(request = %request.describe(), "sending");

        let mut builder = self
            .client
            .request(request.method, request.url)
            .headers(request.headers);
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await?.to_vec();

        debug!(status = status.as_u16(), bytes = body.len(), "response received");
        Ok(ApiResponse {
            status,
            headers,
            body,
        })
    }

    fn cookies_for(&self, url: &Url) -> Option<VaultCookie> {
        let header = self.jar.cookies(url)?;
        let value = header.to_str().ok()?;
        if value.is_empty() {
            None
        } else {
            Some(VaultCookie::new(value))
        }
    }

    fn restore_cookies(&self, url: &Url, cookie: &VaultCookie) {
        for pair in cookie.pairs() {
            self.jar.add_cookie_str(pair, url);
        }
    }
}
