//! The authenticated request pipeline.
//!
//! Every API call goes through [`RequestPipeline::execute`]: the current
//! credential is attached as a bearer header, and a first 401 is handed to
//! the [`RefreshCoordinator`] instead of being returned. The call is then
//! replayed once with whatever credential the refresh produced. A second 401
//! on the replay is returned to the caller as [`ApiError::Unauthorized`].
//!
//! Responses other than 401 never touch the coordinator.

use std::sync::Arc;

use reqwest::header::{AUTHORIZATION, HeaderValue};
use tracing::{debug, warn};

use crate::coordinator::RefreshCoordinator;
use crate::credential::Credential;
use crate::error::{ApiError, TransportError};
use crate::request::{ApiRequest, ApiResponse, Call};
use crate::transport::Transport;

/// Attaches credentials and recovers from expired ones.
pub struct RequestPipeline {
    transport: Arc<dyn Transport>,
    coordinator: Arc<RefreshCoordinator>,
}

impl RequestPipeline {
    pub fn new(transport: Arc<dyn Transport>, coordinator: Arc<RefreshCoordinator>) -> Self {
        Self {
            transport,
            coordinator,
        }
    }

    /// Send `request`, refreshing and replaying once on a 401.
    pub async fn execute(&self, request: ApiRequest) -> Result<ApiResponse, ApiError> {
        let snapshot = self.coordinator.credentials().snapshot();
        let mut credential = snapshot.credential;
        let mut call = Call::new(request);

        loop {
            let response = self.dispatch(&call, credential.as_ref()).await?;

            if !response.is_auth_failure() {
                return response.error_for_status();
            }
            if call.is_retried() {
                warn!(call = %call.request().describe(), "rejected again after refresh");
                return response.error_for_status();
            }

            debug!(call = %call.request().describe(), "credential rejected");
            let label = call.request().describe();
            credential = Some(
                self.coordinator
                    .recover(label, snapshot.generation)
                    .await?,
            );
            call = call.into_replay();
        }
    }

    async fn dispatch(
        &self,
        call: &Call,
        credential: Option<&Credential>,
    ) -> Result<ApiResponse, ApiError> {
        let mut request = call.request().clone();
        match credential {
            Some(credential) => {
                let mut value = HeaderValue::from_str(&credential.bearer_header()).map_err(|_| {
                    TransportError::InvalidRequest {
                        message: "credential is not a valid header value".to_string(),
                    }
                })?;
                value.set_sensitive(true);
                request.headers.insert(AUTHORIZATION, value);
            }
            None => {
                request.headers.remove(AUTHORIZATION);
            }
        }
        Ok(self.transport.send(request).await?)
    }
}

impl std::fmt::Debug for RequestPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestPipeline")
            .field("coordinator", &self.coordinator)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Refresher;
    use crate::coordinator::DEFAULT_REFRESH_TIMEOUT;
    use crate::credential::CredentialStore;
    use crate::error::RefreshError;
    use crate::model::SessionGrant;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use reqwest::StatusCode;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use url::Url;

    /// Accepts exactly one bearer value; answers 401 to anything else.
    struct GatedTransport {
        accepted: Mutex<Option<String>>,
        seen: Mutex<Vec<Option<String>>>,
        status_override: Option<StatusCode>,
    }

    impl GatedTransport {
        fn accepting(token: Option<&str>) -> Arc<Self> {
            Arc::new(Self {
                accepted: Mutex::new(token.map(|t| format!("Bearer {t}"))),
                seen: Mutex::new(Vec::new()),
                status_override: None,
            })
        }

        fn always(status: StatusCode) -> Arc<Self> {
            Arc::new(Self {
                accepted: Mutex::new(None),
                seen: Mutex::new(Vec::new()),
                status_override: Some(status),
            })
        }

        fn seen(&self) -> Vec<Option<String>> {
            self.seen.lock().clone()
        }
    }

    #[async_trait]
    impl Transport for GatedTransport {
        async fn send(&self, request: ApiRequest) -> Result<ApiResponse, TransportError> {
            let header = request
                .headers
                .get(AUTHORIZATION)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            self.seen.lock().push(header.clone());

            if let Some(status) = self.status_override {
                return Ok(ApiResponse::new(status, br#"{"detail":"boom"}"#.to_vec()));
            }
            if header.is_some() && header == *self.accepted.lock() {
                Ok(ApiResponse::new(StatusCode::OK, br#"{"ok":true}"#.to_vec()))
            } else {
                Ok(ApiResponse::new(
                    StatusCode::UNAUTHORIZED,
                    br#"{"detail":"Could not validate credentials"}"#.to_vec(),
                ))
            }
        }
    }

    struct FixedRefresher {
        outcome: Result<&'static str, RefreshError>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Refresher for FixedRefresher {
        async fn refresh(&self) -> Result<SessionGrant, RefreshError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.outcome.clone().map(|token| {
                serde_json::from_value(serde_json::json!({
                    "access_token": token,
                    "user": {
                        "id": "5f0c6b8e-3f43-4d8a-9a52-0f4b1c7d2e11",
                        "username": "alice",
                        "is_active": true
                    }
                }))
                .unwrap()
            })
        }
    }

    fn pipeline(
        transport: Arc<GatedTransport>,
        outcome: Result<&'static str, RefreshError>,
        initial: Option<&str>,
    ) -> (RequestPipeline, Arc<FixedRefresher>, Arc<RefreshCoordinator>) {
        let refresher = Arc::new(FixedRefresher {
            outcome,
            calls: AtomicUsize::new(0),
        });
        let store = Arc::new(CredentialStore::new());
        store.set(initial.map(Credential::new));
        let coordinator = Arc::new(RefreshCoordinator::new(
            store,
            refresher.clone(),
            DEFAULT_REFRESH_TIMEOUT,
        ));
        (
            RequestPipeline::new(transport, coordinator.clone()),
            refresher,
            coordinator,
        )
    }

    fn request() -> ApiRequest {
        ApiRequest::get(Url::parse("http://localhost/api/admin/users").unwrap())
    }

    #[tokio::test]
    async fn test_attaches_current_credential() {
        let transport = GatedTransport::accepting(Some("T1"));
        let (pipeline, refresher, _) = pipeline(transport.clone(), Ok("T2"), Some("T1"));

        let response = pipeline.execute(request()).await.unwrap();
        assert!(response.is_success());
        assert_eq!(transport.seen(), vec![Some("Bearer T1".to_string())]);
        assert_eq!(refresher.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_no_credential_sends_no_header() {
        let transport = GatedTransport::always(StatusCode::OK);
        let (pipeline, _, _) = pipeline(transport.clone(), Ok("T2"), None);

        pipeline.execute(request()).await.unwrap();
        assert_eq!(transport.seen(), vec![None]);
    }

    #[tokio::test]
    async fn test_expired_credential_is_refreshed_and_replayed() {
        let transport = GatedTransport::accepting(Some("T2"));
        let (pipeline, refresher, coordinator) =
            pipeline(transport.clone(), Ok("T2"), Some("T1"));

        let response = pipeline.execute(request()).await.unwrap();
        assert_eq!(response.json::<serde_json::Value>().unwrap()["ok"], true);
        assert_eq!(
            transport.seen(),
            vec![
                Some("Bearer T1".to_string()),
                Some("Bearer T2".to_string())
            ]
        );
        assert_eq!(refresher.calls.load(Ordering::SeqCst), 1);
        assert_eq!(coordinator.credentials().get().unwrap().expose(), "T2");
    }

    #[tokio::test]
    async fn test_second_rejection_is_not_retried() {
        let transport = GatedTransport::accepting(None);
        let (pipeline, refresher, _) = pipeline(transport.clone(), Ok("T2"), Some("T1"));

        let err = pipeline.execute(request()).await.unwrap_err();
        assert!(matches!(err, ApiError::Unauthorized { .. }));
        assert_eq!(transport.seen().len(), 2);
        assert_eq!(refresher.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_other_errors_bypass_refresh() {
        let transport = GatedTransport::always(StatusCode::INTERNAL_SERVER_ERROR);
        let (pipeline, refresher, _) = pipeline(transport.clone(), Ok("T2"), Some("T1"));

        let err = pipeline.execute(request()).await.unwrap_err();
        assert_eq!(err.status(), Some(500));
        assert_eq!(transport.seen().len(), 1);
        assert_eq!(refresher.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_failed_refresh_surfaces_session_expired() {
        let transport = GatedTransport::accepting(Some("T2"));
        let failure = RefreshError::Rejected {
            status: 401,
            detail: "Refresh token expired".into(),
        };
        let (pipeline, _, coordinator) =
            pipeline(transport.clone(), Err(failure.clone()), Some("T1"));

        let err = pipeline.execute(request()).await.unwrap_err();
        match err {
            ApiError::SessionExpired(inner) => assert_eq!(inner, failure),
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(transport.seen().len(), 1);
        assert!(coordinator.credentials().get().is_none());
    }
}
