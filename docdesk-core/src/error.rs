//! Error types for docdesk.
//!
//! - [`TransportError`] - The request never produced a response
//! - [`RefreshError`] - The durable refresh failed; cloned to every queued caller
//! - [`ApiError`] - What a caller of the request pipeline sees

use serde::Deserialize;
use thiserror::Error;

/// Maximum length for response bodies quoted in error messages.
const MAX_ERROR_BODY_LENGTH: usize = 500;

/// Failure to obtain any response from the server.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    /// Connection, DNS, TLS, or protocol failure.
    #[error("network error: {message}")]
    Network { message: String },

    /// The call exceeded its deadline.
    #[error("request timed out")]
    Timeout,

    /// The request could not be built (bad URL, header, or body).
    #[error("invalid request: {message}")]
    InvalidRequest { message: String },
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            TransportError::Timeout
        } else if err.is_builder() {
            TransportError::InvalidRequest {
                message: err.to_string(),
            }
        } else {
            TransportError::Network {
                message: err.to_string(),
            }
        }
    }
}

/// Failure of the durable refresh operation.
///
/// Terminal for the current session. Cloneable so one outcome can be
/// delivered to every caller queued behind the refresh.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RefreshError {
    /// The server refused the durable credential (missing, expired, or revoked).
    #[error("refresh rejected ({status}): {detail}")]
    Rejected { status: u16, detail: String },

    /// The refresh request never got a response.
    #[error("refresh network error: {message}")]
    Network { message: String },

    /// The refresh did not settle within the configured timeout.
    #[error("refresh timed out after {after_ms}ms")]
    Timeout { after_ms: u64 },

    /// The server answered with a body that is not a session grant.
    #[error("malformed refresh response: {message}")]
    Malformed { message: String },

    /// The refresh task ended without reporting an outcome.
    #[error("refresh abandoned before it settled")]
    Abandoned,
}

impl From<TransportError> for RefreshError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Timeout => RefreshError::Network {
                message: "refresh request timed out".to_string(),
            },
            other => RefreshError::Network {
                message: other.to_string(),
            },
        }
    }
}

/// A single field-level validation message reported by the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    /// Last element of the server's `loc` path, when present.
    pub field: Option<String>,
    pub message: String,
}

/// Error returned to a caller of the request pipeline.
#[derive(Debug, Clone, Error)]
pub enum ApiError {
    /// No response was received.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The call was rejected with 401 even after being replayed with a
    /// freshly refreshed credential, or it bypasses refresh (login).
    #[error("unauthorized: {detail}")]
    Unauthorized { detail: String },

    /// The session could not be refreshed; the caller must re-authenticate.
    #[error("session expired: {0}")]
    SessionExpired(#[from] RefreshError),

    /// Any other non-success status.
    #[error("server returned {status}: {detail}")]
    Status {
        status: u16,
        detail: String,
        fields: Vec<FieldError>,
    },

    /// A success response whose body could not be decoded.
    #[error("invalid response: {message}")]
    InvalidResponse { message: String },
}

#[derive(Deserialize)]
struct ErrorBody {
    detail: ErrorDetail,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ErrorDetail {
    Text(String),
    Validation(Vec<ValidationEntry>),
}

#[derive(Deserialize)]
struct ValidationEntry {
    #[serde(default)]
    loc: Vec<serde_json::Value>,
    msg: String,
    #[serde(default)]
    ctx: Option<ValidationContext>,
}

#[derive(Deserialize)]
struct ValidationContext {
    #[serde(default)]
    reason: Option<String>,
}

impl ApiError {
    /// Build an error from a non-success status and its raw body.
    ///
    /// Understands `{"detail": "..."}` and the list form
    /// `{"detail": [{"loc": [...], "msg": "...", "ctx": {"reason": "..."}}]}`.
    pub fn from_status(status: u16, body: &[u8]) -> Self {
        let (detail, fields) = parse_detail(body);
        if status == 401 {
            return ApiError::Unauthorized { detail };
        }
        ApiError::Status {
            status,
            detail,
            fields,
        }
    }

    /// HTTP status associated with this error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Unauthorized { .. } => Some(401),
            ApiError::Status { status, .. } => Some(*status),
            ApiError::SessionExpired(RefreshError::Rejected { status, .. }) => Some(*status),
            _ => None,
        }
    }

    /// Whether the caller has to sign in again.
    pub fn requires_login(&self) -> bool {
        matches!(
            self,
            ApiError::Unauthorized { .. } | ApiError::SessionExpired(_)
        )
    }
}

/// Extract a human-readable detail and field errors from an error body.
pub(crate) fn parse_detail(body: &[u8]) -> (String, Vec<FieldError>) {
    match serde_json::from_slice::<ErrorBody>(body) {
        Ok(ErrorBody {
            detail: ErrorDetail::Text(text),
        }) => (text, Vec::new()),
        Ok(ErrorBody {
            detail: ErrorDetail::Validation(entries),
        }) => {
            let fields: Vec<FieldError> = entries
                .into_iter()
                .map(|entry| FieldError {
                    field: entry.loc.last().map(|v| match v {
                        serde_json::Value::String(s) => s.clone(),
                        other => other.to_string(),
                    }),
                    message: entry
                        .ctx
                        .and_then(|c| c.reason)
                        .unwrap_or(entry.msg),
                })
                .collect();
            let detail = fields
                .iter()
                .map(|f| f.message.as_str())
                .collect::<Vec<_>>()
                .join("; ");
            (detail, fields)
        }
        Err(_) => (truncate_body(body), Vec::new()),
    }
}

fn truncate_body(body: &[u8]) -> String {
    let text = String::from_utf8_lossy(body);
    if text.len() <= MAX_ERROR_BODY_LENGTH {
        return text.into_owned();
    }
    let mut end = MAX_ERROR_BODY_LENGTH;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}... (truncated, {} total bytes)", &text[..end], text.len())
}
