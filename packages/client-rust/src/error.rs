//! Error taxonomy of REST calls and controllers.

use maestro_core::session::SessionError;
use serde_json::Value;

/// The user-facing operation a request belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Load,
    Save,
    Delete,
}

impl Action {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Load => "load",
            Self::Save => "save",
            Self::Delete => "delete",
        }
    }

    /// Generic notice for a failed operation.
    #[must_use]
    pub fn failure_message(self) -> String {
        format!("Failed to {}", self.as_str())
    }
}

/// How a failure is surfaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Missing or expired session: forced logout.
    Unauthorized,
    /// Concurrent modification reported by the backend. Handling is an open
    /// extension point; callers only show a placeholder notice.
    Conflict,
    /// Any other failure.
    Failed,
}

/// Errors returned by a [`RestApi`](crate::traits::RestApi) call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApiError {
    #[error("HTTP {status}: {body}")]
    Status {
        status: u16,
        /// Response body, truncated.
        body: String,
        /// The body's `detail` field, when it has one.
        detail: Option<String>,
    },
    #[error("request failed: {0}")]
    Transport(String),
    #[error("invalid response body: {0}")]
    Decode(String),
}

const BODY_PREVIEW_CHARS: usize = 200;

impl ApiError {
    /// Builds a status error, extracting `detail` from a JSON body.
    #[must_use]
    pub fn from_status(status: u16, body: &str) -> Self {
        let detail = serde_json::from_str::<Value>(body)
            .ok()
            .and_then(|v| match v.get("detail")? {
                Value::String(s) if !s.is_empty() => Some(s.clone()),
                Value::Null => None,
                other => Some(other.to_string()),
            });
        Self::Status {
            status,
            body: body.chars().take(BODY_PREVIEW_CHARS).collect(),
            detail,
        }
    }

    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self.status() {
            Some(401 | 403) => ErrorKind::Unauthorized,
            Some(409) => ErrorKind::Conflict,
            _ => ErrorKind::Failed,
        }
    }

    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    #[must_use]
    pub fn detail(&self) -> Option<&str> {
        match self {
            Self::Status { detail, .. } => detail.as_deref(),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::Decode(err.to_string())
        } else {
            Self::Transport(err.to_string())
        }
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        Self::Decode(err.to_string())
    }
}

/// Errors returned by controllers.
#[derive(Debug, thiserror::Error)]
pub enum ControllerError {
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error(transparent)]
    Session(#[from] SessionError),
}
