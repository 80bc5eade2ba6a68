//! Fetch error taxonomy
//!
//! Every failure a usage client can produce collapses into [`FetchError`]. The
//! retry wrapper in [`crate::client::retry`] is the only place that looks at
//! [`FetchError::is_retryable`]; trackers and the dispatcher never see errors.

use reqwest::StatusCode;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum FetchError {
    /// Credential missing, empty, or rejected with 401/403.
    #[error("credential missing or rejected, re-authenticate")]
    Unauthenticated,

    /// Transport-level failure (DNS, connect, TLS, timeout, truncated body).
    #[error("network error: {0}")]
    Network(String),

    /// The response body did not decode into the expected structure.
    #[error("failed to decode response: {0}")]
    Parse(String),

    /// Any other non-2xx status.
    #[error("{}", describe_status(.0))]
    Server(u16),

    /// Shutdown interrupted a backoff sleep.
    #[error("request cancelled by shutdown")]
    Cancelled,
}

impl FetchError {
    /// Map a non-success HTTP status onto the taxonomy
    pub fn from_status(status: StatusCode) -> Self {
        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => FetchError::Unauthenticated,
            other => FetchError::Server(other.as_u16()),
        }
    }

    pub fn is_retryable(&self) -> bool {
        !matches!(self, FetchError::Unauthenticated | FetchError::Cancelled)
    }

    /// Short hint shown next to a failed service in the summary
    pub fn user_hint(&self) -> &'static str {
        match self {
            FetchError::Unauthenticated => "re-authenticate",
            FetchError::Cancelled => "stopped",
            _ => "temporarily unavailable",
        }
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            FetchError::Parse(err.to_string())
        } else if let Some(status) = err.status() {
            FetchError::from_status(status)
        } else {
            FetchError::Network(err.to_string())
        }
    }
}

fn describe_status(code: &u16) -> String {
    if *code >= 500 {
        format!("server error (HTTP {code})")
    } else {
        format!("request failed (HTTP {code})")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_statuses_map_to_unauthenticated() {
        assert_eq!(FetchError::from_status(StatusCode::UNAUTHORIZED), FetchError::Unauthenticated);
        assert_eq!(FetchError::from_status(StatusCode::FORBIDDEN), FetchError::Unauthenticated);
        assert_eq!(
            FetchError::from_status(StatusCode::TOO_MANY_REQUESTS),
            FetchError::Server(429)
        );
    }

    #[test]
    fn test_retryability() {
        assert!(!FetchError::Unauthenticated.is_retryable());
        assert!(!FetchError::Cancelled.is_retryable());
        assert!(FetchError::Network("reset".into()).is_retryable());
        assert!(FetchError::Parse("eof".into()).is_retryable());
        assert!(FetchError::Server(502).is_retryable());
    }

    #[test]
    fn test_display_messages() {
        assert_eq!(FetchError::Server(503).to_string(), "server error (HTTP 503)");
        assert_eq!(FetchError::Server(404).to_string(), "request failed (HTTP 404)");
    }
}
