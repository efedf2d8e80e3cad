use async_trait::async_trait;
use thiserror::Error;

use crate::platform::Platform;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryKind {
    /// 403 and 5xx responses.
    Http,
    /// Connection failures, timeouts and 429s; these back off longer.
    Connection,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    #[error("{message}")]
    Retryable { kind: RetryKind, message: String },
    #[error("page not found (404)")]
    NotFound,
    #[error("{0}")]
    Fatal(String),
}

impl FetchError {
    pub fn http(message: impl Into<String>) -> Self {
        Self::Retryable {
            kind: RetryKind::Http,
            message: message.into(),
        }
    }

    pub fn connection(message: impl Into<String>) -> Self {
        Self::Retryable {
            kind: RetryKind::Connection,
            message: message.into(),
        }
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        Self::Fatal(message.into())
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Retryable { .. })
    }
}

/// Classifies a non-200 status from the rendering API.
pub fn classify_status(status: u16) -> FetchError {
    match status {
        404 => FetchError::NotFound,
        403 => FetchError::http("HTTP 403: blocked or API credits exhausted"),
        429 => FetchError::connection("HTTP 429: rate limited"),
        500..=599 => FetchError::http(format!("HTTP {status}: upstream server error")),
        400 => FetchError::fatal("HTTP 400: bad request, url may be malformed"),
        _ => FetchError::fatal(format!("unexpected HTTP status {status}")),
    }
}

/// Retrieves the HTML of one page.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, url: &str, platform: Platform) -> Result<String, FetchError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses_map_to_error_kinds() {
        assert!(matches!(
            classify_status(403),
            FetchError::Retryable {
                kind: RetryKind::Http,
                ..
            }
        ));
        assert!(matches!(
            classify_status(503),
            FetchError::Retryable {
                kind: RetryKind::Http,
                ..
            }
        ));
        assert!(matches!(
            classify_status(429),
            FetchError::Retryable {
                kind: RetryKind::Connection,
                ..
            }
        ));
        assert_eq!(classify_status(404), FetchError::NotFound);
        assert!(!classify_status(400).is_retryable());
        assert!(!classify_status(418).is_retryable());
    }
}
