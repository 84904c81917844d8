use crate::Platform;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, warn};

#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Content not found: {0}")]
    NotFound(String),

    #[error("Platform error: {platform} - {message}")]
    PlatformError { platform: Platform, message: String },

    #[error("Request timeout: {0}")]
    Timeout(String),

    #[error("Rate limit exceeded, retry after {}s", retry_after.as_secs())]
    RateLimited { retry_after: Duration },

    #[error("Cache error: {0}")]
    Cache(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<url::ParseError> for ScrapeError {
    fn from(e: url::ParseError) -> Self {
        ScrapeError::InvalidUrl(format!("failed to parse URL: {e}"))
    }
}

impl ScrapeError {
    pub fn platform(platform: Platform, message: impl Into<String>) -> Self {
        ScrapeError::PlatformError {
            platform,
            message: message.into(),
        }
    }

    /// Wire code reported to API callers.
    pub fn code(&self) -> &'static str {
        match self {
            ScrapeError::InvalidUrl(_) => "INVALID_URL",
            ScrapeError::NotFound(_) => "SCRAPE_FAILED",
            ScrapeError::PlatformError { .. } | ScrapeError::Timeout(_) => "PLATFORM_ERROR",
            ScrapeError::RateLimited { .. } => "RATE_LIMITED",
            ScrapeError::Cache(_) | ScrapeError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// HTTP status code for this error class.
    pub fn status(&self) -> u16 {
        match self {
            ScrapeError::InvalidUrl(_) => 400,
            ScrapeError::NotFound(_) => 404,
            ScrapeError::PlatformError { .. } | ScrapeError::Timeout(_) => 502,
            ScrapeError::RateLimited { .. } => 429,
            ScrapeError::Cache(_) | ScrapeError::Internal(_) => 500,
        }
    }

    /// Whether a caller may reasonably try again later. Nothing in this crate retries.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ScrapeError::PlatformError { .. }
                | ScrapeError::Timeout(_)
                | ScrapeError::RateLimited { .. }
        )
    }

    pub fn log(&self) {
        match self {
            ScrapeError::InvalidUrl(e) => {
                warn!(error = %e, "URL rejected");
            }
            ScrapeError::NotFound(e) => {
                warn!(error = %e, "Content not found on platform");
            }
            ScrapeError::PlatformError { platform, message } => {
                error!(
                    platform = %platform,
                    error = %message,
                    "Platform request failed"
                );
            }
            ScrapeError::Timeout(e) => {
                warn!(error = %e, "Request timed out");
            }
            ScrapeError::RateLimited { retry_after } => {
                warn!(retry_after_secs = retry_after.as_secs(), "Rate limit exceeded");
            }
            ScrapeError::Cache(e) => {
                warn!(error = %e, "Cache operation failed");
            }
            ScrapeError::Internal(e) => {
                error!(error = %e, "Internal error");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_and_statuses() {
        let invalid = ScrapeError::InvalidUrl("nope".into());
        assert_eq!(invalid.code(), "INVALID_URL");
        assert_eq!(invalid.status(), 400);
        assert!(!invalid.is_retryable());

        let missing = ScrapeError::NotFound("gone".into());
        assert_eq!(missing.code(), "SCRAPE_FAILED");
        assert_eq!(missing.status(), 404);

        let upstream = ScrapeError::platform(Platform::Github, "HTTP 500");
        assert_eq!(upstream.code(), "PLATFORM_ERROR");
        assert_eq!(upstream.status(), 502);
        assert!(upstream.is_retryable());

        let slow = ScrapeError::Timeout("5s".into());
        assert_eq!(slow.code(), "PLATFORM_ERROR");

        let limited = ScrapeError::RateLimited {
            retry_after: Duration::from_secs(30),
        };
        assert_eq!(limited.code(), "RATE_LIMITED");
        assert_eq!(limited.status(), 429);
        assert_eq!(limited.to_string(), "Rate limit exceeded, retry after 30s");

        assert_eq!(ScrapeError::Internal("boom".into()).status(), 500);
    }

    #[test]
    fn test_parse_error_is_invalid_url() {
        let err: ScrapeError = url::Url::parse("not a url").unwrap_err().into();
        assert!(matches!(err, ScrapeError::InvalidUrl(_)));
    }
}
