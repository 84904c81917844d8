//! HTTP surface: `POST /scrape` behind a per-identity rate limit, plus `GET /health`.

use crate::error::ScrapeError;
use crate::rate_limit::{RateLimiter, SlidingWindowLimiter, DEFAULT_RATE_LIMIT, DEFAULT_RATE_WINDOW};
use crate::{ResourceScraper, ScrapedResource};
use axum::extract::rejection::JsonRejection;
use axum::extract::{ConnectInfo, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::trace::TraceLayer;
use tracing::{debug, warn};

pub const USER_ID_HEADER: &str = "x-user-id";
const DEFAULT_BIND_ADDR: &str = "127.0.0.1:8080";

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    pub rate_limit: u32,
    pub rate_window: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: DEFAULT_BIND_ADDR
                .parse()
                .unwrap_or_else(|_| SocketAddr::from(([127, 0, 0, 1], 8080))),
            rate_limit: DEFAULT_RATE_LIMIT,
            rate_window: DEFAULT_RATE_WINDOW,
        }
    }
}

impl ServerConfig {
    /// Defaults plus `SCRAPER_BIND_ADDR` from the environment.
    pub fn from_env() -> Result<Self, ScrapeError> {
        let mut config = Self::default();
        if let Ok(raw) = std::env::var("SCRAPER_BIND_ADDR") {
            config.bind_addr = raw.trim().parse().map_err(|e| {
                ScrapeError::Internal(format!("invalid SCRAPER_BIND_ADDR {raw:?}: {e}"))
            })?;
        }
        Ok(config)
    }

    pub fn with_bind_addr(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    pub fn with_rate_limit(mut self, limit: u32, window: Duration) -> Self {
        self.rate_limit = limit;
        self.rate_window = window;
        self
    }

    pub fn limiter(&self) -> SlidingWindowLimiter {
        SlidingWindowLimiter::new(self.rate_limit, self.rate_window)
    }
}

/// Parses a rate-limit window given in whole seconds. Zero is refused.
pub fn parse_rate_window(raw: &str) -> Result<Duration, ScrapeError> {
    let secs: u64 = raw
        .trim()
        .parse()
        .map_err(|e| ScrapeError::Internal(format!("invalid rate window {raw:?}: {e}")))?;
    if secs == 0 {
        return Err(ScrapeError::Internal(
            "rate window must be at least 1 second".to_string(),
        ));
    }
    Ok(Duration::from_secs(secs))
}

#[derive(Clone)]
pub struct AppState {
    pub scraper: Arc<dyn ResourceScraper>,
    pub limiter: Arc<dyn RateLimiter>,
}

impl AppState {
    pub fn new(scraper: impl ResourceScraper + 'static, limiter: impl RateLimiter + 'static) -> Self {
        Self {
            scraper: Arc::new(scraper),
            limiter: Arc::new(limiter),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ScrapeRequest {
    pub url: String,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: &'static str,
    pub message: String,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum ApiResponse {
    Success { success: bool, data: ScrapedResource },
    Failure { success: bool, error: ErrorBody },
}

impl ApiResponse {
    pub fn ok(data: ScrapedResource) -> Self {
        ApiResponse::Success {
            success: true,
            data,
        }
    }

    pub fn error(code: &'static str, message: impl Into<String>) -> Self {
        ApiResponse::Failure {
            success: false,
            error: ErrorBody {
                code,
                message: message.into(),
            },
        }
    }
}

impl IntoResponse for ScrapeError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let retry_after = match &self {
            ScrapeError::RateLimited { retry_after } => Some(retry_after_secs(*retry_after)),
            _ => None,
        };

        let mut response = (status, Json(ApiResponse::error(self.code(), self.to_string())))
            .into_response();
        if let Some(secs) = retry_after {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(secs));
        }
        response
    }
}

fn retry_after_secs(d: Duration) -> u64 {
    // round up so clients never retry early
    let secs = d.as_secs() + u64::from(d.subsec_nanos() > 0);
    secs.max(1)
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/scrape", post(scrape))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "healthy": true,
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Rate-limit key for a caller: the authenticated user if known, else the peer IP.
pub fn identity_key(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    let user = headers
        .get(USER_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty());

    match (user, peer) {
        (Some(user), _) => format!("user:{user}"),
        (None, Some(addr)) => format!("ip:{}", addr.ip()),
        (None, None) => "ip:unknown".to_string(),
    }
}

async fn scrape(
    State(state): State<AppState>,
    peer: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    payload: Result<Json<ScrapeRequest>, JsonRejection>,
) -> Response {
    let key = identity_key(&headers, peer.map(|ConnectInfo(addr)| addr));

    match state.limiter.check(&key).await {
        Ok(decision) if !decision.allowed => {
            let err = ScrapeError::RateLimited {
                retry_after: decision.retry_after,
            };
            err.log();
            return err.into_response();
        }
        Ok(decision) => debug!(key = %key, remaining = decision.remaining, "Rate limit check passed"),
        Err(e) => warn!(key = %key, error = %e, "Rate limiter unavailable, allowing request"),
    }

    let Json(request) = match payload {
        Ok(body) => body,
        Err(rejection) => {
            return ScrapeError::InvalidUrl(format!("invalid request body: {}", rejection.body_text()))
                .into_response();
        }
    };

    let user_id = key.strip_prefix("user:");
    match state.scraper.scrape(&request.url, user_id).await {
        Ok(resource) => (StatusCode::OK, Json(ApiResponse::ok(resource))).into_response(),
        Err(e) => {
            e.log();
            e.into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_key() {
        let mut headers = HeaderMap::new();
        let peer: SocketAddr = "203.0.113.9:5555".parse().unwrap();

        assert_eq!(identity_key(&headers, Some(peer)), "ip:203.0.113.9");
        assert_eq!(identity_key(&headers, None), "ip:unknown");

        headers.insert(USER_ID_HEADER, HeaderValue::from_static("  u-42 "));
        assert_eq!(identity_key(&headers, Some(peer)), "user:u-42");
    }

    #[test]
    fn test_parse_rate_window() {
        assert_eq!(parse_rate_window("60").unwrap(), Duration::from_secs(60));
        assert_eq!(parse_rate_window(" 1 ").unwrap(), Duration::from_secs(1));
        assert!(parse_rate_window("0").is_err());
        assert!(parse_rate_window("-5").is_err());
        assert!(parse_rate_window("soon").is_err());
    }

    #[test]
    fn test_retry_after_rounds_up() {
        assert_eq!(retry_after_secs(Duration::from_millis(1500)), 2);
        assert_eq!(retry_after_secs(Duration::from_secs(30)), 30);
        assert_eq!(retry_after_secs(Duration::ZERO), 1);
    }

    #[test]
    fn test_error_envelope_shape() {
        let body = serde_json::to_value(ApiResponse::error("INVALID_URL", "nope")).unwrap();
        assert_eq!(body["success"], false);
        assert_eq!(body["error"]["code"], "INVALID_URL");
        assert_eq!(body["error"]["message"], "nope");
    }
}
