use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use resource_scraper::server::{router, AppState};
use resource_scraper::{
    Platform, RateDecision, RateLimiter, ResourceMetadata, ResourceScraper, ResourceType,
    ScrapeError, ScrapeMethod, ScrapedResource, SlidingWindowLimiter,
};
use serde_json::Value;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tower::ServiceExt;

/// Answers by URL so each error class can be triggered on demand.
#[derive(Clone, Default)]
struct StubScraper {
    seen_users: Arc<Mutex<Vec<Option<String>>>>,
}

#[async_trait]
impl ResourceScraper for StubScraper {
    async fn scrape(
        &self,
        url: &str,
        user_id: Option<&str>,
    ) -> Result<ScrapedResource, ScrapeError> {
        self.seen_users
            .lock()
            .unwrap()
            .push(user_id.map(String::from));

        match url {
            "bad" => Err(ScrapeError::InvalidUrl("bad".into())),
            "missing" => Err(ScrapeError::NotFound("missing".into())),
            "upstream" => Err(ScrapeError::platform(Platform::Youtube, "HTTP 503")),
            "slow" => Err(ScrapeError::Timeout("5000ms".into())),
            "bug" => Err(ScrapeError::Internal("unexpected".into())),
            _ => Ok(ScrapedResource {
                title: "facebook/react".into(),
                description: None,
                image: None,
                credits: Some("facebook".into()),
                url: url.to_string(),
                suggested_resource_type: ResourceType::Repo,
                suggested_tags: vec![],
                suggested_tech_stack: vec!["javascript".into()],
                platform: Platform::Github,
                method: ScrapeMethod::Api,
                cached: false,
                metadata: ResourceMetadata {
                    stars: Some(7),
                    ..Default::default()
                },
            }),
        }
    }
}

struct BrokenLimiter;

#[async_trait]
impl RateLimiter for BrokenLimiter {
    async fn check(&self, _key: &str) -> Result<RateDecision, ScrapeError> {
        Err(ScrapeError::Internal("limiter backend unavailable".into()))
    }
}

fn app(scraper: StubScraper, limit: u32) -> Router {
    router(AppState::new(
        scraper,
        SlidingWindowLimiter::new(limit, Duration::from_secs(60)),
    ))
}

fn scrape_request(body: &str, user: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/scrape")
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(user) = user {
        builder = builder.header("x-user-id", user);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Option<String>, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let retry_after = response
        .headers()
        .get(header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .map(String::from);
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, retry_after, json)
}

#[tokio::test]
async fn test_health() {
    let app = app(StubScraper::default(), 10);
    let request = Request::builder()
        .uri("/health")
        .body(Body::empty())
        .unwrap();
    let (status, _, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["healthy"], true);
}

#[tokio::test]
async fn test_success_envelope() {
    let scraper = StubScraper::default();
    let app = app(scraper.clone(), 10);

    let (status, _, body) = send(
        &app,
        scrape_request(r#"{"url":"https://github.com/facebook/react"}"#, Some("u-1")),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["platform"], "github");
    assert_eq!(body["data"]["suggestedResourceType"], "repo");
    assert_eq!(body["data"]["suggestedTechStack"][0], "javascript");
    assert_eq!(body["data"]["metadata"]["stars"], 7);
    assert_eq!(body["data"]["cached"], false);

    assert_eq!(
        *scraper.seen_users.lock().unwrap(),
        vec![Some("u-1".to_string())]
    );
}

#[tokio::test]
async fn test_error_codes_and_statuses() {
    let app = app(StubScraper::default(), 100);

    let cases = [
        ("bad", StatusCode::BAD_REQUEST, "INVALID_URL"),
        ("missing", StatusCode::NOT_FOUND, "SCRAPE_FAILED"),
        ("upstream", StatusCode::BAD_GATEWAY, "PLATFORM_ERROR"),
        ("slow", StatusCode::BAD_GATEWAY, "PLATFORM_ERROR"),
        ("bug", StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
    ];

    for (url, expected_status, expected_code) in cases {
        let (status, _, body) = send(
            &app,
            scrape_request(&format!(r#"{{"url":"{url}"}}"#), Some("u-1")),
        )
        .await;
        assert_eq!(status, expected_status, "{url}");
        assert_eq!(body["success"], false, "{url}");
        assert_eq!(body["error"]["code"], expected_code, "{url}");
        assert!(body["error"]["message"].is_string(), "{url}");
    }
}

#[tokio::test]
async fn test_malformed_body_is_invalid_url() {
    let app = app(StubScraper::default(), 10);

    for body in ["not json", "{}", r#"{"url": 42}"#] {
        let (status, _, json) = send(&app, scrape_request(body, Some("u-1"))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");
        assert_eq!(json["error"]["code"], "INVALID_URL", "{body}");
    }
}

#[tokio::test]
async fn test_rate_limit_per_identity() {
    let scraper = StubScraper::default();
    let app = app(scraper.clone(), 2);
    let body = r#"{"url":"https://github.com/facebook/react"}"#;

    for _ in 0..2 {
        let (status, _, _) = send(&app, scrape_request(body, Some("alice"))).await;
        assert_eq!(status, StatusCode::OK);
    }

    let (status, retry_after, json) = send(&app, scrape_request(body, Some("alice"))).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(json["error"]["code"], "RATE_LIMITED");
    let retry_after: u64 = retry_after.expect("Retry-After header").parse().unwrap();
    assert!((1..=60).contains(&retry_after));

    // a different user has a separate budget
    let (status, _, _) = send(&app, scrape_request(body, Some("bob"))).await;
    assert_eq!(status, StatusCode::OK);

    // the limited request never reached the scraper
    assert_eq!(scraper.seen_users.lock().unwrap().len(), 3);
}

#[tokio::test]
async fn test_anonymous_callers_share_ip_bucket() {
    let scraper = StubScraper::default();
    let app = app(scraper.clone(), 1);
    let body = r#"{"url":"https://github.com/facebook/react"}"#;

    let (status, _, _) = send(&app, scrape_request(body, None)).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _, _) = send(&app, scrape_request(body, None)).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);

    assert_eq!(*scraper.seen_users.lock().unwrap(), vec![None]);
}

#[tokio::test]
async fn test_limiter_failure_fails_open() {
    let app = router(AppState::new(StubScraper::default(), BrokenLimiter));

    for _ in 0..20 {
        let (status, _, _) = send(
            &app,
            scrape_request(r#"{"url":"https://github.com/facebook/react"}"#, Some("u-1")),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }
}
