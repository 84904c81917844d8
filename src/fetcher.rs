use crate::cancel::CancelSignal;
use crate::dns::{HostResolver, SystemResolver};
use crate::error::ScrapeError;
use crate::security::{normalize_ip, FetchLimits, UrlValidationConfig, UrlValidator};
use crate::Platform;
use reqwest::header::{HeaderMap, ACCEPT, LOCATION};
use reqwest::redirect::Policy;
use reqwest::{Client, Response, StatusCode};
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use tracing::{debug, instrument, warn};
use url::{Host, Url};

const DEFAULT_USER_AGENT: &str = "resource_scraper/0.1.0";
const HTML_ACCEPT: &str = "text/html,application/xhtml+xml;q=0.9,*/*;q=0.5";

/// A fully buffered response from an arbitrary origin.
#[derive(Debug, Clone)]
pub struct FetchResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
    /// URL of the last hop after redirects
    pub final_url: Url,
    pub redirects: usize,
}

impl FetchResponse {
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn content_type(&self) -> Option<&str> {
        self.headers
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
    }
}

/// Configuration for the outbound fetcher.
///
/// # Examples
/// ```ignore
/// let fetcher = Fetcher::new_with_config(FetcherConfig {
///     user_agent: "my-agent/1.0".to_string(),
///     limits: FetchLimits { max_redirects: 3, ..Default::default() },
///     ..Default::default()
/// });
/// ```
#[derive(Clone)]
pub struct FetcherConfig {
    pub user_agent: String,
    pub limits: FetchLimits,
    pub validation: UrlValidationConfig,
    pub resolver: Arc<dyn HostResolver>,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            user_agent: DEFAULT_USER_AGENT.to_string(),
            limits: FetchLimits::default(),
            validation: UrlValidationConfig::default(),
            resolver: Arc::new(SystemResolver),
        }
    }
}

impl FetcherConfig {
    pub fn with_resolver(mut self, resolver: impl HostResolver + 'static) -> Self {
        self.resolver = Arc::new(resolver);
        self
    }

    pub fn with_limits(mut self, limits: FetchLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn with_validation(mut self, validation: UrlValidationConfig) -> Self {
        self.validation = validation;
        self
    }
}

/// Fetches arbitrary user-supplied URLs without letting them reach internal networks.
///
/// Every hop is validated, resolved, checked against the blocklist and then
/// connected to one of the validated addresses only. Redirects are walked by hand.
#[derive(Clone)]
pub struct Fetcher {
    validator: UrlValidator,
    resolver: Arc<dyn HostResolver>,
    limits: FetchLimits,
    user_agent: String,
}

impl Default for Fetcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Fetcher {
    pub fn new() -> Self {
        debug!("Fetcher initialized with default configuration");
        Self::new_with_config(FetcherConfig::default())
    }

    pub fn new_with_config(config: FetcherConfig) -> Self {
        Self {
            validator: UrlValidator::new(config.validation),
            resolver: config.resolver,
            limits: config.limits,
            user_agent: config.user_agent,
        }
    }

    pub fn limits(&self) -> &FetchLimits {
        &self.limits
    }

    #[instrument(level = "debug", skip(self, signal), err)]
    pub async fn fetch(&self, url: &str, signal: &CancelSignal) -> Result<FetchResponse, ScrapeError> {
        let start = self.validator.validate(url)?;
        let budget = self.limits.timeout;

        // Losing either race drops the in-flight request, which closes its socket.
        tokio::select! {
            biased;
            _ = signal.cancelled() => {
                warn!(url = %url, "Fetch cancelled by caller");
                Err(ScrapeError::Timeout(format!("fetch of {url} was cancelled")))
            }
            result = tokio::time::timeout(budget, self.follow(start)) => match result {
                Ok(response) => response,
                Err(_) => {
                    warn!(url = %url, timeout_ms = budget.as_millis() as u64, "Fetch timed out");
                    Err(ScrapeError::Timeout(format!(
                        "fetch of {url} exceeded {}ms",
                        budget.as_millis()
                    )))
                }
            },
        }
    }

    async fn follow(&self, start: Url) -> Result<FetchResponse, ScrapeError> {
        let mut current = start;
        let mut redirects = 0usize;

        loop {
            let allowed = self.resolve_allowed(&current).await?;
            let response = self.send_pinned(&current, &allowed).await?;

            if let Err(e) = self.validator.verify_peer(response.remote_addr(), &allowed) {
                warn!(url = %current, peer = ?response.remote_addr(), "Peer address check failed");
                return Err(e);
            }

            let status = response.status();
            if is_redirect(status) {
                if redirects >= self.limits.max_redirects {
                    return Err(ScrapeError::platform(
                        Platform::Generic,
                        format!("too many redirects (max {})", self.limits.max_redirects),
                    ));
                }

                let next = redirect_target(&current, &response)?;
                self.validator.validate_url(&next)?;
                debug!(from = %current, to = %next, hop = redirects + 1, "Following redirect");

                drop(response);
                redirects += 1;
                current = next;
                continue;
            }

            let headers = response.headers().clone();
            let body = self.read_body(response, &current).await?;
            debug!(url = %current, status = %status, bytes = body.len(), "Fetched response");

            return Ok(FetchResponse {
                status,
                headers,
                body,
                final_url: current,
                redirects,
            });
        }
    }

    async fn resolve_allowed(&self, url: &Url) -> Result<Vec<IpAddr>, ScrapeError> {
        let port = url.port_or_known_default().unwrap_or(80);

        match url.host() {
            Some(Host::Ipv4(ip)) => Ok(vec![IpAddr::V4(ip)]),
            Some(Host::Ipv6(ip)) => Ok(vec![normalize_ip(IpAddr::V6(ip))]),
            Some(Host::Domain(domain)) => {
                let addrs = self.resolver.resolve(domain, port).await.map_err(|e| {
                    ScrapeError::platform(
                        Platform::Generic,
                        format!("DNS lookup for {domain} failed: {e}"),
                    )
                })?;
                self.validator.check_resolved(domain, &addrs)
            }
            None => Err(ScrapeError::InvalidUrl("URL has no host".to_string())),
        }
    }

    async fn send_pinned(&self, url: &Url, allowed: &[IpAddr]) -> Result<Response, ScrapeError> {
        let port = url.port_or_known_default().unwrap_or(80);

        let mut builder = Client::builder()
            .redirect(Policy::none())
            .no_proxy()
            .pool_max_idle_per_host(0)
            .user_agent(&self.user_agent);

        // Host header and SNI keep the hostname; the socket goes to a validated address.
        if let Some(Host::Domain(domain)) = url.host() {
            let addrs: Vec<SocketAddr> = allowed
                .iter()
                .map(|ip| SocketAddr::new(*ip, port))
                .collect();
            builder = builder.resolve_to_addrs(domain, &addrs);
        }

        let client = builder
            .build()
            .map_err(|e| ScrapeError::Internal(format!("failed to build HTTP client: {e}")))?;

        client
            .get(url.clone())
            .header(ACCEPT, HTML_ACCEPT)
            .send()
            .await
            .map_err(|e| map_send_error(e, url))
    }

    async fn read_body(&self, mut response: Response, url: &Url) -> Result<Vec<u8>, ScrapeError> {
        let max = self.limits.max_body_bytes;

        if let Some(len) = response.content_length() {
            if len > max as u64 {
                warn!(url = %url, content_length = len, max_bytes = max, "Declared body too large");
                return Err(too_large(max));
            }
        }

        let mut body = Vec::new();
        while let Some(chunk) = response.chunk().await.map_err(|e| map_send_error(e, url))? {
            if body.len() + chunk.len() > max {
                warn!(url = %url, max_bytes = max, "Body exceeded size cap mid-stream");
                return Err(too_large(max));
            }
            body.extend_from_slice(&chunk);
        }

        Ok(body)
    }
}

fn is_redirect(status: StatusCode) -> bool {
    matches!(status.as_u16(), 301 | 302 | 303 | 307 | 308)
}

fn redirect_target(current: &Url, response: &Response) -> Result<Url, ScrapeError> {
    let location = response
        .headers()
        .get(LOCATION)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| {
            ScrapeError::platform(Platform::Generic, "redirect without a usable Location header")
        })?;

    current
        .join(location.trim())
        .map_err(|e| ScrapeError::InvalidUrl(format!("invalid redirect target {location}: {e}")))
}

fn too_large(max: usize) -> ScrapeError {
    ScrapeError::platform(
        Platform::Generic,
        format!("response body exceeds {max} bytes"),
    )
}

fn map_send_error(e: reqwest::Error, url: &Url) -> ScrapeError {
    if e.is_timeout() {
        ScrapeError::Timeout(format!("request to {url} timed out"))
    } else if e.is_connect() {
        ScrapeError::platform(Platform::Generic, format!("failed to connect to {url}: {e}"))
    } else {
        ScrapeError::platform(Platform::Generic, format!("request to {url} failed: {e}"))
    }
}
