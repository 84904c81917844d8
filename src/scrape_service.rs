use crate::cache::{cache_key, CacheStore, NoopCache, DEFAULT_CACHE_TTL};
use crate::cancel::CancelSignal;
use crate::error::ScrapeError;
use crate::fetcher::{Fetcher, FetcherConfig};
use crate::providers::{Provider, ProviderConfig, ProviderRegistry};
use crate::{Platform, ResourceScraper, ScrapeOptions, ScrapedResource};
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};
use url::Url;

/// Source of per-user OAuth tokens for platforms that accept them.
///
/// Owned by the account-linking side of the application; the scraper only reads.
#[async_trait]
pub trait TokenStore: Send + Sync {
    async fn github_token(&self, user_id: &str) -> Result<Option<String>, ScrapeError>;
}

/// No linked accounts. Every lookup returns `None`.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoTokens;

#[async_trait]
impl TokenStore for NoTokens {
    async fn github_token(&self, _user_id: &str) -> Result<Option<String>, ScrapeError> {
        Ok(None)
    }
}

#[derive(Clone, Default)]
pub struct ScrapeServiceConfig {
    pub providers: ProviderConfig,
    pub fetcher: FetcherConfig,
    /// `None` means [`DEFAULT_CACHE_TTL`]
    pub cache_ttl: Option<Duration>,
}

impl ScrapeServiceConfig {
    /// Defaults with provider settings read from the environment.
    pub fn from_env() -> Self {
        Self {
            providers: ProviderConfig::from_env(),
            ..Default::default()
        }
    }

    pub fn with_providers(mut self, providers: ProviderConfig) -> Self {
        self.providers = providers;
        self
    }

    pub fn with_fetcher(mut self, fetcher: FetcherConfig) -> Self {
        self.fetcher = fetcher;
        self
    }

    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = Some(ttl);
        self
    }
}

/// Trims the input and adds `https://` when no scheme was given.
pub fn normalize_input_url(raw: &str) -> Result<Url, ScrapeError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ScrapeError::InvalidUrl("URL is empty".to_string()));
    }

    let candidate = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("https://{trimmed}")
    };

    let url = Url::parse(&candidate)?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ScrapeError::InvalidUrl(format!(
            "unsupported scheme: {}",
            url.scheme()
        )));
    }
    if url.host_str().map_or(true, str::is_empty) {
        return Err(ScrapeError::InvalidUrl("URL has no host".to_string()));
    }

    Ok(url)
}

/// Entry point: picks a provider, consults the cache and stores fresh results.
#[derive(Clone)]
pub struct ScrapeService {
    registry: ProviderRegistry,
    cache: Arc<dyn CacheStore>,
    tokens: Arc<dyn TokenStore>,
    cache_ttl: Duration,
}

impl ScrapeService {
    /// Builds a service with an in-memory cache when the `cache` feature is on.
    pub fn new(config: ScrapeServiceConfig) -> Result<Self, ScrapeError> {
        let fetcher = Fetcher::new_with_config(config.fetcher);
        let registry = ProviderRegistry::new(&config.providers, fetcher)?;

        #[cfg(feature = "cache")]
        let cache: Arc<dyn CacheStore> = Arc::new(crate::cache::MemoryCache::new());
        #[cfg(not(feature = "cache"))]
        let cache: Arc<dyn CacheStore> = Arc::new(NoopCache);

        debug!("ScrapeService initialized");

        Ok(Self {
            registry,
            cache,
            tokens: Arc::new(NoTokens),
            cache_ttl: config.cache_ttl.unwrap_or(DEFAULT_CACHE_TTL),
        })
    }

    pub fn with_cache(mut self, cache: impl CacheStore + 'static) -> Self {
        self.cache = Arc::new(cache);
        self
    }

    pub fn with_shared_cache(mut self, cache: Arc<dyn CacheStore>) -> Self {
        self.cache = cache;
        self
    }

    pub fn without_cache(self) -> Self {
        self.with_cache(NoopCache)
    }

    pub fn with_token_store(mut self, tokens: impl TokenStore + 'static) -> Self {
        self.tokens = Arc::new(tokens);
        self
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    pub fn cache_ttl(&self) -> Duration {
        self.cache_ttl
    }

    /// Like [`ResourceScraper::scrape`], but aborts in-flight work when `signal` fires.
    #[instrument(level = "debug", skip(self, signal), err)]
    pub async fn scrape_with_signal(
        &self,
        url: &str,
        user_id: Option<&str>,
        signal: &CancelSignal,
    ) -> Result<ScrapedResource, ScrapeError> {
        let url = normalize_input_url(url)?;
        let provider = self.registry.select(&url);
        let platform = provider.platform();

        let options = self.options_for(provider, user_id).await;
        // Authenticated responses may include private data, so they are never shared.
        let key = (!options.is_authenticated()).then(|| cache_key(url.as_str()));

        if let Some(key) = key.as_deref() {
            if let Some(mut hit) = self.cache_lookup(key).await {
                debug!(url = %url, platform = %platform, "Cache hit");
                hit.cached = true;
                return Ok(hit);
            }
        }

        let resource = provider.scrape(&url, &options, signal).await?;
        info!(
            url = %url,
            platform = %platform,
            method = ?resource.method,
            "Scraped resource"
        );

        match key.as_deref() {
            Some(key) if resource.is_valid() => self.cache_store(key, &resource).await,
            Some(_) => debug!(url = %url, "Result has no title, not caching"),
            None => debug!(url = %url, "Authenticated result, not caching"),
        }

        Ok(resource)
    }

    /// Scrapes several URLs with at most `concurrency` in flight. Results keep input order.
    pub async fn scrape_many(
        &self,
        urls: &[String],
        user_id: Option<&str>,
        concurrency: usize,
    ) -> Vec<Result<ScrapedResource, ScrapeError>> {
        let signal = CancelSignal::never();
        stream::iter(urls)
            .map(|url| self.scrape_with_signal(url, user_id, &signal))
            .buffered(concurrency.max(1))
            .collect()
            .await
    }

    async fn options_for(&self, provider: &Provider, user_id: Option<&str>) -> ScrapeOptions {
        let (Platform::Github, Some(user_id)) = (provider.platform(), user_id) else {
            return ScrapeOptions::default();
        };

        match self.tokens.github_token(user_id).await {
            Ok(token) => ScrapeOptions {
                github_access_token: token.filter(|t| !t.is_empty()),
            },
            Err(e) => {
                warn!(user_id = %user_id, error = %e, "GitHub token lookup failed, scraping anonymously");
                ScrapeOptions::default()
            }
        }
    }

    async fn cache_lookup(&self, key: &str) -> Option<ScrapedResource> {
        let raw = match self.cache.get(key).await {
            Ok(raw) => raw?,
            Err(e) => {
                warn!(key = %key, error = %e, "Cache read failed, treating as miss");
                return None;
            }
        };

        match serde_json::from_str::<ScrapedResource>(&raw) {
            Ok(resource) => Some(resource),
            Err(e) => {
                warn!(key = %key, error = %e, "Corrupt cache entry, treating as miss");
                None
            }
        }
    }

    async fn cache_store(&self, key: &str, resource: &ScrapedResource) {
        let value = match serde_json::to_string(resource) {
            Ok(value) => value,
            Err(e) => {
                warn!(key = %key, error = %e, "Could not serialize resource for cache");
                return;
            }
        };

        if let Err(e) = self.cache.set_ex(key, value, self.cache_ttl).await {
            warn!(key = %key, error = %e, "Cache write failed");
        }
    }
}

#[async_trait]
impl ResourceScraper for ScrapeService {
    async fn scrape(
        &self,
        url: &str,
        user_id: Option<&str>,
    ) -> Result<ScrapedResource, ScrapeError> {
        self.scrape_with_signal(url, user_id, &CancelSignal::never())
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_adds_scheme() {
        let url = normalize_input_url("  github.com/facebook/react ").unwrap();
        assert_eq!(url.as_str(), "https://github.com/facebook/react");

        let url = normalize_input_url("http://example.com/a").unwrap();
        assert_eq!(url.scheme(), "http");
    }

    #[test]
    fn test_normalize_rejects_bad_input() {
        for raw in ["", "   ", "ftp://example.com/file", "file:///etc/passwd", "https://"] {
            assert!(
                matches!(normalize_input_url(raw), Err(ScrapeError::InvalidUrl(_))),
                "{raw:?} should be rejected"
            );
        }
    }

    #[tokio::test]
    async fn test_no_tokens() {
        assert_eq!(NoTokens.github_token("user-1").await.unwrap(), None);
    }
}
