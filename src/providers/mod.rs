//! Platform strategies. Each provider answers "can I handle this URL?" and turns
//! a URL into a [`ScrapedResource`]. The set is closed: adding a platform means
//! adding a [`Provider`] variant and slotting it into [`ProviderRegistry::new`].

mod devto;
mod generic;
mod github;
mod hashnode;
mod youtube;

pub use devto::DevToProvider;
pub use generic::GenericProvider;
pub use github::GitHubProvider;
pub use hashnode::HashnodeProvider;
pub use youtube::{parse_iso8601_duration, YouTubeProvider};

use crate::cancel::CancelSignal;
use crate::error::ScrapeError;
use crate::fetcher::Fetcher;
use crate::{Platform, ScrapeOptions, ScrapedResource};
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, instrument};
use url::Url;

pub const YOUTUBE_API_BASE: &str = "https://www.googleapis.com/youtube/v3";
pub const YOUTUBE_OEMBED_URL: &str = "https://www.youtube.com/oembed";
pub const GITHUB_API_BASE: &str = "https://api.github.com";
pub const DEVTO_API_BASE: &str = "https://dev.to/api";
pub const HASHNODE_GRAPHQL_URL: &str = "https://gql.hashnode.com";

/// Upper bound on playlist entries returned with a playlist.
pub const DEFAULT_MAX_PLAYLIST_ITEMS: usize = 100;

/// Settings shared by the platform API providers.
///
/// Base URLs default to the real platform endpoints; overriding them is meant for
/// tests and self-hosted mirrors.
#[derive(Clone)]
pub struct ProviderConfig {
    pub youtube_api_key: Option<String>,
    pub youtube_api_base: String,
    pub youtube_oembed_url: String,
    pub github_api_base: String,
    pub devto_api_base: String,
    pub hashnode_graphql_url: String,
    pub api_timeout: Duration,
    pub max_playlist_items: usize,
    pub user_agent: String,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            youtube_api_key: None,
            youtube_api_base: YOUTUBE_API_BASE.to_string(),
            youtube_oembed_url: YOUTUBE_OEMBED_URL.to_string(),
            github_api_base: GITHUB_API_BASE.to_string(),
            devto_api_base: DEVTO_API_BASE.to_string(),
            hashnode_graphql_url: HASHNODE_GRAPHQL_URL.to_string(),
            api_timeout: Duration::from_secs(10),
            max_playlist_items: DEFAULT_MAX_PLAYLIST_ITEMS,
            user_agent: "resource_scraper/0.1.0".to_string(),
        }
    }
}

impl ProviderConfig {
    /// Defaults plus `YOUTUBE_API_KEY` from the environment.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(key) = std::env::var("YOUTUBE_API_KEY") {
            if !key.trim().is_empty() {
                debug!("Found YouTube API key in environment");
                config.youtube_api_key = Some(key.trim().to_string());
            }
        }
        config
    }

    pub fn with_youtube_api_key(mut self, key: impl Into<String>) -> Self {
        self.youtube_api_key = Some(key.into());
        self
    }

    pub fn with_youtube_api_base(mut self, base: impl Into<String>) -> Self {
        self.youtube_api_base = base.into();
        self
    }

    pub fn with_youtube_oembed_url(mut self, url: impl Into<String>) -> Self {
        self.youtube_oembed_url = url.into();
        self
    }

    pub fn with_github_api_base(mut self, base: impl Into<String>) -> Self {
        self.github_api_base = base.into();
        self
    }

    pub fn with_devto_api_base(mut self, base: impl Into<String>) -> Self {
        self.devto_api_base = base.into();
        self
    }

    pub fn with_hashnode_graphql_url(mut self, url: impl Into<String>) -> Self {
        self.hashnode_graphql_url = url.into();
        self
    }

    pub fn with_max_playlist_items(mut self, max: usize) -> Self {
        self.max_playlist_items = max;
        self
    }
}

/// The closed set of scraping strategies.
#[derive(Clone)]
pub enum Provider {
    Youtube(YouTubeProvider),
    Github(GitHubProvider),
    Devto(DevToProvider),
    Hashnode(HashnodeProvider),
    Generic(GenericProvider),
}

impl Provider {
    pub fn platform(&self) -> Platform {
        match self {
            Provider::Youtube(_) => Platform::Youtube,
            Provider::Github(_) => Platform::Github,
            Provider::Devto(_) => Platform::Devto,
            Provider::Hashnode(_) => Platform::Hashnode,
            Provider::Generic(_) => Platform::Generic,
        }
    }

    pub fn can_handle(&self, url: &Url) -> bool {
        match self {
            Provider::Youtube(p) => p.can_handle(url),
            Provider::Github(p) => p.can_handle(url),
            Provider::Devto(p) => p.can_handle(url),
            Provider::Hashnode(p) => p.can_handle(url),
            Provider::Generic(_) => true,
        }
    }

    #[instrument(level = "debug", skip(self, options, signal), fields(platform = %self.platform()), err)]
    pub async fn scrape(
        &self,
        url: &Url,
        options: &ScrapeOptions,
        signal: &CancelSignal,
    ) -> Result<ScrapedResource, ScrapeError> {
        let platform = self.platform();
        match self {
            Provider::Youtube(p) => cancellable(platform, signal, p.scrape(url)).await,
            Provider::Github(p) => cancellable(platform, signal, p.scrape(url, options)).await,
            Provider::Devto(p) => cancellable(platform, signal, p.scrape(url)).await,
            Provider::Hashnode(p) => cancellable(platform, signal, p.scrape(url)).await,
            Provider::Generic(p) => p.scrape(url, signal).await,
        }
    }
}

/// Providers ordered from most specific to the generic fallback.
#[derive(Clone)]
pub struct ProviderRegistry {
    specific: Vec<Provider>,
    fallback: Provider,
}

impl ProviderRegistry {
    pub fn new(config: &ProviderConfig, fetcher: Fetcher) -> Result<Self, ScrapeError> {
        let client = api_client(config)?;

        Ok(Self {
            specific: vec![
                Provider::Youtube(YouTubeProvider::new(config, client.clone())),
                Provider::Github(GitHubProvider::new(config, client.clone())),
                Provider::Devto(DevToProvider::new(config, client.clone())),
                Provider::Hashnode(HashnodeProvider::new(config, client)),
            ],
            fallback: Provider::Generic(GenericProvider::new(fetcher)),
        })
    }

    /// First provider that accepts `url`. Never fails: the generic provider takes everything.
    pub fn select(&self, url: &Url) -> &Provider {
        self.specific
            .iter()
            .find(|p| p.can_handle(url))
            .unwrap_or(&self.fallback)
    }

    pub fn providers(&self) -> impl Iterator<Item = &Provider> {
        self.specific.iter().chain(std::iter::once(&self.fallback))
    }
}

fn api_client(config: &ProviderConfig) -> Result<Client, ScrapeError> {
    Client::builder()
        .timeout(config.api_timeout)
        .user_agent(&config.user_agent)
        .build()
        .map_err(|e| ScrapeError::Internal(format!("failed to build API client: {e}")))
}

async fn cancellable<T>(
    platform: Platform,
    signal: &CancelSignal,
    work: impl Future<Output = Result<T, ScrapeError>>,
) -> Result<T, ScrapeError> {
    tokio::select! {
        biased;
        _ = signal.cancelled() => Err(ScrapeError::Timeout(format!("{platform} request was cancelled"))),
        result = work => result,
    }
}

/// Maps a transport failure. The URL is stripped so query-string API keys never reach logs.
pub(crate) fn send_error(platform: Platform, e: reqwest::Error) -> ScrapeError {
    let e = e.without_url();
    if e.is_timeout() {
        ScrapeError::Timeout(format!("{platform} API request timed out"))
    } else {
        ScrapeError::platform(platform, format!("request failed: {e}"))
    }
}

/// Checks the status and decodes a JSON body. 404 means the content does not exist.
pub(crate) async fn read_json<T: DeserializeOwned>(
    platform: Platform,
    response: Response,
    what: &str,
) -> Result<T, ScrapeError> {
    let status = response.status();

    if status == StatusCode::NOT_FOUND {
        return Err(ScrapeError::NotFound(format!("{what} not found on {platform}")));
    }

    if !status.is_success() {
        return Err(ScrapeError::platform(
            platform,
            format!("{what}: API returned status {status}"),
        ));
    }

    response
        .json::<T>()
        .await
        .map_err(|e| ScrapeError::platform(platform, format!("malformed {what} response: {}", e.without_url())))
}

/// Path segments with empty entries (trailing slashes) removed.
pub(crate) fn segments(url: &Url) -> Vec<&str> {
    url.path_segments()
        .map(|s| s.filter(|seg| !seg.is_empty()).collect())
        .unwrap_or_default()
}

pub(crate) fn host_of(url: &Url) -> String {
    url.host_str().unwrap_or_default().to_ascii_lowercase()
}
