use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

mod cache;
mod cancel;
mod dns;
mod error;
mod extractor;
mod fetcher;
mod github_types;
#[cfg(feature = "logging")]
mod logging;
pub mod providers;
#[cfg(feature = "server")]
mod rate_limit;
mod scrape_service;
mod security;
#[cfg(feature = "server")]
pub mod server;
pub mod taxonomy;
#[cfg(feature = "logging")]
mod utils;

#[cfg(feature = "cache")]
pub use cache::MemoryCache;
pub use cache::{cache_key, decode_cache_key, CacheStore, NoopCache, DEFAULT_CACHE_TTL};
pub use cancel::{CancelHandle, CancelSignal};
pub use dns::{HostResolver, StaticResolver, SystemResolver};
pub use error::ScrapeError;
pub use extractor::{MetadataExtractor, PageMetadata};
pub use fetcher::{FetchResponse, Fetcher, FetcherConfig};
#[cfg(feature = "logging")]
pub use logging::{log_error_card, log_resource_card, setup_logging, LogConfig, LogLevelGuard};
pub use providers::{Provider, ProviderConfig, ProviderRegistry};
#[cfg(feature = "server")]
pub use rate_limit::{RateDecision, RateLimiter, SlidingWindowLimiter};
pub use scrape_service::{
    normalize_input_url, NoTokens, ScrapeService, ScrapeServiceConfig, TokenStore,
};
pub use security::{FetchLimits, UrlValidationConfig, UrlValidator};

/// Classification hint for the resource-creation form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceType {
    Video,
    Playlist,
    Repo,
    Blog,
    Tool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Youtube,
    Github,
    Devto,
    Hashnode,
    Generic,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Youtube => "youtube",
            Platform::Github => "github",
            Platform::Devto => "devto",
            Platform::Hashnode => "hashnode",
            Platform::Generic => "generic",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where the data in a [`ScrapedResource`] came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScrapeMethod {
    Api,
    Graphql,
    OgMeta,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaylistVideoItem {
    pub position: u32,
    pub video_id: String,
    pub title: String,
    pub thumbnail: String,
}

/// Platform-specific extras. Every field is optional; providers fill what they know.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ResourceMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_seconds: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub view_count: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub like_count: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub published_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub playlist_item_count: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub playlist_items: Option<Vec<PlaylistVideoItem>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stars: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub forks: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub open_issues: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub topics: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub license: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub archived: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reading_time: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reactions: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comments: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub views: Option<u64>,
}

/// Normalized metadata about a user-supplied URL, used to prefill a resource form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScrapedResource {
    pub title: String,
    pub description: Option<String>,
    pub image: Option<String>,
    pub credits: Option<String>,
    pub url: String,
    pub suggested_resource_type: ResourceType,
    pub suggested_tags: Vec<String>,
    pub suggested_tech_stack: Vec<String>,
    pub platform: Platform,
    pub method: ScrapeMethod,
    #[serde(default)]
    pub cached: bool,
    #[serde(default)]
    pub metadata: ResourceMetadata,
}

impl ScrapedResource {
    /// A result is only worth keeping when it carries a title.
    pub fn is_valid(&self) -> bool {
        !self.title.trim().is_empty()
    }
}

/// Per-call options threaded through to providers.
#[derive(Clone, Default)]
pub struct ScrapeOptions {
    pub github_access_token: Option<String>,
}

impl ScrapeOptions {
    pub fn is_authenticated(&self) -> bool {
        self.github_access_token.is_some()
    }
}

// never print the token
impl fmt::Debug for ScrapeOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScrapeOptions")
            .field(
                "github_access_token",
                &self.github_access_token.as_ref().map(|_| "<redacted>"),
            )
            .finish()
    }
}

#[async_trait]
pub trait ResourceScraper: Send + Sync {
    async fn scrape(&self, url: &str, user_id: Option<&str>)
        -> Result<ScrapedResource, ScrapeError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_serializes_camel_case() {
        let resource = ScrapedResource {
            title: "React".into(),
            description: None,
            image: None,
            credits: Some("facebook".into()),
            url: "https://github.com/facebook/react".into(),
            suggested_resource_type: ResourceType::Repo,
            suggested_tags: vec!["ui".into()],
            suggested_tech_stack: vec!["javascript".into()],
            platform: Platform::Github,
            method: ScrapeMethod::Api,
            cached: false,
            metadata: ResourceMetadata {
                stars: Some(42),
                ..Default::default()
            },
        };

        let json = serde_json::to_value(&resource).unwrap();
        assert_eq!(json["suggestedResourceType"], "repo");
        assert_eq!(json["suggestedTechStack"][0], "javascript");
        assert_eq!(json["platform"], "github");
        assert_eq!(json["method"], "api");
        assert_eq!(json["metadata"]["stars"], 42);
        assert!(json["metadata"].get("forks").is_none());
    }

    #[test]
    fn test_og_meta_method_name() {
        assert_eq!(
            serde_json::to_value(ScrapeMethod::OgMeta).unwrap(),
            "og_meta"
        );
    }

    #[test]
    fn test_options_debug_redacts_token() {
        let options = ScrapeOptions {
            github_access_token: Some("gho_secret".into()),
        };
        let printed = format!("{options:?}");
        assert!(!printed.contains("gho_secret"));
        assert!(printed.contains("redacted"));
    }

    #[test]
    fn test_blank_title_is_invalid() {
        let resource = ScrapedResource {
            title: "   ".into(),
            description: None,
            image: None,
            credits: None,
            url: "https://example.com".into(),
            suggested_resource_type: ResourceType::Blog,
            suggested_tags: vec![],
            suggested_tech_stack: vec![],
            platform: Platform::Generic,
            method: ScrapeMethod::OgMeta,
            cached: false,
            metadata: ResourceMetadata::default(),
        };
        assert!(!resource.is_valid());
    }
}
