use super::{host_of, read_json, segments, send_error, ProviderConfig};
use crate::error::ScrapeError;
use crate::taxonomy::partition_tags;
use crate::{Platform, ResourceMetadata, ResourceType, ScrapeMethod, ScrapedResource};
use reqwest::Client;
use serde::Deserialize;
use tracing::instrument;
use url::Url;

/// First path segments on dev.to that are site sections, not authors.
const RESERVED_SEGMENTS: &[&str] = &[
    "t",
    "top",
    "latest",
    "search",
    "settings",
    "new",
    "dashboard",
    "enter",
    "notifications",
    "readinglist",
    "listings",
    "videos",
    "podcasts",
    "tags",
    "about",
    "faq",
];

#[derive(Clone)]
pub struct DevToProvider {
    client: Client,
    api_base: String,
}

/// `(username, slug)` for `dev.to/{username}/{slug}`.
pub fn parse_article(url: &Url) -> Option<(String, String)> {
    if !matches!(host_of(url).as_str(), "dev.to" | "www.dev.to") {
        return None;
    }

    match segments(url).as_slice() {
        [user, slug] if !RESERVED_SEGMENTS.contains(&user.to_ascii_lowercase().as_str()) => {
            Some((user.to_string(), slug.to_string()))
        }
        _ => None,
    }
}

impl DevToProvider {
    pub fn new(config: &ProviderConfig, client: Client) -> Self {
        Self {
            client,
            api_base: config.devto_api_base.trim_end_matches('/').to_string(),
        }
    }

    pub fn can_handle(&self, url: &Url) -> bool {
        parse_article(url).is_some()
    }

    #[instrument(level = "debug", skip(self), err)]
    pub async fn scrape(&self, url: &Url) -> Result<ScrapedResource, ScrapeError> {
        let (user, slug) = parse_article(url)
            .ok_or_else(|| ScrapeError::InvalidUrl(format!("not a DEV article URL: {url}")))?;

        let response = self
            .client
            .get(format!("{}/articles/{user}/{slug}", self.api_base))
            .send()
            .await
            .map_err(|e| send_error(Platform::Devto, e))?;

        let article: DevToArticle = read_json(Platform::Devto, response, "article").await?;
        Ok(article.into_resource(url))
    }
}

#[derive(Debug, Deserialize)]
struct DevToArticle {
    title: String,
    description: Option<String>,
    url: Option<String>,
    cover_image: Option<String>,
    social_image: Option<String>,
    published_at: Option<String>,
    reading_time_minutes: Option<u32>,
    public_reactions_count: Option<u64>,
    comments_count: Option<u64>,
    page_views_count: Option<u64>,
    #[serde(default)]
    tags: Option<DevToTags>,
    #[serde(default)]
    tag_list: Option<DevToTags>,
    user: Option<DevToUser>,
}

#[derive(Debug, Deserialize)]
struct DevToUser {
    name: Option<String>,
    username: Option<String>,
}

/// The articles endpoint reports tags as either a list or a comma-joined string,
/// and swaps the two fields between list and detail responses.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum DevToTags {
    List(Vec<String>),
    Joined(String),
}

impl DevToTags {
    fn into_vec(self) -> Vec<String> {
        match self {
            DevToTags::List(tags) => tags,
            DevToTags::Joined(joined) => joined
                .split(',')
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty())
                .collect(),
        }
    }
}

impl DevToArticle {
    fn into_resource(self, requested: &Url) -> ScrapedResource {
        let raw_tags = self
            .tag_list
            .or(self.tags)
            .map(DevToTags::into_vec)
            .unwrap_or_default();
        let (tags, tech) = partition_tags(raw_tags);

        let credits = self
            .user
            .and_then(|u| u.name.filter(|n| !n.trim().is_empty()).or(u.username));

        ScrapedResource {
            title: self.title,
            description: self.description.filter(|d| !d.trim().is_empty()),
            image: self
                .cover_image
                .filter(|i| !i.is_empty())
                .or(self.social_image),
            credits,
            url: self.url.unwrap_or_else(|| requested.to_string()),
            suggested_resource_type: ResourceType::Blog,
            suggested_tags: tags,
            suggested_tech_stack: tech,
            platform: Platform::Devto,
            method: ScrapeMethod::Api,
            cached: false,
            metadata: ResourceMetadata {
                reading_time: self.reading_time_minutes,
                published_at: self.published_at,
                reactions: self.public_reactions_count,
                comments: self.comments_count,
                views: self.page_views_count,
                ..Default::default()
            },
        }
    }
}
