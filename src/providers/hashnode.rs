use super::{host_of, read_json, segments, send_error, ProviderConfig};
use crate::error::ScrapeError;
use crate::taxonomy::partition_tags;
use crate::{Platform, ResourceMetadata, ResourceType, ScrapeMethod, ScrapedResource};
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, instrument};
use url::Url;

const POST_QUERY: &str = r#"
query Post($host: String!, $slug: String!) {
  publication(host: $host) {
    post(slug: $slug) {
      title
      subtitle
      brief
      url
      coverImage { url }
      author { name username }
      tags { name slug }
      readTimeInMinutes
      publishedAt
      reactionCount
      responseCount
      views
    }
  }
}
"#;

#[derive(Clone)]
pub struct HashnodeProvider {
    client: Client,
    endpoint: String,
}

/// `(publication host, post slug)` for `{blog}.hashnode.dev/{slug}`.
pub fn parse_post(url: &Url) -> Option<(String, String)> {
    let host = host_of(url);
    let blog = host.strip_suffix(".hashnode.dev")?;
    if blog.is_empty() || blog == "www" {
        return None;
    }

    match segments(url).as_slice() {
        [slug] => Some((host.clone(), slug.to_string())),
        _ => None,
    }
}

impl HashnodeProvider {
    pub fn new(config: &ProviderConfig, client: Client) -> Self {
        Self {
            client,
            endpoint: config.hashnode_graphql_url.clone(),
        }
    }

    pub fn can_handle(&self, url: &Url) -> bool {
        parse_post(url).is_some()
    }

    #[instrument(level = "debug", skip(self), err)]
    pub async fn scrape(&self, url: &Url) -> Result<ScrapedResource, ScrapeError> {
        let (host, slug) = parse_post(url)
            .ok_or_else(|| ScrapeError::InvalidUrl(format!("not a Hashnode post URL: {url}")))?;

        let body = json!({
            "query": POST_QUERY,
            "variables": { "host": host, "slug": slug },
        });

        let response = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|e| send_error(Platform::Hashnode, e))?;

        let reply: GraphQlResponse = read_json(Platform::Hashnode, response, "post").await?;

        if let Some(first) = reply.errors.first() {
            return Err(ScrapeError::platform(
                Platform::Hashnode,
                format!("GraphQL error: {}", first.message),
            ));
        }

        let post = reply
            .data
            .and_then(|d| d.publication)
            .and_then(|p| p.post)
            .ok_or_else(|| ScrapeError::NotFound(format!("Hashnode post {slug} on {host}")))?;

        debug!(host = %host, slug = %slug, "Fetched Hashnode post");
        Ok(post.into_resource(url))
    }
}

#[derive(Debug, Deserialize)]
struct GraphQlResponse {
    data: Option<GraphQlData>,
    #[serde(default)]
    errors: Vec<GraphQlError>,
}

#[derive(Debug, Deserialize)]
struct GraphQlError {
    message: String,
}

#[derive(Debug, Deserialize)]
struct GraphQlData {
    publication: Option<Publication>,
}

#[derive(Debug, Deserialize)]
struct Publication {
    post: Option<HashnodePost>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HashnodePost {
    title: String,
    subtitle: Option<String>,
    brief: Option<String>,
    url: Option<String>,
    cover_image: Option<CoverImage>,
    author: Option<Author>,
    #[serde(default)]
    tags: Option<Vec<Tag>>,
    read_time_in_minutes: Option<u32>,
    published_at: Option<String>,
    reaction_count: Option<u64>,
    response_count: Option<u64>,
    views: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct CoverImage {
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Author {
    name: Option<String>,
    username: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Tag {
    name: Option<String>,
    slug: Option<String>,
}

impl HashnodePost {
    fn into_resource(self, requested: &Url) -> ScrapedResource {
        let raw_tags = self
            .tags
            .unwrap_or_default()
            .into_iter()
            .filter_map(|t| t.slug.or(t.name));
        let (tags, tech) = partition_tags(raw_tags);

        let description = self
            .subtitle
            .filter(|s| !s.trim().is_empty())
            .or(self.brief)
            .filter(|s| !s.trim().is_empty());

        ScrapedResource {
            title: self.title,
            description,
            image: self.cover_image.and_then(|c| c.url),
            credits: self
                .author
                .and_then(|a| a.name.filter(|n| !n.trim().is_empty()).or(a.username)),
            url: self.url.unwrap_or_else(|| requested.to_string()),
            suggested_resource_type: ResourceType::Blog,
            suggested_tags: tags,
            suggested_tech_stack: tech,
            platform: Platform::Hashnode,
            method: ScrapeMethod::Graphql,
            cached: false,
            metadata: ResourceMetadata {
                reading_time: self.read_time_in_minutes,
                published_at: self.published_at,
                reactions: self.reaction_count,
                comments: self.response_count,
                views: self.views,
                ..Default::default()
            },
        }
    }
}
