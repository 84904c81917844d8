use super::{host_of, read_json, segments, send_error, ProviderConfig};
use crate::error::ScrapeError;
use crate::github_types::{is_github_host, GitHubRepository, RESERVED_OWNERS};
use crate::taxonomy::{normalize_language, partition_tags, push_unique};
use crate::{Platform, ResourceMetadata, ResourceType, ScrapeMethod, ScrapeOptions, ScrapedResource};
use reqwest::header::{HeaderMap, ACCEPT};
use reqwest::{Client, StatusCode};
use tracing::{debug, instrument, warn};
use url::Url;

const GITHUB_API_VERSION: &str = "2022-11-28";

#[derive(Clone)]
pub struct GitHubProvider {
    client: Client,
    api_base: String,
}

/// `(owner, repo)` for `github.com/{owner}/{repo}[/...]`, with a trailing `.git` removed.
pub fn parse_repo(url: &Url) -> Option<(String, String)> {
    if !is_github_host(&host_of(url)) {
        return None;
    }

    let parts = segments(url);
    let owner = *parts.first()?;
    let repo = parts.get(1)?.trim_end_matches(".git");

    if repo.is_empty() || RESERVED_OWNERS.contains(&owner.to_ascii_lowercase().as_str()) {
        return None;
    }

    Some((owner.to_string(), repo.to_string()))
}

impl GitHubProvider {
    pub fn new(config: &ProviderConfig, client: Client) -> Self {
        Self {
            client,
            api_base: config.github_api_base.trim_end_matches('/').to_string(),
        }
    }

    pub fn can_handle(&self, url: &Url) -> bool {
        parse_repo(url).is_some()
    }

    #[instrument(level = "debug", skip(self, options), fields(authenticated = options.is_authenticated()), err)]
    pub async fn scrape(
        &self,
        url: &Url,
        options: &ScrapeOptions,
    ) -> Result<ScrapedResource, ScrapeError> {
        let (owner, repo) = parse_repo(url)
            .ok_or_else(|| ScrapeError::InvalidUrl(format!("not a GitHub repository URL: {url}")))?;

        let mut request = self
            .client
            .get(format!("{}/repos/{owner}/{repo}", self.api_base))
            .header(ACCEPT, "application/vnd.github+json")
            .header("X-GitHub-Api-Version", GITHUB_API_VERSION);
        if let Some(token) = options.github_access_token.as_deref() {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| send_error(Platform::Github, e))?;

        let status = response.status();
        if (status == StatusCode::FORBIDDEN || status == StatusCode::TOO_MANY_REQUESTS)
            && rate_limit_exhausted(response.headers())
        {
            warn!(owner = %owner, repo = %repo, "GitHub API rate limit exhausted");
            return Err(ScrapeError::platform(
                Platform::Github,
                "GitHub API rate limit exceeded",
            ));
        }

        let repository: GitHubRepository =
            read_json(Platform::Github, response, "repository").await?;
        debug!(full_name = %repository.full_name, stars = repository.stargazers_count, "Fetched repository");

        Ok(into_resource(repository))
    }
}

fn rate_limit_exhausted(headers: &HeaderMap) -> bool {
    headers
        .get("x-ratelimit-remaining")
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim() == "0")
        .unwrap_or(false)
}

fn into_resource(repo: GitHubRepository) -> ScrapedResource {
    let language = repo.language.as_deref().and_then(normalize_language);

    let (tags, topic_tech) = partition_tags(repo.topics.iter());
    let mut tech = Vec::new();
    if let Some(lang) = &language {
        tech.push(lang.clone());
    }
    for t in topic_tech {
        push_unique(&mut tech, t);
    }

    let license = repo
        .license
        .as_ref()
        .and_then(|l| l.spdx_id.clone().filter(|id| id != "NOASSERTION").or_else(|| l.name.clone()));

    ScrapedResource {
        image: Some(format!(
            "https://opengraph.githubassets.com/1/{}",
            repo.full_name
        )),
        description: repo.description.filter(|d| !d.trim().is_empty()),
        credits: Some(repo.owner.login),
        url: repo.html_url,
        suggested_resource_type: ResourceType::Repo,
        suggested_tags: tags,
        suggested_tech_stack: tech,
        platform: Platform::Github,
        method: ScrapeMethod::Api,
        cached: false,
        metadata: ResourceMetadata {
            stars: Some(repo.stargazers_count),
            forks: Some(repo.forks_count),
            open_issues: Some(repo.open_issues_count),
            language: repo.language,
            topics: Some(repo.topics),
            license,
            last_updated: repo.pushed_at,
            archived: Some(repo.archived),
            ..Default::default()
        },
        title: repo.full_name,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn test_parse_repo() {
        assert_eq!(
            parse_repo(&url("https://github.com/facebook/react")),
            Some(("facebook".into(), "react".into()))
        );
        assert_eq!(
            parse_repo(&url("https://github.com/rust-lang/rust.git")),
            Some(("rust-lang".into(), "rust".into()))
        );
        assert_eq!(
            parse_repo(&url("https://www.github.com/tokio-rs/tokio/tree/master/tokio")),
            Some(("tokio-rs".into(), "tokio".into()))
        );
        assert_eq!(parse_repo(&url("https://github.com/facebook")), None);
        assert_eq!(parse_repo(&url("https://github.com/features/copilot")), None);
        assert_eq!(parse_repo(&url("https://gitlab.com/a/b")), None);
    }

    #[test]
    fn test_rate_limit_header() {
        let mut headers = HeaderMap::new();
        assert!(!rate_limit_exhausted(&headers));
        headers.insert("x-ratelimit-remaining", "0".parse().unwrap());
        assert!(rate_limit_exhausted(&headers));
        headers.insert("x-ratelimit-remaining", "12".parse().unwrap());
        assert!(!rate_limit_exhausted(&headers));
    }

    #[test]
    fn test_repository_mapping() {
        let repo: GitHubRepository = serde_json::from_value(serde_json::json!({
            "name": "react",
            "full_name": "facebook/react",
            "description": "The library for web and native user interfaces.",
            "stargazers_count": 230000,
            "forks_count": 47000,
            "open_issues_count": 900,
            "language": "JavaScript",
            "owner": {"login": "facebook"},
            "topics": ["react", "javascript", "ui", "frontend", "declarative"],
            "html_url": "https://github.com/facebook/react",
            "license": {"spdx_id": "MIT", "name": "MIT License"},
            "pushed_at": "2024-05-01T00:00:00Z",
            "archived": false
        }))
        .unwrap();

        let resource = into_resource(repo);
        assert_eq!(resource.title, "facebook/react");
        assert_eq!(resource.credits.as_deref(), Some("facebook"));
        assert_eq!(resource.suggested_resource_type, ResourceType::Repo);
        assert_eq!(resource.suggested_tech_stack, vec!["javascript", "react"]);
        assert_eq!(resource.suggested_tags, vec!["ui", "frontend", "declarative"]);
        assert_eq!(
            resource.image.as_deref(),
            Some("https://opengraph.githubassets.com/1/facebook/react")
        );
        assert_eq!(resource.metadata.stars, Some(230000));
        assert_eq!(resource.metadata.license.as_deref(), Some("MIT"));
        assert_eq!(resource.metadata.archived, Some(false));
    }
}
