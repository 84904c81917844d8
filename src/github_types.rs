use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct GitHubRepository {
    pub name: String,
    pub full_name: String,
    pub description: Option<String>,
    #[serde(default)]
    pub stargazers_count: u64,
    #[serde(default)]
    pub forks_count: u64,
    pub language: Option<String>,
    #[serde(default)]
    pub open_issues_count: u64,
    pub owner: GitHubOwner,
    #[serde(default)]
    pub topics: Vec<String>,
    pub html_url: String,
    pub homepage: Option<String>,
    pub license: Option<GitHubLicense>,
    pub pushed_at: Option<String>,
    #[serde(default)]
    pub archived: bool,
}

#[derive(Debug, Deserialize)]
pub struct GitHubOwner {
    pub login: String,
    pub avatar_url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct GitHubLicense {
    pub spdx_id: Option<String>,
    pub name: Option<String>,
}

/// First path segments on github.com that never name a repository owner.
pub const RESERVED_OWNERS: &[&str] = &[
    "about",
    "apps",
    "collections",
    "enterprise",
    "events",
    "explore",
    "features",
    "issues",
    "login",
    "marketplace",
    "new",
    "notifications",
    "orgs",
    "pricing",
    "pulls",
    "search",
    "settings",
    "sponsors",
    "topics",
    "trending",
];

pub fn is_github_host(host: &str) -> bool {
    matches!(host, "github.com" | "www.github.com")
}
