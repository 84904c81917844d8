use super::{host_of, read_json, send_error, ProviderConfig};
use crate::error::ScrapeError;
use crate::taxonomy::{dedupe_tags, partition_tags, push_unique, tech_in_text};
use crate::{
    Platform, PlaylistVideoItem, ResourceMetadata, ResourceType, ScrapeMethod, ScrapedResource,
};
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, instrument, warn};
use url::Url;

static VIDEO_ID_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?:youtube(?:-nocookie)?\.com/(?:watch\?(?:[^#]*&)?v=|shorts/|embed/|live/|v/)|youtu\.be/)([A-Za-z0-9_-]{11})",
    )
    .expect("Failed to compile YouTube video regex")
});

static PLAYLIST_ID_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[?&]list=([A-Za-z0-9_-]+)").expect("Failed to compile YouTube playlist regex")
});

static DURATION_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^P(?:(\d+)W)?(?:(\d+)D)?(?:T(?:(\d+)H)?(?:(\d+)M)?(?:(\d+)S)?)?$")
        .expect("Failed to compile ISO 8601 duration regex")
});

const YOUTUBE_HOSTS: &[&str] = &[
    "youtube.com",
    "www.youtube.com",
    "m.youtube.com",
    "music.youtube.com",
    "youtu.be",
    "youtube-nocookie.com",
    "www.youtube-nocookie.com",
];

const PAGE_SIZE: usize = 50;

/// Video and playlist IDs found in a YouTube URL.
pub fn extract_ids(url: &str) -> (Option<String>, Option<String>) {
    let video = VIDEO_ID_REGEX
        .captures(url)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string());
    let playlist = PLAYLIST_ID_REGEX
        .captures(url)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string());
    (video, playlist)
}

/// Thumbnail URL derived from the video ID alone; needs no API call.
pub fn thumbnail_for(video_id: &str) -> String {
    format!("https://i.ytimg.com/vi/{video_id}/hqdefault.jpg")
}

/// Converts an ISO 8601 duration such as `PT1H2M3S` to seconds.
pub fn parse_iso8601_duration(raw: &str) -> Option<u64> {
    let caps = DURATION_REGEX.captures(raw.trim())?;
    let units: [(usize, u64); 5] = [(1, 604_800), (2, 86_400), (3, 3_600), (4, 60), (5, 1)];

    units.iter().try_fold(0u64, |total, &(group, secs)| {
        let value = match caps.get(group) {
            Some(m) => m.as_str().parse::<u64>().ok()?,
            None => 0,
        };
        value.checked_mul(secs)?.checked_add(total)
    })
}

#[derive(Clone)]
pub struct YouTubeProvider {
    client: Client,
    api_key: Option<String>,
    api_base: String,
    oembed_url: String,
    max_playlist_items: usize,
}

impl YouTubeProvider {
    pub fn new(config: &ProviderConfig, client: Client) -> Self {
        Self {
            client,
            api_key: config.youtube_api_key.clone(),
            api_base: config.youtube_api_base.trim_end_matches('/').to_string(),
            oembed_url: config.youtube_oembed_url.clone(),
            max_playlist_items: config.max_playlist_items,
        }
    }

    pub fn can_handle(&self, url: &Url) -> bool {
        if !YOUTUBE_HOSTS.contains(&host_of(url).as_str()) {
            return false;
        }
        let (video, playlist) = extract_ids(url.as_str());
        video.is_some() || playlist.is_some()
    }

    #[instrument(level = "debug", skip(self), err)]
    pub async fn scrape(&self, url: &Url) -> Result<ScrapedResource, ScrapeError> {
        let (video_id, playlist_id) = extract_ids(url.as_str());

        match (&self.api_key, video_id, playlist_id) {
            (_, None, None) => Err(ScrapeError::InvalidUrl(format!(
                "no YouTube video or playlist ID in {url}"
            ))),
            (None, video_id, playlist_id) => {
                debug!("No YouTube API key configured, using oEmbed");
                self.scrape_oembed(video_id, playlist_id).await
            }
            (Some(key), video_id, Some(playlist_id)) => {
                self.scrape_playlist(key, &playlist_id, video_id).await
            }
            (Some(key), Some(video_id), None) => self.scrape_video(key, &video_id).await,
        }
    }

    async fn scrape_oembed(
        &self,
        video_id: Option<String>,
        playlist_id: Option<String>,
    ) -> Result<ScrapedResource, ScrapeError> {
        let (canonical, resource_type) = match (&playlist_id, &video_id) {
            (Some(list), _) => (
                format!("https://www.youtube.com/playlist?list={list}"),
                ResourceType::Playlist,
            ),
            (None, Some(id)) => (
                format!("https://www.youtube.com/watch?v={id}"),
                ResourceType::Video,
            ),
            (None, None) => {
                return Err(ScrapeError::InvalidUrl("no YouTube ID to look up".to_string()))
            }
        };

        let response = self
            .client
            .get(&self.oembed_url)
            .query(&[("url", canonical.as_str()), ("format", "json")])
            .send()
            .await
            .map_err(|e| send_error(Platform::Youtube, e))?;
        let oembed: OEmbedResponse = read_json(Platform::Youtube, response, "video").await?;

        let image = match (&playlist_id, &video_id) {
            (None, Some(id)) => Some(thumbnail_for(id)),
            _ => oembed
                .thumbnail_url
                .clone()
                .or_else(|| video_id.as_deref().map(thumbnail_for)),
        };

        Ok(ScrapedResource {
            suggested_tech_stack: tech_in_text(&oembed.title),
            title: oembed.title,
            description: None,
            image,
            credits: oembed.author_name,
            url: canonical,
            suggested_resource_type: resource_type,
            suggested_tags: Vec::new(),
            platform: Platform::Youtube,
            method: ScrapeMethod::Api,
            cached: false,
            metadata: ResourceMetadata::default(),
        })
    }

    async fn fetch_video(&self, key: &str, video_id: &str) -> Result<VideoItem, ScrapeError> {
        let response = self
            .client
            .get(format!("{}/videos", self.api_base))
            .query(&[
                ("part", "snippet,contentDetails,statistics"),
                ("id", video_id),
                ("key", key),
            ])
            .send()
            .await
            .map_err(|e| send_error(Platform::Youtube, e))?;

        let list: ListResponse<VideoItem> = read_json(Platform::Youtube, response, "video").await?;
        list.items
            .into_iter()
            .next()
            .ok_or_else(|| ScrapeError::NotFound(format!("YouTube video {video_id} not found")))
    }

    async fn scrape_video(&self, key: &str, video_id: &str) -> Result<ScrapedResource, ScrapeError> {
        let video = self.fetch_video(key, video_id).await?;
        let snippet = video.snippet;

        let (suggested_tags, mut tech) = partition_tags(snippet.tags.iter());
        for t in tech_in_text(&snippet.title) {
            push_unique(&mut tech, t);
        }

        let duration = video.content_details.and_then(|d| d.duration);
        let statistics = video.statistics.unwrap_or_default();

        Ok(ScrapedResource {
            image: snippet
                .thumbnails
                .best()
                .or_else(|| Some(thumbnail_for(video_id))),
            title: snippet.title,
            description: non_empty(snippet.description),
            credits: snippet.channel_title,
            url: format!("https://www.youtube.com/watch?v={video_id}"),
            suggested_resource_type: ResourceType::Video,
            suggested_tags,
            suggested_tech_stack: tech,
            platform: Platform::Youtube,
            method: ScrapeMethod::Api,
            cached: false,
            metadata: ResourceMetadata {
                duration_seconds: duration.as_deref().and_then(parse_iso8601_duration),
                duration,
                view_count: statistics.view_count.and_then(|v| v.parse().ok()),
                like_count: statistics.like_count.and_then(|v| v.parse().ok()),
                published_at: snippet.published_at,
                channel_id: snippet.channel_id,
                ..Default::default()
            },
        })
    }

    async fn scrape_playlist(
        &self,
        key: &str,
        playlist_id: &str,
        linked_video: Option<String>,
    ) -> Result<ScrapedResource, ScrapeError> {
        let response = self
            .client
            .get(format!("{}/playlists", self.api_base))
            .query(&[
                ("part", "snippet,contentDetails"),
                ("id", playlist_id),
                ("key", key),
            ])
            .send()
            .await
            .map_err(|e| send_error(Platform::Youtube, e))?;

        let list: ListResponse<PlaylistResource> =
            read_json(Platform::Youtube, response, "playlist").await?;
        let playlist = list.items.into_iter().next().ok_or_else(|| {
            ScrapeError::NotFound(format!("YouTube playlist {playlist_id} not found"))
        })?;

        let items = self.fetch_playlist_items(key, playlist_id).await?;

        // One extra video lookup gives a representative description, thumbnail and tags.
        let first_video_id = items
            .first()
            .map(|item| item.video_id.clone())
            .or(linked_video);
        let first_video = match first_video_id {
            Some(id) => match self.fetch_video(key, &id).await {
                Ok(video) => Some(video),
                Err(e) => {
                    warn!(error = %e, video_id = %id, "Could not load first playlist video");
                    None
                }
            },
            None => None,
        };

        let snippet = playlist.snippet;
        let (first_description, first_image, first_tags) = match first_video {
            Some(video) => (
                non_empty(video.snippet.description),
                video.snippet.thumbnails.best(),
                video.snippet.tags,
            ),
            None => (None, None, Vec::new()),
        };

        let (suggested_tags, mut tech) = partition_tags(first_tags.iter());
        for t in tech_in_text(&snippet.title) {
            push_unique(&mut tech, t);
        }

        let item_count = playlist
            .content_details
            .and_then(|d| d.item_count)
            .or(Some(items.len() as u64));

        Ok(ScrapedResource {
            image: snippet
                .thumbnails
                .best()
                .or(first_image)
                .or_else(|| items.first().map(|i| i.thumbnail.clone())),
            title: snippet.title,
            description: non_empty(snippet.description).or(first_description),
            credits: snippet.channel_title,
            url: format!("https://www.youtube.com/playlist?list={playlist_id}"),
            suggested_resource_type: ResourceType::Playlist,
            suggested_tags: dedupe_tags(suggested_tags),
            suggested_tech_stack: tech,
            platform: Platform::Youtube,
            method: ScrapeMethod::Api,
            cached: false,
            metadata: ResourceMetadata {
                playlist_item_count: item_count,
                playlist_items: Some(items),
                published_at: snippet.published_at,
                channel_id: snippet.channel_id,
                ..Default::default()
            },
        })
    }

    async fn fetch_playlist_items(
        &self,
        key: &str,
        playlist_id: &str,
    ) -> Result<Vec<PlaylistVideoItem>, ScrapeError> {
        let mut items: Vec<PlaylistVideoItem> = Vec::new();
        let mut page_token: Option<String> = None;
        // pages of entries without a video ID (deleted or private) never fill the cap
        let max_pages = self.max_playlist_items.div_ceil(PAGE_SIZE) + 1;
        let mut pages = 0;

        while items.len() < self.max_playlist_items && pages < max_pages {
            pages += 1;
            let page_size = PAGE_SIZE.min(self.max_playlist_items - items.len()).to_string();
            let mut query = vec![
                ("part", "snippet"),
                ("playlistId", playlist_id),
                ("maxResults", page_size.as_str()),
                ("key", key),
            ];
            if let Some(token) = page_token.as_deref() {
                query.push(("pageToken", token));
            }

            let response = self
                .client
                .get(format!("{}/playlistItems", self.api_base))
                .query(&query)
                .send()
                .await
                .map_err(|e| send_error(Platform::Youtube, e))?;
            let page: ListResponse<PlaylistItemResource> =
                read_json(Platform::Youtube, response, "playlist items").await?;

            for item in page.items {
                let Some(video_id) = item.snippet.resource_id.video_id else {
                    continue;
                };
                let position = item.snippet.position.unwrap_or(items.len() as u32);
                items.push(PlaylistVideoItem {
                    position,
                    thumbnail: item
                        .snippet
                        .thumbnails
                        .best()
                        .unwrap_or_else(|| thumbnail_for(&video_id)),
                    video_id,
                    title: item.snippet.title,
                });
            }

            page_token = page.next_page_token;
            if page_token.is_none() {
                break;
            }
        }

        items.sort_by_key(|item| item.position);
        items.truncate(self.max_playlist_items);
        debug!(playlist_id = %playlist_id, count = items.len(), "Loaded playlist items");
        Ok(items)
    }
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}

#[derive(Debug, Deserialize)]
struct OEmbedResponse {
    title: String,
    author_name: Option<String>,
    thumbnail_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ListResponse<T> {
    #[serde(default = "Vec::new")]
    items: Vec<T>,
    #[serde(rename = "nextPageToken")]
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VideoItem {
    snippet: Snippet,
    content_details: Option<VideoContentDetails>,
    statistics: Option<VideoStatistics>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Snippet {
    #[serde(default)]
    title: String,
    #[serde(default)]
    description: String,
    channel_title: Option<String>,
    channel_id: Option<String>,
    published_at: Option<String>,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    thumbnails: Thumbnails,
}

#[derive(Debug, Deserialize)]
struct VideoContentDetails {
    duration: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VideoStatistics {
    view_count: Option<String>,
    like_count: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlaylistResource {
    snippet: Snippet,
    content_details: Option<PlaylistContentDetails>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlaylistContentDetails {
    item_count: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct PlaylistItemResource {
    snippet: PlaylistItemSnippet,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlaylistItemSnippet {
    #[serde(default)]
    title: String,
    position: Option<u32>,
    #[serde(default)]
    thumbnails: Thumbnails,
    #[serde(default)]
    resource_id: ResourceId,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResourceId {
    video_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct Thumbnails {
    default: Option<Thumbnail>,
    medium: Option<Thumbnail>,
    high: Option<Thumbnail>,
    standard: Option<Thumbnail>,
    maxres: Option<Thumbnail>,
}

#[derive(Debug, Deserialize)]
struct Thumbnail {
    url: String,
}

impl Thumbnails {
    fn best(&self) -> Option<String> {
        [&self.maxres, &self.standard, &self.high, &self.medium, &self.default]
            .into_iter()
            .flatten()
            .map(|t| t.url.clone())
            .next()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_video_ids() {
        let cases = [
            "https://www.youtube.com/watch?v=dQw4w9WgXcQ",
            "https://youtube.com/watch?feature=share&v=dQw4w9WgXcQ",
            "https://youtu.be/dQw4w9WgXcQ",
            "https://www.youtube.com/shorts/dQw4w9WgXcQ",
            "https://www.youtube.com/embed/dQw4w9WgXcQ?start=5",
            "https://www.youtube.com/live/dQw4w9WgXcQ",
            "https://m.youtube.com/watch?v=dQw4w9WgXcQ&t=42",
        ];
        for url in cases {
            assert_eq!(
                extract_ids(url),
                (Some("dQw4w9WgXcQ".to_string()), None),
                "{url}"
            );
        }
    }

    #[test]
    fn test_extract_playlist_ids() {
        let (video, playlist) = extract_ids(
            "https://www.youtube.com/watch?v=dQw4w9WgXcQ&list=PLx0sYbCqOb8TBPRdmBHs5Iftvv9TPboYG",
        );
        assert_eq!(video.as_deref(), Some("dQw4w9WgXcQ"));
        assert_eq!(
            playlist.as_deref(),
            Some("PLx0sYbCqOb8TBPRdmBHs5Iftvv9TPboYG")
        );

        let (video, playlist) = extract_ids("https://www.youtube.com/playlist?list=PL123");
        assert!(video.is_none());
        assert_eq!(playlist.as_deref(), Some("PL123"));
    }

    #[test]
    fn test_can_handle() {
        let provider = YouTubeProvider::new(&ProviderConfig::default(), Client::new());
        let url = |s: &str| Url::parse(s).unwrap();

        assert!(provider.can_handle(&url("https://youtu.be/dQw4w9WgXcQ")));
        assert!(provider.can_handle(&url("https://www.youtube.com/playlist?list=PL123")));
        assert!(!provider.can_handle(&url("https://www.youtube.com/@somechannel")));
        assert!(!provider.can_handle(&url("https://notyoutube.com/watch?v=dQw4w9WgXcQ")));
    }

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_iso8601_duration("PT3M33S"), Some(213));
        assert_eq!(parse_iso8601_duration("PT1H2M3S"), Some(3723));
        assert_eq!(parse_iso8601_duration("P1DT1S"), Some(86_401));
        assert_eq!(parse_iso8601_duration("PT0S"), Some(0));
        assert_eq!(parse_iso8601_duration("3 minutes"), None);
    }

    #[test]
    fn test_parse_duration_overflow_is_none() {
        assert_eq!(parse_iso8601_duration("P99999999999999W"), None);
        assert_eq!(parse_iso8601_duration("PT99999999999999999999S"), None);
        assert_eq!(
            parse_iso8601_duration("PT18446744073709551615S"),
            Some(u64::MAX)
        );
    }

    #[test]
    fn test_best_thumbnail_prefers_maxres() {
        let thumbs: Thumbnails = serde_json::from_value(serde_json::json!({
            "default": {"url": "d"},
            "high": {"url": "h"},
            "maxres": {"url": "m"}
        }))
        .unwrap();
        assert_eq!(thumbs.best().as_deref(), Some("m"));
        assert_eq!(Thumbnails::default().best(), None);
    }

    #[test]
    fn test_thumbnail_for() {
        assert_eq!(
            thumbnail_for("dQw4w9WgXcQ"),
            "https://i.ytimg.com/vi/dQw4w9WgXcQ/hqdefault.jpg"
        );
    }
}
