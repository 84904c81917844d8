use super::host_of;
use crate::cancel::CancelSignal;
use crate::error::ScrapeError;
use crate::extractor::{MetadataExtractor, PageMetadata};
use crate::fetcher::{FetchResponse, Fetcher};
use crate::taxonomy::{classify_domain, partition_tags, push_unique, tech_in_text};
use crate::{Platform, ResourceMetadata, ScrapeMethod, ScrapedResource};
use reqwest::StatusCode;
use tracing::{debug, instrument};
use url::Url;

/// Fallback for any http(s) page: fetches it through the guarded [`Fetcher`] and
/// reads Open Graph / meta tags.
#[derive(Clone)]
pub struct GenericProvider {
    fetcher: Fetcher,
    extractor: MetadataExtractor,
}

impl GenericProvider {
    pub fn new(fetcher: Fetcher) -> Self {
        Self {
            fetcher,
            extractor: MetadataExtractor::new(),
        }
    }

    #[instrument(level = "debug", skip(self, signal), err)]
    pub async fn scrape(
        &self,
        url: &Url,
        signal: &CancelSignal,
    ) -> Result<ScrapedResource, ScrapeError> {
        let response = self.fetcher.fetch(url.as_str(), signal).await?;
        check_status(&response)?;

        let html = response.text();
        let meta = self.extractor.extract(&html, &response.final_url);
        debug!(
            final_url = %response.final_url,
            redirects = response.redirects,
            "Extracted generic page metadata"
        );

        Ok(into_resource(meta, &response.final_url))
    }
}

fn check_status(response: &FetchResponse) -> Result<(), ScrapeError> {
    match response.status {
        StatusCode::NOT_FOUND | StatusCode::GONE => Err(ScrapeError::NotFound(format!(
            "{} returned {}",
            response.final_url, response.status
        ))),
        status if !status.is_success() => Err(ScrapeError::platform(
            Platform::Generic,
            format!("{} returned {status}", response.final_url),
        )),
        _ => Ok(()),
    }
}

fn into_resource(meta: PageMetadata, final_url: &Url) -> ScrapedResource {
    let title = meta.title.unwrap_or_default();

    let (tags, mut tech) = partition_tags(meta.keywords.iter());
    for t in tech_in_text(&title) {
        push_unique(&mut tech, t);
    }

    ScrapedResource {
        suggested_resource_type: classify_domain(&host_of(final_url), final_url.path()),
        title,
        description: meta.description,
        image: meta.image,
        credits: meta.author.or(meta.site_name),
        url: final_url.to_string(),
        suggested_tags: tags,
        suggested_tech_stack: tech,
        platform: Platform::Generic,
        method: ScrapeMethod::OgMeta,
        cached: false,
        metadata: ResourceMetadata::default(),
    }
}
