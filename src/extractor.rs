use scraper::{Html, Selector};
use tracing::debug;
use url::Url;

/// Open Graph / Twitter card / meta tag fields found in a page.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageMetadata {
    pub title: Option<String>,
    pub description: Option<String>,
    /// Absolute image URL
    pub image: Option<String>,
    pub author: Option<String>,
    pub keywords: Vec<String>,
    pub site_name: Option<String>,
}

/// Metadata extractor, responsible for pulling preview information out of HTML
#[derive(Clone)]
pub struct MetadataExtractor;

impl Default for MetadataExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl MetadataExtractor {
    pub fn new() -> Self {
        Self
    }

    /// Extracts metadata from `html`; relative image URLs are resolved against `base`,
    /// which should be the final URL after redirects.
    pub fn extract(&self, html: &str, base: &Url) -> PageMetadata {
        let document = Html::parse_document(html);

        let metadata = PageMetadata {
            title: self.extract_title(&document),
            description: self.extract_description(&document),
            image: self
                .extract_image(&document)
                .and_then(|raw| resolve_url(base, &raw)),
            author: self.extract_author(&document),
            keywords: self.extract_keywords(&document),
            site_name: first_content(&document, "meta[property='og:site_name']"),
        };

        debug!(
            url = %base,
            has_title = metadata.title.is_some(),
            has_image = metadata.image.is_some(),
            "Extracted page metadata"
        );
        metadata
    }

    fn extract_title(&self, document: &Html) -> Option<String> {
        first_content(document, "meta[property='og:title']")
            .or_else(|| first_content(document, "meta[name='twitter:title']"))
            .or_else(|| {
                let selector = Selector::parse("title").ok()?;
                document
                    .select(&selector)
                    .next()
                    .map(|el| el.text().collect::<String>())
                    .and_then(|s| non_empty(&s))
            })
    }

    fn extract_description(&self, document: &Html) -> Option<String> {
        first_content(document, "meta[property='og:description']")
            .or_else(|| first_content(document, "meta[name='twitter:description']"))
            .or_else(|| first_content(document, "meta[name='description']"))
    }

    fn extract_image(&self, document: &Html) -> Option<String> {
        first_content(document, "meta[property='og:image'],meta[property='og:image:url']")
            .or_else(|| first_content(document, "meta[name='twitter:image']"))
            .or_else(|| {
                let selector = Selector::parse("link[rel='image_src']").ok()?;
                document
                    .select(&selector)
                    .next()
                    .and_then(|el| el.value().attr("href"))
                    .and_then(non_empty)
            })
    }

    fn extract_author(&self, document: &Html) -> Option<String> {
        first_content(document, "meta[name='author']")
            .or_else(|| first_content(document, "meta[property='article:author']"))
    }

    fn extract_keywords(&self, document: &Html) -> Vec<String> {
        let mut keywords: Vec<String> = first_content(document, "meta[name='keywords']")
            .map(|raw| {
                raw.split(',')
                    .filter_map(non_empty)
                    .collect()
            })
            .unwrap_or_default();

        if let Ok(selector) = Selector::parse("meta[property='article:tag']") {
            keywords.extend(
                document
                    .select(&selector)
                    .filter_map(|el| el.value().attr("content"))
                    .filter_map(non_empty),
            );
        }

        keywords
    }
}

fn first_content(document: &Html, selector: &str) -> Option<String> {
    let selector = Selector::parse(selector).ok()?;
    document
        .select(&selector)
        .filter_map(|el| el.value().attr("content"))
        .find_map(non_empty)
}

fn non_empty(s: &str) -> Option<String> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Resolves `raw` against `base`; only http(s) results are kept.
fn resolve_url(base: &Url, raw: &str) -> Option<String> {
    let resolved = base.join(raw).ok()?;
    match resolved.scheme() {
        "http" | "https" => Some(resolved.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"<!doctype html>
        <html><head>
          <title> Fallback Title </title>
          <meta property="og:title" content="An Article About Rust">
          <meta property="og:description" content="  Ownership explained. ">
          <meta property="og:image" content="/images/cover.png">
          <meta name="author" content="Jane Doe">
          <meta name="keywords" content="rust, Ownership, , borrowing">
          <meta property="article:tag" content="systems">
        </head><body></body></html>"#;

    #[test]
    fn test_extract_open_graph() {
        let base = Url::parse("https://blog.example.com/posts/rust?ref=home").unwrap();
        let meta = MetadataExtractor::new().extract(PAGE, &base);

        assert_eq!(meta.title.as_deref(), Some("An Article About Rust"));
        assert_eq!(meta.description.as_deref(), Some("Ownership explained."));
        assert_eq!(
            meta.image.as_deref(),
            Some("https://blog.example.com/images/cover.png")
        );
        assert_eq!(meta.author.as_deref(), Some("Jane Doe"));
        assert_eq!(meta.keywords, vec!["rust", "Ownership", "borrowing", "systems"]);
    }

    #[test]
    fn test_fallbacks() {
        let html = r#"<html><head>
            <title>Plain Title</title>
            <meta name="twitter:description" content="From twitter">
            <meta name="twitter:image" content="img/a.jpg">
            <meta property="article:author" content="Someone">
        </head></html>"#;
        let base = Url::parse("https://example.com/dir/page.html").unwrap();
        let meta = MetadataExtractor::new().extract(html, &base);

        assert_eq!(meta.title.as_deref(), Some("Plain Title"));
        assert_eq!(meta.description.as_deref(), Some("From twitter"));
        assert_eq!(meta.image.as_deref(), Some("https://example.com/dir/img/a.jpg"));
        assert_eq!(meta.author.as_deref(), Some("Someone"));
        assert!(meta.keywords.is_empty());
    }

    #[test]
    fn test_non_http_images_are_dropped() {
        let html = r#"<meta property="og:image" content="javascript:alert(1)">"#;
        let base = Url::parse("https://example.com/").unwrap();
        let meta = MetadataExtractor::new().extract(html, &base);
        assert!(meta.image.is_none());
        assert!(meta.title.is_none());
    }
}
