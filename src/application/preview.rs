//! Social preview rendering for link-preview crawlers.
//!
//! Crawlers fetching `/view/{id}` get a small static HTML document carrying
//! Open Graph and Twitter meta tags; everything else gets the SPA entry
//! document proxied verbatim from the hosting origin, without touching the
//! document store.

use std::sync::Arc;

use metrics::counter;
use thiserror::Error;
use tracing::warn;

use crate::application::repos::{PostsRepo, RepoError, SpaOrigin};
use crate::util::escape::html_escape;

/// Substrings identifying known link-preview agents. Matching is
/// case-insensitive; the list is replaceable through configuration.
pub const DEFAULT_CRAWLER_SIGNATURES: [&str; 8] = [
    "facebookexternalhit",
    "twitterbot",
    "slackbot",
    "telegrambot",
    "whatsapp",
    "discordbot",
    "linkedinbot",
    "kakaotalk-scrap",
];

/// Pluggable user-agent predicate over a signature allow-list.
#[derive(Debug, Clone)]
pub struct CrawlerDetector {
    signatures: Vec<String>,
}

impl CrawlerDetector {
    pub fn new<I, S>(signatures: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            signatures: signatures
                .into_iter()
                .map(|s| s.as_ref().to_lowercase())
                .collect(),
        }
    }

    pub fn is_crawler(&self, user_agent: &str) -> bool {
        let ua = user_agent.to_lowercase();
        self.signatures.iter().any(|sig| ua.contains(sig))
    }
}

impl Default for CrawlerDetector {
    fn default() -> Self {
        Self::new(DEFAULT_CRAWLER_SIGNATURES)
    }
}

/// Site-level values interpolated into the preview document.
#[derive(Debug, Clone)]
pub struct PreviewSite {
    pub public_url: String,
    pub site_name: String,
    pub default_description: String,
    pub default_thumbnail_url: String,
}

#[derive(Debug, Error)]
pub enum PreviewError {
    #[error("post not found")]
    NotFound,
    #[error("failed to load post metadata: {0}")]
    Metadata(#[source] RepoError),
    #[error("failed to fetch SPA entry document: {0}")]
    Origin(#[source] RepoError),
}

/// Renders crawler-facing preview documents and proxies the SPA entry.
#[derive(Clone)]
pub struct PreviewService {
    posts: Arc<dyn PostsRepo>,
    spa: Arc<dyn SpaOrigin>,
    detector: CrawlerDetector,
    site: PreviewSite,
}

impl PreviewService {
    pub fn new(
        posts: Arc<dyn PostsRepo>,
        spa: Arc<dyn SpaOrigin>,
        detector: CrawlerDetector,
        site: PreviewSite,
    ) -> Self {
        Self {
            posts,
            spa,
            detector,
            site,
        }
    }

    pub fn is_crawler(&self, user_agent: &str) -> bool {
        self.detector.is_crawler(user_agent)
    }

    /// The SPA entry document, fetched live and returned unmodified.
    pub async fn spa_entry(&self) -> Result<String, PreviewError> {
        self.spa.entry_document().await.map_err(PreviewError::Origin)
    }

    /// Render the static preview document for a crawler request.
    ///
    /// The content lookup only enriches the preview image; any failure there
    /// falls back to the default thumbnail instead of failing the request.
    pub async fn render(&self, id: &str) -> Result<String, PreviewError> {
        let meta = self
            .posts
            .get_post_meta(id)
            .await
            .map_err(PreviewError::Metadata)?
            .ok_or(PreviewError::NotFound)?;

        let image = match self.posts.get_post_content(id).await {
            Ok(content) => content
                .and_then(|c| c.image_urls.into_iter().next())
                .unwrap_or_else(|| self.site.default_thumbnail_url.clone()),
            Err(err) => {
                warn!(post_id = id, error = %err, "content lookup failed; using default thumbnail");
                self.site.default_thumbnail_url.clone()
            }
        };

        counter!("baram_preview_rendered_total").increment(1);

        let description = if meta.summary.trim().is_empty() {
            self.site.default_description.clone()
        } else {
            meta.summary.clone()
        };
        let canonical = format!(
            "{}/view/{}",
            self.site.public_url.trim_end_matches('/'),
            id
        );

        Ok(render_document(&PreviewValues {
            title: &meta.title,
            site_name: &self.site.site_name,
            description: &description,
            image: &image,
            canonical: &canonical,
        }))
    }
}

struct PreviewValues<'a> {
    title: &'a str,
    site_name: &'a str,
    description: &'a str,
    image: &'a str,
    canonical: &'a str,
}

fn render_document(values: &PreviewValues<'_>) -> String {
    let title = html_escape(values.title);
    let site_name = html_escape(values.site_name);
    let description = html_escape(values.description);
    let image = html_escape(values.image);
    let canonical = html_escape(values.canonical);
    // Entities are not decoded inside <script>; encode as a JSON string
    // literal for the redirect instead.
    let canonical_js =
        serde_json::to_string(values.canonical).unwrap_or_else(|_| "\"/\"".to_string());

    format!(
        "<!doctype html>\n\
         <html lang=\"ko\">\n\
         <head>\n\
         <meta charset=\"utf-8\">\n\
         <title>{title} | {site_name}</title>\n\
         <meta name=\"description\" content=\"{description}\">\n\
         <meta property=\"og:type\" content=\"article\">\n\
         <meta property=\"og:site_name\" content=\"{site_name}\">\n\
         <meta property=\"og:title\" content=\"{title}\">\n\
         <meta property=\"og:description\" content=\"{description}\">\n\
         <meta property=\"og:image\" content=\"{image}\">\n\
         <meta property=\"og:url\" content=\"{canonical}\">\n\
         <meta name=\"twitter:card\" content=\"summary_large_image\">\n\
         <meta name=\"twitter:title\" content=\"{title}\">\n\
         <meta name=\"twitter:description\" content=\"{description}\">\n\
         <meta name=\"twitter:image\" content=\"{image}\">\n\
         <link rel=\"canonical\" href=\"{canonical}\">\n\
         <script>window.location.replace({canonical_js});</script>\n\
         </head>\n\
         <body></body>\n\
         </html>\n"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detector_matches_case_insensitively() {
        let detector = CrawlerDetector::default();
        assert!(detector.is_crawler("facebookexternalhit/1.1"));
        assert!(detector.is_crawler("Mozilla/5.0 (compatible; TwitterBot/1.0)"));
        assert!(!detector.is_crawler("Mozilla/5.0 (Macintosh) Safari/605.1"));
    }

    #[test]
    fn custom_signature_list_replaces_defaults() {
        let detector = CrawlerDetector::new(["examplebot"]);
        assert!(detector.is_crawler("ExampleBot/2.0"));
        assert!(!detector.is_crawler("facebookexternalhit/1.1"));
    }

    #[test]
    fn document_escapes_interpolated_values() {
        let html = render_document(&PreviewValues {
            title: "T & Co",
            site_name: "Rocky's Blog",
            description: "<s>",
            image: "https://cdn.example/img.png",
            canonical: "https://example.org/view/abc",
        });

        assert!(html.contains("<meta property=\"og:title\" content=\"T &amp; Co\">"));
        assert!(html.contains("content=\"&lt;s&gt;\""));
        assert!(!html.contains("<s>"));
        assert!(html.contains("window.location.replace(\"https://example.org/view/abc\");"));
    }
}
