//! Sitemap generation and publication.
//!
//! The sitemap is a derived artifact: every rebuild fetches the full
//! post-metadata set and rewrites `sitemap.xml` in the object store. A
//! failed rebuild leaves the previous object in place, so crawlers see a
//! stale-but-available sitemap rather than an error.

use std::sync::Arc;

use bytes::Bytes;
use metrics::counter;
use thiserror::Error;
use time::{
    Date, OffsetDateTime, format_description::well_known::Rfc3339, macros::format_description,
};
use tracing::{error, info};

use crate::application::repos::{ObjectStore, PostsRepo, RepoError};

const SITEMAP_CONTENT_TYPE: &str = "application/xml";

/// Fixed entries for the SPA's landing and post-list routes, always emitted
/// ahead of the per-post entries.
const STATIC_ENTRIES: [(&str, &str, &str); 2] =
    [("/", "daily", "1.0"), ("/posts", "daily", "0.9")];

#[derive(Debug, Error)]
pub enum SitemapError {
    #[error("failed to list posts: {0}")]
    Posts(#[source] RepoError),
    #[error("failed to store sitemap: {0}")]
    Store(#[source] RepoError),
}

/// Rebuilds sitemap XML from post metadata and publishes it.
#[derive(Clone)]
pub struct SitemapService {
    posts: Arc<dyn PostsRepo>,
    objects: Arc<dyn ObjectStore>,
    public_url: String,
    object_path: String,
}

impl SitemapService {
    pub fn new(
        posts: Arc<dyn PostsRepo>,
        objects: Arc<dyn ObjectStore>,
        public_url: impl Into<String>,
        object_path: impl Into<String>,
    ) -> Self {
        Self {
            posts,
            objects,
            public_url: normalize_base(&public_url.into()),
            object_path: object_path.into(),
        }
    }

    /// Generate the sitemap document for a given "today".
    ///
    /// Deterministic for a fixed metadata set and date: posts are ordered by
    /// creation timestamp (then id) before serialization.
    pub async fn sitemap_xml(&self, today: Date) -> Result<String, SitemapError> {
        let mut posts = self.posts.list_post_meta().await.map_err(SitemapError::Posts)?;
        posts.sort_by(|a, b| {
            a.create_dt
                .cmp(&b.create_dt)
                .then_with(|| a.id.cmp(&b.id))
        });

        let today_str = format_date(today);
        let mut xml = String::from(
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<urlset xmlns=\"http://www.sitemaps.org/schemas/sitemap/0.9\">\n",
        );

        for (path, changefreq, priority) in STATIC_ENTRIES {
            push_entry(&mut xml, &self.public_url, path, &today_str, changefreq, priority);
        }

        for post in &posts {
            let lastmod = parse_date(&post.create_dt).map(format_date);
            let lastmod = lastmod.as_deref().unwrap_or(&today_str);
            push_entry(
                &mut xml,
                &self.public_url,
                &format!("/view/{}", post.id),
                lastmod,
                "weekly",
                "0.8",
            );
        }

        xml.push_str("</urlset>\n");
        Ok(xml)
    }

    /// Rebuild and publish the sitemap, swallowing every error.
    ///
    /// Invoked after post create/delete mutations; the trigger does not care
    /// whether the rebuild succeeded and nothing retries it.
    pub async fn rebuild(&self) {
        let today = OffsetDateTime::now_utc().date();
        let xml = match self.sitemap_xml(today).await {
            Ok(xml) => xml,
            Err(err) => {
                counter!("baram_sitemap_rebuild_failed_total").increment(1);
                error!(error = %err, "sitemap rebuild failed; previous object left in place");
                return;
            }
        };

        match self
            .objects
            .upload(&self.object_path, Bytes::from(xml), SITEMAP_CONTENT_TYPE, true)
            .await
        {
            Ok(()) => {
                counter!("baram_sitemap_rebuild_total").increment(1);
                info!(path = %self.object_path, "sitemap updated");
            }
            Err(err) => {
                counter!("baram_sitemap_rebuild_failed_total").increment(1);
                error!(error = %err, "sitemap upload failed; previous object left in place");
            }
        }
    }

    /// Fetch the currently published sitemap object.
    pub async fn published(&self) -> Result<Bytes, RepoError> {
        self.objects.download(&self.object_path).await
    }

    /// robots.txt mirrors the SPA's routing: editor routes are private.
    pub fn robots_txt(&self) -> String {
        format!(
            "User-agent: *\nAllow: /\nDisallow: /posting\nDisallow: /edit/\n\nSitemap: {}/sitemap.xml\n",
            self.public_url
        )
    }
}

fn push_entry(
    xml: &mut String,
    base: &str,
    path: &str,
    lastmod: &str,
    changefreq: &str,
    priority: &str,
) {
    xml.push_str("  <url>\n");
    xml.push_str(&format!("    <loc>{base}{path}</loc>\n"));
    xml.push_str(&format!("    <lastmod>{lastmod}</lastmod>\n"));
    xml.push_str(&format!("    <changefreq>{changefreq}</changefreq>\n"));
    xml.push_str(&format!("    <priority>{priority}</priority>\n"));
    xml.push_str("  </url>\n");
}

fn normalize_base(url: &str) -> String {
    url.trim_end_matches('/').to_string()
}

fn parse_date(raw: &str) -> Option<Date> {
    OffsetDateTime::parse(raw, &Rfc3339).ok().map(|dt| dt.date())
}

fn format_date(date: Date) -> String {
    let format = format_description!("[year]-[month]-[day]");
    date.format(&format).unwrap_or_default()
}
