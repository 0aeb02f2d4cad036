use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode, header};
use bytes::Bytes;
use tokio::sync::Mutex;
use tower::ServiceExt;

use baram::application::preview::{CrawlerDetector, PreviewService, PreviewSite};
use baram::application::repos::{
    IndicatorSource, ObjectStore, Observation, PortfolioBatch, PortfolioRepo, PostsRepo,
    RepoError, SpaOrigin, SpreadsheetSource,
};
use baram::application::sitemap::SitemapService;
use baram::application::sync::{PortfolioSyncService, SyncSettings};
use baram::domain::posts::{PostContentRecord, PostMetaRecord};
use baram::infra::http::{HttpState, build_router};

const SPA_DOCUMENT: &str = "<!doctype html><html><body><div id=\"app\"></div></body></html>";

struct CountingPosts {
    meta: Vec<PostMetaRecord>,
    content: HashMap<String, PostContentRecord>,
    reads: AtomicUsize,
}

impl CountingPosts {
    fn new(meta: Vec<PostMetaRecord>, content: Vec<PostContentRecord>) -> Self {
        Self {
            meta,
            content: content.into_iter().map(|c| (c.id.clone(), c)).collect(),
            reads: AtomicUsize::new(0),
        }
    }

    fn read_count(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PostsRepo for CountingPosts {
    async fn list_post_meta(&self) -> Result<Vec<PostMetaRecord>, RepoError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        Ok(self.meta.clone())
    }

    async fn get_post_meta(&self, id: &str) -> Result<Option<PostMetaRecord>, RepoError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        Ok(self.meta.iter().find(|p| p.id == id).cloned())
    }

    async fn get_post_content(&self, id: &str) -> Result<Option<PostContentRecord>, RepoError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        Ok(self.content.get(id).cloned())
    }
}

struct StaticSpa;

#[async_trait]
impl SpaOrigin for StaticSpa {
    async fn entry_document(&self) -> Result<String, RepoError> {
        Ok(SPA_DOCUMENT.to_string())
    }
}

#[derive(Default)]
struct MemoryObjects {
    objects: Mutex<HashMap<String, Bytes>>,
}

#[async_trait]
impl ObjectStore for MemoryObjects {
    async fn upload(
        &self,
        path: &str,
        body: Bytes,
        _content_type: &str,
        _public: bool,
    ) -> Result<(), RepoError> {
        self.objects.lock().await.insert(path.to_string(), body);
        Ok(())
    }

    async fn download(&self, path: &str) -> Result<Bytes, RepoError> {
        self.objects
            .lock()
            .await
            .get(path)
            .cloned()
            .ok_or(RepoError::NotFound)
    }
}

struct EmptySheets;

#[async_trait]
impl SpreadsheetSource for EmptySheets {
    async fn read_range(&self, _range: &str) -> Result<Vec<Vec<String>>, RepoError> {
        Ok(Vec::new())
    }

    async fn read_cell(&self, _range: &str) -> Result<Option<String>, RepoError> {
        Ok(None)
    }
}

struct EmptyIndicators;

#[async_trait]
impl IndicatorSource for EmptyIndicators {
    async fn latest_observations(
        &self,
        _series_id: &str,
        _limit: u32,
    ) -> Result<Vec<Observation>, RepoError> {
        Ok(Vec::new())
    }
}

#[derive(Default)]
struct RecordingPortfolio {
    commits: Mutex<Vec<PortfolioBatch>>,
}

#[async_trait]
impl PortfolioRepo for RecordingPortfolio {
    async fn list_holding_ids(&self, _owner: &str) -> Result<Vec<String>, RepoError> {
        Ok(Vec::new())
    }

    async fn commit_batch(&self, _owner: &str, batch: PortfolioBatch) -> Result<(), RepoError> {
        self.commits.lock().await.push(batch);
        Ok(())
    }
}

fn meta(id: &str, title: &str, summary: &str) -> PostMetaRecord {
    PostMetaRecord {
        id: id.to_string(),
        title: title.to_string(),
        category: "daily".to_string(),
        author: "rocky".to_string(),
        summary: summary.to_string(),
        create_dt: "2023-05-04T01:02:03Z".to_string(),
        update_dt: None,
        year: 2023,
    }
}

fn site() -> PreviewSite {
    PreviewSite {
        public_url: "https://blog.example.org".to_string(),
        site_name: "Rocky's Blog".to_string(),
        default_description: "default description".to_string(),
        default_thumbnail_url: "https://blog.example.org/thumbnail.png".to_string(),
    }
}

fn build_app(posts: Arc<CountingPosts>, objects: Arc<MemoryObjects>) -> Router {
    let sitemap = Arc::new(SitemapService::new(
        posts.clone(),
        objects,
        "https://blog.example.org",
        "sitemap.xml",
    ));
    let preview = Arc::new(PreviewService::new(
        posts,
        Arc::new(StaticSpa),
        CrawlerDetector::default(),
        site(),
    ));
    let sync = Arc::new(PortfolioSyncService::new(
        Arc::new(EmptySheets),
        Arc::new(EmptyIndicators),
        Arc::new(RecordingPortfolio::default()),
        SyncSettings {
            owner: "rocky".to_string(),
            holdings_range: "Portfolio!A2:L".to_string(),
            usd_cell: "Rates!B1".to_string(),
            eur_cell: "Rates!B2".to_string(),
            series_10y: "DGS10".to_string(),
            series_2y: "DGS2".to_string(),
        },
    ));

    build_router(HttpState {
        sitemap,
        preview,
        sync,
    })
}

fn get(uri: &str, user_agent: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header(header::USER_AGENT, user_agent)
        .body(Body::empty())
        .expect("request")
}

async fn body_string(response: axum::response::Response) -> String {
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read body");
    String::from_utf8(bytes.to_vec()).expect("utf-8 body")
}

#[tokio::test]
async fn sitemap_endpoint_serves_the_published_object() {
    let posts = Arc::new(CountingPosts::new(Vec::new(), Vec::new()));
    let objects = Arc::new(MemoryObjects::default());
    objects
        .objects
        .lock()
        .await
        .insert("sitemap.xml".to_string(), Bytes::from_static(b"<urlset/>"));
    let app = build_app(posts, objects);

    let response = app
        .oneshot(get("/sitemap.xml", "Mozilla/5.0"))
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(header::CONTENT_TYPE).unwrap(),
        "application/xml"
    );
    assert_eq!(body_string(response).await, "<urlset/>");
}

#[tokio::test]
async fn missing_sitemap_fails_with_a_fixed_message() {
    let posts = Arc::new(CountingPosts::new(Vec::new(), Vec::new()));
    let app = build_app(posts, Arc::new(MemoryObjects::default()));

    let response = app
        .oneshot(get("/sitemap.xml", "Mozilla/5.0"))
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body_string(response).await, "Failed to load sitemap.");
}

#[tokio::test]
async fn crawler_gets_an_escaped_preview_with_cache_headers() {
    let posts = Arc::new(CountingPosts::new(
        vec![meta("abc", "T & <Co>", "a \"quoted\" summary")],
        Vec::new(),
    ));
    let app = build_app(posts, Arc::new(MemoryObjects::default()));

    let response = app
        .oneshot(get("/view/abc", "facebookexternalhit/1.1"))
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(header::CACHE_CONTROL).unwrap(),
        "public, max-age=300, stale-while-revalidate=600"
    );

    let body = body_string(response).await;
    assert!(body.contains("T &amp; &lt;Co&gt;"));
    assert!(body.contains("a &quot;quoted&quot; summary"));
    assert!(!body.contains("<Co>"));
    assert!(body.contains("https://blog.example.org/view/abc"));
    // No post content document: the default thumbnail stands in.
    assert!(body.contains("https://blog.example.org/thumbnail.png"));
}

#[tokio::test]
async fn browser_gets_the_spa_entry_without_store_reads() {
    let posts = Arc::new(CountingPosts::new(
        vec![meta("abc", "title", "summary")],
        Vec::new(),
    ));
    let app = build_app(posts.clone(), Arc::new(MemoryObjects::default()));

    let response = app
        .oneshot(get(
            "/view/abc",
            "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) Safari/605.1",
        ))
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_string(response).await, SPA_DOCUMENT);
    assert_eq!(posts.read_count(), 0);
}

#[tokio::test]
async fn view_without_id_is_not_found_for_crawlers() {
    let posts = Arc::new(CountingPosts::new(Vec::new(), Vec::new()));
    let app = build_app(posts, Arc::new(MemoryObjects::default()));

    let response = app
        .oneshot(get("/view", "TwitterBot/1.0"))
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn view_without_id_serves_the_spa_to_browsers() {
    let posts = Arc::new(CountingPosts::new(Vec::new(), Vec::new()));
    let app = build_app(posts.clone(), Arc::new(MemoryObjects::default()));

    let response = app
        .oneshot(get("/view", "Mozilla/5.0"))
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_string(response).await, SPA_DOCUMENT);
    assert_eq!(posts.read_count(), 0);
}

#[tokio::test]
async fn unknown_post_is_not_found_for_crawlers() {
    let posts = Arc::new(CountingPosts::new(Vec::new(), Vec::new()));
    let app = build_app(posts, Arc::new(MemoryObjects::default()));

    let response = app
        .oneshot(get("/view/missing", "Slackbot-LinkExpanding 1.0"))
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn preview_uses_first_image_url_when_content_exists() {
    let posts = Arc::new(CountingPosts::new(
        vec![meta("abc", "title", "summary")],
        vec![PostContentRecord {
            id: "abc".to_string(),
            content: "body".to_string(),
            images: vec!["uploads/a.png".to_string()],
            image_urls: vec!["https://cdn.example/a.png".to_string()],
        }],
    ));
    let app = build_app(posts, Arc::new(MemoryObjects::default()));

    let response = app
        .oneshot(get("/view/abc", "kakaotalk-scrap/1.0"))
        .await
        .expect("response");

    let body = body_string(response).await;
    assert!(body.contains("https://cdn.example/a.png"));
    assert!(!body.contains("thumbnail.png"));
}

#[tokio::test]
async fn posts_changed_hook_republishes_the_sitemap() {
    let posts = Arc::new(CountingPosts::new(
        vec![meta("abc", "title", "summary")],
        Vec::new(),
    ));
    let objects = Arc::new(MemoryObjects::default());
    let app = build_app(posts, objects.clone());

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/hooks/posts-changed")
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let stored = objects.objects.lock().await;
    let xml = String::from_utf8(stored.get("sitemap.xml").expect("sitemap").to_vec())
        .expect("utf-8");
    assert!(xml.contains("/view/abc"));
}

#[tokio::test]
async fn manual_sync_trigger_reports_a_summary() {
    let posts = Arc::new(CountingPosts::new(Vec::new(), Vec::new()));
    let app = build_app(posts, Arc::new(MemoryObjects::default()));

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/jobs/portfolio-sync")
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::OK);
    let body: serde_json::Value =
        serde_json::from_str(&body_string(response).await).expect("json body");
    assert_eq!(body["success"], serde_json::json!(true));
    assert_eq!(body["holdingsCount"], serde_json::json!(0));
}

#[tokio::test]
async fn robots_txt_is_served_as_plain_text() {
    let posts = Arc::new(CountingPosts::new(Vec::new(), Vec::new()));
    let app = build_app(posts, Arc::new(MemoryObjects::default()));

    let response = app
        .oneshot(get("/robots.txt", "Mozilla/5.0"))
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_string(response).await;
    assert!(body.contains("Sitemap: https://blog.example.org/sitemap.xml"));
}

#[tokio::test]
async fn health_endpoint_responds_without_content() {
    let posts = Arc::new(CountingPosts::new(Vec::new(), Vec::new()));
    let app = build_app(posts, Arc::new(MemoryObjects::default()));

    let response = app
        .oneshot(get("/_health", "Mozilla/5.0"))
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::NO_CONTENT);
}
