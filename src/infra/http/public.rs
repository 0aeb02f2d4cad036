use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, State},
    http::{
        HeaderMap, StatusCode,
        header::{CACHE_CONTROL, CONTENT_TYPE, USER_AGENT},
    },
    middleware,
    response::{Html, IntoResponse, Response},
    routing::get,
};
use tracing::error;

use crate::application::{
    error::{ErrorReport, HttpError},
    preview::{PreviewError, PreviewService},
    sitemap::SitemapService,
    sync::PortfolioSyncService,
};

use super::middleware::{log_responses, set_request_context};

/// Crawler previews are cacheable for a short window; a stale preview is
/// preferable to a render on every share.
const PREVIEW_CACHE_CONTROL: &str = "public, max-age=300, stale-while-revalidate=600";

#[derive(Clone)]
pub struct HttpState {
    pub sitemap: Arc<SitemapService>,
    pub preview: Arc<PreviewService>,
    pub sync: Arc<PortfolioSyncService>,
}

pub fn build_router(state: HttpState) -> Router {
    Router::new()
        .route("/sitemap.xml", get(sitemap))
        .route("/robots.txt", get(robots_txt))
        .route("/view/{id}", get(view_post))
        .route("/view", get(view_index))
        .route("/view/", get(view_index))
        .route("/jobs/portfolio-sync", get(run_sync).post(run_sync))
        .route("/hooks/posts-changed", get(posts_changed).post(posts_changed))
        .route("/_health", get(health))
        .with_state(state)
        .layer(middleware::from_fn(log_responses))
        .layer(middleware::from_fn(set_request_context))
}

async fn sitemap(State(state): State<HttpState>) -> Response {
    match state.sitemap.published().await {
        Ok(body) => (
            StatusCode::OK,
            [(CONTENT_TYPE, "application/xml")],
            body,
        )
            .into_response(),
        Err(err) => HttpError::from_error(
            "infra::http::sitemap",
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to load sitemap.",
            &err,
        )
        .into_response(),
    }
}

async fn robots_txt(State(state): State<HttpState>) -> Response {
    (
        StatusCode::OK,
        [(CONTENT_TYPE, "text/plain; charset=utf-8")],
        state.sitemap.robots_txt(),
    )
        .into_response()
}

/// `/view/{id}`: crawlers get the static preview document, everyone else
/// gets the SPA entry document.
async fn view_post(
    State(state): State<HttpState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Response {
    if !is_crawler(&state, &headers) {
        return spa_entry(&state).await;
    }

    match state.preview.render(&id).await {
        Ok(html) => (
            StatusCode::OK,
            [(CACHE_CONTROL, PREVIEW_CACHE_CONTROL)],
            Html(html),
        )
            .into_response(),
        Err(PreviewError::NotFound) => HttpError::new(
            "infra::http::preview",
            StatusCode::NOT_FOUND,
            "Post not found.",
            format!("no post metadata for `{id}`"),
        )
        .into_response(),
        Err(err) => HttpError::from_error(
            "infra::http::preview",
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to render preview.",
            &err,
        )
        .into_response(),
    }
}

/// `/view` without an id has nothing to preview: crawlers get "not found",
/// browsers get the SPA.
async fn view_index(State(state): State<HttpState>, headers: HeaderMap) -> Response {
    if is_crawler(&state, &headers) {
        return HttpError::new(
            "infra::http::preview",
            StatusCode::NOT_FOUND,
            "Post not found.",
            "preview requested without a post id",
        )
        .into_response();
    }
    spa_entry(&state).await
}

async fn spa_entry(state: &HttpState) -> Response {
    match state.preview.spa_entry().await {
        Ok(document) => Html(document).into_response(),
        Err(err) => HttpError::from_error(
            "infra::http::spa",
            StatusCode::BAD_GATEWAY,
            "Upstream unavailable.",
            &err,
        )
        .into_response(),
    }
}

fn is_crawler(state: &HttpState, headers: &HeaderMap) -> bool {
    headers
        .get(USER_AGENT)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|ua| state.preview.is_crawler(ua))
}

/// Manual trigger for one portfolio sync pass.
async fn run_sync(State(state): State<HttpState>) -> Response {
    match state.sync.run().await {
        Ok(summary) => Json(summary).into_response(),
        Err(err) => {
            error!(error = %err, "manual portfolio sync failed");
            let mut response = (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({ "error": err.to_string() })),
            )
                .into_response();
            ErrorReport::from_error(
                "infra::http::sync",
                StatusCode::INTERNAL_SERVER_ERROR,
                &err,
            )
            .attach(&mut response);
            response
        }
    }
}

/// Post create/delete webhook: rebuild the sitemap and acknowledge.
///
/// The rebuild swallows its own failures, so the hook always returns 204.
async fn posts_changed(State(state): State<HttpState>) -> StatusCode {
    state.sitemap.rebuild().await;
    StatusCode::NO_CONTENT
}

async fn health() -> StatusCode {
    StatusCode::NO_CONTENT
}
