use std::{process, sync::Arc};

use apalis::{
    layers::WorkerBuilderExt,
    prelude::{Monitor, WorkerBuilder, WorkerFactoryFn},
};
use apalis_cron::CronStream;
use baram::{
    application::{
        error::AppError,
        jobs::{PortfolioSyncContext, process_portfolio_sync_job},
        preview::{CrawlerDetector, PreviewService, PreviewSite},
        repos::{IndicatorSource, ObjectStore, PortfolioRepo, PostsRepo, SpaOrigin, SpreadsheetSource},
        sitemap::SitemapService,
        sync::{PortfolioSyncService, SyncSettings},
    },
    config,
    infra::{
        docstore::{DocStoreClient, DocStoreCollections, DocStoreRepositories},
        error::InfraError,
        http::{self, HttpState},
        indicators::IndicatorClient,
        objstore::HttpObjectStore,
        sheets::SheetsClient,
        spa::SpaEntryClient,
        telemetry,
    },
};
use tracing::{Dispatch, Level, dispatcher, error, info};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()
        .map_err(|err| AppError::unexpected(format!("failed to load configuration: {err}")))?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Serve(Box::<config::ServeArgs>::default()));

    telemetry::init(&settings.logging).map_err(AppError::from)?;

    match command {
        config::Command::Serve(_) => run_serve(settings).await,
        config::Command::Sync(_) => run_sync_once(settings).await,
        config::Command::Sitemap(_) => run_sitemap_once(settings).await,
    }
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let repositories = build_repositories(&settings)?;
    let services = Services {
        sitemap: build_sitemap(&settings, repositories.clone())?,
        preview: build_preview(&settings, repositories.clone())?,
        sync: build_sync(&settings, repositories)?,
    };

    let sync_ctx = PortfolioSyncContext {
        sync: services.sync.clone(),
    };
    let monitor_handle = spawn_sync_monitor(sync_ctx, &settings.sync);

    let state = HttpState {
        sitemap: services.sitemap,
        preview: services.preview,
        sync: services.sync,
    };
    let router = http::build_router(state);

    let listener = tokio::net::TcpListener::bind(settings.server.addr)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;
    info!(addr = %settings.server.addr, "listening");

    let result = axum::serve(listener, router.into_make_service())
        .await
        .map_err(|err| AppError::unexpected(format!("server error: {err}")));

    monitor_handle.abort();
    let _ = monitor_handle.await;

    result
}

async fn run_sync_once(settings: config::Settings) -> Result<(), AppError> {
    let repositories = build_repositories(&settings)?;
    let sync = build_sync(&settings, repositories)?;
    let summary = sync
        .run()
        .await
        .map_err(|err| AppError::unexpected(format!("sync failed: {err}")))?;

    let rendered = serde_json::to_string_pretty(&summary)
        .map_err(|err| AppError::unexpected(err.to_string()))?;
    println!("{rendered}");
    Ok(())
}

async fn run_sitemap_once(settings: config::Settings) -> Result<(), AppError> {
    let repositories = build_repositories(&settings)?;
    let sitemap = build_sitemap(&settings, repositories)?;
    sitemap.rebuild().await;
    Ok(())
}

struct Services {
    sitemap: Arc<SitemapService>,
    preview: Arc<PreviewService>,
    sync: Arc<PortfolioSyncService>,
}

fn build_repositories(
    settings: &config::Settings,
) -> Result<Arc<DocStoreRepositories>, AppError> {
    let docstore_url = settings
        .docstore
        .base_url
        .as_deref()
        .ok_or_else(|| InfraError::configuration("docstore base url is not configured"))?;
    let docstore = DocStoreClient::new(docstore_url, settings.docstore.auth_token.clone())?;
    Ok(Arc::new(DocStoreRepositories::new(
        docstore,
        DocStoreCollections {
            posts: settings.docstore.posts_collection.clone(),
            content: settings.docstore.content_collection.clone(),
            market: settings.docstore.market_collection.clone(),
            users: settings.docstore.users_collection.clone(),
        },
    )))
}

fn build_sitemap(
    settings: &config::Settings,
    repositories: Arc<DocStoreRepositories>,
) -> Result<Arc<SitemapService>, AppError> {
    let objstore_url = settings
        .objstore
        .base_url
        .as_deref()
        .ok_or_else(|| InfraError::configuration("objstore base url is not configured"))?;
    let objects: Arc<dyn ObjectStore> = Arc::new(HttpObjectStore::new(
        objstore_url,
        settings.objstore.auth_token.clone(),
    )?);
    let posts_repo: Arc<dyn PostsRepo> = repositories;

    Ok(Arc::new(SitemapService::new(
        posts_repo,
        objects,
        settings.site.public_url.clone(),
        settings.objstore.sitemap_path.clone(),
    )))
}

fn build_preview(
    settings: &config::Settings,
    repositories: Arc<DocStoreRepositories>,
) -> Result<Arc<PreviewService>, AppError> {
    // With no dedicated SPA origin the entry document is fetched from the
    // public site itself.
    let spa_origin = settings
        .site
        .spa_origin
        .clone()
        .unwrap_or_else(|| settings.site.public_url.clone());
    let spa: Arc<dyn SpaOrigin> = Arc::new(SpaEntryClient::new(&spa_origin)?);
    let posts_repo: Arc<dyn PostsRepo> = repositories;

    Ok(Arc::new(PreviewService::new(
        posts_repo,
        spa,
        CrawlerDetector::new(&settings.site.crawler_signatures),
        PreviewSite {
            public_url: settings.site.public_url.clone(),
            site_name: settings.site.site_name.clone(),
            default_description: settings.site.default_description.clone(),
            default_thumbnail_url: settings.site.default_thumbnail_url.clone(),
        },
    )))
}

fn build_sync(
    settings: &config::Settings,
    repositories: Arc<DocStoreRepositories>,
) -> Result<Arc<PortfolioSyncService>, AppError> {
    let spreadsheet_id = settings
        .sheets
        .spreadsheet_id
        .as_deref()
        .ok_or_else(|| InfraError::configuration("sheets spreadsheet id is not configured"))?;
    let sheets_token = settings
        .sheets
        .auth_token
        .as_deref()
        .ok_or_else(|| InfraError::configuration("sheets auth token is not configured"))?;
    let sheets: Arc<dyn SpreadsheetSource> = Arc::new(SheetsClient::new(
        &settings.sheets.base_url,
        spreadsheet_id,
        sheets_token,
    )?);

    let api_key = settings
        .indicators
        .api_key
        .as_deref()
        .ok_or_else(|| InfraError::configuration("indicators api key is not configured"))?;
    let indicators: Arc<dyn IndicatorSource> =
        Arc::new(IndicatorClient::new(&settings.indicators.base_url, api_key)?);

    let owner = settings
        .sync
        .owner
        .clone()
        .ok_or_else(|| InfraError::configuration("sync owner is not configured"))?;
    let portfolio_repo: Arc<dyn PortfolioRepo> = repositories;

    Ok(Arc::new(PortfolioSyncService::new(
        sheets,
        indicators,
        portfolio_repo,
        SyncSettings {
            owner,
            holdings_range: settings.sheets.holdings_range.clone(),
            usd_cell: settings.sheets.usd_cell.clone(),
            eur_cell: settings.sheets.eur_cell.clone(),
            series_10y: settings.indicators.series_10y.clone(),
            series_2y: settings.indicators.series_2y.clone(),
        },
    )))
}

fn spawn_sync_monitor(
    context: PortfolioSyncContext,
    sync: &config::SyncScheduleSettings,
) -> tokio::task::JoinHandle<()> {
    let stream = CronStream::new_with_timezone(sync.schedule.clone(), sync.timezone);
    let worker = WorkerBuilder::new("portfolio-sync-worker")
        .data(context)
        .backend(stream)
        .build_fn(process_portfolio_sync_job);

    let monitor = Monitor::new().register(worker);

    tokio::spawn(async move {
        if let Err(err) = monitor.run().await {
            error!(error = %err, "job monitor stopped");
        }
    })
}
