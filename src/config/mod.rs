//! Configuration layer: typed settings with layered precedence (file → env → CLI).

use std::{net::SocketAddr, str::FromStr};

use apalis_cron::Schedule;
use chrono_tz::Tz;
use clap::{Args, Parser, Subcommand, builder::BoolishValueParser};
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

use crate::application::preview::DEFAULT_CRAWLER_SIGNATURES;

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "baram";
const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 3000;
const DEFAULT_SITE_NAME: &str = "Rocky's Blog";
const DEFAULT_DESCRIPTION: &str = "Rocky의 일하는 이야기";
const DEFAULT_SITEMAP_PATH: &str = "sitemap.xml";
const DEFAULT_SHEETS_BASE_URL: &str = "https://sheets.googleapis.com";
const DEFAULT_INDICATORS_BASE_URL: &str = "https://api.stlouisfed.org";
const DEFAULT_HOLDINGS_RANGE: &str = "Portfolio!A2:L";
const DEFAULT_USD_CELL: &str = "Rates!B1";
const DEFAULT_EUR_CELL: &str = "Rates!B2";
const DEFAULT_SERIES_10Y: &str = "DGS10";
const DEFAULT_SERIES_2Y: &str = "DGS2";
const DEFAULT_POSTS_COLLECTION: &str = "board-info";
const DEFAULT_CONTENT_COLLECTION: &str = "board-content";
const DEFAULT_MARKET_COLLECTION: &str = "market";
const DEFAULT_USERS_COLLECTION: &str = "users";
// Four ticks daily; hours are interpreted in sync.timezone.
const DEFAULT_SYNC_SCHEDULE: &str = "0 0 7,12,17,22 * * *";
const DEFAULT_SYNC_TIMEZONE: &str = "Asia/Seoul";

/// Command-line arguments for the baram binary.
#[derive(Debug, Parser)]
#[command(name = "baram", version, about = "Blog backing services")]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "BARAM_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<std::path::PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run the HTTP services and the cron scheduler.
    Serve(Box<ServeArgs>),
    /// Run one portfolio sync pass and print the summary.
    Sync(SyncArgs),
    /// Rebuild and publish the sitemap once.
    Sitemap(SitemapArgs),
}

#[derive(Debug, Args, Default, Clone)]
pub struct CommonOverrides {
    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub log_json: Option<bool>,

    /// Override the document-store base URL.
    #[arg(long = "docstore-url", value_name = "URL")]
    pub docstore_url: Option<String>,

    /// Override the object-store base URL.
    #[arg(long = "objstore-url", value_name = "URL")]
    pub objstore_url: Option<String>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeArgs {
    #[command(flatten)]
    pub overrides: ServeOverrides,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeOverrides {
    #[command(flatten)]
    pub common: CommonOverrides,

    /// Override the listener host.
    #[arg(long = "server-host", value_name = "HOST")]
    pub server_host: Option<String>,

    /// Override the listener port.
    #[arg(long = "server-port", value_name = "PORT")]
    pub server_port: Option<u16>,

    /// Override the sync cron expression.
    #[arg(long = "sync-schedule", value_name = "CRON")]
    pub sync_schedule: Option<String>,

    /// Override the sync timezone.
    #[arg(long = "sync-timezone", value_name = "TZ")]
    pub sync_timezone: Option<String>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct SyncArgs {
    #[command(flatten)]
    pub overrides: CommonOverrides,
}

#[derive(Debug, Args, Default, Clone)]
pub struct SitemapArgs {
    #[command(flatten)]
    pub overrides: CommonOverrides,
}

/// Fully-resolved deployment settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub logging: LoggingSettings,
    pub site: SiteSettings,
    pub docstore: DocStoreSettings,
    pub objstore: ObjectStoreSettings,
    pub sheets: SheetsSettings,
    pub indicators: IndicatorSettings,
    pub sync: SyncScheduleSettings,
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub addr: SocketAddr,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Clone)]
pub struct SiteSettings {
    /// Canonical origin of the published site (no trailing slash).
    pub public_url: String,
    pub site_name: String,
    pub default_description: String,
    pub default_thumbnail_url: String,
    /// Origin the SPA entry document is fetched from for non-crawlers.
    pub spa_origin: Option<String>,
    pub crawler_signatures: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct DocStoreSettings {
    pub base_url: Option<String>,
    pub auth_token: Option<String>,
    pub posts_collection: String,
    pub content_collection: String,
    pub market_collection: String,
    pub users_collection: String,
}

#[derive(Debug, Clone)]
pub struct ObjectStoreSettings {
    pub base_url: Option<String>,
    pub auth_token: Option<String>,
    pub sitemap_path: String,
}

#[derive(Debug, Clone)]
pub struct SheetsSettings {
    pub base_url: String,
    pub spreadsheet_id: Option<String>,
    pub auth_token: Option<String>,
    pub holdings_range: String,
    pub usd_cell: String,
    pub eur_cell: String,
}

#[derive(Debug, Clone)]
pub struct IndicatorSettings {
    pub base_url: String,
    pub api_key: Option<String>,
    pub series_10y: String,
    pub series_2y: String,
}

#[derive(Debug, Clone)]
pub struct SyncScheduleSettings {
    pub owner: Option<String>,
    pub schedule: Schedule,
    pub timezone: Tz,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(Environment::with_prefix("BARAM").separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;

    match cli.command.as_ref() {
        Some(Command::Serve(args)) => raw.apply_serve_overrides(&args.overrides),
        Some(Command::Sync(args)) => raw.apply_common_overrides(&args.overrides),
        Some(Command::Sitemap(args)) => raw.apply_common_overrides(&args.overrides),
        None => raw.apply_serve_overrides(&ServeOverrides::default()),
    }

    Settings::from_raw(raw)
}

/// Resolve configuration using the supplied CLI arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    server: RawServerSettings,
    logging: RawLoggingSettings,
    site: RawSiteSettings,
    docstore: RawDocStoreSettings,
    objstore: RawObjectStoreSettings,
    sheets: RawSheetsSettings,
    indicators: RawIndicatorSettings,
    sync: RawSyncSettings,
}

impl RawSettings {
    fn apply_serve_overrides(&mut self, overrides: &ServeOverrides) {
        if let Some(host) = overrides.server_host.as_ref() {
            self.server.host = Some(host.clone());
        }
        if let Some(port) = overrides.server_port {
            self.server.port = Some(port);
        }
        if let Some(schedule) = overrides.sync_schedule.as_ref() {
            self.sync.schedule = Some(schedule.clone());
        }
        if let Some(tz) = overrides.sync_timezone.as_ref() {
            self.sync.timezone = Some(tz.clone());
        }
        self.apply_common_overrides(&overrides.common);
    }

    fn apply_common_overrides(&mut self, overrides: &CommonOverrides) {
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
        if let Some(url) = overrides.docstore_url.as_ref() {
            self.docstore.base_url = Some(url.clone());
        }
        if let Some(url) = overrides.objstore_url.as_ref() {
            self.objstore.base_url = Some(url.clone());
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            server,
            logging,
            site,
            docstore,
            objstore,
            sheets,
            indicators,
            sync,
        } = raw;

        Ok(Self {
            server: build_server_settings(server)?,
            logging: build_logging_settings(logging)?,
            site: build_site_settings(site)?,
            docstore: build_docstore_settings(docstore),
            objstore: build_objstore_settings(objstore),
            sheets: build_sheets_settings(sheets),
            indicators: build_indicator_settings(indicators),
            sync: build_sync_settings(sync)?,
        })
    }
}

fn build_server_settings(server: RawServerSettings) -> Result<ServerSettings, LoadError> {
    let host = server.host.unwrap_or_else(|| DEFAULT_HOST.to_string());
    let port = server.port.unwrap_or(DEFAULT_PORT);
    if port == 0 {
        return Err(LoadError::invalid(
            "server.port",
            "port must be greater than zero",
        ));
    }

    let candidate = format!("{host}:{port}");
    let addr = candidate
        .parse()
        .map_err(|err| LoadError::invalid("server.addr", format!("invalid `{candidate}`: {err}")))?;

    Ok(ServerSettings { addr })
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_site_settings(site: RawSiteSettings) -> Result<SiteSettings, LoadError> {
    let public_url = site
        .public_url
        .unwrap_or_else(|| "http://127.0.0.1:3000".to_string());
    url::Url::parse(&public_url)
        .map_err(|err| LoadError::invalid("site.public_url", err.to_string()))?;
    let public_url = public_url.trim_end_matches('/').to_string();

    let default_thumbnail_url = site
        .default_thumbnail_url
        .unwrap_or_else(|| format!("{public_url}/thumbnail.png"));

    let crawler_signatures = match site.crawler_signatures {
        Some(list) if !list.is_empty() => list,
        _ => DEFAULT_CRAWLER_SIGNATURES
            .iter()
            .map(|s| s.to_string())
            .collect(),
    };

    Ok(SiteSettings {
        public_url,
        site_name: site.site_name.unwrap_or_else(|| DEFAULT_SITE_NAME.to_string()),
        default_description: site
            .default_description
            .unwrap_or_else(|| DEFAULT_DESCRIPTION.to_string()),
        default_thumbnail_url,
        spa_origin: non_empty(site.spa_origin),
        crawler_signatures,
    })
}

fn build_docstore_settings(docstore: RawDocStoreSettings) -> DocStoreSettings {
    DocStoreSettings {
        base_url: non_empty(docstore.base_url),
        auth_token: non_empty(docstore.auth_token),
        posts_collection: docstore
            .posts_collection
            .unwrap_or_else(|| DEFAULT_POSTS_COLLECTION.to_string()),
        content_collection: docstore
            .content_collection
            .unwrap_or_else(|| DEFAULT_CONTENT_COLLECTION.to_string()),
        market_collection: docstore
            .market_collection
            .unwrap_or_else(|| DEFAULT_MARKET_COLLECTION.to_string()),
        users_collection: docstore
            .users_collection
            .unwrap_or_else(|| DEFAULT_USERS_COLLECTION.to_string()),
    }
}

fn build_objstore_settings(objstore: RawObjectStoreSettings) -> ObjectStoreSettings {
    ObjectStoreSettings {
        base_url: non_empty(objstore.base_url),
        auth_token: non_empty(objstore.auth_token),
        sitemap_path: objstore
            .sitemap_path
            .unwrap_or_else(|| DEFAULT_SITEMAP_PATH.to_string()),
    }
}

fn build_sheets_settings(sheets: RawSheetsSettings) -> SheetsSettings {
    SheetsSettings {
        base_url: sheets
            .base_url
            .unwrap_or_else(|| DEFAULT_SHEETS_BASE_URL.to_string()),
        spreadsheet_id: non_empty(sheets.spreadsheet_id),
        auth_token: non_empty(sheets.auth_token),
        holdings_range: sheets
            .holdings_range
            .unwrap_or_else(|| DEFAULT_HOLDINGS_RANGE.to_string()),
        usd_cell: sheets.usd_cell.unwrap_or_else(|| DEFAULT_USD_CELL.to_string()),
        eur_cell: sheets.eur_cell.unwrap_or_else(|| DEFAULT_EUR_CELL.to_string()),
    }
}

fn build_indicator_settings(indicators: RawIndicatorSettings) -> IndicatorSettings {
    IndicatorSettings {
        base_url: indicators
            .base_url
            .unwrap_or_else(|| DEFAULT_INDICATORS_BASE_URL.to_string()),
        api_key: non_empty(indicators.api_key),
        series_10y: indicators
            .series_10y
            .unwrap_or_else(|| DEFAULT_SERIES_10Y.to_string()),
        series_2y: indicators
            .series_2y
            .unwrap_or_else(|| DEFAULT_SERIES_2Y.to_string()),
    }
}

fn build_sync_settings(sync: RawSyncSettings) -> Result<SyncScheduleSettings, LoadError> {
    let schedule_expr = sync
        .schedule
        .unwrap_or_else(|| DEFAULT_SYNC_SCHEDULE.to_string());
    let schedule = Schedule::from_str(&schedule_expr)
        .map_err(|err| LoadError::invalid("sync.schedule", err.to_string()))?;

    let tz_name = sync
        .timezone
        .unwrap_or_else(|| DEFAULT_SYNC_TIMEZONE.to_string());
    let timezone: Tz = tz_name
        .parse()
        .map_err(|err: chrono_tz::ParseError| LoadError::invalid("sync.timezone", err.to_string()))?;

    Ok(SyncScheduleSettings {
        owner: non_empty(sync.owner),
        schedule,
        timezone,
    })
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.and_then(|v| {
        let trimmed = v.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    })
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawServerSettings {
    host: Option<String>,
    port: Option<u16>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSiteSettings {
    public_url: Option<String>,
    site_name: Option<String>,
    default_description: Option<String>,
    default_thumbnail_url: Option<String>,
    spa_origin: Option<String>,
    crawler_signatures: Option<Vec<String>>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawDocStoreSettings {
    base_url: Option<String>,
    auth_token: Option<String>,
    posts_collection: Option<String>,
    content_collection: Option<String>,
    market_collection: Option<String>,
    users_collection: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawObjectStoreSettings {
    base_url: Option<String>,
    auth_token: Option<String>,
    sitemap_path: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSheetsSettings {
    base_url: Option<String>,
    spreadsheet_id: Option<String>,
    auth_token: Option<String>,
    holdings_range: Option<String>,
    usd_cell: Option<String>,
    eur_cell: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawIndicatorSettings {
    base_url: Option<String>,
    api_key: Option<String>,
    series_10y: Option<String>,
    series_2y: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSyncSettings {
    owner: Option<String>,
    schedule: Option<String>,
    timezone: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_overrides_take_highest_precedence() {
        let mut raw = RawSettings::default();
        raw.server.port = Some(4000);
        raw.logging.level = Some("info".to_string());

        let overrides = ServeOverrides {
            server_port: Some(4321),
            common: CommonOverrides {
                log_level: Some("debug".to_string()),
                ..Default::default()
            },
            ..Default::default()
        };

        raw.apply_serve_overrides(&overrides);
        let settings = Settings::from_raw(raw).expect("valid settings");

        assert_eq!(settings.server.addr.port(), 4321);
        assert_eq!(settings.logging.level, LevelFilter::DEBUG);
    }

    #[test]
    fn default_sync_schedule_parses() {
        let settings = Settings::from_raw(RawSettings::default()).expect("valid settings");
        assert_eq!(settings.sync.timezone, chrono_tz::Asia::Seoul);
        let upcoming: Vec<_> = settings
            .sync
            .schedule
            .upcoming(chrono::Utc)
            .take(4)
            .collect();
        assert_eq!(upcoming.len(), 4);
    }

    #[test]
    fn invalid_timezone_is_rejected() {
        let mut raw = RawSettings::default();
        raw.sync.timezone = Some("Mars/Olympus".to_string());
        assert!(matches!(
            Settings::from_raw(raw),
            Err(LoadError::Invalid { key: "sync.timezone", .. })
        ));
    }

    #[test]
    fn crawler_signatures_default_when_missing() {
        let settings = Settings::from_raw(RawSettings::default()).expect("valid settings");
        assert!(settings
            .site
            .crawler_signatures
            .iter()
            .any(|s| s == "facebookexternalhit"));
    }

    #[test]
    fn public_url_trailing_slash_is_trimmed() {
        let mut raw = RawSettings::default();
        raw.site.public_url = Some("https://blog.example.org/".to_string());
        let settings = Settings::from_raw(raw).expect("valid settings");
        assert_eq!(settings.site.public_url, "https://blog.example.org");
        assert_eq!(
            settings.site.default_thumbnail_url,
            "https://blog.example.org/thumbnail.png"
        );
    }

    #[test]
    fn parse_sync_command_with_overrides() {
        let args = CliArgs::parse_from([
            "baram",
            "sync",
            "--docstore-url",
            "https://docstore.example",
        ]);

        match args.command.expect("sync command") {
            Command::Sync(sync) => {
                assert_eq!(
                    sync.overrides.docstore_url.as_deref(),
                    Some("https://docstore.example")
                );
            }
            _ => panic!("wrong command parsed"),
        }
    }

    #[test]
    fn default_to_serve_command() {
        let args = CliArgs::parse_from(["baram"]);
        assert!(args.command.is_none());
    }
}
