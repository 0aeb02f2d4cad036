//! Portfolio synchronization: spreadsheet and indicator reads followed by
//! one atomic document-store batch.
//!
//! The read phase is best-effort for the market snapshots (last good value
//! wins on any failure) and strict for the holdings range, because holdings
//! are replaced wholesale and a missing read would wipe the collection.

use std::sync::Arc;

use metrics::counter;
use thiserror::Error;
use time::{OffsetDateTime, format_description::well_known::Rfc3339};
use tracing::{info, warn};

use crate::application::repos::{
    IndicatorSource, Observation, PortfolioBatch, PortfolioRepo, RepoError, SpreadsheetSource,
};
use crate::domain::portfolio::{FxSnapshot, HoldingRecord, RatesSnapshot, SyncSummary};
use crate::util::numbers::{parse_bool_literal, parse_number};

/// How many recent observations to request per yield series.
pub const OBSERVATION_WINDOW: u32 = 5;

const DEFAULT_MARKET: &str = "KR";
const DEFAULT_ASSET_TYPE: &str = "STOCK";
const DEFAULT_CURRENCY: &str = "KRW";

/// Spreadsheet ranges and indicator series the job reads, all supplied by
/// configuration.
#[derive(Debug, Clone)]
pub struct SyncSettings {
    /// Owner whose holdings collection is replaced.
    pub owner: String,
    /// Rectangular holdings range, one asset per row.
    pub holdings_range: String,
    /// Single cell holding the KRW-per-USD rate.
    pub usd_cell: String,
    /// Single cell holding the KRW-per-EUR rate.
    pub eur_cell: String,
    /// 10-year treasury yield series id.
    pub series_10y: String,
    /// 2-year treasury yield series id.
    pub series_2y: String,
}

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("failed to read holdings range: {0}")]
    Holdings(#[source] RepoError),
    #[error("failed to list existing holdings: {0}")]
    ListExisting(#[source] RepoError),
    #[error("batch commit failed: {0}")]
    Commit(#[source] RepoError),
}

/// Orchestrates one sync pass; shared by the cron worker, the manual HTTP
/// trigger and the CLI subcommand.
#[derive(Clone)]
pub struct PortfolioSyncService {
    sheets: Arc<dyn SpreadsheetSource>,
    indicators: Arc<dyn IndicatorSource>,
    portfolio: Arc<dyn PortfolioRepo>,
    settings: SyncSettings,
}

impl PortfolioSyncService {
    pub fn new(
        sheets: Arc<dyn SpreadsheetSource>,
        indicators: Arc<dyn IndicatorSource>,
        portfolio: Arc<dyn PortfolioRepo>,
        settings: SyncSettings,
    ) -> Self {
        Self {
            sheets,
            indicators,
            portfolio,
            settings,
        }
    }

    pub async fn run(&self) -> Result<SyncSummary, SyncError> {
        let rows = self
            .sheets
            .read_range(&self.settings.holdings_range)
            .await
            .map_err(|err| {
                counter!("baram_sync_failed_total").increment(1);
                SyncError::Holdings(err)
            })?;

        let now = rfc3339_now();

        let usd = self.read_fx_cell(&self.settings.usd_cell).await;
        let eur = self.read_fx_cell(&self.settings.eur_cell).await;
        let fx = match (usd, eur) {
            (Some(usd_krw), Some(eur_krw)) => Some(FxSnapshot {
                usd_krw,
                eur_krw,
                updated_at: now.clone(),
            }),
            _ => {
                warn!("fx cells unavailable or unparsable; keeping last good snapshot");
                None
            }
        };

        let us_10y = self.resolve_yield(&self.settings.series_10y).await;
        let us_2y = self.resolve_yield(&self.settings.series_2y).await;
        let rates = match (us_10y, us_2y) {
            (Some(us_10y), Some(us_2y)) => Some(RatesSnapshot {
                us_10y,
                us_2y,
                spread: us_10y - us_2y,
                updated_at: now.clone(),
            }),
            _ => {
                warn!("yield series incomplete; keeping last good snapshot");
                None
            }
        };

        let holdings = parse_holdings(&rows, &now);
        let holdings_count = holdings.len();

        let delete_ids = self
            .portfolio
            .list_holding_ids(&self.settings.owner)
            .await
            .map_err(|err| {
                counter!("baram_sync_failed_total").increment(1);
                SyncError::ListExisting(err)
            })?;

        let batch = PortfolioBatch {
            delete_ids,
            holdings,
            fx,
            rates,
        };
        self.portfolio
            .commit_batch(&self.settings.owner, batch)
            .await
            .map_err(|err| {
                counter!("baram_sync_failed_total").increment(1);
                SyncError::Commit(err)
            })?;

        counter!("baram_sync_success_total").increment(1);
        info!(holdings = holdings_count, "portfolio sync completed");

        Ok(SyncSummary {
            success: true,
            holdings_count,
        })
    }

    /// Read one FX cell; any read error or unparsable value becomes `None`
    /// so the merge is skipped instead of clobbering the stored rate.
    async fn read_fx_cell(&self, range: &str) -> Option<f64> {
        match self.sheets.read_cell(range).await {
            Ok(Some(raw)) => {
                let parsed = parse_number(&raw);
                if parsed.is_none() {
                    warn!(range, value = %raw, "fx cell did not parse as a number");
                }
                parsed
            }
            Ok(None) => {
                warn!(range, "fx cell is empty");
                None
            }
            Err(err) => {
                warn!(range, error = %err, "fx cell read failed");
                None
            }
        }
    }

    /// Fetch recent observations for a series and take the newest numeric
    /// value. Fetch errors are isolated here; a missing yield only skips the
    /// rates merge.
    async fn resolve_yield(&self, series_id: &str) -> Option<f64> {
        match self
            .indicators
            .latest_observations(series_id, OBSERVATION_WINDOW)
            .await
        {
            Ok(observations) => {
                let value = first_numeric(&observations);
                if value.is_none() {
                    warn!(series_id, "no numeric observation in window");
                }
                value
            }
            Err(err) => {
                warn!(series_id, error = %err, "yield fetch failed");
                None
            }
        }
    }
}

/// Scan observations newest to oldest for the first parseable value.
fn first_numeric(observations: &[Observation]) -> Option<f64> {
    observations.iter().find_map(|obs| parse_number(&obs.value))
}

/// Map spreadsheet rows to holding records.
///
/// Column layout: market, asset type, name, ticker, quantity, average price,
/// currency, last price, value (KRW), P&L (KRW), enabled, memo. Rows without
/// a name or a parseable quantity are skipped; other fields default rather
/// than fail.
fn parse_holdings(rows: &[Vec<String>], timestamp: &str) -> Vec<(String, HoldingRecord)> {
    let mut out = Vec::new();
    for (ordinal, row) in rows.iter().enumerate() {
        let name = cell(row, 2);
        let quantity = parse_number(cell(row, 4));
        let (name, quantity) = match (name.trim(), quantity) {
            (name, Some(quantity)) if !name.is_empty() => (name.to_string(), quantity),
            _ => continue,
        };

        let record = HoldingRecord {
            market: cell_or(row, 0, DEFAULT_MARKET),
            asset_type: cell_or(row, 1, DEFAULT_ASSET_TYPE),
            name,
            ticker: cell(row, 3).trim().to_string(),
            quantity,
            avg_price: parse_number(cell(row, 5)).unwrap_or(0.0),
            currency: cell_or(row, 6, DEFAULT_CURRENCY),
            last_price: parse_number(cell(row, 7)).unwrap_or(0.0),
            value_krw: parse_number(cell(row, 8)).unwrap_or(0.0),
            pnl_krw: parse_number(cell(row, 9)).unwrap_or(0.0),
            enabled: parse_bool_literal(cell(row, 10)),
            memo: cell(row, 11).trim().to_string(),
            timestamp: timestamp.to_string(),
        };
        let id = record.document_id(ordinal);
        out.push((id, record));
    }
    out
}

fn cell<'a>(row: &'a [String], index: usize) -> &'a str {
    row.get(index).map(String::as_str).unwrap_or("")
}

fn cell_or(row: &[String], index: usize, default: &str) -> String {
    let value = cell(row, index).trim();
    if value.is_empty() {
        default.to_string()
    } else {
        value.to_string()
    }
}

fn rfc3339_now() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_default()
}
