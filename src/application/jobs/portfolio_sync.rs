//! Cron-triggered portfolio sync worker.

use std::sync::Arc;

use apalis::prelude::*;
use chrono::DateTime;
use chrono_tz::Tz;

use crate::application::sync::PortfolioSyncService;

/// Marker struct for the cron tick.
/// Must implement `From<DateTime<Tz>>` for apalis-cron compatibility.
#[derive(Default, Debug, Clone)]
pub struct PortfolioSyncJob;

impl From<DateTime<Tz>> for PortfolioSyncJob {
    fn from(_: DateTime<Tz>) -> Self {
        Self
    }
}

/// Context for the sync worker.
#[derive(Clone)]
pub struct PortfolioSyncContext {
    pub sync: Arc<PortfolioSyncService>,
}

/// Run one sync pass on the cron tick.
///
/// A failed pass is logged and absorbed: the schedule fires again later and
/// nothing retries in between.
pub async fn process_portfolio_sync_job(
    _job: PortfolioSyncJob,
    ctx: Data<PortfolioSyncContext>,
) -> Result<(), apalis::prelude::Error> {
    match ctx.sync.run().await {
        Ok(summary) => {
            tracing::info!(
                holdings = summary.holdings_count,
                "scheduled portfolio sync finished"
            );
        }
        Err(err) => {
            tracing::warn!(error = %err, "scheduled portfolio sync failed");
        }
    }
    Ok(())
}
