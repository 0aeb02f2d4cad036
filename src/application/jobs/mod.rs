mod portfolio_sync;

pub use portfolio_sync::{PortfolioSyncContext, PortfolioSyncJob, process_portfolio_sync_job};
