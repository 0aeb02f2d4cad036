pub mod docstore;
pub mod error;
pub mod http;
pub mod indicators;
pub mod objstore;
pub mod sheets;
pub mod spa;
pub mod telemetry;
