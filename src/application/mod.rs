pub mod error;
pub mod jobs;
pub mod preview;
pub mod repos;
pub mod sitemap;
pub mod sync;
