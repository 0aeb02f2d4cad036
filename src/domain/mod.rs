pub mod portfolio;
pub mod posts;
