//! Post records mirrored from the external document store.
//!
//! Timestamps are kept in the store's own representation (RFC 3339 strings
//! written by the publishing client); consumers that need a calendar date
//! parse on demand and fall back to "now" when the value is unparsable.

use serde::{Deserialize, Serialize};

/// One document from the post-metadata collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostMetaRecord {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub category: String,
    #[serde(default, rename = "user")]
    pub author: String,
    #[serde(default)]
    pub summary: String,
    #[serde(default, rename = "createDt")]
    pub create_dt: String,
    #[serde(default, rename = "updateDt")]
    pub update_dt: Option<String>,
    #[serde(default)]
    pub year: i32,
}

/// One document from the post-content collection; shares its id with the
/// metadata record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostContentRecord {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub content: String,
    /// Object-store paths of uploaded images.
    #[serde(default)]
    pub images: Vec<String>,
    /// Public URLs issued for the same images, in upload order.
    #[serde(default, rename = "imageUrls")]
    pub image_urls: Vec<String>,
}
