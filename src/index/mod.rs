//! Index service integration
//!
//! The index is the remote file-listing service the orchestrator scans.
//! It exposes a hierarchical listing plus per-file signed direct URLs.

pub mod client;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AppResult;

pub use client::IndexClient;

/// One entry of a directory listing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexEntry {
    pub name: String,
    /// Absolute path in the index namespace
    pub path: String,
    pub size: u64,
    pub is_dir: bool,
    /// Parse-or-zero: unparsable timestamps collapse to the Unix epoch
    pub modified: DateTime<Utc>,
    pub sign: String,
}

/// A single page of a directory listing
#[derive(Debug, Clone, Default)]
pub struct ListPage {
    pub entries: Vec<IndexEntry>,
    pub total: u64,
}

/// Direct-URL pair for one file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileLink {
    pub original_url: String,
    /// `original_url` with the public hostname swapped for the internal one
    pub internal_url: String,
}

impl FileLink {
    pub fn new(original_url: String) -> Self {
        let internal_url = to_internal_url(&original_url);
        Self {
            original_url,
            internal_url,
        }
    }
}

/// Rewrite a public direct URL to its internal-network equivalent.
/// Every occurrence is replaced; URLs without the marker pass through.
pub fn to_internal_url(url: &str) -> String {
    url.replace("fcalist-public", "fcalist-internal")
}

/// Seam between the walker and the concrete index client
#[async_trait]
pub trait IndexProvider: Send + Sync {
    /// List one page of a directory
    async fn list(&self, path: &str, page: u32, per_page: u32) -> AppResult<ListPage>;

    /// Resolve a file's direct-URL pair; best-effort fallback URLs are
    /// synthesized when the index cannot produce a signed one
    async fn resolve(&self, path: &str) -> AppResult<FileLink>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_internal_rewrite() {
        assert_eq!(
            to_internal_url("https://fcalist-public.example.com/d/a.mp4"),
            "https://fcalist-internal.example.com/d/a.mp4"
        );
        // untouched when the marker is absent
        assert_eq!(
            to_internal_url("https://other.example.com/d/a.mp4"),
            "https://other.example.com/d/a.mp4"
        );
        // every occurrence is replaced
        assert_eq!(
            to_internal_url("http://fcalist-public/x?mirror=fcalist-public"),
            "http://fcalist-internal/x?mirror=fcalist-internal"
        );
    }

    #[test]
    fn test_file_link_pair() {
        let link = FileLink::new("https://fcalist-public/d/a.mp4".to_string());
        assert_eq!(link.original_url, "https://fcalist-public/d/a.mp4");
        assert_eq!(link.internal_url, "https://fcalist-internal/d/a.mp4");
    }
}
