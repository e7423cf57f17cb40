//! Time-window recursive walker
//!
//! Visits the index tree depth-first with a modification-time prune: a
//! directory is descended only when its own modification time falls inside
//! the window. The index's directory mtime is authoritative for "new
//! content", so cold directories are never entered even to look for hot
//! files.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::classify::{Classification, Classifier, MediaType};
use crate::error::AppResult;
use crate::index::{FileLink, IndexEntry, IndexProvider};

const PER_PAGE: u32 = 100;

/// Candidate file produced by a walk
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileItem {
    pub name: String,
    pub path: String,
    pub size: u64,
    pub modified: DateTime<Utc>,
    pub is_dir: bool,
    pub media_type: MediaType,
    pub original_url: String,
    pub internal_url: String,
    pub download_dir: String,
}

impl FileItem {
    /// Descriptor for an unclassified entry; directories stay `other` with
    /// an empty destination
    pub fn from_entry(entry: &IndexEntry) -> Self {
        Self {
            name: entry.name.clone(),
            path: entry.path.clone(),
            size: entry.size,
            modified: entry.modified,
            is_dir: entry.is_dir,
            media_type: MediaType::Other,
            original_url: String::new(),
            internal_url: String::new(),
            download_dir: String::new(),
        }
    }

    pub fn with_link(mut self, link: FileLink) -> Self {
        self.original_url = link.original_url;
        self.internal_url = link.internal_url;
        self
    }

    pub fn apply(&mut self, classification: Classification) {
        self.media_type = classification.media_type;
        self.download_dir = classification.download_dir;
    }
}

/// Inclusive modification-time window
#[derive(Debug, Clone, Copy)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        self.start <= instant && instant <= self.end
    }

    /// Window reaching back `hours` from `end`
    pub fn last_hours(end: DateTime<Utc>, hours: u32) -> Self {
        Self {
            start: end - chrono::Duration::hours(hours as i64),
            end,
        }
    }
}

/// Recursive window-filtered traversal over the index tree
pub struct Walker {
    index: Arc<dyn IndexProvider>,
    classifier: Arc<Classifier>,
}

impl Walker {
    pub fn new(index: Arc<dyn IndexProvider>, classifier: Arc<Classifier>) -> Self {
        Self { index, classifier }
    }

    /// Collect in-window files under `path`. `window: None` descends the
    /// whole subtree. Fails only when the root listing itself fails; child
    /// listing errors skip their subtree and the walk continues.
    pub async fn walk(
        &self,
        path: &str,
        window: Option<TimeWindow>,
        video_only: bool,
        cancel: &CancellationToken,
    ) -> AppResult<Vec<FileItem>> {
        let mut found = Vec::new();
        self.walk_dir(path.to_string(), window, video_only, cancel.clone(), &mut found)
            .await?;
        tracing::debug!("walk of {} found {} candidate files", path, found.len());
        Ok(found)
    }

    fn walk_dir<'a>(
        &'a self,
        path: String,
        window: Option<TimeWindow>,
        video_only: bool,
        cancel: CancellationToken,
        found: &'a mut Vec<FileItem>,
    ) -> Pin<Box<dyn Future<Output = AppResult<()>> + Send + 'a>> {
        Box::pin(async move {
            let mut subdirs: Vec<String> = Vec::new();
            let mut page = 1u32;

            loop {
                if cancel.is_cancelled() {
                    return Ok(());
                }

                let listing = self.index.list(&path, page, PER_PAGE).await?;
                let short_page = listing.entries.len() < PER_PAGE as usize;

                for entry in &listing.entries {
                    let in_window = window.map(|w| w.contains(entry.modified)).unwrap_or(true);

                    if entry.is_dir {
                        // the prune: cold directories are not descended
                        if in_window {
                            subdirs.push(entry.path.clone());
                        }
                    } else if in_window && (!video_only || self.classifier.is_video(&entry.name)) {
                        match self.index.resolve(&entry.path).await {
                            Ok(link) => found.push(FileItem::from_entry(entry).with_link(link)),
                            Err(e) => {
                                tracing::warn!("resolving {} failed: {}, skipping file", entry.path, e);
                            }
                        }
                    }
                }

                if short_page {
                    break;
                }
                page += 1;
            }

            for dir in subdirs {
                if cancel.is_cancelled() {
                    return Ok(());
                }
                if let Err(e) = self
                    .walk_dir(dir.clone(), window, video_only, cancel.clone(), found)
                    .await
                {
                    tracing::warn!("listing {} failed: {}, skipping subtree", dir, e);
                }
            }

            Ok(())
        })
    }
}
