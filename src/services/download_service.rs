//! Download service
//!
//! Stateless facade over the fetcher: single and batch creation, listing
//! with status filtering, pause/resume/cancel and engine statistics. The
//! fetcher remains the source of truth for task state.

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::classify::MediaType;
use crate::dispatcher::{BatchResult, DispatchOptions, Dispatcher};
use crate::error::{AppError, AppResult};
use crate::fetcher::{DownloadEngine, DownloadRecord, DownloadStatus, EnqueueOptions, GlobalStat};
use crate::walker::FileItem;

/// How many waiting/stopped entries one listing pulls from the engine
const LIST_LIMIT: i64 = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortKey {
    Name,
    Progress,
    Speed,
}

/// Engine statistics plus version, for the status surface
#[derive(Debug, Clone, Serialize)]
pub struct SystemStatus {
    pub version: String,
    pub stat: GlobalStat,
}

pub struct DownloadService {
    engine: Arc<dyn DownloadEngine>,
    dispatcher: Dispatcher,
}

impl DownloadService {
    pub fn new(engine: Arc<dyn DownloadEngine>) -> Self {
        let dispatcher = Dispatcher::new(Arc::clone(&engine));
        Self { engine, dispatcher }
    }

    fn validate_url(url: &str) -> AppResult<()> {
        if url.is_empty() {
            return Err(AppError::InvalidRequest("url must not be empty".into()));
        }
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(AppError::InvalidRequest(format!(
                "url must be http(s): {url}"
            )));
        }
        Ok(())
    }

    /// Enqueue one URL, returning the fetcher-assigned id
    pub async fn create(
        &self,
        url: &str,
        dir: Option<String>,
        out: Option<String>,
    ) -> AppResult<String> {
        Self::validate_url(url)?;
        let options = EnqueueOptions {
            dir,
            out,
            extra: Default::default(),
        };
        let id = self.engine.add_uri(url, &options).await?;
        tracing::info!("enqueued {} as {}", url, id);
        Ok(id)
    }

    /// Enqueue a set of raw URLs through the dispatcher
    pub async fn create_batch(
        &self,
        urls: Vec<String>,
        dir: Option<String>,
        cancel: &CancellationToken,
    ) -> AppResult<BatchResult> {
        if urls.is_empty() {
            return Err(AppError::InvalidRequest("batch must not be empty".into()));
        }
        for url in &urls {
            Self::validate_url(url)?;
        }

        let files = urls
            .into_iter()
            .map(|url| {
                let name = url
                    .rsplit('/')
                    .next()
                    .and_then(|tail| tail.split('?').next())
                    .unwrap_or("unknown")
                    .to_string();
                FileItem {
                    name,
                    path: url.clone(),
                    size: 0,
                    modified: Utc::now(),
                    is_dir: false,
                    media_type: MediaType::Other,
                    original_url: url.clone(),
                    internal_url: url,
                    download_dir: dir.clone().unwrap_or_default(),
                }
            })
            .collect();

        Ok(self
            .dispatcher
            .dispatch(files, DispatchOptions::default(), cancel)
            .await)
    }

    /// Enqueue already-classified walker candidates
    pub async fn dispatch_files(
        &self,
        files: Vec<FileItem>,
        cancel: &CancellationToken,
    ) -> BatchResult {
        self.dispatcher
            .dispatch(files, DispatchOptions::default(), cancel)
            .await
    }

    /// All known engine tasks: active, waiting and stopped fetched
    /// concurrently, then filtered and sorted on the caller's behalf
    pub async fn list(
        &self,
        status: Option<DownloadStatus>,
        sort: Option<SortKey>,
    ) -> AppResult<Vec<DownloadRecord>> {
        let (active, waiting, stopped) = tokio::join!(
            self.engine.get_active(),
            self.engine.get_waiting(0, LIST_LIMIT),
            self.engine.get_stopped(0, LIST_LIMIT),
        );

        let mut records = active?;
        records.extend(waiting?);
        records.extend(stopped?);

        if let Some(wanted) = status {
            records.retain(|r| r.status == wanted);
        }

        match sort {
            Some(SortKey::Name) => records.sort_by(|a, b| a.filename.cmp(&b.filename)),
            Some(SortKey::Progress) => {
                records.sort_by(|a, b| {
                    b.progress()
                        .partial_cmp(&a.progress())
                        .unwrap_or(std::cmp::Ordering::Equal)
                });
            }
            Some(SortKey::Speed) => records.sort_by(|a, b| b.download_speed.cmp(&a.download_speed)),
            None => {}
        }

        Ok(records)
    }

    pub async fn get(&self, id: &str) -> AppResult<DownloadRecord> {
        self.engine.get_status(id).await
    }

    pub async fn pause(&self, id: &str) -> AppResult<()> {
        self.engine.pause(id).await
    }

    pub async fn resume(&self, id: &str) -> AppResult<()> {
        self.engine.resume(id).await
    }

    pub async fn cancel(&self, id: &str) -> AppResult<()> {
        self.engine.remove(id).await
    }

    pub async fn pause_all(&self) -> AppResult<()> {
        self.engine.pause_all().await
    }

    pub async fn resume_all(&self) -> AppResult<()> {
        self.engine.resume_all().await
    }

    pub async fn status(&self) -> AppResult<SystemStatus> {
        let (stat, version) = tokio::join!(self.engine.global_stat(), self.engine.version());
        Ok(SystemStatus {
            version: version?,
            stat: stat?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_url() {
        assert!(DownloadService::validate_url("https://host/d/a.mp4").is_ok());
        assert!(DownloadService::validate_url("http://host/d/a.mp4").is_ok());
        assert!(DownloadService::validate_url("").is_err());
        assert!(DownloadService::validate_url("ftp://host/a.mp4").is_err());
        assert!(DownloadService::validate_url("host/a.mp4").is_err());
    }
}
