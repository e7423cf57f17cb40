//! Fetcher integration
//!
//! The fetcher is the local download engine that actually transfers bytes.
//! The core talks to it over a JSON-RPC surface and mirrors its task state;
//! it never owns download records itself.

pub mod client;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::AppResult;

pub use client::FetcherClient;

/// Core-side download status domain
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DownloadStatus {
    Active,
    Complete,
    Error,
    Paused,
    Removed,
    Pending,
}

impl DownloadStatus {
    /// Normalize a fetcher status string; unknown strings collapse to pending
    pub fn from_wire(status: &str) -> Self {
        match status {
            "active" => Self::Active,
            "complete" => Self::Complete,
            "error" => Self::Error,
            "paused" => Self::Paused,
            "removed" => Self::Removed,
            _ => Self::Pending,
        }
    }

    #[allow(dead_code)]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Complete => "complete",
            Self::Error => "error",
            Self::Paused => "paused",
            Self::Removed => "removed",
            Self::Pending => "pending",
        }
    }
}

/// Mirror of one fetcher task
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadRecord {
    /// Fetcher-assigned task id
    pub id: String,
    pub url: String,
    pub filename: String,
    pub directory: String,
    pub status: DownloadStatus,
    pub total_length: u64,
    pub completed_length: u64,
    pub download_speed: u64,
    pub error_message: Option<String>,
    /// When this mirror was taken from the fetcher
    pub updated_at: DateTime<Utc>,
}

impl DownloadRecord {
    pub fn progress(&self) -> f64 {
        if self.total_length == 0 {
            0.0
        } else {
            self.completed_length as f64 / self.total_length as f64 * 100.0
        }
    }
}

/// Engine-wide transfer statistics
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GlobalStat {
    pub download_speed: u64,
    pub num_active: u64,
    pub num_waiting: u64,
    pub num_stopped: u64,
}

/// Options attached to an enqueue call
#[derive(Debug, Clone, Default)]
pub struct EnqueueOptions {
    /// Destination directory
    pub dir: Option<String>,
    /// Output filename
    pub out: Option<String>,
    /// Extra engine options passed through verbatim
    pub extra: Map<String, Value>,
}

impl EnqueueOptions {
    pub fn to_value(&self) -> Value {
        let mut map = self.extra.clone();
        if let Some(dir) = &self.dir {
            map.insert("dir".to_string(), Value::String(dir.clone()));
        }
        if let Some(out) = &self.out {
            map.insert("out".to_string(), Value::String(out.clone()));
        }
        Value::Object(map)
    }
}

/// Seam between the dispatcher / facade and the concrete fetcher client
#[async_trait]
pub trait DownloadEngine: Send + Sync {
    async fn add_uri(&self, url: &str, options: &EnqueueOptions) -> AppResult<String>;
    async fn get_status(&self, id: &str) -> AppResult<DownloadRecord>;
    async fn get_active(&self) -> AppResult<Vec<DownloadRecord>>;
    async fn get_waiting(&self, offset: i64, limit: i64) -> AppResult<Vec<DownloadRecord>>;
    async fn get_stopped(&self, offset: i64, limit: i64) -> AppResult<Vec<DownloadRecord>>;
    async fn pause(&self, id: &str) -> AppResult<()>;
    async fn resume(&self, id: &str) -> AppResult<()>;
    async fn remove(&self, id: &str) -> AppResult<()>;
    async fn pause_all(&self) -> AppResult<()>;
    async fn resume_all(&self) -> AppResult<()>;
    async fn global_stat(&self) -> AppResult<GlobalStat>;
    async fn version(&self) -> AppResult<String>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_normalization() {
        assert_eq!(DownloadStatus::from_wire("active"), DownloadStatus::Active);
        assert_eq!(DownloadStatus::from_wire("complete"), DownloadStatus::Complete);
        assert_eq!(DownloadStatus::from_wire("error"), DownloadStatus::Error);
        assert_eq!(DownloadStatus::from_wire("paused"), DownloadStatus::Paused);
        assert_eq!(DownloadStatus::from_wire("removed"), DownloadStatus::Removed);
        // anything else collapses to pending
        assert_eq!(DownloadStatus::from_wire("waiting"), DownloadStatus::Pending);
        assert_eq!(DownloadStatus::from_wire(""), DownloadStatus::Pending);
        assert_eq!(DownloadStatus::from_wire("weird"), DownloadStatus::Pending);
    }

    #[test]
    fn test_enqueue_options_value() {
        let mut options = EnqueueOptions {
            dir: Some("/downloads/tvs/Show/S01".into()),
            out: Some("e01.mp4".into()),
            extra: Map::new(),
        };
        options
            .extra
            .insert("split".into(), Value::String("4".into()));

        let value = options.to_value();
        assert_eq!(value["dir"], "/downloads/tvs/Show/S01");
        assert_eq!(value["out"], "e01.mp4");
        assert_eq!(value["split"], "4");
    }

    #[test]
    fn test_progress() {
        let record = DownloadRecord {
            id: "g1".into(),
            url: String::new(),
            filename: String::new(),
            directory: String::new(),
            status: DownloadStatus::Active,
            total_length: 200,
            completed_length: 50,
            download_speed: 0,
            error_message: None,
            updated_at: Utc::now(),
        };
        assert!((record.progress() - 25.0).abs() < f64::EPSILON);
    }
}
