//! Scheduled task records
//!
//! A task binds a cron expression to one scan: an index path, a sliding
//! time window, and filter flags. Records persist across restarts; cron
//! registration ids do not.

pub mod store;

use std::str::FromStr;

use chrono::{DateTime, Utc};
use cron::Schedule;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{AppError, AppResult};

pub use store::TaskStore;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduledTask {
    /// Stable identity; survives restarts
    pub id: String,
    pub name: String,
    pub created_by: String,
    pub enabled: bool,
    /// Standard 5-field expression: minute hour dom month dow
    pub cron: String,
    /// Index path to scan
    pub path: String,
    /// Window length in hours, reaching back from execution time
    pub hours_ago: u32,
    pub video_only: bool,
    /// Preview mode: walk and classify, never enqueue
    pub auto_preview: bool,
    pub created_at: DateTime<Utc>,
    pub last_run_at: Option<DateTime<Utc>>,
    pub next_run_at: Option<DateTime<Utc>>,
}

impl ScheduledTask {
    pub fn new(name: String, created_by: String, cron: String, path: String, hours_ago: u32) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name,
            created_by,
            enabled: true,
            cron,
            path,
            hours_ago,
            video_only: true,
            auto_preview: false,
            created_at: Utc::now(),
            last_run_at: None,
            next_run_at: None,
        }
    }

    /// Next firing after now, None when the expression does not parse
    pub fn next_fire(&self) -> Option<DateTime<Utc>> {
        parse_cron(&self.cron).ok().and_then(|s| s.upcoming(Utc).next())
    }
}

/// Parse a 5-field cron expression. The underlying parser wants a seconds
/// field, so one is prepended.
pub fn parse_cron(expr: &str) -> AppResult<Schedule> {
    let trimmed = expr.trim();
    if trimmed.split_whitespace().count() != 5 {
        return Err(AppError::InvalidRequest(format!(
            "cron expression must have 5 fields: '{trimmed}'"
        )));
    }
    Schedule::from_str(&format!("0 {trimmed}"))
        .map_err(|e| AppError::InvalidRequest(format!("invalid cron '{trimmed}': {e}")))
}

/// Predefined task shapes for one-call creation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuickTemplate {
    /// Every night at 02:00, last 24 hours
    Daily,
    /// Every 2 hours, last 2 hours
    Recent,
    /// Monday mornings, last week
    Weekly,
    /// Hourly, last hour
    Realtime,
}

impl QuickTemplate {
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "daily" => Some(Self::Daily),
            "recent" => Some(Self::Recent),
            "weekly" => Some(Self::Weekly),
            "realtime" => Some(Self::Realtime),
            _ => None,
        }
    }

    pub fn cron(&self) -> &'static str {
        match self {
            Self::Daily => "0 2 * * *",
            Self::Recent => "0 */2 * * *",
            Self::Weekly => "0 9 * * 1",
            Self::Realtime => "0 * * * *",
        }
    }

    pub fn hours_ago(&self) -> u32 {
        match self {
            Self::Daily => 24,
            Self::Recent => 2,
            Self::Weekly => 168,
            Self::Realtime => 1,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Daily => "daily",
            Self::Recent => "recent",
            Self::Weekly => "weekly",
            Self::Realtime => "realtime",
        }
    }
}
