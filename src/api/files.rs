//! Files API Routes
//!
//! Scan endpoints: window walks, subtree downloads and plain listings.
//! Every download endpoint supports preview mode, which returns the
//! would-be plan without touching the fetcher.

use axum::{
    extract::{Query, State},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use super::{ok, ApiResponse};
use crate::dispatcher::BatchResult;
use crate::error::{AppError, AppResult};
use crate::walker::{FileItem, TimeWindow};
use crate::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/yesterday", get(yesterday_files))
        .route("/yesterday/download", post(yesterday_download))
        .route("/download", post(subtree_download))
        .route("/list", post(list_files))
        .route("/manual-download", post(manual_download))
}

// ============================================================================
// Request / Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
struct YesterdayQuery {
    path: Option<String>,
    #[serde(default)]
    preview: bool,
}

#[derive(Debug, Deserialize)]
struct SubtreeRequest {
    path: Option<String>,
    #[serde(default = "default_true")]
    recursive: bool,
    #[serde(default)]
    preview: bool,
}

#[derive(Debug, Deserialize)]
struct ListRequest {
    path: Option<String>,
    page: Option<u32>,
    per_page: Option<u32>,
    video_only: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct ManualRequest {
    path: Option<String>,
    hours_ago: Option<u32>,
    start_time: Option<DateTime<Utc>>,
    end_time: Option<DateTime<Utc>>,
    video_only: Option<bool>,
    #[serde(default)]
    preview: bool,
}

fn default_true() -> bool {
    true
}

/// The would-be plan returned by preview requests
#[derive(Serialize)]
struct ScanPlan {
    total: usize,
    total_size: u64,
    files: Vec<FileItem>,
}

impl ScanPlan {
    fn from_files(files: Vec<FileItem>) -> Self {
        Self {
            total: files.len(),
            total_size: files.iter().map(|f| f.size).sum(),
            files,
        }
    }
}

/// Either a preview plan or a dispatch result
#[derive(Serialize)]
#[serde(untagged)]
enum ScanOutcome {
    Plan(ScanPlan),
    Dispatched(BatchResult),
}

#[derive(Serialize)]
struct FileListResponse {
    files: Vec<FileItem>,
    total: u64,
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /api/v1/files/yesterday - yesterday's window, no enqueue
async fn yesterday_files(
    State(state): State<Arc<AppState>>,
    Query(query): Query<YesterdayQuery>,
) -> AppResult<Json<ApiResponse<ScanPlan>>> {
    let path = scan_path(&state, query.path);
    let files = state
        .file_service
        .collect_yesterday(&path, state.config.rules.video_only, &CancellationToken::new())
        .await?;
    Ok(ok(ScanPlan::from_files(files)))
}

/// POST /api/v1/files/yesterday/download - yesterday's window, enqueue
async fn yesterday_download(
    State(state): State<Arc<AppState>>,
    Query(query): Query<YesterdayQuery>,
) -> AppResult<Json<ApiResponse<ScanOutcome>>> {
    let path = scan_path(&state, query.path);
    let cancel = CancellationToken::new();
    let files = state
        .file_service
        .collect_yesterday(&path, state.config.rules.video_only, &cancel)
        .await?;

    Ok(ok(dispatch_or_plan(&state, files, query.preview, &cancel).await))
}

/// POST /api/v1/files/download - full-subtree variant
async fn subtree_download(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SubtreeRequest>,
) -> AppResult<Json<ApiResponse<ScanOutcome>>> {
    let path = scan_path(&state, request.path);
    let cancel = CancellationToken::new();
    let video_only = state.config.rules.video_only;

    let files = if request.recursive {
        state
            .file_service
            .collect(&path, None, video_only, &cancel)
            .await?
    } else {
        state
            .file_service
            .collect_shallow(&path, video_only, &cancel)
            .await?
    };

    Ok(ok(dispatch_or_plan(&state, files, request.preview, &cancel).await))
}

/// POST /api/v1/files/list - one listing page
async fn list_files(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ListRequest>,
) -> AppResult<Json<ApiResponse<FileListResponse>>> {
    let path = scan_path(&state, request.path);
    let page = request.page.unwrap_or(1).max(1);
    let per_page = request.per_page.unwrap_or(100).clamp(1, 1000);
    let video_only = request.video_only.unwrap_or(false);

    let (files, total) = state
        .file_service
        .list(&path, page, per_page, video_only)
        .await?;
    Ok(ok(FileListResponse { files, total }))
}

/// POST /api/v1/files/manual-download - caller-provided window
async fn manual_download(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ManualRequest>,
) -> AppResult<Json<ApiResponse<ScanOutcome>>> {
    let window = match (request.hours_ago, request.start_time, request.end_time) {
        (Some(hours), _, _) if hours > 0 => TimeWindow::last_hours(Utc::now(), hours),
        (Some(_), _, _) => {
            return Err(AppError::InvalidRequest("hours_ago must be positive".into()))
        }
        (None, Some(start), Some(end)) if start <= end => TimeWindow { start, end },
        (None, Some(_), Some(_)) => {
            return Err(AppError::InvalidRequest(
                "start_time must not be after end_time".into(),
            ))
        }
        _ => {
            return Err(AppError::InvalidRequest(
                "either hours_ago or start_time+end_time is required".into(),
            ))
        }
    };

    let path = scan_path(&state, request.path);
    let video_only = request
        .video_only
        .unwrap_or(state.config.rules.video_only);
    let cancel = CancellationToken::new();

    let files = state
        .file_service
        .collect(&path, Some(window), video_only, &cancel)
        .await?;

    Ok(ok(dispatch_or_plan(&state, files, request.preview, &cancel).await))
}

fn scan_path(state: &AppState, path: Option<String>) -> String {
    path.filter(|p| !p.is_empty())
        .unwrap_or_else(|| state.config.index.default_path.clone())
}

async fn dispatch_or_plan(
    state: &AppState,
    files: Vec<FileItem>,
    preview: bool,
    cancel: &CancellationToken,
) -> ScanOutcome {
    if preview {
        ScanOutcome::Plan(ScanPlan::from_files(files))
    } else {
        ScanOutcome::Dispatched(state.download_service.dispatch_files(files, cancel).await)
    }
}
