//! Downloads API Routes
//!
//! REST endpoints mirroring the fetcher's task state: create, list,
//! pause/resume/cancel and engine statistics.

use axum::{
    extract::{Path, Query, State},
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use super::{ok, ApiResponse};
use crate::dispatcher::BatchResult;
use crate::error::AppResult;
use crate::fetcher::{DownloadRecord, DownloadStatus};
use crate::services::download_service::{SortKey, SystemStatus};
use crate::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_downloads))
        .route("/", post(add_download))
        .route("/batch", post(add_batch))
        .route("/pause-all", post(pause_all))
        .route("/resume-all", post(resume_all))
        .route("/stats", get(get_stats))
        .route("/:id", get(get_download))
        .route("/:id", delete(cancel_download))
        .route("/:id/pause", post(pause_download))
        .route("/:id/resume", post(resume_download))
}

// ============================================================================
// Request / Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
struct AddDownloadRequest {
    url: String,
    #[serde(default)]
    dir: Option<String>,
    #[serde(default)]
    filename: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AddBatchRequest {
    urls: Vec<String>,
    #[serde(default)]
    dir: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ListQuery {
    status: Option<DownloadStatus>,
    sort: Option<SortKey>,
}

#[derive(Serialize)]
struct CreatedResponse {
    id: String,
}

#[derive(Serialize)]
struct ActionResponse {
    success: bool,
}

#[derive(Serialize)]
struct DownloadListResponse {
    downloads: Vec<DownloadRecord>,
    total: usize,
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /api/v1/downloads - create single download
async fn add_download(
    State(state): State<Arc<AppState>>,
    Json(request): Json<AddDownloadRequest>,
) -> AppResult<Json<ApiResponse<CreatedResponse>>> {
    let id = state
        .download_service
        .create(&request.url, request.dir, request.filename)
        .await?;
    Ok(ok(CreatedResponse { id }))
}

/// POST /api/v1/downloads/batch - create many downloads
async fn add_batch(
    State(state): State<Arc<AppState>>,
    Json(request): Json<AddBatchRequest>,
) -> AppResult<Json<ApiResponse<BatchResult>>> {
    let result = state
        .download_service
        .create_batch(request.urls, request.dir, &CancellationToken::new())
        .await?;
    Ok(ok(result))
}

/// GET /api/v1/downloads - list with status filter and optional sort
async fn list_downloads(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListQuery>,
) -> AppResult<Json<ApiResponse<DownloadListResponse>>> {
    let downloads = state.download_service.list(query.status, query.sort).await?;
    Ok(ok(DownloadListResponse {
        total: downloads.len(),
        downloads,
    }))
}

/// GET /api/v1/downloads/:id - single task mirror
async fn get_download(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> AppResult<Json<ApiResponse<DownloadRecord>>> {
    Ok(ok(state.download_service.get(&id).await?))
}

/// DELETE /api/v1/downloads/:id - cancel
async fn cancel_download(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> AppResult<Json<ApiResponse<ActionResponse>>> {
    state.download_service.cancel(&id).await?;
    Ok(ok(ActionResponse { success: true }))
}

/// POST /api/v1/downloads/:id/pause
async fn pause_download(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> AppResult<Json<ApiResponse<ActionResponse>>> {
    state.download_service.pause(&id).await?;
    Ok(ok(ActionResponse { success: true }))
}

/// POST /api/v1/downloads/:id/resume
async fn resume_download(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> AppResult<Json<ApiResponse<ActionResponse>>> {
    state.download_service.resume(&id).await?;
    Ok(ok(ActionResponse { success: true }))
}

/// POST /api/v1/downloads/pause-all
async fn pause_all(
    State(state): State<Arc<AppState>>,
) -> AppResult<Json<ApiResponse<ActionResponse>>> {
    state.download_service.pause_all().await?;
    Ok(ok(ActionResponse { success: true }))
}

/// POST /api/v1/downloads/resume-all
async fn resume_all(
    State(state): State<Arc<AppState>>,
) -> AppResult<Json<ApiResponse<ActionResponse>>> {
    state.download_service.resume_all().await?;
    Ok(ok(ActionResponse { success: true }))
}

/// GET /api/v1/downloads/stats - engine statistics
async fn get_stats(
    State(state): State<Arc<AppState>>,
) -> AppResult<Json<ApiResponse<SystemStatus>>> {
    Ok(ok(state.download_service.status().await?))
}
