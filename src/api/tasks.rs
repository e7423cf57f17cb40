//! Tasks API Routes
//!
//! CRUD and control for scheduled scan tasks, plus the quick-task
//! templates.

use axum::{
    extract::{Path, Query, State},
    routing::{delete, get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::{ok, ApiResponse};
use crate::error::{AppError, AppResult};
use crate::tasks::{QuickTemplate, ScheduledTask};
use crate::walker::FileItem;
use crate::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_tasks))
        .route("/", post(create_task))
        .route("/quick", post(quick_task))
        .route("/:id", get(get_task))
        .route("/:id", put(update_task))
        .route("/:id", delete(delete_task))
        .route("/:id/run", post(run_task))
        .route("/:id/preview", post(preview_task))
        .route("/:id/enable", post(enable_task))
        .route("/:id/disable", post(disable_task))
}

// ============================================================================
// Request / Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
struct ListTasksQuery {
    user: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CreateTaskRequest {
    name: String,
    cron: String,
    path: String,
    hours_ago: u32,
    #[serde(default)]
    created_by: Option<String>,
    #[serde(default = "default_true")]
    enabled: bool,
    #[serde(default = "default_true")]
    video_only: bool,
    #[serde(default)]
    auto_preview: bool,
}

#[derive(Debug, Deserialize)]
struct UpdateTaskRequest {
    name: Option<String>,
    cron: Option<String>,
    path: Option<String>,
    hours_ago: Option<u32>,
    enabled: Option<bool>,
    video_only: Option<bool>,
    auto_preview: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct QuickTaskRequest {
    /// One of: daily, recent, weekly, realtime
    #[serde(rename = "type")]
    template: String,
    #[serde(default)]
    path: Option<String>,
    #[serde(default)]
    created_by: Option<String>,
}

fn default_true() -> bool {
    true
}

#[derive(Serialize)]
struct TaskListResponse {
    tasks: Vec<ScheduledTask>,
    total: usize,
}

#[derive(Serialize)]
struct TaskPreviewResponse {
    task: ScheduledTask,
    total: usize,
    total_size: u64,
    files: Vec<FileItem>,
}

#[derive(Serialize)]
struct RunResponse {
    scheduled: bool,
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /api/v1/tasks - all tasks, optionally one user's
async fn list_tasks(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListTasksQuery>,
) -> AppResult<Json<ApiResponse<TaskListResponse>>> {
    let tasks = match query.user {
        Some(user) => state.task_store.get_by_user(&user),
        None => state.task_store.get_all(),
    };
    Ok(ok(TaskListResponse {
        total: tasks.len(),
        tasks,
    }))
}

/// POST /api/v1/tasks - create
async fn create_task(
    State(state): State<Arc<AppState>>,
    Json(request): Json<CreateTaskRequest>,
) -> AppResult<Json<ApiResponse<ScheduledTask>>> {
    if request.hours_ago == 0 {
        return Err(AppError::InvalidRequest("hours_ago must be positive".into()));
    }

    let mut task = ScheduledTask::new(
        request.name,
        request.created_by.unwrap_or_else(|| "api".to_string()),
        request.cron,
        request.path,
        request.hours_ago,
    );
    task.enabled = request.enabled;
    task.video_only = request.video_only;
    task.auto_preview = request.auto_preview;

    Ok(ok(state.scheduler.create(task).await?))
}

/// POST /api/v1/tasks/quick - create from a predefined template
async fn quick_task(
    State(state): State<Arc<AppState>>,
    Json(request): Json<QuickTaskRequest>,
) -> AppResult<Json<ApiResponse<ScheduledTask>>> {
    let template = QuickTemplate::parse(&request.template).ok_or_else(|| {
        AppError::InvalidRequest(format!("unknown quick-task type '{}'", request.template))
    })?;

    let path = request
        .path
        .filter(|p| !p.is_empty())
        .unwrap_or_else(|| state.config.index.default_path.clone());

    let task = ScheduledTask::new(
        format!("{} scan of {}", template.label(), path),
        request.created_by.unwrap_or_else(|| "api".to_string()),
        template.cron().to_string(),
        path,
        template.hours_ago(),
    );

    Ok(ok(state.scheduler.create(task).await?))
}

/// GET /api/v1/tasks/:id
async fn get_task(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> AppResult<Json<ApiResponse<ScheduledTask>>> {
    state
        .task_store
        .get(&id)
        .map(ok)
        .ok_or_else(|| AppError::NotFound(format!("task {id}")))
}

/// PUT /api/v1/tasks/:id - partial update
async fn update_task(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(request): Json<UpdateTaskRequest>,
) -> AppResult<Json<ApiResponse<ScheduledTask>>> {
    let mut task = state
        .task_store
        .get(&id)
        .ok_or_else(|| AppError::NotFound(format!("task {id}")))?;

    if let Some(name) = request.name {
        task.name = name;
    }
    if let Some(cron) = request.cron {
        task.cron = cron;
    }
    if let Some(path) = request.path {
        task.path = path;
    }
    if let Some(hours_ago) = request.hours_ago {
        if hours_ago == 0 {
            return Err(AppError::InvalidRequest("hours_ago must be positive".into()));
        }
        task.hours_ago = hours_ago;
    }
    if let Some(enabled) = request.enabled {
        task.enabled = enabled;
    }
    if let Some(video_only) = request.video_only {
        task.video_only = video_only;
    }
    if let Some(auto_preview) = request.auto_preview {
        task.auto_preview = auto_preview;
    }

    Ok(ok(state.scheduler.update(task).await?))
}

/// DELETE /api/v1/tasks/:id
async fn delete_task(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> AppResult<Json<ApiResponse<ScheduledTask>>> {
    Ok(ok(state.scheduler.delete(&id).await?))
}

/// POST /api/v1/tasks/:id/run - immediate asynchronous execution
async fn run_task(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> AppResult<Json<ApiResponse<RunResponse>>> {
    state.scheduler.run_now(&id).await?;
    Ok(ok(RunResponse { scheduled: true }))
}

/// POST /api/v1/tasks/:id/preview - the would-be plan, nothing enqueued
async fn preview_task(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> AppResult<Json<ApiResponse<TaskPreviewResponse>>> {
    let (task, files) = state.scheduler.preview(&id).await?;
    Ok(ok(TaskPreviewResponse {
        task,
        total: files.len(),
        total_size: files.iter().map(|f| f.size).sum(),
        files,
    }))
}

/// POST /api/v1/tasks/:id/enable
async fn enable_task(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> AppResult<Json<ApiResponse<ScheduledTask>>> {
    Ok(ok(state.scheduler.toggle(&id, true).await?))
}

/// POST /api/v1/tasks/:id/disable
async fn disable_task(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> AppResult<Json<ApiResponse<ScheduledTask>>> {
    Ok(ok(state.scheduler.toggle(&id, false).await?))
}
