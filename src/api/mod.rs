//! HTTP API
//!
//! REST surface under `/api/v1`. Success replies wrap their payload in the
//! `{code, data}` envelope; errors map through `AppError::into_response`.

pub mod downloads;
pub mod files;
pub mod health;
pub mod tasks;

use axum::{Json, Router};
use serde::Serialize;
use std::sync::Arc;

use crate::AppState;

/// Success envelope
#[derive(Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub code: u16,
    pub data: T,
}

/// Wrap a payload in the success envelope
pub fn ok<T: Serialize>(data: T) -> Json<ApiResponse<T>> {
    Json(ApiResponse { code: 200, data })
}

/// Assemble the versioned API router
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .nest("/files", files::router())
        .nest("/downloads", downloads::router())
        .nest("/tasks", tasks::router())
        .merge(health::router())
}
