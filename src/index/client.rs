//! IndexClient - authenticated HTTP client for the file index
//!
//! Keeps a login token with expiry and transparently re-authenticates.
//! An unauthorized reply drops the token and retries once before the
//! failure surfaces.

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::{FileLink, IndexEntry, IndexProvider, ListPage};
use crate::config::IndexConfig;
use crate::error::{AppError, AppResult};

/// Cached tokens are refreshed ahead of the index's two-day expiry
const TOKEN_TTL_HOURS: i64 = 24;

#[derive(Clone)]
struct TokenState {
    token: String,
    expires_at: DateTime<Utc>,
}

impl TokenState {
    fn is_valid(&self) -> bool {
        Utc::now() < self.expires_at
    }
}

/// Authenticated index client with a shared HTTP connection pool
pub struct IndexClient {
    config: IndexConfig,
    client: Arc<Client>,
    token: Arc<RwLock<Option<TokenState>>>,
}

#[derive(Debug, Deserialize)]
struct Envelope {
    code: i64,
    #[serde(default)]
    message: String,
    #[serde(default)]
    data: Value,
}

impl Envelope {
    fn ok(&self) -> bool {
        self.code == 200 || self.code == 0
    }

    fn unauthorized(&self) -> bool {
        self.code == 401
    }
}

#[derive(Debug, Deserialize)]
struct WireEntry {
    name: String,
    #[serde(default)]
    path: String,
    #[serde(default)]
    size: u64,
    #[serde(default)]
    is_dir: bool,
    #[serde(default)]
    modified: String,
    #[serde(default)]
    sign: String,
}

impl WireEntry {
    fn into_entry(self, parent: &str) -> IndexEntry {
        let path = if self.path.is_empty() {
            join_index_path(parent, &self.name)
        } else {
            self.path
        };
        IndexEntry {
            modified: parse_modified(&self.modified),
            name: self.name,
            path,
            size: self.size,
            is_dir: self.is_dir,
            sign: self.sign,
        }
    }
}

/// Parse-or-zero policy for index timestamps
pub fn parse_modified(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc.timestamp_opt(0, 0).unwrap())
}

fn join_index_path(parent: &str, name: &str) -> String {
    if parent.ends_with('/') {
        format!("{}{}", parent, name)
    } else {
        format!("{}/{}", parent, name)
    }
}

impl IndexClient {
    pub fn new(config: IndexConfig, client: Arc<Client>) -> Self {
        Self {
            config,
            client,
            token: Arc::new(RwLock::new(None)),
        }
    }

    /// Exchange credentials for a fresh token
    async fn login(&self) -> AppResult<String> {
        tracing::info!("Logging into index as {}", self.config.username);

        let resp = self
            .client
            .post(format!("{}/api/auth/login", self.config.url))
            .json(&serde_json::json!({
                "username": self.config.username,
                "password": self.config.password,
            }))
            .send()
            .await
            .map_err(|e| AppError::unavailable("index", e))?;

        let envelope: Envelope = resp
            .json()
            .await
            .map_err(|e| AppError::unavailable("index", e))?;

        if !envelope.ok() {
            return Err(AppError::Unauthorized(format!(
                "index login rejected: {}",
                envelope.message
            )));
        }

        let token = envelope.data["token"]
            .as_str()
            .ok_or_else(|| AppError::Unauthorized("index login returned no token".into()))?
            .to_string();

        let state = TokenState {
            token: token.clone(),
            expires_at: Utc::now() + chrono::Duration::hours(TOKEN_TTL_HOURS),
        };
        *self.token.write().await = Some(state);

        Ok(token)
    }

    /// Return the cached token, logging in when absent or expired
    async fn ensure_token(&self) -> AppResult<String> {
        {
            let guard = self.token.read().await;
            if let Some(state) = guard.as_ref() {
                if state.is_valid() {
                    return Ok(state.token.clone());
                }
            }
        }
        // Lock released before the network round-trip
        self.login().await
    }

    async fn drop_token(&self) {
        *self.token.write().await = None;
    }

    /// POST an authenticated API call, retrying once after re-login when the
    /// index answers with an unauthorized condition
    async fn call(&self, endpoint: &str, body: Value) -> AppResult<Envelope> {
        for attempt in 0..2 {
            let token = self.ensure_token().await?;

            let resp = self
                .client
                .post(format!("{}{}", self.config.url, endpoint))
                .header("Authorization", token)
                .json(&body)
                .send()
                .await
                .map_err(|e| AppError::unavailable("index", e))?;

            if resp.status() == reqwest::StatusCode::UNAUTHORIZED {
                self.drop_token().await;
                if attempt == 0 {
                    continue;
                }
                return Err(AppError::Unauthorized("index rejected token".into()));
            }

            let envelope: Envelope = resp
                .json()
                .await
                .map_err(|e| AppError::unavailable("index", e))?;

            if envelope.unauthorized() {
                self.drop_token().await;
                if attempt == 0 {
                    continue;
                }
                return Err(AppError::Unauthorized(format!(
                    "index rejected token: {}",
                    envelope.message
                )));
            }

            if !envelope.ok() {
                return Err(AppError::unavailable(
                    "index",
                    format!("{} returned code {}: {}", endpoint, envelope.code, envelope.message),
                ));
            }

            return Ok(envelope);
        }
        unreachable!("call retries exhausted without returning")
    }

    /// Fetch one file's metadata and signed direct URL
    pub async fn get(&self, path: &str) -> AppResult<(IndexEntry, String)> {
        let envelope = self
            .call("/api/fs/get", serde_json::json!({ "path": path }))
            .await?;

        let raw_url = envelope.data["raw_url"].as_str().unwrap_or_default().to_string();
        let wire: WireEntry = serde_json::from_value(envelope.data)
            .map_err(|e| AppError::unavailable("index", format!("bad fs/get payload: {e}")))?;

        let parent = path.rsplit_once('/').map(|(p, _)| p).unwrap_or("");
        Ok((wire.into_entry(parent), raw_url))
    }

    /// Best-effort download and page URLs for when the signed URL is missing
    fn fallback_urls(&self, path: &str) -> FileLink {
        FileLink::new(format!("{}/d{}", self.config.url, path))
    }
}

#[async_trait]
impl IndexProvider for IndexClient {
    async fn list(&self, path: &str, page: u32, per_page: u32) -> AppResult<ListPage> {
        let envelope = self
            .call(
                "/api/fs/list",
                serde_json::json!({
                    "path": path,
                    "page": page,
                    "per_page": per_page,
                }),
            )
            .await?;

        let total = envelope.data["total"].as_u64().unwrap_or(0);
        let content = envelope.data["content"].clone();
        let entries: Vec<WireEntry> = if content.is_null() {
            Vec::new()
        } else {
            serde_json::from_value(content)
                .map_err(|e| AppError::unavailable("index", format!("bad fs/list payload: {e}")))?
        };

        Ok(ListPage {
            entries: entries.into_iter().map(|w| w.into_entry(path)).collect(),
            total,
        })
    }

    async fn resolve(&self, path: &str) -> AppResult<FileLink> {
        match self.get(path).await {
            Ok((_, raw_url)) if !raw_url.is_empty() => Ok(FileLink::new(raw_url)),
            Ok(_) => {
                tracing::debug!("index returned empty raw_url for {}, synthesizing", path);
                Ok(self.fallback_urls(path))
            }
            Err(AppError::Unauthorized(msg)) => Err(AppError::Unauthorized(msg)),
            Err(e) => {
                tracing::warn!("fs/get failed for {}: {}, synthesizing fallback URL", path, e);
                Ok(self.fallback_urls(path))
            }
        }
    }
}
