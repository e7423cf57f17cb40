//! FetcherClient - JSON-RPC adapter for the download engine
//!
//! Thin wrapper: every operation is a single RPC call with the secret token
//! prepended to the parameter list.

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde_json::{json, Value};
use std::sync::Arc;

use super::{DownloadEngine, DownloadRecord, DownloadStatus, EnqueueOptions, GlobalStat};
use crate::config::FetcherConfig;
use crate::error::{AppError, AppResult};

/// Fields requested from the engine for task mirrors
const STATUS_KEYS: &[&str] = &[
    "gid",
    "status",
    "totalLength",
    "completedLength",
    "downloadSpeed",
    "errorMessage",
    "dir",
    "files",
];

pub struct FetcherClient {
    config: FetcherConfig,
    client: Arc<Client>,
}

impl FetcherClient {
    pub fn new(config: FetcherConfig, client: Arc<Client>) -> Self {
        Self { config, client }
    }

    /// Issue one RPC call, returning the `result` payload
    async fn rpc(&self, method: &str, mut params: Vec<Value>) -> AppResult<Value> {
        if !self.config.token.is_empty() {
            params.insert(0, Value::String(format!("token:{}", self.config.token)));
        }

        let frame = json!({
            "jsonrpc": "2.0",
            "id": "fetcharr",
            "method": method,
            "params": params,
        });

        let resp = self
            .client
            .post(&self.config.rpc_url)
            .json(&frame)
            .send()
            .await
            .map_err(|e| AppError::unavailable("fetcher", e))?;

        let body: Value = resp
            .json()
            .await
            .map_err(|e| AppError::unavailable("fetcher", e))?;

        if let Some(error) = body.get("error") {
            let code = error["code"].as_i64().unwrap_or(0);
            let message = error["message"].as_str().unwrap_or("unknown RPC error");
            tracing::warn!("fetcher RPC {} failed: code={} {}", method, code, message);
            return Err(AppError::unavailable(
                "fetcher",
                format!("{method}: {message}"),
            ));
        }

        Ok(body.get("result").cloned().unwrap_or(Value::Null))
    }

    fn keys_param() -> Value {
        Value::Array(
            STATUS_KEYS
                .iter()
                .map(|k| Value::String(k.to_string()))
                .collect(),
        )
    }
}

/// Engine numeric fields arrive as decimal strings
fn num(value: &Value) -> u64 {
    value
        .as_str()
        .and_then(|s| s.parse().ok())
        .or_else(|| value.as_u64())
        .unwrap_or(0)
}

/// Convert one engine task struct into a core mirror
fn parse_record(value: &Value) -> DownloadRecord {
    let files = value["files"].as_array();
    let first_file = files.and_then(|f| f.first());

    let url = first_file
        .and_then(|f| f["uris"].as_array())
        .and_then(|uris| uris.first())
        .and_then(|u| u["uri"].as_str())
        .unwrap_or_default()
        .to_string();

    let filename = first_file
        .and_then(|f| f["path"].as_str())
        .and_then(|p| p.rsplit('/').next())
        .unwrap_or_default()
        .to_string();

    let error_message = value["errorMessage"]
        .as_str()
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string());

    DownloadRecord {
        id: value["gid"].as_str().unwrap_or_default().to_string(),
        url,
        filename,
        directory: value["dir"].as_str().unwrap_or_default().to_string(),
        status: DownloadStatus::from_wire(value["status"].as_str().unwrap_or_default()),
        total_length: num(&value["totalLength"]),
        completed_length: num(&value["completedLength"]),
        download_speed: num(&value["downloadSpeed"]),
        error_message,
        updated_at: Utc::now(),
    }
}

fn parse_records(value: Value) -> Vec<DownloadRecord> {
    value
        .as_array()
        .map(|items| items.iter().map(parse_record).collect())
        .unwrap_or_default()
}

#[async_trait]
impl DownloadEngine for FetcherClient {
    async fn add_uri(&self, url: &str, options: &EnqueueOptions) -> AppResult<String> {
        let result = self
            .rpc(
                "aria2.addUri",
                vec![json!([url]), options.to_value()],
            )
            .await?;

        result
            .as_str()
            .map(|s| s.to_string())
            .ok_or_else(|| AppError::unavailable("fetcher", "addUri returned no task id"))
    }

    async fn get_status(&self, id: &str) -> AppResult<DownloadRecord> {
        let result = self
            .rpc("aria2.tellStatus", vec![json!(id), Self::keys_param()])
            .await?;
        Ok(parse_record(&result))
    }

    async fn get_active(&self) -> AppResult<Vec<DownloadRecord>> {
        let result = self
            .rpc("aria2.tellActive", vec![Self::keys_param()])
            .await?;
        Ok(parse_records(result))
    }

    async fn get_waiting(&self, offset: i64, limit: i64) -> AppResult<Vec<DownloadRecord>> {
        let result = self
            .rpc(
                "aria2.tellWaiting",
                vec![json!(offset), json!(limit), Self::keys_param()],
            )
            .await?;
        Ok(parse_records(result))
    }

    async fn get_stopped(&self, offset: i64, limit: i64) -> AppResult<Vec<DownloadRecord>> {
        let result = self
            .rpc(
                "aria2.tellStopped",
                vec![json!(offset), json!(limit), Self::keys_param()],
            )
            .await?;
        Ok(parse_records(result))
    }

    async fn pause(&self, id: &str) -> AppResult<()> {
        self.rpc("aria2.pause", vec![json!(id)]).await?;
        Ok(())
    }

    async fn resume(&self, id: &str) -> AppResult<()> {
        self.rpc("aria2.unpause", vec![json!(id)]).await?;
        Ok(())
    }

    async fn remove(&self, id: &str) -> AppResult<()> {
        self.rpc("aria2.remove", vec![json!(id)]).await?;
        Ok(())
    }

    async fn pause_all(&self) -> AppResult<()> {
        self.rpc("aria2.pauseAll", vec![]).await?;
        Ok(())
    }

    async fn resume_all(&self) -> AppResult<()> {
        self.rpc("aria2.unpauseAll", vec![]).await?;
        Ok(())
    }

    async fn global_stat(&self) -> AppResult<GlobalStat> {
        let result = self.rpc("aria2.getGlobalStat", vec![]).await?;
        Ok(GlobalStat {
            download_speed: num(&result["downloadSpeed"]),
            num_active: num(&result["numActive"]),
            num_waiting: num(&result["numWaiting"]),
            num_stopped: num(&result["numStopped"]),
        })
    }

    async fn version(&self) -> AppResult<String> {
        let result = self.rpc("aria2.getVersion", vec![]).await?;
        result["version"]
            .as_str()
            .map(|s| s.to_string())
            .ok_or_else(|| AppError::unavailable("fetcher", "getVersion returned no version"))
    }
}
