//! Configuration module with appData support

use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub index: IndexConfig,
    pub fetcher: FetcherConfig,
    #[serde(default)]
    pub rules: RulesConfig,
    #[serde(default)]
    pub notify: NotifyConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Remote file index (listing service) settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexConfig {
    /// Base URL, e.g. "http://alist:5244"
    pub url: String,
    pub username: String,
    pub password: String,
    /// Default path scanned when a request carries none
    pub default_path: String,
}

/// Local download engine (JSON-RPC) settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetcherConfig {
    /// RPC endpoint, e.g. "http://aria2:6800/jsonrpc"
    pub rpc_url: String,
    /// RPC secret, sent as "token:<secret>"
    pub token: String,
    /// Base directory all canonical download paths are rooted at
    pub download_dir: PathBuf,
}

/// Classification and filtering rules
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RulesConfig {
    /// Only enqueue files whose extension is in `video_extensions`
    pub video_only: bool,
    pub video_extensions: Vec<String>,
    /// Extensions never enqueued, video or not
    #[serde(default)]
    pub exclude_extensions: Vec<String>,
    /// Files below this size are skipped; 0 disables the bound
    #[serde(default)]
    pub min_file_size: u64,
    /// Files above this size are skipped; 0 disables the bound
    #[serde(default)]
    pub max_file_size: u64,
    /// Show names always treated as episodic content when seen in a path
    pub variety_shows: Vec<String>,
    /// Segment markers that name a whole special series (no season layout)
    pub special_series: Vec<String>,
}

impl Default for RulesConfig {
    fn default() -> Self {
        Self {
            video_only: true,
            video_extensions: [
                "mp4", "mkv", "avi", "mov", "wmv", "flv", "webm", "m4v", "ts", "m2ts", "rmvb",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            exclude_extensions: Vec::new(),
            min_file_size: 0,
            max_file_size: 0,
            variety_shows: ["喜人奇妙夜", "向往的生活", "极限挑战", "奔跑吧"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            special_series: ["宝藏行", "公益季"].iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// Chat notification settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifyConfig {
    pub enabled: bool,
    /// Bot API token
    pub bot_token: String,
    /// Chat the scheduler reports into
    pub chat_id: i64,
    /// User ids allowed to talk to the bot
    pub allowed_ids: Vec<i64>,
    /// User ids allowed to manage tasks
    pub admin_ids: Vec<i64>,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            bot_token: String::new(),
            chat_id: 0,
            allowed_ids: Vec::new(),
            admin_ids: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    pub enabled: bool,
    /// Directory persisted task records live under
    pub data_dir: PathBuf,
    /// Tasks merged into the store at startup (skipped if a persisted task
    /// already carries the same name)
    #[serde(default)]
    pub bootstrap_tasks: Vec<BootstrapTask>,
}

/// Statically configured task, merged with persisted tasks on start
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BootstrapTask {
    pub name: String,
    pub cron: String,
    pub path: String,
    pub hours_ago: u32,
    #[serde(default)]
    pub video_only: bool,
    #[serde(default)]
    pub auto_preview: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            data_dir: get_appdata_dir().join("data"),
            bootstrap_tasks: Vec::new(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8486,
            },
            index: IndexConfig {
                url: "http://localhost:5244".to_string(),
                username: String::new(),
                password: String::new(),
                default_path: "/".to_string(),
            },
            fetcher: FetcherConfig {
                rpc_url: "http://localhost:6800/jsonrpc".to_string(),
                token: String::new(),
                download_dir: PathBuf::from("/downloads"),
            },
            rules: RulesConfig::default(),
            notify: NotifyConfig::default(),
            scheduler: SchedulerConfig::default(),
        }
    }
}

/// Get the appData directory path
/// Priority: FETCHARR_APPDATA_DIR env var > ./appData
pub fn get_appdata_dir() -> PathBuf {
    env::var("FETCHARR_APPDATA_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("./appData"))
}

/// Get the config file path with fallback
/// Tries: appData/config/config.toml -> config.toml (old location)
pub fn get_config_path() -> PathBuf {
    let appdata_config = get_appdata_dir().join("config/config.toml");
    if appdata_config.exists() {
        appdata_config
    } else {
        PathBuf::from("config.toml")
    }
}

/// Create appData directory structure if it doesn't exist
pub fn ensure_appdata_dirs() -> std::io::Result<()> {
    let appdata_dir = get_appdata_dir();

    std::fs::create_dir_all(appdata_dir.join("config"))?;
    std::fs::create_dir_all(appdata_dir.join("data/tasks"))?;
    std::fs::create_dir_all(appdata_dir.join("logs"))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.server.port, 8486);
        assert_eq!(config.fetcher.download_dir, PathBuf::from("/downloads"));
        assert!(config.rules.video_extensions.iter().any(|e| e == "mp4"));
        assert!(config.scheduler.enabled);
    }
}
