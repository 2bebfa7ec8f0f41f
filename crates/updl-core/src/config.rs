use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

/// Retry policy parameters (optional section in config.toml).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of attempts per download (including the first).
    pub max_attempts: u32,
    /// Base delay in seconds for exponential backoff (e.g. 0.25 = 250ms).
    pub base_delay_secs: f64,
    /// Maximum backoff delay in seconds.
    pub max_delay_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay_secs: 0.25,
            max_delay_secs: 30,
        }
    }
}

/// libcurl options for the download stream. Timeouts live here, not in the operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Connect timeout in seconds.
    pub connect_timeout_secs: u64,
    /// Abort when throughput stays below this many bytes/s for `low_speed_time_secs`.
    pub low_speed_limit: u32,
    pub low_speed_time_secs: u64,
    /// Follow `Location` redirects.
    pub follow_redirects: bool,
    pub max_redirections: u32,
    /// Optional `User-Agent` header.
    pub user_agent: Option<String>,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: 30,
            low_speed_limit: 1024,
            low_speed_time_secs: 60,
            follow_redirects: true,
            max_redirections: 10,
            user_agent: Some(concat!("updl/", env!("CARGO_PKG_VERSION")).to_string()),
        }
    }
}

/// Global configuration loaded from `~/.config/updl/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdlConfig {
    /// Directory for resume files (None = `~/.cache/updl/downloads`).
    #[serde(default)]
    pub downloads_dir: Option<PathBuf>,
    /// fdatasync the resume file after every appended chunk.
    #[serde(default)]
    pub sync_each_chunk: bool,
    /// Capacity of each operation's event queue (bounds buffered body chunks).
    pub event_queue_depth: usize,
    #[serde(default)]
    pub transport: TransportConfig,
    /// Optional retry policy for the CLI; if missing, built-in defaults are used.
    #[serde(default)]
    pub retry: Option<RetryConfig>,
}

impl Default for UpdlConfig {
    fn default() -> Self {
        Self {
            downloads_dir: None,
            sync_each_chunk: false,
            event_queue_depth: 64,
            transport: TransportConfig::default(),
            retry: None,
        }
    }
}

impl UpdlConfig {
    /// Configured downloads directory, or the XDG cache default.
    pub fn resolve_downloads_dir(&self) -> Result<PathBuf> {
        if let Some(dir) = &self.downloads_dir {
            return Ok(dir.clone());
        }
        let xdg_dirs = xdg::BaseDirectories::with_prefix("updl")?;
        Ok(xdg_dirs.get_cache_home().join("downloads"))
    }
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("updl")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// Load configuration from disk, creating a default file if none exists.
pub fn load_or_init() -> Result<UpdlConfig> {
    let path = config_path()?;
    if !path.exists() {
        let default_cfg = UpdlConfig::default();
        let toml = toml::to_string_pretty(&default_cfg)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, toml)?;
        tracing::info!("created default config at {}", path.display());
        return Ok(default_cfg);
    }

    let data = fs::read_to_string(&path)?;
    let cfg: UpdlConfig = toml::from_str(&data)?;
    Ok(cfg)
}
