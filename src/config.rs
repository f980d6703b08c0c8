use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

const DEFAULT_ENV_PREFIX: &str = "LIGHTBOX";
pub const DEFAULT_SHARE_BASE_URL: &str = "https://eazyfilms.com";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Config {
    #[serde(default)]
    pub catalog: CatalogConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub remote: RemoteConfig,
    #[serde(default)]
    pub viewer: ViewerConfig,
    #[serde(default)]
    pub share: ShareConfig,
    #[serde(default)]
    pub download: DownloadConfig,
    #[serde(default)]
    pub log: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct CatalogConfig {
    /// Manifest file or directory to scan.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct StorageConfig {
    #[serde(default)]
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RemoteConfig {
    #[serde(default)]
    pub path: Option<PathBuf>,
    #[serde(default = "default_poll_interval", with = "humantime_serde")]
    pub poll_interval: Duration,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            path: None,
            poll_interval: default_poll_interval(),
        }
    }
}

fn default_poll_interval() -> Duration {
    Duration::from_millis(750)
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ViewerConfig {
    #[serde(default = "default_swipe_threshold")]
    pub swipe_threshold: f32,
    #[serde(default)]
    pub rollback_on_failure: bool,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            swipe_threshold: default_swipe_threshold(),
            rollback_on_failure: false,
        }
    }
}

fn default_swipe_threshold() -> f32 {
    crate::viewer::DEFAULT_SWIPE_THRESHOLD
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ShareConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
}

impl Default for ShareConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
        }
    }
}

fn default_base_url() -> String {
    DEFAULT_SHARE_BASE_URL.to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DownloadConfig {
    #[serde(default = "default_download_dir")]
    pub dir: Option<PathBuf>,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            dir: default_download_dir(),
        }
    }
}

fn default_download_dir() -> Option<PathBuf> {
    crate::download::default_dir()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LogConfig {
    #[serde(default = "default_log_path")]
    pub path: Option<PathBuf>,
    #[serde(default = "default_log_filter")]
    pub filter: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            path: default_log_path(),
            filter: default_log_filter(),
        }
    }
}

fn default_log_path() -> Option<PathBuf> {
    dirs::cache_dir().map(|dir| dir.join("lightbox-tui").join("lightbox.log"))
}

fn default_log_filter() -> String {
    "info".into()
}

#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    pub config_file: Option<PathBuf>,
    pub env_prefix: Option<String>,
}

pub fn load(options: LoadOptions) -> Result<Config> {
    let path = options.config_file.or_else(default_config_path);
    let mut cfg = match path {
        Some(path) if path.exists() => read_config_file(&path)?,
        _ => Config::default(),
    };

    let prefix = options.env_prefix.as_deref().unwrap_or(DEFAULT_ENV_PREFIX);
    apply_env(&mut cfg, prefix, env::vars());

    Ok(cfg)
}

fn read_config_file(path: &Path) -> Result<Config> {
    let data = fs::read_to_string(path)
        .with_context(|| format!("config: read {}", path.display()))?;
    if data.trim().is_empty() {
        return Ok(Config::default());
    }
    let config: Config = serde_yaml::from_str(&data)
        .with_context(|| format!("config: parse {}", path.display()))?;
    Ok(config)
}

/// Overlays `PREFIX_SECTION__KEY=value` variables onto `cfg`.
fn apply_env(cfg: &mut Config, prefix: &str, vars: impl Iterator<Item = (String, String)>) {
    let upper_prefix = format!("{}_", prefix.to_uppercase());
    for (key, value) in vars {
        if let Some(stripped) = key.strip_prefix(&upper_prefix) {
            let normalized = stripped.to_ascii_lowercase().replace("__", ".");
            apply_env_value(cfg, &normalized, value);
        }
    }
}

fn apply_env_value(cfg: &mut Config, key: &str, value: String) {
    match key {
        "catalog.path" => cfg.catalog.path = non_empty_path(value),
        "storage.path" => cfg.storage.path = non_empty_path(value),
        "remote.path" => cfg.remote.path = non_empty_path(value),
        "remote.poll_interval" => {
            if let Ok(duration) = humantime::parse_duration(&value) {
                cfg.remote.poll_interval = duration;
            }
        }
        "viewer.swipe_threshold" => {
            if let Ok(parsed) = value.trim().parse::<f32>() {
                cfg.viewer.swipe_threshold = parsed;
            }
        }
        "viewer.rollback_on_failure" => {
            cfg.viewer.rollback_on_failure =
                matches!(value.trim(), "1" | "true" | "TRUE" | "True");
        }
        "share.base_url" => {
            if !value.trim().is_empty() {
                cfg.share.base_url = value;
            }
        }
        "download.dir" => cfg.download.dir = non_empty_path(value),
        "log.path" => cfg.log.path = non_empty_path(value),
        "log.filter" => {
            if !value.trim().is_empty() {
                cfg.log.filter = value;
            }
        }
        _ => {}
    }
}

fn non_empty_path(value: String) -> Option<PathBuf> {
    if value.trim().is_empty() {
        None
    } else {
        Some(PathBuf::from(value))
    }
}

pub fn default_path() -> Option<PathBuf> {
    default_config_path()
}

fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("lightbox-tui").join("config.yaml"))
}
