use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;

use crate::config::LogConfig;

pub const FILTER_ENV: &str = "LIGHTBOX_LOG";

/// Installs a file-backed subscriber. The terminal belongs to the UI, so nothing is written to it.
pub fn init(cfg: &LogConfig) -> Result<Option<PathBuf>> {
    let Some(path) = cfg.path.clone() else {
        return Ok(None);
    };
    let file = open_log_file(&path)?;
    let filter = EnvFilter::try_from_env(FILTER_ENV)
        .or_else(|_| EnvFilter::try_new(&cfg.filter))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .with_target(false)
        .try_init()
        .map_err(|err| anyhow::anyhow!("logging: install subscriber: {err}"))?;
    Ok(Some(path))
}

fn open_log_file(path: &Path) -> Result<File> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("logging: create directory {}", parent.display()))?;
    }
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("logging: open {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn disabled_without_path() {
        let cfg = LogConfig {
            path: None,
            filter: "info".into(),
        };
        assert_eq!(init(&cfg).unwrap(), None);
    }

    #[test]
    fn log_file_is_created_with_parents() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("lightbox.log");
        open_log_file(&path).unwrap();
        assert!(path.exists());
    }
}
