use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use tracing::info;

use crate::catalog::MediaItem;

const DEFAULT_EXTENSION: &str = "jpg";

/// Lowercases and replaces each run of whitespace with a single `-`.
pub fn slug(title: &str) -> String {
    title
        .split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join("-")
}

pub fn file_name(item: &MediaItem) -> String {
    let extension = Path::new(&item.source)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_else(|| DEFAULT_EXTENSION.to_string());
    let stem = slug(&item.title);
    let stem = if stem.is_empty() {
        format!("image-{}", item.id)
    } else {
        stem
    };
    format!("{stem}.{extension}")
}

/// Copies the item's source file into `dir`, returning the written path.
pub fn export(item: &MediaItem, dir: &Path) -> Result<PathBuf> {
    let source = local_source(&item.source)?;
    fs::create_dir_all(dir)
        .with_context(|| format!("download: create directory {}", dir.display()))?;
    let target = dir.join(file_name(item));
    fs::copy(&source, &target).with_context(|| {
        format!(
            "download: copy {} to {}",
            source.display(),
            target.display()
        )
    })?;
    info!(item_id = item.id, path = %target.display(), "download: saved");
    Ok(target)
}

fn local_source(source: &str) -> Result<PathBuf> {
    if let Some(path) = source.strip_prefix("file://") {
        return Ok(PathBuf::from(path));
    }
    if source.contains("://") {
        bail!("download: remote source {source} is not available offline");
    }
    Ok(PathBuf::from(source))
}

pub fn default_dir() -> Option<PathBuf> {
    dirs::download_dir().or_else(|| dirs::home_dir().map(|home| home.join("Downloads")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn item(source: &str, title: &str) -> MediaItem {
        MediaItem {
            id: 5,
            source: source.to_string(),
            title: title.to_string(),
            category: "Street".to_string(),
        }
    }

    #[test]
    fn slug_collapses_whitespace() {
        assert_eq!(slug("Golden  Hour\tOn Main"), "golden-hour-on-main");
        assert_eq!(slug("   "), "");
    }

    #[test]
    fn file_name_keeps_source_extension() {
        assert_eq!(file_name(&item("/a/b.PNG", "Night Bus")), "night-bus.png");
        assert_eq!(file_name(&item("/a/noext", "Night Bus")), "night-bus.jpg");
        assert_eq!(file_name(&item("/a/b.jpg", " ")), "image-5.jpg");
    }

    #[test]
    fn export_copies_local_file() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("raw.jpg");
        fs::write(&source, b"pixels").unwrap();
        let out = dir.path().join("out");
        let written = export(&item(&source.display().to_string(), "Quiet Street"), &out).unwrap();
        assert_eq!(written, out.join("quiet-street.jpg"));
        assert_eq!(fs::read(written).unwrap(), b"pixels");
    }

    #[test]
    fn remote_sources_are_rejected() {
        let dir = tempdir().unwrap();
        assert!(export(&item("https://cdn.example.com/a.jpg", "A"), dir.path()).is_err());
    }
}
