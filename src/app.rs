use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{info, warn};
use url::Url;

use crate::catalog::{Catalog, CatalogError, ItemId};
use crate::config::{self, Config};
use crate::logging;
use crate::remote::{self, SharedStore};
use crate::session::{self, Session};
use crate::share::{self, ShareLinkBuilder};
use crate::storage;
use crate::ui;

#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub config_file: Option<PathBuf>,
    pub catalog: Option<PathBuf>,
    /// Deep link or bare item id to open on launch.
    pub open_link: Option<String>,
}

pub fn run(opts: RunOptions) -> Result<()> {
    let cfg = load_config(&opts)?;
    match logging::init(&cfg.log) {
        Ok(Some(path)) => info!(path = %path.display(), version = crate::VERSION, "app: starting"),
        Ok(None) => {}
        Err(err) => eprintln!("warning: logging disabled: {err:#}"),
    }

    let catalog_path = catalog_path(&opts, &cfg)?;
    let catalog = Catalog::load(&catalog_path)?;
    info!(items = catalog.len(), path = %catalog_path.display(), "app: catalog loaded");

    let store = storage::Store::open(storage::Options {
        path: cfg.storage.path.clone(),
    })
    .context("app: open local storage")?;
    let shared = Arc::new(
        SharedStore::open(remote::Options {
            path: cfg.remote.path.clone(),
            poll_interval: cfg.remote.poll_interval,
        })
        .context("app: open shared store")?,
    );

    let mut session_opts = session::Options::new(shared.clone(), shared, store);
    session_opts.rollback_on_failure = cfg.viewer.rollback_on_failure;
    session_opts.swipe_threshold = cfg.viewer.swipe_threshold;
    session_opts.share_base_url = cfg.share.base_url.clone();
    let mut session = Session::new(catalog, session_opts)?;

    let mut status_message = String::new();
    if let Some(link) = opts.open_link.as_deref() {
        status_message = open_deep_link(&mut session, link);
    }

    let mut model = ui::Model::new(ui::Options {
        session,
        download_dir: cfg.download.dir.clone(),
        status_message,
    });
    model.run()?;
    info!("app: exiting");
    Ok(())
}

/// Builds the share link for `item_id`, checking it against the catalog when one is configured.
pub fn share_link(opts: &RunOptions, item_id: ItemId) -> Result<Url> {
    let cfg = load_config(opts)?;
    if let Ok(path) = catalog_path(opts, &cfg) {
        let catalog = Catalog::load(&path)?;
        catalog
            .get(item_id)
            .ok_or(CatalogError::UnknownItem(item_id))?;
    }
    let builder = ShareLinkBuilder::new(&cfg.share.base_url)?;
    Ok(builder.build_link(item_id))
}

fn load_config(opts: &RunOptions) -> Result<Config> {
    config::load(config::LoadOptions {
        config_file: opts.config_file.clone(),
        env_prefix: None,
    })
    .context("app: load config")
}

fn catalog_path(opts: &RunOptions, cfg: &Config) -> Result<PathBuf> {
    opts.catalog
        .clone()
        .or_else(|| cfg.catalog.path.clone())
        .context("app: no catalog configured; pass --catalog <path> or set catalog.path")
}

fn open_deep_link(session: &mut Session, link: &str) -> String {
    let Some(item_id) = share::parse_link(link) else {
        warn!(link, "app: unrecognised deep link");
        return format!("Could not read link {link}.");
    };
    match session.open_item(item_id) {
        Ok(()) => String::new(),
        Err(err) => {
            warn!(item_id, error = %err, "app: deep link target not found");
            format!("Image {item_id} is not in the catalog.")
        }
    }
}

pub fn friendly_path(path: &Path) -> String {
    if let Some(home) = dirs::home_dir() {
        if let Ok(stripped) = path.strip_prefix(&home) {
            let mut display = String::from("~");
            if !stripped.as_os_str().is_empty() {
                display.push_str(&format!("/{}", stripped.display()));
            }
            return display;
        }
    }
    path.display().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    use crate::catalog::MediaItem;
    use crate::data::{MockReactionService, MockViewService};
    use crate::dispatch::Mode;

    fn session() -> Session {
        let items = (1..=3)
            .map(|id| MediaItem {
                id,
                source: format!("/photos/{id}.jpg"),
                title: format!("Photo {id}"),
                category: "Street".into(),
            })
            .collect();
        let mut opts = session::Options::new(
            Arc::new(MockReactionService::new()),
            Arc::new(MockViewService::new()),
            storage::Store::in_memory().unwrap(),
        );
        opts.dispatch = Mode::Inline;
        Session::new(Catalog::new(items).unwrap(), opts).unwrap()
    }

    #[test]
    fn deep_link_opens_item() {
        let mut session = session();
        let status = open_deep_link(&mut session, "https://eazyfilms.com/?image=2");
        assert!(status.is_empty());
        assert_eq!(session.viewer().current_item(), Some(2));
    }

    #[test]
    fn unknown_deep_link_leaves_grid() {
        let mut session = session();
        let status = open_deep_link(&mut session, "https://eazyfilms.com/?image=99");
        assert!(status.contains("99"));
        let status = open_deep_link(&mut session, "?image=nope");
        assert!(status.starts_with("Could not read link"));
        assert!(!session.viewer().is_open());
        let status = open_deep_link(&mut session, "42");
        assert!(status.contains("42"));
    }

    #[test]
    fn share_link_checks_catalog() {
        let dir = tempdir().unwrap();
        let manifest = dir.path().join("catalog.yaml");
        fs::write(
            &manifest,
            "- id: 7\n  src: a.jpg\n  title: Pier\n  category: Street\n",
        )
        .unwrap();
        let opts = RunOptions {
            config_file: Some(dir.path().join("missing.yaml")),
            catalog: Some(manifest),
            open_link: None,
        };
        assert_eq!(
            share_link(&opts, 7).unwrap().as_str(),
            "https://eazyfilms.com/?image=7"
        );
        assert!(share_link(&opts, 8).is_err());
    }

    #[test]
    fn friendly_path_keeps_foreign_paths() {
        assert_eq!(friendly_path(Path::new("/srv/photos")), "/srv/photos");
    }
}
