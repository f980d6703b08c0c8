use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use parking_lot::Mutex;
use rusqlite::{params, Connection};
use tracing::{debug, warn};

use crate::catalog::ItemId;
use crate::data::{ChangeCallback, ReactionRecord, ReactionService, ViewService, Watch};
use crate::storage::{apply_migrations, unix_now};

/// SQLite database shared between clients; stands in for the hosted reaction and view tables.
#[derive(Debug, Clone)]
pub struct SharedStore {
    conn: Arc<Mutex<Connection>>,
    poll_interval: Duration,
}

#[derive(Debug, Clone)]
pub struct Options {
    pub path: Option<PathBuf>,
    pub poll_interval: Duration,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            path: None,
            poll_interval: Duration::from_millis(750),
        }
    }
}

impl SharedStore {
    pub fn open(opts: Options) -> Result<Self> {
        let path = if let Some(path) = opts.path {
            path
        } else {
            default_path().context("remote: resolve default path")?
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("remote: create directory {}", parent.display()))?;
        }
        let conn = open_connection(&path)?;
        apply_migrations(&conn, &migrations())?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            poll_interval: opts.poll_interval.max(Duration::from_millis(10)),
        })
    }

    fn latest_event(&self, item_id: ItemId) -> Result<i64> {
        latest_event(&self.conn, item_id)
    }
}

fn open_connection(path: &Path) -> Result<Connection> {
    let conn = Connection::open(path)
        .with_context(|| format!("remote: open database at {}", path.display()))?;
    conn.pragma_update(None, "journal_mode", "WAL")
        .context("remote: set WAL")?;
    conn.pragma_update(None, "busy_timeout", 5000)
        .context("remote: set busy timeout")?;
    Ok(conn)
}

fn latest_event(conn: &Mutex<Connection>, item_id: ItemId) -> Result<i64> {
    let conn = conn.lock();
    conn.query_row(
        "SELECT COALESCE(MAX(seq), 0) FROM like_events WHERE image_id = ?1",
        params![item_id],
        |row| row.get(0),
    )
    .context("remote: read change feed")
}

impl ReactionService for SharedStore {
    fn list(&self, item_id: ItemId) -> Result<Vec<ReactionRecord>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            r#"
SELECT image_id, user_id
FROM likes
WHERE image_id = ?1
ORDER BY created_at ASC
"#,
        )?;
        let rows = stmt
            .query_map(params![item_id], |row| {
                Ok(ReactionRecord {
                    item_id: row.get(0)?,
                    user_id: row.get(1)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("remote: select likes")?;
        Ok(rows)
    }

    fn counts(&self) -> Result<HashMap<ItemId, u64>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare("SELECT image_id, COUNT(*) FROM likes GROUP BY image_id")?;
        let rows = stmt
            .query_map([], |row| {
                let id: ItemId = row.get(0)?;
                let count: i64 = row.get(1)?;
                Ok((id, count.max(0) as u64))
            })?
            .collect::<rusqlite::Result<HashMap<_, _>>>()
            .context("remote: count likes")?;
        Ok(rows)
    }

    fn insert(&self, item_id: ItemId, user_id: &str) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT OR IGNORE INTO likes (image_id, user_id, created_at) VALUES (?1, ?2, ?3)",
            params![item_id, user_id, unix_now()],
        )
        .context("remote: insert like")?;
        Ok(())
    }

    fn delete(&self, item_id: ItemId, user_id: &str) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "DELETE FROM likes WHERE image_id = ?1 AND user_id = ?2",
            params![item_id, user_id],
        )
        .context("remote: delete like")?;
        Ok(())
    }

    fn watch(&self, item_id: ItemId, on_change: ChangeCallback) -> Result<Watch> {
        let mut last_seen = self.latest_event(item_id)?;
        let stop = Arc::new(AtomicBool::new(false));
        let conn = Arc::clone(&self.conn);
        let interval = self.poll_interval;
        let thread_stop = Arc::clone(&stop);

        thread::Builder::new()
            .name(format!("likes-feed-{item_id}"))
            .spawn(move || {
                while !thread_stop.load(Ordering::SeqCst) {
                    thread::sleep(interval);
                    if thread_stop.load(Ordering::SeqCst) {
                        break;
                    }
                    match latest_event(&conn, item_id) {
                        Ok(seq) if seq > last_seen => {
                            last_seen = seq;
                            on_change();
                        }
                        Ok(_) => {}
                        Err(err) => warn!(item_id, error = %err, "remote: change feed poll failed"),
                    }
                }
                debug!(item_id, "remote: change feed closed");
            })
            .context("remote: spawn change feed")?;

        Ok(Watch::new(item_id, move || {
            stop.store(true, Ordering::SeqCst);
        }))
    }
}

impl ViewService for SharedStore {
    fn record(&self, item_id: ItemId) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO views (image_id, created_at) VALUES (?1, ?2)",
            params![item_id, unix_now()],
        )
        .context("remote: insert view")?;
        Ok(())
    }

    fn count(&self, item_id: ItemId) -> Result<u64> {
        let conn = self.conn.lock();
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM views WHERE image_id = ?1",
                params![item_id],
                |row| row.get(0),
            )
            .context("remote: count views")?;
        Ok(count.max(0) as u64)
    }
}

fn migrations() -> Vec<&'static str> {
    vec![
        r#"
CREATE TABLE IF NOT EXISTS likes (
  image_id INTEGER NOT NULL,
  user_id TEXT NOT NULL,
  created_at INTEGER NOT NULL,
  PRIMARY KEY (image_id, user_id)
);

CREATE TABLE IF NOT EXISTS views (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  image_id INTEGER NOT NULL,
  created_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_views_image_id ON views(image_id);

CREATE TABLE IF NOT EXISTS like_events (
  seq INTEGER PRIMARY KEY AUTOINCREMENT,
  image_id INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_like_events_image_id ON like_events(image_id);

CREATE TRIGGER IF NOT EXISTS likes_after_insert AFTER INSERT ON likes
BEGIN
  INSERT INTO like_events (image_id) VALUES (NEW.image_id);
END;

CREATE TRIGGER IF NOT EXISTS likes_after_delete AFTER DELETE ON likes
BEGIN
  INSERT INTO like_events (image_id) VALUES (OLD.image_id);
END;
"#,
    ]
}

pub fn default_path() -> Option<PathBuf> {
    dirs::data_dir().map(|dir| dir.join("lightbox-tui").join("shared.db"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::unbounded;
    use tempfile::tempdir;

    fn open(path: &Path) -> SharedStore {
        SharedStore::open(Options {
            path: Some(path.to_path_buf()),
            poll_interval: Duration::from_millis(20),
        })
        .unwrap()
    }

    #[test]
    fn likes_are_unique_per_user() {
        let dir = tempdir().unwrap();
        let store = open(&dir.path().join("shared.db"));
        store.insert(1, "user-a").unwrap();
        store.insert(1, "user-a").unwrap();
        store.insert(1, "user-b").unwrap();
        store.insert(2, "user-a").unwrap();
        assert_eq!(store.list(1).unwrap().len(), 2);
        let counts = store.counts().unwrap();
        assert_eq!(counts.get(&1), Some(&2));
        assert_eq!(counts.get(&2), Some(&1));

        store.delete(1, "user-a").unwrap();
        let remaining = store.list(1).unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].user_id, "user-b");
    }

    #[test]
    fn views_append_and_count() {
        let dir = tempdir().unwrap();
        let store = open(&dir.path().join("shared.db"));
        store.record(5).unwrap();
        store.record(5).unwrap();
        assert_eq!(store.count(5).unwrap(), 2);
        assert_eq!(store.count(6).unwrap(), 0);
    }

    #[test]
    fn change_feed_sees_writes_from_another_client() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("shared.db");
        let watcher = open(&path);
        let other = open(&path);

        let (tx, rx) = unbounded();
        let watch = watcher
            .watch(
                3,
                Arc::new(move || {
                    let _ = tx.send(());
                }),
            )
            .unwrap();

        other.insert(4, "user-x").unwrap();
        other.insert(3, "user-x").unwrap();
        assert!(rx.recv_timeout(Duration::from_secs(2)).is_ok());

        watch.unsubscribe();
        thread::sleep(Duration::from_millis(60));
        while rx.try_recv().is_ok() {}
        other.delete(3, "user-x").unwrap();
        assert!(rx.recv_timeout(Duration::from_millis(200)).is_err());
    }
}
