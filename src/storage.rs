use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::{anyhow, Context, Result};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};

pub const USER_ID_KEY: &str = "eazyfilms-user-id";
pub const USERNAME_KEY: &str = "eazyfilms-username";
const COMMENTS_KEY_PREFIX: &str = "eazyfilms-comments-";

/// Local key-value store that survives across sessions. Values are opaque strings.
#[derive(Debug, Clone)]
pub struct Store {
    conn: Arc<Mutex<Connection>>,
}

#[derive(Debug, Default, Clone)]
pub struct Options {
    pub path: Option<PathBuf>,
}

pub fn comments_key(item_id: i64) -> String {
    format!("{COMMENTS_KEY_PREFIX}{item_id}")
}

impl Store {
    pub fn open(opts: Options) -> Result<Self> {
        let path = if let Some(path) = opts.path {
            path
        } else {
            default_path().context("storage: resolve default path")?
        };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("storage: create directory {}", parent.display()))?;
        }

        let conn = Connection::open(&path)
            .with_context(|| format!("storage: open database at {}", path.display()))?;
        conn.pragma_update(None, "journal_mode", "WAL")
            .context("storage: set WAL")?;
        conn.pragma_update(None, "busy_timeout", 5000)
            .context("storage: set busy timeout")?;
        apply_migrations(&conn, &migrations())?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("storage: open in-memory database")?;
        apply_migrations(&conn, &migrations())?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn close(self) -> Result<()> {
        let conn = Arc::try_unwrap(self.conn)
            .map_err(|_| anyhow!("storage: connection still in use"))?
            .into_inner();
        conn.close()
            .map_err(|(_, err)| err)
            .context("storage: close connection")
    }

    pub fn get(&self, key: &str) -> Result<Option<String>> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT value FROM kv WHERE key = ?1",
            params![key],
            |row| row.get(0),
        )
        .optional()
        .with_context(|| format!("storage: read {key}"))
    }

    pub fn set(&self, key: &str, value: &str) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            r#"
INSERT INTO kv (key, value, updated_at)
VALUES (?1, ?2, ?3)
ON CONFLICT(key) DO UPDATE SET
  value = excluded.value,
  updated_at = excluded.updated_at
"#,
            params![key, value, unix_now()],
        )
        .with_context(|| format!("storage: write {key}"))?;
        Ok(())
    }

    pub fn remove(&self, key: &str) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute("DELETE FROM kv WHERE key = ?1", params![key])
            .with_context(|| format!("storage: delete {key}"))?;
        Ok(())
    }
}

pub(crate) fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::from_secs(0))
        .as_secs() as i64
}

/// Applies each not-yet-recorded migration in order; versions are 1-based positions.
pub(crate) fn apply_migrations(conn: &Connection, migrations: &[&str]) -> Result<()> {
    conn.execute(
        r#"
CREATE TABLE IF NOT EXISTS schema_migrations (
  version INTEGER PRIMARY KEY,
  applied_at INTEGER NOT NULL
)
"#,
        [],
    )?;

    let current: i64 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
            [],
            |row| row.get(0),
        )
        .unwrap_or(0);

    for (idx, sql) in migrations.iter().enumerate() {
        let version = (idx + 1) as i64;
        if version <= current {
            continue;
        }
        conn.execute_batch(sql)
            .with_context(|| format!("storage: apply migration {version}"))?;
        conn.execute(
            "INSERT INTO schema_migrations (version, applied_at) VALUES (?1, ?2)",
            params![version, unix_now()],
        )?;
    }
    Ok(())
}

fn migrations() -> Vec<&'static str> {
    vec![
        r#"
CREATE TABLE IF NOT EXISTS kv (
  key TEXT PRIMARY KEY,
  value TEXT NOT NULL,
  updated_at INTEGER NOT NULL
);
"#,
    ]
}

pub fn default_path() -> Option<PathBuf> {
    dirs::data_dir().map(|dir| dir.join("lightbox-tui").join("local.db"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn values_survive_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("local.db");
        let store = Store::open(Options {
            path: Some(path.clone()),
        })
        .unwrap();
        store.set(USER_ID_KEY, "user-abc").unwrap();
        store.close().unwrap();

        let reopened = Store::open(Options { path: Some(path) }).unwrap();
        assert_eq!(
            reopened.get(USER_ID_KEY).unwrap().as_deref(),
            Some("user-abc")
        );
    }

    #[test]
    fn set_overwrites_and_remove_clears() {
        let store = Store::in_memory().unwrap();
        assert_eq!(store.get(USERNAME_KEY).unwrap(), None);
        store.set(USERNAME_KEY, "Ada").unwrap();
        store.set(USERNAME_KEY, "Grace").unwrap();
        assert_eq!(store.get(USERNAME_KEY).unwrap().as_deref(), Some("Grace"));
        store.remove(USERNAME_KEY).unwrap();
        assert_eq!(store.get(USERNAME_KEY).unwrap(), None);
    }

    #[test]
    fn comment_keys_are_per_item() {
        assert_eq!(comments_key(12), "eazyfilms-comments-12");
        assert_ne!(comments_key(1), comments_key(2));
    }
}
