use rusqlite::{Connection, OptionalExtension};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

/// Errors raised by the local key-value persistence layer
#[derive(Error, Debug)]
pub enum StoreError {
    /// SQLite failed to open, read or write
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// The database directory could not be created
    #[error("failed to create data directory: {0}")]
    Io(#[from] std::io::Error),

    /// A stored value could not be (de)serialized
    #[error("malformed stored value: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// A string-keyed persistence capability.
///
/// `set` fully overwrites whatever value was stored under the key.
pub trait KeyValueStore {
    fn get(&self, key: &str) -> StoreResult<Option<String>>;
    fn set(&mut self, key: &str, value: &str) -> StoreResult<()>;
}

/// SQLite-backed key-value store.
///
/// The database file is created in the user's data directory:
/// - Linux: ~/.local/share/cloud-gallery/cloud_gallery.db
/// - macOS: ~/Library/Application Support/cloud-gallery/cloud_gallery.db
/// - Windows: %APPDATA%\cloud-gallery\cloud_gallery.db
pub struct SqliteStore {
    conn: Connection,
    db_path: PathBuf,
}

impl SqliteStore {
    /// Open (or create) the store at `db_path` and initialize the schema.
    pub fn open(db_path: &Path) -> StoreResult<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(db_path)?;

        info!("📁 Registry store opened at: {}", db_path.display());

        let store = SqliteStore {
            conn,
            db_path: db_path.to_path_buf(),
        };
        store.init_schema()?;

        Ok(store)
    }

    /// Default location of the database file, if the platform has a data directory
    pub fn default_path() -> Option<PathBuf> {
        dirs::data_dir().or_else(dirs::home_dir).map(|mut path| {
            path.push("cloud-gallery");
            path.push("cloud_gallery.db");
            path
        })
    }

    fn init_schema(&self) -> StoreResult<()> {
        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS kv (
                key     TEXT PRIMARY KEY NOT NULL,
                value   TEXT NOT NULL
            )",
            [],
        )?;
        Ok(())
    }
}

impl KeyValueStore for SqliteStore {
    fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let value = self
            .conn
            .query_row("SELECT value FROM kv WHERE key = ?1", [key], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(value)
    }

    fn set(&mut self, key: &str, value: &str) -> StoreResult<()> {
        self.conn.execute(
            "INSERT INTO kv (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            rusqlite::params![key, value],
        )?;
        debug!("Wrote {} bytes under key {:?}", value.len(), key);
        Ok(())
    }
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore")
            .field("db_path", &self.db_path)
            .finish()
    }
}

/// In-memory store, used when the database cannot be opened and in tests
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    values: HashMap<String, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> StoreResult<Option<String>> {
        Ok(self.values.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> StoreResult<()> {
        self.values.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_missing_key_is_none() {
        let dir = tempdir().unwrap();
        let store = SqliteStore::open(&dir.path().join("gallery.db")).unwrap();
        assert_eq!(store.get("images").unwrap(), None);
    }

    #[test]
    fn test_set_overwrites_previous_value() {
        let dir = tempdir().unwrap();
        let mut store = SqliteStore::open(&dir.path().join("gallery.db")).unwrap();

        store.set("images", "[\"a\"]").unwrap();
        store.set("images", "[]").unwrap();

        assert_eq!(store.get("images").unwrap().as_deref(), Some("[]"));
    }

    #[test]
    fn test_values_survive_reopen() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("nested").join("gallery.db");

        {
            let mut store = SqliteStore::open(&db_path).unwrap();
            store.set("images", "[\"https://x/a.png\"]").unwrap();
        }

        let store = SqliteStore::open(&db_path).unwrap();
        assert_eq!(
            store.get("images").unwrap().as_deref(),
            Some("[\"https://x/a.png\"]")
        );
    }

    #[test]
    fn test_memory_store() {
        let mut store = MemoryStore::new();
        assert_eq!(store.get("k").unwrap(), None);
        store.set("k", "v").unwrap();
        assert_eq!(store.get("k").unwrap().as_deref(), Some("v"));
    }
}
