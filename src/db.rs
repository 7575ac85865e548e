// SQLite-backed key store

use rusqlite::{Connection, OptionalExtension, params};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, info};

use crate::error::{JwksError, Result};
use crate::key_management::{self, KeyMaterial};
use crate::types::{KeyRecord, PublicKeyRecord};

const BUSY_TIMEOUT: Duration = Duration::from_millis(500);

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS keys(
    kid INTEGER PRIMARY KEY AUTOINCREMENT,
    key BLOB NOT NULL,
    exp INTEGER NOT NULL
)";

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(2);

static MEMORY_DB_SEQ: AtomicU64 = AtomicU64::new(0);

#[derive(Clone)]
enum Backing {
    File(PathBuf),
    /// Shared-cache in-memory database. The anchor connection is never used
    /// for queries; it only keeps the database alive while any handle exists.
    /// The `Mutex` makes the handle `Sync`.
    Memory {
        uri: String,
        _anchor: Arc<Mutex<Connection>>,
    },
}

/// Durable record store mapping a key id to its PEM material and expiry.
///
/// Each call opens its own connection on tokio's blocking pool, so concurrent
/// readers only contend inside SQLite. Calls are bounded by the store timeout.
#[derive(Clone)]
pub struct KeyStore {
    backing: Backing,
    timeout: Duration,
}

impl std::fmt::Debug for KeyStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let location = match &self.backing {
            Backing::File(path) => path.display().to_string(),
            Backing::Memory { uri, .. } => uri.clone(),
        };
        f.debug_struct("KeyStore")
            .field("location", &location)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl KeyStore {
    /// Open the database file, discarding whatever a previous run left behind.
    pub fn open_fresh(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        match std::fs::remove_file(path) {
            Ok(()) => info!(path = %path.display(), "removed stale key database"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(JwksError::storage_unavailable(format!(
                    "cannot remove {}: {e}",
                    path.display()
                )));
            }
        }
        Self::open(path)
    }

    /// Open (or create) the database file, keeping existing rows.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let conn = Connection::open(&path)?;
        conn.execute(SCHEMA, [])?;
        Ok(Self {
            backing: Backing::File(path),
            timeout: DEFAULT_TIMEOUT,
        })
    }

    /// A private in-memory store; nothing touches the filesystem.
    pub fn in_memory() -> Result<Self> {
        let seq = MEMORY_DB_SEQ.fetch_add(1, Ordering::Relaxed);
        let uri = format!(
            "file:jwks-keys-{}-{seq}?mode=memory&cache=shared",
            std::process::id()
        );
        let anchor = Connection::open(&uri)?;
        anchor.execute(SCHEMA, [])?;
        Ok(Self {
            backing: Backing::Memory {
                uri,
                _anchor: Arc::new(Mutex::new(anchor)),
            },
            timeout: DEFAULT_TIMEOUT,
        })
    }

    fn connect(backing: &Backing) -> Result<Connection> {
        let conn = match backing {
            Backing::File(path) => Connection::open(path)?,
            Backing::Memory { uri, .. } => Connection::open(uri)?,
        };
        conn.busy_timeout(BUSY_TIMEOUT)?;
        Ok(conn)
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Persist a new key record and return its assigned id.
    pub async fn insert(&self, material: KeyMaterial, expires_at: i64) -> Result<i64> {
        let kid = self
            .run(move |conn| {
                conn.execute(
                    "INSERT INTO keys (key, exp) VALUES (?, ?)",
                    params![material.as_bytes(), expires_at],
                )?;
                Ok(conn.last_insert_rowid())
            })
            .await?;
        debug!(kid, expires_at, "inserted signing key");
        Ok(kid)
    }

    /// All keys with `exp > as_of`, in insertion order, public halves only.
    pub async fn list_valid(&self, as_of: i64) -> Result<Vec<PublicKeyRecord>> {
        self.run(move |conn| {
            let mut stmt =
                conn.prepare("SELECT kid, key, exp FROM keys WHERE exp > ? ORDER BY kid")?;
            let rows = stmt.query_map(params![as_of], |row| {
                let kid: i64 = row.get(0)?;
                let key: Vec<u8> = row.get(1)?;
                let exp: i64 = row.get(2)?;
                Ok((kid, key, exp))
            })?;

            let mut out = Vec::new();
            for row in rows {
                let (kid, key, expires_at) = row?;
                out.push(PublicKeyRecord {
                    kid,
                    public_key: key_management::decode_public_key(kid, &key)?,
                    expires_at,
                });
            }
            Ok(out)
        })
        .await
    }

    /// One key matching the expiry condition: `exp > as_of` for a current key,
    /// `exp <= as_of` for an expired one. Lowest id wins.
    pub async fn get_any(&self, as_of: i64, want_expired: bool) -> Result<KeyRecord> {
        let sql = if want_expired {
            "SELECT kid, key, exp FROM keys WHERE exp <= ? ORDER BY kid LIMIT 1"
        } else {
            "SELECT kid, key, exp FROM keys WHERE exp > ? ORDER BY kid LIMIT 1"
        };
        let found = self
            .run(move |conn| {
                conn.query_row(sql, params![as_of], |row| {
                    Ok(KeyRecord {
                        kid: row.get(0)?,
                        material: row.get(1)?,
                        expires_at: row.get(2)?,
                    })
                })
                .optional()
                .map_err(JwksError::from)
            })
            .await?;
        found.ok_or(JwksError::NotFound {
            wanted_expired: want_expired,
        })
    }

    /// Total number of stored keys, current and expired.
    pub async fn count(&self) -> Result<i64> {
        self.run(|conn| Ok(conn.query_row("SELECT COUNT(*) FROM keys", [], |row| row.get(0))?))
            .await
    }

    async fn run<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
    {
        let backing = self.backing.clone();
        let task = tokio::task::spawn_blocking(move || {
            let conn = Self::connect(&backing)?;
            f(&conn)
        });
        match tokio::time::timeout(self.timeout, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_err)) => Err(JwksError::storage_unavailable(join_err.to_string())),
            Err(_) => Err(JwksError::StorageTimeout(self.timeout)),
        }
    }
}
