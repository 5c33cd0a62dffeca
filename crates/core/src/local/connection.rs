//! Opening the local-device store.

use super::migrations;
use crate::Error;
use std::path::Path;
use tokio_rusqlite::Connection;

/// Applied to every connection before migrating.
const PRAGMAS: &str = "PRAGMA journal_mode=WAL;
     PRAGMA synchronous=NORMAL;
     PRAGMA busy_timeout=5000;";

/// Local-device key/value store.
///
/// Backed by a single SQLite connection driven on a background thread.
/// Clones share that connection, so every clone sees the same data.
#[derive(Clone, Debug)]
pub struct LocalDb {
    pub(crate) conn: Connection,
}

impl LocalDb {
    /// Open (creating if needed) the store at `path`.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| Error::LocalStore(format!("cannot create {}: {e}", parent.display())))?;
        }

        let conn = Connection::open(path).await.map_err(|e| Error::Database(e.into()))?;
        tracing::debug!(path = %path.display(), "opened local store");
        Self::init(conn).await
    }

    /// Open a private in-memory store. Nothing survives the last clone.
    pub async fn open_in_memory() -> Result<Self, Error> {
        let conn = Connection::open_in_memory()
            .await
            .map_err(|e| Error::Database(e.into()))?;
        Self::init(conn).await
    }

    async fn init(conn: Connection) -> Result<Self, Error> {
        conn.call(|conn| conn.execute_batch(PRAGMAS)).await?;
        migrations::run(&conn).await?;
        Ok(Self { conn })
    }
}
