//! Key/value operations on the local-device store.
//!
//! Values are stored as strings; the JSON helpers encode payloads the same
//! way the remote store sees them so a mirrored value reads back identically.

use super::connection::LocalDb;
use crate::Error;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio_rusqlite::params;
use tokio_rusqlite::rusqlite;

impl LocalDb {
    /// Get the raw value stored under `key`.
    pub async fn get(&self, key: &str) -> Result<Option<String>, Error> {
        let key = key.to_string();
        self.conn
            .call(move |conn| -> Result<Option<String>, Error> {
                let result = conn.query_row("SELECT value FROM local_kv WHERE key = ?1", params![key], |row| {
                    row.get::<_, String>(0)
                });

                match result {
                    Ok(value) => Ok(Some(value)),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(e.into()),
                }
            })
            .await
            .map_err(Error::from)
    }

    /// Insert or replace the value stored under `key`.
    pub async fn set(&self, key: &str, value: &str) -> Result<(), Error> {
        let key = key.to_string();
        let value = value.to_string();
        let now = chrono::Utc::now().to_rfc3339();
        self.conn
            .call(move |conn| -> Result<(), Error> {
                conn.execute(
                    "INSERT INTO local_kv (key, value, updated_at) VALUES (?1, ?2, ?3)
                     ON CONFLICT(key) DO UPDATE SET
                        value = excluded.value,
                        updated_at = excluded.updated_at",
                    params![key, value, now],
                )?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    /// Remove `key`. Returns whether a value was present.
    pub async fn remove(&self, key: &str) -> Result<bool, Error> {
        let key = key.to_string();
        self.conn
            .call(move |conn| -> Result<bool, Error> {
                let count = conn.execute("DELETE FROM local_kv WHERE key = ?1", params![key])?;
                Ok(count > 0)
            })
            .await
            .map_err(Error::from)
    }

    /// Decode the JSON value stored under `key`.
    ///
    /// A value that no longer decodes as `T` is reported as
    /// [`Error::Serialization`] rather than silently dropped.
    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, Error> {
        match self.get(key).await? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    pub async fn set_json<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<(), Error> {
        let raw = serde_json::to_string(value)?;
        self.set(key, &raw).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};

    #[tokio::test]
    async fn test_set_and_get() {
        let db = LocalDb::open_in_memory().await.unwrap();
        db.set("ui_filter_state", r#"{"sort":"price"}"#).await.unwrap();

        let value = db.get("ui_filter_state").await.unwrap();
        assert_eq!(value.as_deref(), Some(r#"{"sort":"price"}"#));
    }

    #[tokio::test]
    async fn test_get_missing() {
        let db = LocalDb::open_in_memory().await.unwrap();
        assert!(db.get("nonexistent").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_set_replaces() {
        let db = LocalDb::open_in_memory().await.unwrap();
        db.set("k", "one").await.unwrap();
        db.set("k", "two").await.unwrap();
        assert_eq!(db.get("k").await.unwrap().as_deref(), Some("two"));
    }

    #[tokio::test]
    async fn test_remove() {
        let db = LocalDb::open_in_memory().await.unwrap();
        db.set("k", "v").await.unwrap();

        assert!(db.remove("k").await.unwrap());
        assert!(!db.remove("k").await.unwrap());
        assert!(db.get("k").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_json_helpers() {
        let db = LocalDb::open_in_memory().await.unwrap();
        let quotes = json!([{"plan": "G", "premium": 112.5}, {"plan": "N", "premium": 98.0}]);
        db.set_json("medigap_quotes", &quotes).await.unwrap();

        let back: Value = db.get_json("medigap_quotes").await.unwrap().unwrap();
        assert_eq!(back, quotes);
    }

    #[tokio::test]
    async fn test_get_json_reports_corrupt_value() {
        let db = LocalDb::open_in_memory().await.unwrap();
        db.set("k", "{broken").await.unwrap();

        let result = db.get_json::<Value>("k").await;
        assert!(matches!(result, Err(Error::Serialization(_))));
    }
}
