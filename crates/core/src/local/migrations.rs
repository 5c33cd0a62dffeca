//! Local store schema migrations.
//!
//! The schema version lives in SQLite's `user_version` pragma. Migration `n`
//! (1-based) is `MIGRATIONS[n - 1]`; pending ones are applied in a single
//! transaction.

use super::Error;
use tokio_rusqlite::Connection;

const MIGRATIONS: &[&str] = &[include_str!("../../migrations/001_local_kv.sql")];

/// Bring the schema up to date.
///
/// # Errors
///
/// Returns `MigrationFailed` if a migration fails or the file was written by
/// a newer schema.
pub async fn run(conn: &Connection) -> Result<(), Error> {
    conn.call(|conn| -> Result<(), Error> {
        let applied: i64 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;
        let applied = usize::try_from(applied)
            .map_err(|_| Error::MigrationFailed(format!("invalid schema version {applied}")))?;
        if applied > MIGRATIONS.len() {
            return Err(Error::MigrationFailed(format!(
                "schema version {applied} is newer than supported version {}",
                MIGRATIONS.len()
            )));
        }
        if applied == MIGRATIONS.len() {
            return Ok(());
        }

        let tx = conn.transaction()?;
        for (index, sql) in MIGRATIONS.iter().enumerate().skip(applied) {
            let version = index + 1;
            tracing::debug!(version, "applying local store migration");
            tx.execute_batch(sql)
                .map_err(|e| Error::MigrationFailed(format!("migration {version}: {e}")))?;
        }
        tx.pragma_update(None, "user_version", MIGRATIONS.len() as i64)?;
        tx.commit()?;
        Ok(())
    })
    .await
    .map_err(Error::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn schema_version(conn: &Connection) -> i64 {
        conn.call(|conn| conn.pragma_query_value(None, "user_version", |row| row.get(0)))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_run_is_idempotent() {
        let conn = Connection::open_in_memory().await.unwrap();
        run(&conn).await.unwrap();
        run(&conn).await.unwrap();

        assert_eq!(schema_version(&conn).await, MIGRATIONS.len() as i64);

        let has_kv: bool = conn
            .call(|conn| {
                conn.query_row(
                    "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type='table' AND name='local_kv')",
                    [],
                    |row| row.get(0),
                )
            })
            .await
            .unwrap();
        assert!(has_kv);
    }

    #[tokio::test]
    async fn test_rejects_newer_schema() {
        let conn = Connection::open_in_memory().await.unwrap();
        conn.call(|conn| conn.pragma_update(None, "user_version", 99)).await.unwrap();

        let result = run(&conn).await;
        assert!(matches!(result, Err(Error::MigrationFailed(_))));
    }
}
