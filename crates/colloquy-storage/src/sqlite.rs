// SPDX-FileCopyrightText: 2026 Colloquy Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite implementation of the StorageAdapter trait.
//!
//! List items are rows keyed by `(key, position)`. Each [`ListOp`] in a batch
//! is translated to the statements that touch only the affected rows, inside
//! one `IMMEDIATE` transaction together with the guard check.

use std::time::Duration;

use async_trait::async_trait;
use rusqlite::{Connection, OptionalExtension, TransactionBehavior, params};
use tokio::sync::OnceCell;
use tracing::debug;

use colloquy_config::model::StorageConfig;
use colloquy_core::{
    AdapterType, ColloquyError, HealthStatus, ListEffect, ListOp, PluginAdapter, Revision,
    StorageAdapter, Versioned,
};

use crate::database::{Database, map_tr_err};

/// SQLite-backed store.
///
/// The database is lazily opened on the first call to
/// [`StorageAdapter::initialize`]. Several processes may point at the same
/// file; each mutation is one `IMMEDIATE` transaction.
pub struct SqliteStore {
    config: StorageConfig,
    db: OnceCell<Database>,
}

impl SqliteStore {
    /// Create a new store with the given configuration.
    ///
    /// The database connection is not opened until [`initialize`] is called.
    ///
    /// [`initialize`]: StorageAdapter::initialize
    pub fn new(config: StorageConfig) -> Self {
        Self {
            config,
            db: OnceCell::new(),
        }
    }

    fn db(&self) -> Result<&Database, ColloquyError> {
        self.db.get().ok_or_else(|| ColloquyError::Storage {
            source: "storage not initialized -- call initialize() first".into(),
        })
    }
}

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

fn deadline_after(now: i64, ttl: Duration) -> i64 {
    now.saturating_add(i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX))
}

fn to_index(n: usize) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

/// Revision and expiry of a live list. An expired list is removed first and
/// reads as absent.
fn live_list_meta(
    conn: &Connection,
    key: &str,
    now: i64,
) -> rusqlite::Result<Option<(i64, Option<i64>)>> {
    let row: Option<(i64, Option<i64>)> = conn
        .query_row(
            "SELECT revision, expires_at FROM kv_lists WHERE key = ?1",
            params![key],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;

    match row {
        Some((_, Some(expires_at))) if expires_at <= now => {
            remove_list(conn, key)?;
            debug!(key, "list expired");
            Ok(None)
        }
        other => Ok(other),
    }
}

fn remove_list(conn: &Connection, key: &str) -> rusqlite::Result<()> {
    conn.execute("DELETE FROM kv_list_items WHERE key = ?1", params![key])?;
    conn.execute("DELETE FROM kv_lists WHERE key = ?1", params![key])?;
    Ok(())
}

fn load_items(conn: &Connection, key: &str) -> rusqlite::Result<Vec<String>> {
    let mut stmt = conn
        .prepare_cached("SELECT value FROM kv_list_items WHERE key = ?1 ORDER BY position ASC")?;
    let rows = stmt.query_map(params![key], |row| row.get(0))?;
    rows.collect()
}

/// Position of the item at zero-based `index`, if the list is that long.
fn position_at(conn: &Connection, key: &str, index: usize) -> rusqlite::Result<Option<i64>> {
    conn.prepare_cached(
        "SELECT position FROM kv_list_items WHERE key = ?1 ORDER BY position ASC LIMIT 1 OFFSET ?2",
    )?
    .query_row(params![key, to_index(index)], |row| row.get(0))
    .optional()
}

fn insert_item(conn: &Connection, key: &str, position: i64, value: &str) -> rusqlite::Result<()> {
    conn.prepare_cached("INSERT INTO kv_list_items (key, position, value) VALUES (?1, ?2, ?3)")?
        .execute(params![key, position, value])?;
    Ok(())
}

fn push_items(conn: &Connection, key: &str, values: &[String]) -> rusqlite::Result<()> {
    let last: Option<i64> = conn.query_row(
        "SELECT MAX(position) FROM kv_list_items WHERE key = ?1",
        params![key],
        |row| row.get(0),
    )?;
    let mut position = last.map_or(0, |p| p + 1);
    for value in values {
        insert_item(conn, key, position, value)?;
        position += 1;
    }
    Ok(())
}

fn apply_op(conn: &Connection, key: &str, op: &ListOp) -> rusqlite::Result<()> {
    match op {
        ListOp::Push(values) => push_items(conn, key, values)?,
        ListOp::PushFront(value) => {
            let first: Option<i64> = conn.query_row(
                "SELECT MIN(position) FROM kv_list_items WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )?;
            insert_item(conn, key, first.map_or(0, |p| p - 1), value)?;
        }
        ListOp::Insert { index, value } => match position_at(conn, key, *index)? {
            Some(at) => {
                conn.execute(
                    "UPDATE kv_list_items SET position = position + 1 WHERE key = ?1 AND position >= ?2",
                    params![key, at],
                )?;
                insert_item(conn, key, at, value)?;
            }
            None => push_items(conn, key, std::slice::from_ref(value))?,
        },
        ListOp::TrimFrom(0) => {}
        ListOp::TrimFrom(start) => match position_at(conn, key, *start)? {
            Some(cut) => {
                conn.execute(
                    "DELETE FROM kv_list_items WHERE key = ?1 AND position < ?2",
                    params![key, cut],
                )?;
            }
            None => {
                conn.execute("DELETE FROM kv_list_items WHERE key = ?1", params![key])?;
            }
        },
        ListOp::Replace(values) => {
            conn.execute("DELETE FROM kv_list_items WHERE key = ?1", params![key])?;
            push_items(conn, key, values)?;
        }
        ListOp::Delete => {
            conn.execute("DELETE FROM kv_list_items WHERE key = ?1", params![key])?;
        }
        ListOp::Expire(_) => {}
    }
    Ok(())
}

fn next_revision(conn: &Connection) -> rusqlite::Result<i64> {
    conn.query_row(
        "UPDATE kv_sequence SET revision = revision + 1 WHERE id = 1 RETURNING revision",
        [],
        |row| row.get(0),
    )
}

fn to_revision(raw: i64) -> Revision {
    Revision(u64::try_from(raw).unwrap_or_default())
}

#[async_trait]
impl PluginAdapter for SqliteStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Storage
    }

    async fn health_check(&self) -> Result<HealthStatus, ColloquyError> {
        let db = self.db()?;
        db.connection()
            .call(|conn| -> Result<(), rusqlite::Error> {
                conn.execute_batch("SELECT 1;")?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)?;
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), ColloquyError> {
        if let Some(db) = self.db.get() {
            db.checkpoint().await?;
            debug!("shutdown: WAL checkpoint complete");
        }
        Ok(())
    }
}

#[async_trait]
impl StorageAdapter for SqliteStore {
    async fn initialize(&self) -> Result<(), ColloquyError> {
        let db = Database::open(&self.config.database_path, self.config.wal_mode).await?;
        self.db.set(db).map_err(|_| ColloquyError::Storage {
            source: "storage already initialized".into(),
        })?;
        debug!(path = %self.config.database_path, "SQLite storage initialized");
        Ok(())
    }

    async fn close(&self) -> Result<(), ColloquyError> {
        self.db()?.checkpoint().await?;
        debug!("WAL checkpoint complete");
        Ok(())
    }

    async fn read_list(&self, key: &str) -> Result<Versioned<Vec<String>>, ColloquyError> {
        let key = key.to_string();
        let now = now_millis();
        let (items, revision) = self
            .db()?
            .connection()
            .call(move |conn| {
                // IMMEDIATE because an expired list is removed on read.
                let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
                let read = match live_list_meta(&tx, &key, now)? {
                    Some((revision, _)) => (load_items(&tx, &key)?, revision),
                    None => (Vec::new(), 0),
                };
                tx.commit()?;
                Ok(read)
            })
            .await
            .map_err(map_tr_err)?;

        Ok(Versioned {
            value: items,
            revision: to_revision(revision),
        })
    }

    async fn apply(
        &self,
        key: &str,
        ops: Vec<ListOp>,
        guard: Option<Revision>,
    ) -> Result<Revision, ColloquyError> {
        let owned_key = key.to_string();
        let now = now_millis();
        let outcome = self
            .db()?
            .connection()
            .call(move |conn| -> Result<Option<i64>, rusqlite::Error> {
                let key = owned_key;
                let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
                let (revision, expires_at) = live_list_meta(&tx, &key, now)?.unwrap_or((0, None));

                if guard.is_some_and(|expected| to_revision(revision) != expected) {
                    // Keep any expiry removal done above.
                    tx.commit()?;
                    return Ok(None);
                }
                if ops.is_empty() {
                    tx.commit()?;
                    return Ok(Some(revision));
                }

                let mut effect = ListEffect::default();
                for op in &ops {
                    effect.observe(op);
                    apply_op(&tx, &key, op)?;
                }

                let remaining: i64 = tx.query_row(
                    "SELECT COUNT(*) FROM kv_list_items WHERE key = ?1",
                    params![key],
                    |row| row.get(0),
                )?;
                if remaining == 0 {
                    tx.execute("DELETE FROM kv_lists WHERE key = ?1", params![key])?;
                    tx.commit()?;
                    return Ok(Some(0));
                }

                let expires_at = effect.resolve(false, expires_at, |ttl| deadline_after(now, ttl));
                let revision = next_revision(&tx)?;
                tx.execute(
                    "INSERT INTO kv_lists (key, revision, expires_at) VALUES (?1, ?2, ?3)
                     ON CONFLICT(key) DO UPDATE SET
                        revision = excluded.revision,
                        expires_at = excluded.expires_at",
                    params![key, revision, expires_at],
                )?;
                tx.commit()?;
                Ok(Some(revision))
            })
            .await
            .map_err(map_tr_err)?;

        outcome.map(to_revision).ok_or_else(|| ColloquyError::Conflict {
            key: key.to_string(),
        })
    }

    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, ColloquyError> {
        let key = key.to_string();
        let value = value.to_string();
        let now = now_millis();
        let expires_at = deadline_after(now, ttl);
        self.db()?
            .connection()
            .call(move |conn| {
                let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
                tx.execute(
                    "DELETE FROM kv_values WHERE key = ?1 AND expires_at <= ?2",
                    params![key, now],
                )?;
                let inserted = tx.execute(
                    "INSERT OR IGNORE INTO kv_values (key, value, expires_at) VALUES (?1, ?2, ?3)",
                    params![key, value, expires_at],
                )?;
                tx.commit()?;
                Ok(inserted == 1)
            })
            .await
            .map_err(map_tr_err)
    }

    async fn get_value(&self, key: &str) -> Result<Option<String>, ColloquyError> {
        let key = key.to_string();
        let now = now_millis();
        self.db()?
            .connection()
            .call(move |conn| {
                let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
                tx.execute(
                    "DELETE FROM kv_values WHERE key = ?1 AND expires_at <= ?2",
                    params![key, now],
                )?;
                let value = tx
                    .query_row(
                        "SELECT value FROM kv_values WHERE key = ?1",
                        params![key],
                        |row| row.get(0),
                    )
                    .optional()?;
                tx.commit()?;
                Ok(value)
            })
            .await
            .map_err(map_tr_err)
    }

    async fn compare_and_delete(&self, key: &str, expected: &str) -> Result<bool, ColloquyError> {
        let key = key.to_string();
        let expected = expected.to_string();
        let now = now_millis();
        self.db()?
            .connection()
            .call(move |conn| {
                let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
                tx.execute(
                    "DELETE FROM kv_values WHERE key = ?1 AND expires_at <= ?2",
                    params![key, now],
                )?;
                let deleted = tx.execute(
                    "DELETE FROM kv_values WHERE key = ?1 AND value = ?2",
                    params![key, expected],
                )?;
                tx.commit()?;
                Ok(deleted == 1)
            })
            .await
            .map_err(map_tr_err)
    }

    async fn purge_expired(&self) -> Result<usize, ColloquyError> {
        let now = now_millis();
        self.db()?
            .connection()
            .call(move |conn| {
                let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
                tx.execute(
                    "DELETE FROM kv_list_items WHERE key IN
                        (SELECT key FROM kv_lists WHERE expires_at <= ?1)",
                    params![now],
                )?;
                let lists = tx.execute("DELETE FROM kv_lists WHERE expires_at <= ?1", params![now])?;
                let values =
                    tx.execute("DELETE FROM kv_values WHERE expires_at <= ?1", params![now])?;
                tx.commit()?;
                Ok(lists + values)
            })
            .await
            .map_err(map_tr_err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn make_config(path: &str) -> StorageConfig {
        StorageConfig {
            database_path: path.to_string(),
            ..StorageConfig::default()
        }
    }

    async fn open_store(dir: &tempfile::TempDir) -> SqliteStore {
        let db_path = dir.path().join("store.db");
        let store = SqliteStore::new(make_config(db_path.to_str().unwrap()));
        store.initialize().await.unwrap();
        store
    }

    fn push(values: &[&str]) -> ListOp {
        ListOp::Push(values.iter().map(|v| v.to_string()).collect())
    }

    async fn row_count(store: &SqliteStore, table: &'static str) -> i64 {
        store
            .db()
            .unwrap()
            .connection()
            .call(move |conn| -> Result<i64, rusqlite::Error> {
                conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))
            })
            .await
            .unwrap()
    }

    async fn positions(store: &SqliteStore, key: &'static str) -> Vec<i64> {
        store
            .db()
            .unwrap()
            .connection()
            .call(move |conn| -> Result<Vec<i64>, rusqlite::Error> {
                let mut stmt = conn.prepare(
                    "SELECT position FROM kv_list_items WHERE key = ?1 ORDER BY position",
                )?;
                let rows = stmt.query_map(params![key], |row| row.get(0))?;
                rows.collect()
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn sqlite_store_implements_plugin_adapter() {
        let store = SqliteStore::new(make_config("unused.db"));
        assert_eq!(store.name(), "sqlite");
        assert_eq!(store.version(), semver::Version::new(0, 1, 0));
        assert_eq!(store.adapter_type(), AdapterType::Storage);
    }

    #[tokio::test]
    async fn initialize_twice_returns_error() {
        let dir = tempdir().unwrap();
        let store = open_store(&dir).await;
        assert!(store.initialize().await.is_err());
    }

    #[tokio::test]
    async fn health_check_requires_initialize() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("no_init.db");
        let store = SqliteStore::new(make_config(db_path.to_str().unwrap()));
        assert!(store.health_check().await.is_err());

        store.initialize().await.unwrap();
        assert_eq!(store.health_check().await.unwrap(), HealthStatus::Healthy);
    }

    #[tokio::test]
    async fn list_ops_round_trip_in_order() {
        let dir = tempdir().unwrap();
        let store = open_store(&dir).await;

        let r1 = store.apply("k", vec![push(&["a", "b", "c"])], None).await.unwrap();
        let r2 = store
            .apply(
                "k",
                vec![ListOp::TrimFrom(1), ListOp::PushFront("s".into())],
                Some(r1),
            )
            .await
            .unwrap();
        let read = store.read_list("k").await.unwrap();
        assert_eq!(read.value, vec!["s", "b", "c"]);
        assert_eq!(read.revision, r2);

        store
            .apply(
                "k",
                vec![ListOp::Insert {
                    index: 2,
                    value: "x".into(),
                }],
                None,
            )
            .await
            .unwrap();
        assert_eq!(store.read_list("k").await.unwrap().value, vec!["s", "b", "x", "c"]);
    }

    #[tokio::test]
    async fn guarded_apply_conflicts_after_concurrent_write() {
        let dir = tempdir().unwrap();
        let store = open_store(&dir).await;

        let seen = store.read_list("k").await.unwrap().revision;
        store.apply("k", vec![push(&["other"])], None).await.unwrap();
        let err = store.apply("k", vec![push(&["mine"])], Some(seen)).await.unwrap_err();
        assert!(matches!(err, ColloquyError::Conflict { ref key } if key == "k"));
        assert_eq!(store.read_list("k").await.unwrap().value, vec!["other"]);
    }

    #[tokio::test]
    async fn two_handles_share_one_file() {
        let dir = tempdir().unwrap();
        let first = open_store(&dir).await;
        let second = open_store(&dir).await;

        assert!(
            first
                .set_if_absent("lock", "a", Duration::from_secs(5))
                .await
                .unwrap()
        );
        assert!(
            !second
                .set_if_absent("lock", "b", Duration::from_secs(5))
                .await
                .unwrap()
        );

        let seen = second.read_list("k").await.unwrap().revision;
        first.apply("k", vec![push(&["a"])], None).await.unwrap();
        assert!(second.apply("k", vec![push(&["b"])], Some(seen)).await.is_err());
    }

    #[tokio::test]
    async fn expired_list_is_removed_on_read() {
        let dir = tempdir().unwrap();
        let store = open_store(&dir).await;

        let rev = store
            .apply("k", vec![push(&["a"]), ListOp::Expire(Duration::ZERO)], None)
            .await
            .unwrap();
        let read = store.read_list("k").await.unwrap();
        assert!(read.value.is_empty());
        assert_eq!(read.revision, Revision(0));
        assert_eq!(row_count(&store, "kv_lists").await, 0);
        assert_eq!(row_count(&store, "kv_list_items").await, 0);

        let err = store.apply("k", vec![push(&["b"])], Some(rev)).await.unwrap_err();
        assert!(matches!(err, ColloquyError::Conflict { .. }));
    }

    #[tokio::test]
    async fn delete_then_recreate_gets_fresh_revision() {
        let dir = tempdir().unwrap();
        let store = open_store(&dir).await;

        let r1 = store.apply("k", vec![push(&["a"])], None).await.unwrap();
        let r2 = store.apply("k", vec![ListOp::Delete], None).await.unwrap();
        assert_eq!(r2, Revision(0));
        assert_eq!(row_count(&store, "kv_lists").await, 0);
        assert!(store.read_list("k").await.unwrap().value.is_empty());

        let r3 = store.apply("k", vec![push(&["b"])], None).await.unwrap();
        assert!(r3 > r1);
    }

    #[tokio::test]
    async fn appends_keep_existing_rows_in_place() {
        let dir = tempdir().unwrap();
        let store = open_store(&dir).await;

        store.apply("k", vec![push(&["a", "b"])], None).await.unwrap();
        let before = positions(&store, "k").await;
        store.apply("k", vec![push(&["c"])], None).await.unwrap();
        let after = positions(&store, "k").await;
        assert_eq!(&after[..2], &before[..]);
        assert_eq!(after.len(), 3);
    }

    #[tokio::test]
    async fn trim_then_push_front_reuses_positions_below_the_cut() {
        let dir = tempdir().unwrap();
        let store = open_store(&dir).await;

        store
            .apply("k", vec![push(&["s", "q0", "a0", "q1", "a1"])], None)
            .await
            .unwrap();
        store
            .apply(
                "k",
                vec![ListOp::TrimFrom(3), ListOp::PushFront("s".into())],
                None,
            )
            .await
            .unwrap();
        assert_eq!(store.read_list("k").await.unwrap().value, vec!["s", "q1", "a1"]);
        assert_eq!(positions(&store, "k").await, vec![2, 3, 4]);

        store
            .apply(
                "k",
                vec![
                    ListOp::Insert {
                        index: 0,
                        value: "x".into(),
                    },
                    ListOp::Insert {
                        index: 2,
                        value: "y".into(),
                    },
                ],
                None,
            )
            .await
            .unwrap();
        assert_eq!(
            store.read_list("k").await.unwrap().value,
            vec!["x", "s", "y", "q1", "a1"]
        );
    }

    #[tokio::test]
    async fn purge_removes_expired_lists_and_values() {
        let dir = tempdir().unwrap();
        let store = open_store(&dir).await;

        store
            .apply("old", vec![push(&["a", "b"]), ListOp::Expire(Duration::ZERO)], None)
            .await
            .unwrap();
        store.apply("live", vec![push(&["a"])], None).await.unwrap();
        store.set_if_absent("stale", "t", Duration::ZERO).await.unwrap();
        store
            .set_if_absent("held", "t", Duration::from_secs(30))
            .await
            .unwrap();

        assert_eq!(store.purge_expired().await.unwrap(), 2);
        assert_eq!(store.purge_expired().await.unwrap(), 0);
        assert_eq!(row_count(&store, "kv_lists").await, 1);
        assert_eq!(row_count(&store, "kv_list_items").await, 1);
        assert_eq!(row_count(&store, "kv_values").await, 1);
    }

    #[tokio::test]
    async fn lease_values_honor_ttl_and_owner() {
        let dir = tempdir().unwrap();
        let store = open_store(&dir).await;

        assert!(store.set_if_absent("lock", "t1", Duration::ZERO).await.unwrap());
        // Already expired, so the next claimant wins.
        assert_eq!(store.get_value("lock").await.unwrap(), None);
        assert!(
            store
                .set_if_absent("lock", "t2", Duration::from_secs(30))
                .await
                .unwrap()
        );
        assert!(!store.compare_and_delete("lock", "t1").await.unwrap());
        assert!(store.compare_and_delete("lock", "t2").await.unwrap());
        assert_eq!(store.get_value("lock").await.unwrap(), None);
    }

    #[tokio::test]
    async fn shutdown_runs_checkpoint() {
        let dir = tempdir().unwrap();
        let store = open_store(&dir).await;
        store.apply("k", vec![push(&["a"])], None).await.unwrap();
        store.shutdown().await.unwrap();
        store.close().await.unwrap();
    }
}
