// Connection management and transactional scope.
//
// Single-writer, many-reader local store: one connection behind an
// async mutex, WAL journaling for concurrent readers, and a unit-of-work
// scope that commits on Ok and rolls back on Err or panic.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use rusqlite::{params, Connection};
use tokio::sync::Mutex;

use crate::error::{StoreError, StoreResult};
use crate::migrations;

pub struct Store {
    conn: Arc<Mutex<Connection>>,
    db_path: Option<PathBuf>,
}

impl Store {
    /// Open (or create) the store at `path` and bring the schema up to
    /// date. Journaling is WAL; referential integrity is enforced.
    pub async fn open(path: &Path) -> StoreResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path).map_err(StoreError::from)?;
        let store = Self::init(conn, Some(path.to_path_buf())).await?;
        Ok(store)
    }

    /// In-memory store for tests.
    pub async fn open_in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory().map_err(StoreError::from)?;
        Self::init(conn, None).await
    }

    async fn init(conn: Connection, db_path: Option<PathBuf>) -> StoreResult<Self> {
        conn.busy_timeout(Duration::from_secs(10))?;
        // PRAGMA journal_mode returns a row; query_row discards it.
        conn.query_row("PRAGMA journal_mode = WAL", [], |_| Ok(()))?;
        conn.execute_batch("PRAGMA synchronous = NORMAL; PRAGMA foreign_keys = ON;")?;
        migrations::apply(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            db_path,
        })
    }

    pub fn db_path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    /// Run `f` against the live connection without a transaction.
    /// Multi-row read-only operations belong here.
    pub async fn read<T>(
        &self,
        f: impl FnOnce(&Connection) -> StoreResult<T>,
    ) -> StoreResult<T> {
        let conn = self.conn.lock().await;
        f(&conn)
    }

    /// Transactional scope: commits when `f` returns Ok, rolls back when
    /// it returns Err, and rolls back on panic (the transaction's drop
    /// path) before the panic continues unwinding.
    pub async fn with_unit_of_work<T>(
        &self,
        f: impl FnOnce(&Connection) -> StoreResult<T>,
    ) -> StoreResult<T> {
        let mut conn = self.conn.lock().await;
        let tx = conn
            .transaction()
            .map_err(|e| StoreError::Fatal(format!("begin failed: {e}")))?;
        match f(&tx) {
            Ok(value) => {
                tx.commit()
                    .map_err(|e| StoreError::Fatal(format!("commit failed: {e}")))?;
                Ok(value)
            }
            Err(err) => {
                let _ = tx.rollback();
                Err(err)
            }
        }
    }

    /// Allocate the next project-scoped display sequence number.
    ///
    /// The first request bootstraps the counter from max(seq) across the
    /// project's nodes and work items; every allocation is one atomic
    /// increment-and-return, so concurrent callers observe distinct,
    /// strictly monotone values.
    pub async fn next_seq(&self, project_id: &str) -> StoreResult<i64> {
        let conn = self.conn.lock().await;
        next_seq(&conn, project_id)
    }
}

/// Connection-level allocator so it also composes inside a unit of work.
pub fn next_seq(conn: &Connection, project_id: &str) -> StoreResult<i64> {
    conn.execute(
        "INSERT OR IGNORE INTO project_sequences (project_id, next_seq)
         SELECT ?1, COALESCE(MAX(seq), 0) + 1
         FROM (
            SELECT seq FROM plan_nodes WHERE project_id = ?1
            UNION ALL
            SELECT wi.seq FROM work_items wi
            JOIN plan_nodes n ON wi.node_id = n.id
            WHERE n.project_id = ?1
         )",
        params![project_id],
    )?;
    let seq: i64 = conn.query_row(
        "UPDATE project_sequences SET next_seq = next_seq + 1
         WHERE project_id = ?1
         RETURNING next_seq - 1",
        params![project_id],
        |row| row.get(0),
    )?;
    Ok(seq)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repo;
    use chrono::{NaiveDate, Utc};
    use kairos_types::{Project, ProjectStatus};

    fn project(id: &str, name: &str) -> Project {
        Project {
            id: id.to_string(),
            short_id: String::new(),
            name: name.to_string(),
            domain: "study".to_string(),
            start_date: NaiveDate::from_ymd_opt(2026, 1, 1).unwrap(),
            target_date: None,
            status: ProjectStatus::Active,
            archived_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn unit_of_work_commits_on_ok() {
        let store = Store::open_in_memory().await.unwrap();
        store
            .with_unit_of_work(|conn| repo::projects::insert(conn, &project("p1", "Latin")))
            .await
            .unwrap();
        let found = store
            .read(|conn| repo::projects::get(conn, "p1"))
            .await
            .unwrap();
        assert_eq!(found.name, "Latin");
    }

    #[tokio::test]
    async fn unit_of_work_rolls_back_on_err() {
        let store = Store::open_in_memory().await.unwrap();
        let result = store
            .with_unit_of_work(|conn| {
                repo::projects::insert(conn, &project("p1", "Latin"))?;
                Err::<(), _>(StoreError::Validation("forced failure".into()))
            })
            .await;
        assert!(matches!(result, Err(StoreError::Validation(_))));
        let found = store.read(|conn| repo::projects::get(conn, "p1")).await;
        assert!(matches!(found, Err(StoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn unit_of_work_rolls_back_on_panic() {
        let store = std::sync::Arc::new(Store::open_in_memory().await.unwrap());
        let worker = store.clone();
        let handle = tokio::spawn(async move {
            worker
                .with_unit_of_work(|conn| {
                    repo::projects::insert(conn, &project("p1", "Latin"))?;
                    panic!("abnormal termination mid-transaction");
                    #[allow(unreachable_code)]
                    Ok(())
                })
                .await
        });
        assert!(handle.await.is_err());

        // the store stays usable and carries no partial state
        let found = store.read(|conn| repo::projects::get(conn, "p1")).await;
        assert!(matches!(found, Err(StoreError::NotFound(_))));
        store
            .with_unit_of_work(|conn| repo::projects::insert(conn, &project("p2", "Piano")))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn seq_allocation_is_monotone_and_unique() {
        let store = Store::open_in_memory().await.unwrap();
        store
            .with_unit_of_work(|conn| repo::projects::insert(conn, &project("p1", "Latin")))
            .await
            .unwrap();

        let mut seen = Vec::new();
        for _ in 0..20 {
            seen.push(store.next_seq("p1").await.unwrap());
        }
        for pair in seen.windows(2) {
            assert_eq!(pair[1], pair[0] + 1);
        }
        assert_eq!(seen[0], 1);
    }

    #[tokio::test]
    async fn seq_bootstraps_above_existing_rows() {
        let store = Store::open_in_memory().await.unwrap();
        store
            .with_unit_of_work(|conn| {
                repo::projects::insert(conn, &project("p1", "Latin"))?;
                conn.execute(
                    "INSERT INTO plan_nodes (id, project_id, title, seq, created_at, updated_at)
                     VALUES ('n1', 'p1', 'Week 1', 7, 't', 't')",
                    [],
                )?;
                Ok(())
            })
            .await
            .unwrap();
        assert_eq!(store.next_seq("p1").await.unwrap(), 8);
        assert_eq!(store.next_seq("p1").await.unwrap(), 9);
    }

    #[tokio::test]
    async fn seq_allocation_is_unique_under_concurrent_callers() {
        let store = std::sync::Arc::new(Store::open_in_memory().await.unwrap());
        store
            .with_unit_of_work(|conn| repo::projects::insert(conn, &project("p1", "Latin")))
            .await
            .unwrap();

        let mut handles = Vec::new();
        for _ in 0..4 {
            let worker = store.clone();
            handles.push(tokio::spawn(async move {
                let mut got = Vec::new();
                for _ in 0..10 {
                    got.push(worker.next_seq("p1").await.unwrap());
                }
                got
            }));
        }
        let mut all = Vec::new();
        for handle in handles {
            all.extend(handle.await.unwrap());
        }
        all.sort_unstable();
        let expected: Vec<i64> = (1..=40).collect();
        assert_eq!(all, expected);
    }

    #[tokio::test]
    async fn file_store_survives_reopen_and_remigration() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("kairos.db");
        {
            let store = Store::open(&path).await.unwrap();
            store
                .with_unit_of_work(|conn| repo::projects::insert(conn, &project("p1", "Latin")))
                .await
                .unwrap();
        }
        // reopening runs the migrations again; they must be a no-op
        let store = Store::open(&path).await.unwrap();
        let found = store
            .read(|conn| repo::projects::get(conn, "p1"))
            .await
            .unwrap();
        assert_eq!(found.name, "Latin");
        assert_eq!(store.db_path(), Some(path.as_path()));
    }

    #[tokio::test]
    async fn seq_counters_are_independent_per_project() {
        let store = Store::open_in_memory().await.unwrap();
        store
            .with_unit_of_work(|conn| {
                repo::projects::insert(conn, &project("p1", "Latin"))?;
                repo::projects::insert(conn, &project("p2", "Piano"))
            })
            .await
            .unwrap();
        assert_eq!(store.next_seq("p1").await.unwrap(), 1);
        assert_eq!(store.next_seq("p1").await.unwrap(), 2);
        assert_eq!(store.next_seq("p2").await.unwrap(), 1);
    }
}
