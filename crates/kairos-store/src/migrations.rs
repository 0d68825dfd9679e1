// Schema migrations.
//
// The migration list is ordered and idempotent: CREATE ... IF NOT
// EXISTS statements plus later ALTER TABLE ADD COLUMN steps whose
// "duplicate column name" errors are tolerated on re-run. The one
// structural change that SQLite cannot express as an ALTER (broadening
// the work_items.status CHECK) is a guarded table rebuild.

use rusqlite::Connection;

use crate::error::{StoreError, StoreResult};

/// Ordered idempotent statements. Re-running the whole list on an
/// up-to-date store is a no-op.
const MIGRATIONS: &[&str] = &[
    // -- base schema ---------------------------------------------------
    "CREATE TABLE IF NOT EXISTS projects (
        id TEXT PRIMARY KEY,
        short_id TEXT NOT NULL DEFAULT '',
        name TEXT NOT NULL,
        domain TEXT NOT NULL DEFAULT '',
        start_date TEXT NOT NULL,
        target_date TEXT,
        status TEXT NOT NULL DEFAULT 'active'
            CHECK (status IN ('active','paused','done','archived')),
        archived_at TEXT,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )",
    "CREATE UNIQUE INDEX IF NOT EXISTS idx_projects_short_id
        ON projects(short_id) WHERE short_id <> ''",
    "CREATE TABLE IF NOT EXISTS plan_nodes (
        id TEXT PRIMARY KEY,
        project_id TEXT NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
        parent_id TEXT REFERENCES plan_nodes(id) ON DELETE CASCADE,
        title TEXT NOT NULL,
        kind TEXT NOT NULL DEFAULT 'generic'
            CHECK (kind IN ('week','module','book','stage','section','assessment','generic')),
        order_index INTEGER NOT NULL DEFAULT 0,
        due_date TEXT,
        not_before TEXT,
        not_after TEXT,
        seq INTEGER NOT NULL,
        is_default INTEGER NOT NULL DEFAULT 0,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_plan_nodes_project ON plan_nodes(project_id)",
    "CREATE INDEX IF NOT EXISTS idx_plan_nodes_parent ON plan_nodes(parent_id)",
    "CREATE TABLE IF NOT EXISTS work_items (
        id TEXT PRIMARY KEY,
        node_id TEXT NOT NULL REFERENCES plan_nodes(id) ON DELETE CASCADE,
        seq INTEGER NOT NULL,
        title TEXT NOT NULL,
        description TEXT NOT NULL DEFAULT '',
        item_type TEXT NOT NULL DEFAULT 'task',
        status TEXT NOT NULL DEFAULT 'todo'
            CHECK (status IN ('todo','in_progress','done','skipped','archived')),
        archived_at TEXT,
        completed_at TEXT,
        duration_mode TEXT NOT NULL DEFAULT 'estimate'
            CHECK (duration_mode IN ('fixed','estimate','derived')),
        planned_min INTEGER NOT NULL DEFAULT 0 CHECK (planned_min >= 0),
        logged_min INTEGER NOT NULL DEFAULT 0 CHECK (logged_min >= 0),
        estimate_confidence REAL NOT NULL DEFAULT 0.5
            CHECK (estimate_confidence >= 0.0 AND estimate_confidence <= 1.0),
        min_session_min INTEGER NOT NULL DEFAULT 15,
        max_session_min INTEGER NOT NULL DEFAULT 60,
        default_session_min INTEGER NOT NULL DEFAULT 30,
        splittable INTEGER NOT NULL DEFAULT 1,
        units_kind TEXT,
        units_total INTEGER,
        units_done INTEGER,
        due_date TEXT,
        not_before TEXT,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_work_items_node ON work_items(node_id)",
    "CREATE INDEX IF NOT EXISTS idx_work_items_status ON work_items(status)",
    "CREATE TABLE IF NOT EXISTS dependencies (
        predecessor_id TEXT NOT NULL REFERENCES work_items(id) ON DELETE CASCADE,
        successor_id TEXT NOT NULL REFERENCES work_items(id) ON DELETE CASCADE,
        PRIMARY KEY (predecessor_id, successor_id)
    )",
    "CREATE INDEX IF NOT EXISTS idx_dependencies_successor ON dependencies(successor_id)",
    "CREATE TABLE IF NOT EXISTS work_session_logs (
        id TEXT PRIMARY KEY,
        work_item_id TEXT NOT NULL REFERENCES work_items(id) ON DELETE CASCADE,
        started_at TEXT NOT NULL,
        minutes INTEGER NOT NULL CHECK (minutes > 0),
        note TEXT,
        created_at TEXT NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_session_logs_item ON work_session_logs(work_item_id)",
    "CREATE INDEX IF NOT EXISTS idx_session_logs_started ON work_session_logs(started_at)",
    "CREATE TABLE IF NOT EXISTS user_profile (
        id TEXT PRIMARY KEY,
        buffer_pct REAL NOT NULL DEFAULT 0.1,
        w_deadline_pressure REAL NOT NULL DEFAULT 1.0,
        w_behind_pace REAL NOT NULL DEFAULT 0.8,
        w_spacing REAL NOT NULL DEFAULT 0.6,
        w_variation REAL NOT NULL DEFAULT 0.5,
        default_max_slices INTEGER NOT NULL DEFAULT 5,
        baseline_daily_min INTEGER NOT NULL DEFAULT 60,
        updated_at TEXT NOT NULL
    )",
    "INSERT OR IGNORE INTO user_profile (id, updated_at)
        VALUES ('default', strftime('%Y-%m-%dT%H:%M:%SZ','now'))",
    "CREATE TABLE IF NOT EXISTS project_sequences (
        project_id TEXT PRIMARY KEY REFERENCES projects(id) ON DELETE CASCADE,
        next_seq INTEGER NOT NULL
    )",
    // -- later additions ----------------------------------------------
    // These columns arrived after the base schema shipped; re-running
    // them hits "duplicate column name", which apply() tolerates.
    "ALTER TABLE plan_nodes ADD COLUMN planned_min_budget INTEGER",
    "ALTER TABLE work_items ADD COLUMN duration_source TEXT NOT NULL DEFAULT 'manual'",
    "ALTER TABLE work_session_logs ADD COLUMN units_done_delta INTEGER NOT NULL DEFAULT 0",
];

pub fn apply(conn: &Connection) -> StoreResult<()> {
    for sql in MIGRATIONS {
        if let Err(err) = conn.execute(sql, []) {
            if is_duplicate_column(&err) {
                tracing::debug!("tolerating duplicate column on re-run: {err}");
                continue;
            }
            return Err(StoreError::Fatal(format!("migration failed: {err}")));
        }
    }
    broaden_work_item_status_check(conn)?;
    Ok(())
}

fn is_duplicate_column(err: &rusqlite::Error) -> bool {
    err.to_string().contains("duplicate column name")
}

/// Stores created before soft-archival carry a work_items CHECK that
/// rejects 'archived'. SQLite cannot relax a CHECK in place, so this
/// rebuilds the table: create-new, copy, drop, rename, reindex, all
/// under foreign_keys=OFF with the pragma restored on every path.
fn broaden_work_item_status_check(conn: &Connection) -> StoreResult<()> {
    let table_sql: Option<String> = conn
        .query_row(
            "SELECT sql FROM sqlite_master WHERE type='table' AND name='work_items'",
            [],
            |row| row.get(0),
        )
        .ok();
    let Some(table_sql) = table_sql else {
        return Ok(());
    };
    if table_sql.contains("'archived'") {
        return Ok(());
    }

    conn.execute_batch("PRAGMA foreign_keys = OFF")
        .map_err(|e| StoreError::Fatal(format!("migration failed: {e}")))?;
    let result = rebuild_work_items(conn);
    let restore = conn.execute_batch("PRAGMA foreign_keys = ON");
    result.map_err(|e| StoreError::Fatal(format!("migration failed: {e}")))?;
    restore.map_err(|e| StoreError::Fatal(format!("migration failed: {e}")))?;
    Ok(())
}

fn rebuild_work_items(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "BEGIN;
         CREATE TABLE work_items_new (
            id TEXT PRIMARY KEY,
            node_id TEXT NOT NULL REFERENCES plan_nodes(id) ON DELETE CASCADE,
            seq INTEGER NOT NULL,
            title TEXT NOT NULL,
            description TEXT NOT NULL DEFAULT '',
            item_type TEXT NOT NULL DEFAULT 'task',
            status TEXT NOT NULL DEFAULT 'todo'
                CHECK (status IN ('todo','in_progress','done','skipped','archived')),
            archived_at TEXT,
            completed_at TEXT,
            duration_mode TEXT NOT NULL DEFAULT 'estimate'
                CHECK (duration_mode IN ('fixed','estimate','derived')),
            planned_min INTEGER NOT NULL DEFAULT 0 CHECK (planned_min >= 0),
            logged_min INTEGER NOT NULL DEFAULT 0 CHECK (logged_min >= 0),
            estimate_confidence REAL NOT NULL DEFAULT 0.5
                CHECK (estimate_confidence >= 0.0 AND estimate_confidence <= 1.0),
            min_session_min INTEGER NOT NULL DEFAULT 15,
            max_session_min INTEGER NOT NULL DEFAULT 60,
            default_session_min INTEGER NOT NULL DEFAULT 30,
            splittable INTEGER NOT NULL DEFAULT 1,
            units_kind TEXT,
            units_total INTEGER,
            units_done INTEGER,
            due_date TEXT,
            not_before TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            duration_source TEXT NOT NULL DEFAULT 'manual'
         );
         INSERT INTO work_items_new (
            id, node_id, seq, title, description, item_type, status,
            archived_at, completed_at, duration_mode, planned_min, logged_min,
            estimate_confidence, min_session_min, max_session_min,
            default_session_min, splittable, units_kind, units_total,
            units_done, due_date, not_before, created_at, updated_at,
            duration_source)
         SELECT
            id, node_id, seq, title, description, item_type, status,
            archived_at, completed_at, duration_mode, planned_min, logged_min,
            estimate_confidence, min_session_min, max_session_min,
            default_session_min, splittable, units_kind, units_total,
            units_done, due_date, not_before, created_at, updated_at,
            duration_source
         FROM work_items;
         DROP TABLE work_items;
         ALTER TABLE work_items_new RENAME TO work_items;
         CREATE INDEX IF NOT EXISTS idx_work_items_node ON work_items(node_id);
         CREATE INDEX IF NOT EXISTS idx_work_items_status ON work_items(status);
         COMMIT;",
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fresh_conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("PRAGMA foreign_keys = ON").unwrap();
        conn
    }

    #[test]
    fn apply_twice_is_a_no_op() {
        let conn = fresh_conn();
        apply(&conn).unwrap();
        let schema_once: Vec<String> = dump_schema(&conn);
        apply(&conn).unwrap();
        let schema_twice: Vec<String> = dump_schema(&conn);
        assert_eq!(schema_once, schema_twice);
    }

    #[test]
    fn profile_singleton_is_seeded() {
        let conn = fresh_conn();
        apply(&conn).unwrap();
        let (id, buffer): (String, f64) = conn
            .query_row(
                "SELECT id, buffer_pct FROM user_profile WHERE id = 'default'",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .unwrap();
        assert_eq!(id, "default");
        assert!((buffer - 0.1).abs() < f64::EPSILON);
    }

    #[test]
    fn legacy_status_check_is_broadened_with_data_preserved() {
        let conn = fresh_conn();
        // Legacy shape: no 'archived' in the CHECK, no duration_source.
        conn.execute_batch(
            "CREATE TABLE projects (
                id TEXT PRIMARY KEY, short_id TEXT NOT NULL DEFAULT '',
                name TEXT NOT NULL, domain TEXT NOT NULL DEFAULT '',
                start_date TEXT NOT NULL, target_date TEXT,
                status TEXT NOT NULL DEFAULT 'active'
                    CHECK (status IN ('active','paused','done','archived')),
                archived_at TEXT, created_at TEXT NOT NULL, updated_at TEXT NOT NULL);
             CREATE TABLE plan_nodes (
                id TEXT PRIMARY KEY,
                project_id TEXT NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
                parent_id TEXT REFERENCES plan_nodes(id) ON DELETE CASCADE,
                title TEXT NOT NULL, kind TEXT NOT NULL DEFAULT 'generic',
                order_index INTEGER NOT NULL DEFAULT 0,
                due_date TEXT, not_before TEXT, not_after TEXT,
                seq INTEGER NOT NULL, is_default INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL, updated_at TEXT NOT NULL);
             CREATE TABLE work_items (
                id TEXT PRIMARY KEY,
                node_id TEXT NOT NULL REFERENCES plan_nodes(id) ON DELETE CASCADE,
                seq INTEGER NOT NULL, title TEXT NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                item_type TEXT NOT NULL DEFAULT 'task',
                status TEXT NOT NULL DEFAULT 'todo'
                    CHECK (status IN ('todo','in_progress','done','skipped')),
                archived_at TEXT, completed_at TEXT,
                duration_mode TEXT NOT NULL DEFAULT 'estimate',
                planned_min INTEGER NOT NULL DEFAULT 0,
                logged_min INTEGER NOT NULL DEFAULT 0,
                estimate_confidence REAL NOT NULL DEFAULT 0.5,
                min_session_min INTEGER NOT NULL DEFAULT 15,
                max_session_min INTEGER NOT NULL DEFAULT 60,
                default_session_min INTEGER NOT NULL DEFAULT 30,
                splittable INTEGER NOT NULL DEFAULT 1,
                units_kind TEXT, units_total INTEGER, units_done INTEGER,
                due_date TEXT, not_before TEXT,
                created_at TEXT NOT NULL, updated_at TEXT NOT NULL);
             INSERT INTO projects (id, name, start_date, created_at, updated_at)
                VALUES ('p1', 'Latin', '2026-01-01', 't', 't');
             INSERT INTO plan_nodes (id, project_id, title, seq, created_at, updated_at)
                VALUES ('n1', 'p1', 'Week 1', 1, 't', 't');
             INSERT INTO work_items (id, node_id, seq, title, created_at, updated_at)
                VALUES ('wi1', 'n1', 2, 'Read chapter', 't', 't');",
        )
        .unwrap();

        apply(&conn).unwrap();

        // Old row survived, new status value is accepted.
        let title: String = conn
            .query_row("SELECT title FROM work_items WHERE id = 'wi1'", [], |r| {
                r.get(0)
            })
            .unwrap();
        assert_eq!(title, "Read chapter");
        conn.execute("UPDATE work_items SET status = 'archived' WHERE id = 'wi1'", [])
            .unwrap();
        let fk_on: i64 = conn
            .query_row("PRAGMA foreign_keys", [], |r| r.get(0))
            .unwrap();
        assert_eq!(fk_on, 1);
    }

    fn dump_schema(conn: &Connection) -> Vec<String> {
        let mut stmt = conn
            .prepare("SELECT COALESCE(sql,'') FROM sqlite_master ORDER BY name")
            .unwrap();
        stmt.query_map([], |row| row.get::<_, String>(0))
            .unwrap()
            .collect::<Result<Vec<_>, _>>()
            .unwrap()
    }
}
