use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use kairos_types::{DurationMode, SessionPolicy, UnitTracking, WorkItem, WorkItemStatus};

use crate::error::{StoreError, StoreResult};

use super::{opt_date_to_sql, opt_ts_to_sql, parse_opt_date, parse_opt_ts, parse_ts, ts_to_sql};

pub(crate) const COLUMNS: &str =
    "id, node_id, seq, title, description, item_type, status, archived_at, completed_at, \
     duration_mode, planned_min, logged_min, duration_source, estimate_confidence, \
     min_session_min, max_session_min, default_session_min, splittable, \
     units_kind, units_total, units_done, due_date, not_before, created_at, updated_at";

pub fn insert(conn: &Connection, item: &WorkItem) -> StoreResult<()> {
    item.validate().map_err(StoreError::Validation)?;
    conn.execute(
        &format!(
            "INSERT INTO work_items ({COLUMNS})
             VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15,?16,?17,?18,?19,?20,?21,?22,?23,?24,?25)"
        ),
        params![
            item.id,
            item.node_id,
            item.seq,
            item.title,
            item.description,
            item.item_type,
            item.status.as_str(),
            opt_ts_to_sql(&item.archived_at),
            opt_ts_to_sql(&item.completed_at),
            item.duration_mode.as_str(),
            item.planned_min,
            item.logged_min,
            item.duration_source,
            item.estimate_confidence,
            item.session.min_session_min,
            item.session.max_session_min,
            item.session.default_session_min,
            item.splittable as i64,
            item.units.units_kind,
            item.units.units_total,
            item.units.units_done,
            opt_date_to_sql(&item.due_date),
            opt_date_to_sql(&item.not_before),
            ts_to_sql(&item.created_at),
            ts_to_sql(&item.updated_at),
        ],
    )?;
    Ok(())
}

pub fn update(conn: &Connection, item: &WorkItem) -> StoreResult<()> {
    item.validate().map_err(StoreError::Validation)?;
    let changed = conn.execute(
        "UPDATE work_items SET
            title = ?2, description = ?3, item_type = ?4, status = ?5,
            archived_at = ?6, completed_at = ?7, duration_mode = ?8,
            planned_min = ?9, logged_min = ?10, duration_source = ?11,
            estimate_confidence = ?12, min_session_min = ?13, max_session_min = ?14,
            default_session_min = ?15, splittable = ?16, units_kind = ?17,
            units_total = ?18, units_done = ?19, due_date = ?20, not_before = ?21,
            updated_at = ?22
         WHERE id = ?1",
        params![
            item.id,
            item.title,
            item.description,
            item.item_type,
            item.status.as_str(),
            opt_ts_to_sql(&item.archived_at),
            opt_ts_to_sql(&item.completed_at),
            item.duration_mode.as_str(),
            item.planned_min,
            item.logged_min,
            item.duration_source,
            item.estimate_confidence,
            item.session.min_session_min,
            item.session.max_session_min,
            item.session.default_session_min,
            item.splittable as i64,
            item.units.units_kind,
            item.units.units_total,
            item.units.units_done,
            opt_date_to_sql(&item.due_date),
            opt_date_to_sql(&item.not_before),
            ts_to_sql(&item.updated_at),
        ],
    )?;
    if changed == 0 {
        return Err(StoreError::NotFound(format!("work item {}", item.id)));
    }
    Ok(())
}

pub fn get(conn: &Connection, id: &str) -> StoreResult<WorkItem> {
    conn.query_row(
        &format!("SELECT {COLUMNS} FROM work_items WHERE id = ?1"),
        params![id],
        row_to_item,
    )
    .optional()?
    .ok_or_else(|| StoreError::NotFound(format!("work item {id}")))
}

pub fn list_for_node(conn: &Connection, node_id: &str) -> StoreResult<Vec<WorkItem>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {COLUMNS} FROM work_items WHERE node_id = ?1 ORDER BY seq"
    ))?;
    let rows = stmt
        .query_map(params![node_id], row_to_item)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Status transition keeping the completed_at-iff-done invariant.
pub fn set_status(
    conn: &Connection,
    id: &str,
    status: WorkItemStatus,
    now: DateTime<Utc>,
) -> StoreResult<()> {
    let mut item = get(conn, id)?;
    item.status = status;
    item.completed_at = match status {
        WorkItemStatus::Done => Some(item.completed_at.unwrap_or(now)),
        _ => None,
    };
    item.archived_at = match status {
        WorkItemStatus::Archived => Some(item.archived_at.unwrap_or(now)),
        _ => item.archived_at,
    };
    item.updated_at = now;
    update(conn, &item)
}

/// Re-planner write path: plan and stamp only, never status or logged
/// minutes.
pub fn apply_reestimate(
    conn: &Connection,
    id: &str,
    new_planned_min: i64,
    now: DateTime<Utc>,
) -> StoreResult<()> {
    let changed = conn.execute(
        "UPDATE work_items SET planned_min = ?2, duration_source = 'reestimate',
            updated_at = ?3
         WHERE id = ?1",
        params![id, new_planned_min, ts_to_sql(&now)],
    )?;
    if changed == 0 {
        return Err(StoreError::NotFound(format!("work item {id}")));
    }
    Ok(())
}

/// Dependencies (either endpoint) and session logs cascade.
pub fn remove(conn: &Connection, id: &str) -> StoreResult<()> {
    let changed = conn.execute("DELETE FROM work_items WHERE id = ?1", params![id])?;
    if changed == 0 {
        return Err(StoreError::NotFound(format!("work item {id}")));
    }
    Ok(())
}

/// Items the re-estimator may touch: unit-tracked, estimate-mode,
/// non-terminal, with observed pace.
pub fn list_reestimate_candidates(
    conn: &Connection,
    project_id: Option<&str>,
) -> StoreResult<Vec<WorkItem>> {
    let sql = format!(
        "SELECT {COLUMNS} FROM work_items wi
         WHERE wi.status IN ('todo','in_progress')
           AND wi.duration_mode = 'estimate'
           AND COALESCE(wi.units_total, 0) > 0
           AND COALESCE(wi.units_done, 0) > 0
           AND (?1 IS NULL OR wi.node_id IN
                (SELECT id FROM plan_nodes WHERE project_id = ?1))
         ORDER BY wi.id"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params![project_id], row_to_item)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub(crate) fn row_to_item(row: &Row) -> Result<WorkItem, rusqlite::Error> {
    let status_raw: String = row.get(6)?;
    let status = WorkItemStatus::parse(&status_raw).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            6,
            rusqlite::types::Type::Text,
            format!("unknown work item status `{status_raw}`").into(),
        )
    })?;
    let mode_raw: String = row.get(9)?;
    let duration_mode = DurationMode::parse(&mode_raw).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            9,
            rusqlite::types::Type::Text,
            format!("unknown duration mode `{mode_raw}`").into(),
        )
    })?;
    Ok(WorkItem {
        id: row.get(0)?,
        node_id: row.get(1)?,
        seq: row.get(2)?,
        title: row.get(3)?,
        description: row.get(4)?,
        item_type: row.get(5)?,
        status,
        archived_at: parse_opt_ts(7, row.get(7)?)?,
        completed_at: parse_opt_ts(8, row.get(8)?)?,
        duration_mode,
        planned_min: row.get(10)?,
        logged_min: row.get(11)?,
        duration_source: row.get(12)?,
        estimate_confidence: row.get(13)?,
        session: SessionPolicy {
            min_session_min: row.get(14)?,
            max_session_min: row.get(15)?,
            default_session_min: row.get(16)?,
        },
        splittable: row.get::<_, i64>(17)? != 0,
        units: UnitTracking {
            units_kind: row.get(18)?,
            units_total: row.get(19)?,
            units_done: row.get(20)?,
        },
        due_date: parse_opt_date(21, row.get(21)?)?,
        not_before: parse_opt_date(22, row.get(22)?)?,
        created_at: parse_ts(23, row.get(23)?)?,
        updated_at: parse_ts(24, row.get(24)?)?,
    })
}
