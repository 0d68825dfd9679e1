use rusqlite::{params, Connection, OptionalExtension, Row};

use kairos_types::{WorkItemStatus, WorkSessionLog};

use crate::error::{StoreError, StoreResult};
use crate::repo::items;

use super::{parse_ts, ts_to_sql};

const COLUMNS: &str = "id, work_item_id, started_at, minutes, units_done_delta, note, created_at";

/// Record a sitting and fold it into the parent item: logged minutes
/// accrue, unit progress advances (capped at units_total), and a todo
/// item moves to in_progress. One unit of work, one consistent view.
pub fn log(conn: &Connection, entry: &WorkSessionLog) -> StoreResult<()> {
    if entry.minutes <= 0 {
        return Err(StoreError::Validation("session minutes must be > 0".into()));
    }
    if entry.units_done_delta < 0 {
        return Err(StoreError::Validation(
            "units_done_delta must be >= 0".into(),
        ));
    }

    let mut item = items::get(conn, &entry.work_item_id)?;

    conn.execute(
        &format!("INSERT INTO work_session_logs ({COLUMNS}) VALUES (?1,?2,?3,?4,?5,?6,?7)"),
        params![
            entry.id,
            entry.work_item_id,
            ts_to_sql(&entry.started_at),
            entry.minutes,
            entry.units_done_delta,
            entry.note,
            ts_to_sql(&entry.created_at),
        ],
    )?;

    item.logged_min += entry.minutes;
    if entry.units_done_delta > 0 {
        let done = item.units.units_done.unwrap_or(0) + entry.units_done_delta;
        item.units.units_done = Some(match item.units.units_total {
            Some(total) => done.min(total),
            None => done,
        });
    }
    if item.status == WorkItemStatus::Todo {
        item.status = WorkItemStatus::InProgress;
    }
    item.updated_at = entry.created_at;
    items::update(conn, &item)
}

/// Correction path: remove the log row and back its minutes out of the
/// parent item (floored at zero).
pub fn delete(conn: &Connection, log_id: &str) -> StoreResult<()> {
    let entry = get(conn, log_id)?;
    conn.execute("DELETE FROM work_session_logs WHERE id = ?1", params![log_id])?;

    let mut item = items::get(conn, &entry.work_item_id)?;
    item.logged_min = (item.logged_min - entry.minutes).max(0);
    if entry.units_done_delta > 0 {
        let done = item.units.units_done.unwrap_or(0) - entry.units_done_delta;
        item.units.units_done = Some(done.max(0));
    }
    items::update(conn, &item)
}

pub fn get(conn: &Connection, id: &str) -> StoreResult<WorkSessionLog> {
    conn.query_row(
        &format!("SELECT {COLUMNS} FROM work_session_logs WHERE id = ?1"),
        params![id],
        row_to_log,
    )
    .optional()?
    .ok_or_else(|| StoreError::NotFound(format!("session log {id}")))
}

pub fn list_for_item(conn: &Connection, work_item_id: &str) -> StoreResult<Vec<WorkSessionLog>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {COLUMNS} FROM work_session_logs
         WHERE work_item_id = ?1 ORDER BY started_at DESC"
    ))?;
    let rows = stmt
        .query_map(params![work_item_id], row_to_log)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn row_to_log(row: &Row) -> Result<WorkSessionLog, rusqlite::Error> {
    Ok(WorkSessionLog {
        id: row.get(0)?,
        work_item_id: row.get(1)?,
        started_at: parse_ts(2, row.get(2)?)?,
        minutes: row.get(3)?,
        units_done_delta: row.get(4)?,
        note: row.get(5)?,
        created_at: parse_ts(6, row.get(6)?)?,
    })
}
