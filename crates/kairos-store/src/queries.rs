// Read queries the recommendation pipeline is built on. These run
// outside a unit of work (multi-row, read-only) but take `&Connection`
// like the repositories so they compose inside one when needed.

use std::collections::{HashMap, HashSet};

use chrono::NaiveDate;
use rusqlite::{params, params_from_iter, Connection};
use serde::{Deserialize, Serialize};

use kairos_types::CandidateRow;

use crate::error::StoreResult;
use crate::repo::items;
use crate::repo::{parse_date, parse_opt_date, DATE_FMT};

/// Per-project completion numbers feeding the risk classifier.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CompletionAggregates {
    pub items_total: i64,
    pub items_done: i64,
    pub items_skipped: i64,
    pub planned_min_total: i64,
    /// Sum of effective logged minutes (done items credited with at
    /// least their plan).
    pub logged_min_total: i64,
    /// Planned minutes of items whose effective due date is on or
    /// before the as-of date. Feeds the due-weighted expected-progress
    /// signal.
    pub planned_min_due_by: i64,
}

/// Recent minutes grouped by work item type; the variation signals in
/// status views read from this.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionTypeAggregate {
    pub item_type: String,
    pub minutes: i64,
    pub sessions: i64,
}

fn prefixed_item_columns() -> String {
    items::COLUMNS
        .split(", ")
        .map(|c| format!("wi.{}", c.trim()))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Schedulable candidates: non-terminal items of active, non-archived
/// projects, joined with the node and project columns the scorer needs.
/// Soft-archived items (archived_at set while the status is still
/// workable) are excluded unless asked for.
pub fn list_schedulable(
    conn: &Connection,
    project_scope: Option<&str>,
    include_soft_archived: bool,
) -> StoreResult<Vec<CandidateRow>> {
    let sql = format!(
        "SELECT {items}, n.id, n.title, n.due_date,
                p.id, p.name, p.domain, p.start_date, p.target_date
         FROM work_items wi
         JOIN plan_nodes n ON wi.node_id = n.id
         JOIN projects p ON n.project_id = p.id
         WHERE wi.status IN ('todo','in_progress')
           AND p.status = 'active'
           AND p.archived_at IS NULL
           AND (?1 OR wi.archived_at IS NULL)
           AND (?2 IS NULL OR p.id = ?2 OR (p.short_id <> '' AND p.short_id = ?2))
         ORDER BY p.name, n.order_index, wi.seq",
        items = prefixed_item_columns()
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(
            params![include_soft_archived as i64, project_scope],
            |row| {
                Ok(CandidateRow {
                    item: items::row_to_item(row)?,
                    node_id: row.get(25)?,
                    node_title: row.get(26)?,
                    node_due_date: parse_opt_date(27, row.get(27)?)?,
                    project_id: row.get(28)?,
                    project_name: row.get(29)?,
                    project_domain: row.get(30)?,
                    project_start_date: parse_date(31, row.get(31)?)?,
                    project_target_date: parse_opt_date(32, row.get(32)?)?,
                })
            },
        )?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Of the given candidate ids, the subset with at least one predecessor
/// that is not done, skipped or archived. One query for the whole batch.
pub fn blocked_item_ids(
    conn: &Connection,
    candidate_ids: &[String],
) -> StoreResult<HashSet<String>> {
    if candidate_ids.is_empty() {
        return Ok(HashSet::new());
    }
    let placeholders = (1..=candidate_ids.len())
        .map(|i| format!("?{i}"))
        .collect::<Vec<_>>()
        .join(",");
    let sql = format!(
        "SELECT DISTINCT d.successor_id
         FROM dependencies d
         JOIN work_items pred ON pred.id = d.predecessor_id
         WHERE d.successor_id IN ({placeholders})
           AND pred.status NOT IN ('done','skipped','archived')"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params_from_iter(candidate_ids.iter()), |row| {
            row.get::<_, String>(0)
        })?
        .collect::<Result<HashSet<_>, _>>()?;
    Ok(rows)
}

/// Completion aggregates for one project, as of a calendar day.
/// Archived items are out of every sum.
pub fn completion_aggregates(
    conn: &Connection,
    project_id: &str,
    as_of: NaiveDate,
) -> StoreResult<CompletionAggregates> {
    let as_of_sql = as_of.format(DATE_FMT).to_string();
    let agg = conn.query_row(
        "SELECT
            COUNT(*),
            COALESCE(SUM(CASE WHEN wi.status = 'done' THEN 1 ELSE 0 END), 0),
            COALESCE(SUM(CASE WHEN wi.status = 'skipped' THEN 1 ELSE 0 END), 0),
            COALESCE(SUM(wi.planned_min), 0),
            COALESCE(SUM(CASE WHEN wi.status = 'done'
                             THEN MAX(wi.logged_min, wi.planned_min)
                             ELSE wi.logged_min END), 0),
            COALESCE(SUM(CASE
                WHEN COALESCE(
                        CASE WHEN wi.due_date IS NOT NULL AND n.due_date IS NOT NULL
                             THEN MIN(wi.due_date, n.due_date)
                             ELSE COALESCE(wi.due_date, n.due_date) END,
                        '9999-12-31') <= ?2
                THEN wi.planned_min ELSE 0 END), 0)
         FROM work_items wi
         JOIN plan_nodes n ON wi.node_id = n.id
         WHERE n.project_id = ?1 AND wi.status <> 'archived'",
        params![project_id, as_of_sql],
        |row| {
            Ok(CompletionAggregates {
                items_total: row.get(0)?,
                items_done: row.get(1)?,
                items_skipped: row.get(2)?,
                planned_min_total: row.get(3)?,
                logged_min_total: row.get(4)?,
                planned_min_due_by: row.get(5)?,
            })
        },
    )?;
    Ok(agg)
}

/// Session minutes per project since a calendar day (inclusive).
pub fn recent_minutes_by_project(
    conn: &Connection,
    since: NaiveDate,
) -> StoreResult<HashMap<String, i64>> {
    let since_sql = since.format(DATE_FMT).to_string();
    let mut stmt = conn.prepare(
        "SELECT n.project_id, COALESCE(SUM(l.minutes), 0)
         FROM work_session_logs l
         JOIN work_items wi ON l.work_item_id = wi.id
         JOIN plan_nodes n ON wi.node_id = n.id
         WHERE date(l.started_at) >= ?1
         GROUP BY n.project_id",
    )?;
    let mut out = HashMap::new();
    let rows = stmt.query_map(params![since_sql], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
    })?;
    for row in rows {
        let (project_id, minutes) = row?;
        out.insert(project_id, minutes);
    }
    Ok(out)
}

/// Most recent session calendar day per project.
pub fn last_session_date_by_project(
    conn: &Connection,
) -> StoreResult<HashMap<String, NaiveDate>> {
    let mut stmt = conn.prepare(
        "SELECT n.project_id, MAX(date(l.started_at))
         FROM work_session_logs l
         JOIN work_items wi ON l.work_item_id = wi.id
         JOIN plan_nodes n ON wi.node_id = n.id
         GROUP BY n.project_id",
    )?;
    let mut out = HashMap::new();
    let rows = stmt.query_map([], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
    })?;
    for row in rows {
        let (project_id, raw) = row?;
        if let Ok(date) = NaiveDate::parse_from_str(&raw, DATE_FMT) {
            out.insert(project_id, date);
        }
    }
    Ok(out)
}

/// Recent minutes grouped by item type, optionally scoped to a project.
pub fn session_minutes_by_type(
    conn: &Connection,
    since: NaiveDate,
    project_scope: Option<&str>,
) -> StoreResult<Vec<SessionTypeAggregate>> {
    let since_sql = since.format(DATE_FMT).to_string();
    let mut stmt = conn.prepare(
        "SELECT wi.item_type, COALESCE(SUM(l.minutes), 0), COUNT(*)
         FROM work_session_logs l
         JOIN work_items wi ON l.work_item_id = wi.id
         JOIN plan_nodes n ON wi.node_id = n.id
         WHERE date(l.started_at) >= ?1
           AND (?2 IS NULL OR n.project_id = ?2)
         GROUP BY wi.item_type
         ORDER BY 2 DESC",
    )?;
    let rows = stmt
        .query_map(params![since_sql, project_scope], |row| {
            Ok(SessionTypeAggregate {
                item_type: row.get(0)?,
                minutes: row.get(1)?,
                sessions: row.get(2)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}
