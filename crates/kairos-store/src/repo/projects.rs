use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};

use kairos_types::{Project, ProjectStatus};

use crate::error::{StoreError, StoreResult};

use super::{
    date_to_sql, opt_date_to_sql, opt_ts_to_sql, parse_date, parse_opt_date, parse_opt_ts,
    parse_ts, ts_to_sql,
};

const COLUMNS: &str = "id, short_id, name, domain, start_date, target_date, status, \
                       archived_at, created_at, updated_at";

pub fn insert(conn: &Connection, project: &Project) -> StoreResult<()> {
    validate(project)?;
    conn.execute(
        &format!("INSERT INTO projects ({COLUMNS}) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10)"),
        params![
            project.id,
            project.short_id,
            project.name,
            project.domain,
            date_to_sql(&project.start_date),
            opt_date_to_sql(&project.target_date),
            project.status.as_str(),
            opt_ts_to_sql(&project.archived_at),
            ts_to_sql(&project.created_at),
            ts_to_sql(&project.updated_at),
        ],
    )?;
    Ok(())
}

pub fn update(conn: &Connection, project: &Project) -> StoreResult<()> {
    validate(project)?;
    let changed = conn.execute(
        "UPDATE projects SET short_id = ?2, name = ?3, domain = ?4, start_date = ?5,
            target_date = ?6, status = ?7, archived_at = ?8, updated_at = ?9
         WHERE id = ?1",
        params![
            project.id,
            project.short_id,
            project.name,
            project.domain,
            date_to_sql(&project.start_date),
            opt_date_to_sql(&project.target_date),
            project.status.as_str(),
            opt_ts_to_sql(&project.archived_at),
            ts_to_sql(&project.updated_at),
        ],
    )?;
    if changed == 0 {
        return Err(StoreError::NotFound(format!("project {}", project.id)));
    }
    Ok(())
}

pub fn get(conn: &Connection, id: &str) -> StoreResult<Project> {
    conn.query_row(
        &format!("SELECT {COLUMNS} FROM projects WHERE id = ?1"),
        params![id],
        row_to_project,
    )
    .optional()?
    .ok_or_else(|| StoreError::NotFound(format!("project {id}")))
}

/// Resolve by id or by short_id; the shell accepts either.
pub fn resolve(conn: &Connection, key: &str) -> StoreResult<Project> {
    conn.query_row(
        &format!("SELECT {COLUMNS} FROM projects WHERE id = ?1 OR (short_id <> '' AND short_id = ?1)"),
        params![key],
        row_to_project,
    )
    .optional()?
    .ok_or_else(|| StoreError::NotFound(format!("project {key}")))
}

pub fn list(conn: &Connection, include_archived: bool) -> StoreResult<Vec<Project>> {
    let sql = if include_archived {
        format!("SELECT {COLUMNS} FROM projects ORDER BY name")
    } else {
        format!("SELECT {COLUMNS} FROM projects WHERE status <> 'archived' ORDER BY name")
    };
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([], row_to_project)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Flip to archived and stamp archived_at in one step, keeping the
/// archived_at-iff-archived invariant intact.
pub fn archive(conn: &Connection, id: &str) -> StoreResult<()> {
    let now = Utc::now();
    let changed = conn.execute(
        "UPDATE projects SET status = 'archived', archived_at = ?2, updated_at = ?2
         WHERE id = ?1",
        params![id, ts_to_sql(&now)],
    )?;
    if changed == 0 {
        return Err(StoreError::NotFound(format!("project {id}")));
    }
    Ok(())
}

/// Hard delete; nodes, items, dependencies and session logs cascade.
pub fn remove(conn: &Connection, id: &str) -> StoreResult<()> {
    let changed = conn.execute("DELETE FROM projects WHERE id = ?1", params![id])?;
    if changed == 0 {
        return Err(StoreError::NotFound(format!("project {id}")));
    }
    Ok(())
}

fn validate(project: &Project) -> StoreResult<()> {
    if project.name.trim().is_empty() {
        return Err(StoreError::Validation("project name must not be empty".into()));
    }
    if !Project::short_id_is_valid(&project.short_id) {
        return Err(StoreError::Validation(format!(
            "short_id `{}` must be 3-6 uppercase letters followed by 2-4 digits",
            project.short_id
        )));
    }
    if (project.status == ProjectStatus::Archived) != project.archived_at.is_some() {
        return Err(StoreError::Validation(
            "archived_at must be set iff status is archived".into(),
        ));
    }
    Ok(())
}

fn row_to_project(row: &Row) -> Result<Project, rusqlite::Error> {
    let status_raw: String = row.get(6)?;
    let status = ProjectStatus::parse(&status_raw).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            6,
            rusqlite::types::Type::Text,
            format!("unknown project status `{status_raw}`").into(),
        )
    })?;
    Ok(Project {
        id: row.get(0)?,
        short_id: row.get(1)?,
        name: row.get(2)?,
        domain: row.get(3)?,
        start_date: parse_date(4, row.get(4)?)?,
        target_date: parse_opt_date(5, row.get(5)?)?,
        status,
        archived_at: parse_opt_ts(7, row.get(7)?)?,
        created_at: parse_ts(8, row.get(8)?)?,
        updated_at: parse_ts(9, row.get(9)?)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Store;
    use chrono::NaiveDate;

    fn sample(id: &str, short_id: &str) -> Project {
        Project {
            id: id.to_string(),
            short_id: short_id.to_string(),
            name: format!("Project {id}"),
            domain: "study".into(),
            start_date: NaiveDate::from_ymd_opt(2026, 1, 1).unwrap(),
            target_date: Some(NaiveDate::from_ymd_opt(2026, 6, 1).unwrap()),
            status: ProjectStatus::Active,
            archived_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn insert_get_round_trip() {
        let store = Store::open_in_memory().await.unwrap();
        store
            .with_unit_of_work(|conn| insert(conn, &sample("p1", "LAT01")))
            .await
            .unwrap();
        let found = store.read(|conn| get(conn, "p1")).await.unwrap();
        assert_eq!(found.short_id, "LAT01");
        assert_eq!(found.start_date, NaiveDate::from_ymd_opt(2026, 1, 1).unwrap());
        assert_eq!(found.status, ProjectStatus::Active);
    }

    #[tokio::test]
    async fn duplicate_short_id_is_a_conflict() {
        let store = Store::open_in_memory().await.unwrap();
        store
            .with_unit_of_work(|conn| insert(conn, &sample("p1", "LAT01")))
            .await
            .unwrap();
        let err = store
            .with_unit_of_work(|conn| insert(conn, &sample("p2", "LAT01")))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn empty_short_ids_do_not_conflict() {
        let store = Store::open_in_memory().await.unwrap();
        store
            .with_unit_of_work(|conn| {
                insert(conn, &sample("p1", ""))?;
                insert(conn, &sample("p2", ""))
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn bad_short_id_is_rejected() {
        let store = Store::open_in_memory().await.unwrap();
        let err = store
            .with_unit_of_work(|conn| insert(conn, &sample("p1", "lat01")))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));
    }

    #[tokio::test]
    async fn archive_stamps_timestamp() {
        let store = Store::open_in_memory().await.unwrap();
        store
            .with_unit_of_work(|conn| insert(conn, &sample("p1", "")))
            .await
            .unwrap();
        store
            .with_unit_of_work(|conn| archive(conn, "p1"))
            .await
            .unwrap();
        let found = store.read(|conn| get(conn, "p1")).await.unwrap();
        assert_eq!(found.status, ProjectStatus::Archived);
        assert!(found.archived_at.is_some());
    }

    #[tokio::test]
    async fn resolve_accepts_short_id() {
        let store = Store::open_in_memory().await.unwrap();
        store
            .with_unit_of_work(|conn| insert(conn, &sample("p1", "LAT01")))
            .await
            .unwrap();
        let found = store.read(|conn| resolve(conn, "LAT01")).await.unwrap();
        assert_eq!(found.id, "p1");
    }
}
