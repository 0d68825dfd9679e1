use rusqlite::{params, Connection, OptionalExtension, Row};

use kairos_types::{NodeKind, PlanNode};

use crate::error::{StoreError, StoreResult};

use super::{opt_date_to_sql, parse_opt_date, parse_ts, ts_to_sql};

const COLUMNS: &str = "id, project_id, parent_id, title, kind, order_index, due_date, \
                       not_before, not_after, planned_min_budget, seq, is_default, \
                       created_at, updated_at";

pub fn insert(conn: &Connection, node: &PlanNode) -> StoreResult<()> {
    validate(conn, node)?;
    conn.execute(
        &format!(
            "INSERT INTO plan_nodes ({COLUMNS})
             VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14)"
        ),
        params![
            node.id,
            node.project_id,
            node.parent_id,
            node.title,
            node.kind.as_str(),
            node.order_index,
            opt_date_to_sql(&node.due_date),
            opt_date_to_sql(&node.not_before),
            opt_date_to_sql(&node.not_after),
            node.planned_min_budget,
            node.seq,
            node.is_default as i64,
            ts_to_sql(&node.created_at),
            ts_to_sql(&node.updated_at),
        ],
    )?;
    Ok(())
}

pub fn update(conn: &Connection, node: &PlanNode) -> StoreResult<()> {
    validate(conn, node)?;
    let changed = conn.execute(
        "UPDATE plan_nodes SET parent_id = ?2, title = ?3, kind = ?4, order_index = ?5,
            due_date = ?6, not_before = ?7, not_after = ?8, planned_min_budget = ?9,
            is_default = ?10, updated_at = ?11
         WHERE id = ?1",
        params![
            node.id,
            node.parent_id,
            node.title,
            node.kind.as_str(),
            node.order_index,
            opt_date_to_sql(&node.due_date),
            opt_date_to_sql(&node.not_before),
            opt_date_to_sql(&node.not_after),
            node.planned_min_budget,
            node.is_default as i64,
            ts_to_sql(&node.updated_at),
        ],
    )?;
    if changed == 0 {
        return Err(StoreError::NotFound(format!("plan node {}", node.id)));
    }
    Ok(())
}

pub fn get(conn: &Connection, id: &str) -> StoreResult<PlanNode> {
    conn.query_row(
        &format!("SELECT {COLUMNS} FROM plan_nodes WHERE id = ?1"),
        params![id],
        row_to_node,
    )
    .optional()?
    .ok_or_else(|| StoreError::NotFound(format!("plan node {id}")))
}

pub fn list_for_project(conn: &Connection, project_id: &str) -> StoreResult<Vec<PlanNode>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {COLUMNS} FROM plan_nodes WHERE project_id = ?1
         ORDER BY order_index, seq"
    ))?;
    let rows = stmt
        .query_map(params![project_id], row_to_node)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// The node new items land under when the caller names none.
pub fn default_for_project(conn: &Connection, project_id: &str) -> StoreResult<Option<PlanNode>> {
    let node = conn
        .query_row(
            &format!(
                "SELECT {COLUMNS} FROM plan_nodes
                 WHERE project_id = ?1 AND is_default = 1
                 ORDER BY order_index LIMIT 1"
            ),
            params![project_id],
            row_to_node,
        )
        .optional()?;
    Ok(node)
}

/// Children and their items cascade.
pub fn remove(conn: &Connection, id: &str) -> StoreResult<()> {
    let changed = conn.execute("DELETE FROM plan_nodes WHERE id = ?1", params![id])?;
    if changed == 0 {
        return Err(StoreError::NotFound(format!("plan node {id}")));
    }
    Ok(())
}

/// Parent links must stay inside one project and must not form a cycle.
fn validate(conn: &Connection, node: &PlanNode) -> StoreResult<()> {
    if node.title.trim().is_empty() {
        return Err(StoreError::Validation("node title must not be empty".into()));
    }
    let Some(parent_id) = &node.parent_id else {
        return Ok(());
    };
    if parent_id == &node.id {
        return Err(StoreError::Validation("node cannot be its own parent".into()));
    }
    let parent = get(conn, parent_id)?;
    if parent.project_id != node.project_id {
        return Err(StoreError::Validation(
            "parent node belongs to a different project".into(),
        ));
    }
    // Walk up from the proposed parent; hitting the node itself would
    // close a cycle.
    let mut cursor = parent.parent_id;
    let mut hops = 0usize;
    while let Some(ancestor_id) = cursor {
        if ancestor_id == node.id {
            return Err(StoreError::Validation("node parent link forms a cycle".into()));
        }
        hops += 1;
        if hops > 10_000 {
            return Err(StoreError::Validation("node tree too deep".into()));
        }
        cursor = conn
            .query_row(
                "SELECT parent_id FROM plan_nodes WHERE id = ?1",
                params![ancestor_id],
                |row| row.get::<_, Option<String>>(0),
            )
            .optional()?
            .flatten();
    }
    Ok(())
}

fn row_to_node(row: &Row) -> Result<PlanNode, rusqlite::Error> {
    let kind_raw: String = row.get(4)?;
    let kind = NodeKind::parse(&kind_raw).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            4,
            rusqlite::types::Type::Text,
            format!("unknown node kind `{kind_raw}`").into(),
        )
    })?;
    Ok(PlanNode {
        id: row.get(0)?,
        project_id: row.get(1)?,
        parent_id: row.get(2)?,
        title: row.get(3)?,
        kind,
        order_index: row.get(5)?,
        due_date: parse_opt_date(6, row.get(6)?)?,
        not_before: parse_opt_date(7, row.get(7)?)?,
        not_after: parse_opt_date(8, row.get(8)?)?,
        planned_min_budget: row.get(9)?,
        seq: row.get(10)?,
        is_default: row.get::<_, i64>(11)? != 0,
        created_at: parse_ts(12, row.get(12)?)?,
        updated_at: parse_ts(13, row.get(13)?)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repo::projects;
    use crate::Store;
    use chrono::{NaiveDate, Utc};
    use kairos_types::{Project, ProjectStatus};

    fn project(id: &str) -> Project {
        Project {
            id: id.to_string(),
            short_id: String::new(),
            name: "Latin".into(),
            domain: "study".into(),
            start_date: NaiveDate::from_ymd_opt(2026, 1, 1).unwrap(),
            target_date: None,
            status: ProjectStatus::Active,
            archived_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn node(id: &str, project_id: &str, parent: Option<&str>, seq: i64) -> PlanNode {
        PlanNode {
            id: id.to_string(),
            project_id: project_id.to_string(),
            parent_id: parent.map(|s| s.to_string()),
            title: format!("Node {id}"),
            kind: NodeKind::Generic,
            order_index: seq,
            due_date: None,
            not_before: None,
            not_after: None,
            planned_min_budget: None,
            seq,
            is_default: false,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn insert_and_list_in_order() {
        let store = Store::open_in_memory().await.unwrap();
        store
            .with_unit_of_work(|conn| {
                projects::insert(conn, &project("p1"))?;
                insert(conn, &node("n2", "p1", None, 2))?;
                insert(conn, &node("n1", "p1", None, 1))
            })
            .await
            .unwrap();
        let nodes = store
            .read(|conn| list_for_project(conn, "p1"))
            .await
            .unwrap();
        assert_eq!(
            nodes.iter().map(|n| n.id.as_str()).collect::<Vec<_>>(),
            vec!["n1", "n2"]
        );
    }

    #[tokio::test]
    async fn parent_cycle_is_rejected() {
        let store = Store::open_in_memory().await.unwrap();
        store
            .with_unit_of_work(|conn| {
                projects::insert(conn, &project("p1"))?;
                insert(conn, &node("n1", "p1", None, 1))?;
                insert(conn, &node("n2", "p1", Some("n1"), 2))
            })
            .await
            .unwrap();
        // re-parenting n1 under n2 would close the loop
        let err = store
            .with_unit_of_work(|conn| {
                let mut n1 = get(conn, "n1")?;
                n1.parent_id = Some("n2".to_string());
                update(conn, &n1)
            })
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));
    }

    #[tokio::test]
    async fn cross_project_parent_is_rejected() {
        let store = Store::open_in_memory().await.unwrap();
        let mut other = project("p2");
        other.name = "Piano".into();
        store
            .with_unit_of_work(|conn| {
                projects::insert(conn, &project("p1"))?;
                projects::insert(conn, &other)?;
                insert(conn, &node("n1", "p1", None, 1))
            })
            .await
            .unwrap();
        let err = store
            .with_unit_of_work(|conn| insert(conn, &node("n2", "p2", Some("n1"), 1)))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));
    }

    #[tokio::test]
    async fn nodes_cascade_with_project() {
        let store = Store::open_in_memory().await.unwrap();
        store
            .with_unit_of_work(|conn| {
                projects::insert(conn, &project("p1"))?;
                insert(conn, &node("n1", "p1", None, 1))
            })
            .await
            .unwrap();
        store
            .with_unit_of_work(|conn| projects::remove(conn, "p1"))
            .await
            .unwrap();
        let found = store.read(|conn| get(conn, "n1")).await;
        assert!(matches!(found, Err(StoreError::NotFound(_))));
    }
}
