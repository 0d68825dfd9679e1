use std::collections::{HashMap, HashSet};

use rusqlite::{params, Connection, OptionalExtension};

use kairos_types::Dependency;

use crate::error::{StoreError, StoreResult};

/// Insert a predecessor → successor edge.
///
/// Storage keeps the composite key only; same-project membership and
/// acyclicity are semantic requirements validated here, not by schema
/// constraints.
pub fn insert(conn: &Connection, dep: &Dependency) -> StoreResult<()> {
    if dep.predecessor_id == dep.successor_id {
        return Err(StoreError::Validation(
            "a work item cannot depend on itself".into(),
        ));
    }

    let pred_project = project_of_item(conn, &dep.predecessor_id)?;
    let succ_project = project_of_item(conn, &dep.successor_id)?;
    if pred_project != succ_project {
        return Err(StoreError::Validation(
            "dependencies must stay within one project".into(),
        ));
    }

    // Adding pred -> succ closes a cycle iff pred is already reachable
    // from succ along existing edges.
    let edges = project_edges(conn, &pred_project)?;
    let mut stack = vec![dep.successor_id.clone()];
    let mut seen = HashSet::new();
    while let Some(current) = stack.pop() {
        if current == dep.predecessor_id {
            return Err(StoreError::Validation(
                "dependency would create a cycle".into(),
            ));
        }
        if !seen.insert(current.clone()) {
            continue;
        }
        if let Some(nexts) = edges.get(&current) {
            stack.extend(nexts.iter().cloned());
        }
    }

    conn.execute(
        "INSERT INTO dependencies (predecessor_id, successor_id) VALUES (?1, ?2)",
        params![dep.predecessor_id, dep.successor_id],
    )?;
    Ok(())
}

pub fn remove(conn: &Connection, dep: &Dependency) -> StoreResult<()> {
    let changed = conn.execute(
        "DELETE FROM dependencies WHERE predecessor_id = ?1 AND successor_id = ?2",
        params![dep.predecessor_id, dep.successor_id],
    )?;
    if changed == 0 {
        return Err(StoreError::NotFound(format!(
            "dependency {} -> {}",
            dep.predecessor_id, dep.successor_id
        )));
    }
    Ok(())
}

pub fn list_for_item(conn: &Connection, work_item_id: &str) -> StoreResult<Vec<Dependency>> {
    let mut stmt = conn.prepare(
        "SELECT predecessor_id, successor_id FROM dependencies
         WHERE predecessor_id = ?1 OR successor_id = ?1
         ORDER BY predecessor_id, successor_id",
    )?;
    let rows = stmt
        .query_map(params![work_item_id], |row| {
            Ok(Dependency {
                predecessor_id: row.get(0)?,
                successor_id: row.get(1)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

fn project_of_item(conn: &Connection, work_item_id: &str) -> StoreResult<String> {
    conn.query_row(
        "SELECT n.project_id FROM work_items wi
         JOIN plan_nodes n ON wi.node_id = n.id
         WHERE wi.id = ?1",
        params![work_item_id],
        |row| row.get(0),
    )
    .optional()?
    .ok_or_else(|| StoreError::NotFound(format!("work item {work_item_id}")))
}

/// predecessor → successors adjacency for one project.
fn project_edges(conn: &Connection, project_id: &str) -> StoreResult<HashMap<String, Vec<String>>> {
    let mut stmt = conn.prepare(
        "SELECT d.predecessor_id, d.successor_id
         FROM dependencies d
         JOIN work_items wi ON wi.id = d.predecessor_id
         JOIN plan_nodes n ON wi.node_id = n.id
         WHERE n.project_id = ?1",
    )?;
    let mut edges: HashMap<String, Vec<String>> = HashMap::new();
    let rows = stmt.query_map(params![project_id], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
    })?;
    for row in rows {
        let (pred, succ) = row?;
        edges.entry(pred).or_default().push(succ);
    }
    Ok(edges)
}
