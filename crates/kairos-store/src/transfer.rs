// Project bundle export/import.
//
// A bundle is the structural identity of one project: the project row,
// its node tree, its work items and its dependency edges, ids included.
// Importing a bundle into a fresh store and exporting it again yields
// the same bundle. Session history is deliberately not part of a
// bundle; it describes what happened, not what the project is.

use std::collections::HashSet;

use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};

use kairos_types::{Dependency, PlanNode, Project, WorkItem};

use crate::error::{StoreError, StoreResult};
use crate::repo::{dependencies, items, nodes, projects};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectBundle {
    pub project: Project,
    pub nodes: Vec<PlanNode>,
    pub items: Vec<WorkItem>,
    pub dependencies: Vec<Dependency>,
}

pub fn export_project(conn: &Connection, project_id: &str) -> StoreResult<ProjectBundle> {
    let project = projects::get(conn, project_id)?;
    let nodes = nodes::list_for_project(conn, project_id)?;

    let mut bundle_items = Vec::new();
    for node in &nodes {
        bundle_items.extend(items::list_for_node(conn, &node.id)?);
    }
    bundle_items.sort_by(|a, b| a.id.cmp(&b.id));

    let mut stmt = conn.prepare(
        "SELECT d.predecessor_id, d.successor_id
         FROM dependencies d
         JOIN work_items wi ON wi.id = d.predecessor_id
         JOIN plan_nodes n ON wi.node_id = n.id
         WHERE n.project_id = ?1
         ORDER BY d.predecessor_id, d.successor_id",
    )?;
    let bundle_dependencies = stmt
        .query_map(params![project_id], |row| {
            Ok(Dependency {
                predecessor_id: row.get(0)?,
                successor_id: row.get(1)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(ProjectBundle {
        project,
        nodes,
        items: bundle_items,
        dependencies: bundle_dependencies,
    })
}

/// Insert a whole bundle. Runs inside the caller's unit of work, so a
/// half-imported bundle never survives a failure. Ids are round-tripped
/// verbatim; an existing project with the same id is a Conflict.
pub fn import_project(conn: &Connection, bundle: &ProjectBundle) -> StoreResult<()> {
    projects::insert(conn, &bundle.project)?;

    // parents before children; the node repo verifies each parent link
    let mut inserted: HashSet<&str> = HashSet::new();
    while inserted.len() < bundle.nodes.len() {
        let mut progressed = false;
        for node in &bundle.nodes {
            if inserted.contains(node.id.as_str()) {
                continue;
            }
            let parent_ready = node
                .parent_id
                .as_deref()
                .map_or(true, |parent| inserted.contains(parent));
            if parent_ready {
                nodes::insert(conn, node)?;
                inserted.insert(node.id.as_str());
                progressed = true;
            }
        }
        if !progressed {
            return Err(StoreError::Validation(
                "bundle node tree has a dangling or cyclic parent link".into(),
            ));
        }
    }

    for item in &bundle.items {
        items::insert(conn, item)?;
    }
    for dependency in &bundle.dependencies {
        dependencies::insert(conn, dependency)?;
    }
    Ok(())
}
