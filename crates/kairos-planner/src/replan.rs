// Periodic re-plan: fold observed pace back into plans, then refresh
// risk. Touches planned_min and updated_at only; never status, never
// logged minutes.

use chrono::{DateTime, NaiveDate, Utc};
use tracing::info;

use kairos_store::repo::items;
use kairos_store::Store;
use kairos_types::{ReplanResponse, ReplanUpdate};

use crate::estimate;
use crate::status;
use crate::PlanResult;

pub async fn run(
    store: &Store,
    project_scope: Option<&str>,
    now: NaiveDate,
    now_ts: DateTime<Utc>,
) -> PlanResult<ReplanResponse> {
    let scope = project_scope.map(|s| s.to_string());
    let updates = store
        .with_unit_of_work(move |conn| {
            let candidates = items::list_reestimate_candidates(conn, scope.as_deref())?;
            let mut updates = Vec::new();
            for item in candidates {
                let Some(new_planned) = estimate::reestimate(&item) else {
                    continue;
                };
                if new_planned == item.planned_min {
                    continue;
                }
                items::apply_reestimate(conn, &item.id, new_planned, now_ts)?;
                updates.push(ReplanUpdate {
                    work_item_id: item.id.clone(),
                    title: item.title.clone(),
                    old_planned_min: item.planned_min,
                    new_planned_min: new_planned,
                });
            }
            Ok(updates)
        })
        .await?;

    if !updates.is_empty() {
        info!(count = updates.len(), "replan adjusted work item estimates");
    }

    let risks = status::status(store, project_scope, now)
        .await?
        .projects
        .into_iter()
        .map(|row| row.risk)
        .collect();

    Ok(ReplanResponse { updates, risks })
}

#[cfg(test)]
mod tests {
    use super::*;
    use kairos_store::repo::{nodes, projects, sessions};
    use kairos_types::{
        DurationMode, NodeKind, PlanNode, Project, ProjectStatus, SessionPolicy, UnitTracking,
        WorkItem, WorkItemStatus, WorkSessionLog,
    };

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    async fn seed(store: &Store) {
        store
            .with_unit_of_work(|conn| {
                projects::insert(
                    conn,
                    &Project {
                        id: "p1".into(),
                        short_id: String::new(),
                        name: "Latin".into(),
                        domain: "study".into(),
                        start_date: date(2026, 1, 1),
                        target_date: None,
                        status: ProjectStatus::Active,
                        archived_at: None,
                        created_at: Utc::now(),
                        updated_at: Utc::now(),
                    },
                )?;
                nodes::insert(
                    conn,
                    &PlanNode {
                        id: "n1".into(),
                        project_id: "p1".into(),
                        parent_id: None,
                        title: "Book 1".into(),
                        kind: NodeKind::Book,
                        order_index: 0,
                        due_date: None,
                        not_before: None,
                        not_after: None,
                        planned_min_budget: None,
                        seq: 1,
                        is_default: true,
                        created_at: Utc::now(),
                        updated_at: Utc::now(),
                    },
                )?;
                items::insert(
                    conn,
                    &WorkItem {
                        id: "wi1".into(),
                        node_id: "n1".into(),
                        seq: 2,
                        title: "Read book".into(),
                        description: String::new(),
                        item_type: "reading".into(),
                        status: WorkItemStatus::Todo,
                        archived_at: None,
                        completed_at: None,
                        duration_mode: DurationMode::Estimate,
                        planned_min: 200,
                        logged_min: 0,
                        duration_source: "manual".into(),
                        estimate_confidence: 0.5,
                        session: SessionPolicy::default(),
                        splittable: true,
                        units: UnitTracking {
                            units_kind: Some("pages".into()),
                            units_total: Some(100),
                            units_done: Some(0),
                        },
                        due_date: None,
                        not_before: None,
                        created_at: Utc::now(),
                        updated_at: Utc::now(),
                    },
                )
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn replan_applies_pace_and_keeps_status() {
        let store = Store::open_in_memory().await.unwrap();
        seed(&store).await;
        // 60 minutes over 20 pages -> implied 300 total
        store
            .with_unit_of_work(|conn| {
                sessions::log(
                    conn,
                    &WorkSessionLog {
                        id: "s1".into(),
                        work_item_id: "wi1".into(),
                        started_at: Utc::now(),
                        minutes: 60,
                        units_done_delta: 20,
                        note: None,
                        created_at: Utc::now(),
                    },
                )
            })
            .await
            .unwrap();

        let response = run(&store, None, date(2026, 2, 1), Utc::now())
            .await
            .unwrap();
        assert_eq!(response.updates.len(), 1);
        let update = &response.updates[0];
        assert_eq!(update.old_planned_min, 200);
        // 0.7 * 200 + 0.3 * 300 = 230
        assert_eq!(update.new_planned_min, 230);

        let item = store
            .read(|conn| items::get(conn, "wi1"))
            .await
            .unwrap();
        assert_eq!(item.planned_min, 230);
        assert_eq!(item.logged_min, 60);
        assert_eq!(item.status, WorkItemStatus::InProgress); // from the log, not the replan
        assert_eq!(item.duration_source, "reestimate");
        assert_eq!(response.risks.len(), 1);
    }

    #[tokio::test]
    async fn replan_without_pace_changes_nothing() {
        let store = Store::open_in_memory().await.unwrap();
        seed(&store).await;
        let response = run(&store, None, date(2026, 2, 1), Utc::now())
            .await
            .unwrap();
        assert!(response.updates.is_empty());
        let item = store
            .read(|conn| items::get(conn, "wi1"))
            .await
            .unwrap();
        assert_eq!(item.planned_min, 200);
    }

    #[tokio::test]
    async fn replan_is_idempotent_until_new_sessions_arrive() {
        let store = Store::open_in_memory().await.unwrap();
        seed(&store).await;
        store
            .with_unit_of_work(|conn| {
                sessions::log(
                    conn,
                    &WorkSessionLog {
                        id: "s1".into(),
                        work_item_id: "wi1".into(),
                        started_at: Utc::now(),
                        minutes: 60,
                        units_done_delta: 20,
                        note: None,
                        created_at: Utc::now(),
                    },
                )
            })
            .await
            .unwrap();
        let first = run(&store, None, date(2026, 2, 1), Utc::now())
            .await
            .unwrap();
        assert_eq!(first.updates.len(), 1);
        // Second pass re-blends from the already-adjusted plan:
        // 0.7 * 230 + 0.3 * 300 = 251, then convergence toward 300.
        let second = run(&store, None, date(2026, 2, 1), Utc::now())
            .await
            .unwrap();
        assert_eq!(second.updates.len(), 1);
        assert_eq!(second.updates[0].old_planned_min, 230);
        assert_eq!(second.updates[0].new_planned_min, 251);
    }
}
