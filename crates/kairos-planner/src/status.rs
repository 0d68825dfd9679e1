// Per-project risk and progress, the GetStatus surface.

use std::collections::HashMap;

use chrono::{Duration, NaiveDate};

use kairos_store::queries;
use kairos_store::repo::{profile, projects};
use kairos_store::Store;
use kairos_types::{ProjectStatus, ProjectStatusRow, StatusResponse};

use crate::recommend::RECENT_WINDOW_DAYS;
use crate::risk::{self, RiskInput};
use crate::PlanResult;

pub async fn status(
    store: &Store,
    project_scope: Option<&str>,
    now: NaiveDate,
) -> PlanResult<StatusResponse> {
    let scope = project_scope.map(|s| s.to_string());
    let rows = store
        .read(move |conn| {
            let user = profile::get(conn)?;
            let listed = match &scope {
                Some(key) => vec![projects::resolve(conn, key)?],
                None => projects::list(conn, false)?,
            };
            let since = now - Duration::days(RECENT_WINDOW_DAYS - 1);
            let recent: HashMap<String, i64> = queries::recent_minutes_by_project(conn, since)?;

            let mut rows = Vec::new();
            for project in listed {
                if project.status == ProjectStatus::Archived {
                    continue;
                }
                let agg = queries::completion_aggregates(conn, &project.id, now)?;
                let recent_daily =
                    *recent.get(&project.id).unwrap_or(&0) as f64 / RECENT_WINDOW_DAYS as f64;
                let progress_pct = if agg.planned_min_total > 0 {
                    (agg.logged_min_total as f64 / agg.planned_min_total as f64).clamp(0.0, 1.0)
                } else {
                    0.0
                };
                let time_elapsed_pct = match project.target_date {
                    Some(target) => {
                        let span = (target - project.start_date).num_days();
                        if span <= 0 {
                            0.0
                        } else {
                            ((now - project.start_date).num_days() as f64 / span as f64)
                                .clamp(0.0, 1.0)
                        }
                    }
                    None => 0.0,
                };
                let due_based_expected_pct = if agg.planned_min_total > 0 {
                    (agg.planned_min_due_by as f64 / agg.planned_min_total as f64).clamp(0.0, 1.0)
                } else {
                    0.0
                };
                let input = RiskInput {
                    now,
                    target_date: project.target_date,
                    planned_min: agg.planned_min_total,
                    logged_min: agg.logged_min_total,
                    buffer_pct: user.buffer_pct,
                    recent_daily_min: recent_daily,
                    progress_pct,
                    time_elapsed_pct,
                    due_based_expected_pct,
                };
                rows.push(ProjectStatusRow {
                    risk: risk::classify(&project.id, &project.name, &input),
                    items_total: agg.items_total,
                    items_done: agg.items_done,
                    items_skipped: agg.items_skipped,
                    planned_min_total: agg.planned_min_total,
                    logged_min_total: agg.logged_min_total,
                });
            }
            rows.sort_by(|a, b| {
                a.risk
                    .level
                    .priority()
                    .cmp(&b.risk.level.priority())
                    .then_with(|| a.risk.project_name.cmp(&b.risk.project_name))
            });
            Ok(rows)
        })
        .await?;
    Ok(StatusResponse { projects: rows })
}
