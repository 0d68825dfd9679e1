// One recommendation request, end to end: load candidates and
// per-project state, grade risk, score, sort, slice. The whole pass is
// a pure function of the store contents, the profile and the injected
// clock; nothing here consults wall time or randomness.

use std::collections::{HashMap, HashSet};

use chrono::{Duration, NaiveDate};
use tracing::debug;

use kairos_store::queries::{self, CompletionAggregates};
use kairos_store::repo::profile;
use kairos_store::Store;
use kairos_types::{
    codes, Blocker, CandidateRow, PlanningMode, RiskAssessment, RiskLevel, UserProfile,
    WhatNowResponse,
};

use crate::allocate;
use crate::risk::{self, RiskInput};
use crate::score::{self, ScoreInput, ScoreOutcome};
use crate::{PlanError, PlanResult};

/// Trailing window, in calendar days, for the recent-activity signal.
pub const RECENT_WINDOW_DAYS: i64 = 7;

#[derive(Debug, Clone)]
pub struct RecommendRequest {
    pub now: NaiveDate,
    pub available_min: i64,
    pub mode: PlanningMode,
    pub project_scope: Option<String>,
    pub enforce_variation: bool,
    pub max_slices: Option<i64>,
}

impl RecommendRequest {
    pub fn new(now: NaiveDate, available_min: i64) -> Self {
        Self {
            now,
            available_min,
            mode: PlanningMode::Balanced,
            project_scope: None,
            enforce_variation: true,
            max_slices: None,
        }
    }
}

struct Gathered {
    profile: UserProfile,
    candidates: Vec<CandidateRow>,
    blocked: HashSet<String>,
    aggregates: HashMap<String, CompletionAggregates>,
    recent_minutes: HashMap<String, i64>,
    last_session: HashMap<String, NaiveDate>,
}

pub async fn recommend(store: &Store, req: &RecommendRequest) -> PlanResult<WhatNowResponse> {
    if req.available_min < 0 {
        return Err(PlanError::Validation(
            "available minutes must be >= 0".into(),
        ));
    }
    if let Some(max) = req.max_slices {
        if max < 1 {
            return Err(PlanError::Validation("max_slices must be >= 1".into()));
        }
    }

    let now = req.now;
    let scope = req.project_scope.clone();
    let gathered = store
        .read(move |conn| {
            let profile = profile::get(conn)?;
            let candidates = queries::list_schedulable(conn, scope.as_deref(), false)?;
            let ids: Vec<String> = candidates.iter().map(|c| c.item.id.clone()).collect();
            let blocked = queries::blocked_item_ids(conn, &ids)?;

            let project_ids: HashSet<String> =
                candidates.iter().map(|c| c.project_id.clone()).collect();
            let mut aggregates = HashMap::new();
            for project_id in &project_ids {
                aggregates.insert(
                    project_id.clone(),
                    queries::completion_aggregates(conn, project_id, now)?,
                );
            }
            let since = now - Duration::days(RECENT_WINDOW_DAYS - 1);
            let recent_minutes = queries::recent_minutes_by_project(conn, since)?;
            let last_session = queries::last_session_date_by_project(conn)?;
            Ok(Gathered {
                profile,
                candidates,
                blocked,
                aggregates,
                recent_minutes,
                last_session,
            })
        })
        .await?;

    Ok(build_response(req, gathered))
}

fn build_response(req: &RecommendRequest, gathered: Gathered) -> WhatNowResponse {
    let Gathered {
        profile,
        candidates,
        blocked,
        aggregates,
        recent_minutes,
        last_session,
    } = gathered;

    let mut policy_messages = Vec::new();
    if candidates.is_empty() {
        policy_messages.push(match &req.project_scope {
            Some(scope) => format!(
                "no schedulable work items in project {scope}; everything is done, blocked off, or the project is not active"
            ),
            None => "no schedulable work items; add a project or un-archive one".to_string(),
        });
        return WhatNowResponse {
            mode: req.mode,
            requested_min: req.available_min,
            allocated_min: 0,
            recommendations: Vec::new(),
            blockers: Vec::new(),
            top_risk_projects: Vec::new(),
            policy_messages,
        };
    }

    // one risk grade per project
    let mut risks: HashMap<String, RiskAssessment> = HashMap::new();
    for cand in &candidates {
        if risks.contains_key(&cand.project_id) {
            continue;
        }
        let agg = aggregates.get(&cand.project_id).cloned().unwrap_or_default();
        let input = risk_input(req.now, cand, &agg, &profile, &recent_minutes);
        risks.insert(
            cand.project_id.clone(),
            risk::classify(&cand.project_id, &cand.project_name, &input),
        );
    }

    let mut blockers: Vec<Blocker> = Vec::new();
    let mut scored = Vec::new();
    for cand in &candidates {
        if blocked.contains(&cand.item.id) {
            blockers.push(Blocker {
                entity_id: cand.item.id.clone(),
                entity_title: cand.item.title.clone(),
                code: codes::DEPENDENCY.to_string(),
                message: "waiting on an unfinished predecessor".to_string(),
            });
            continue;
        }
        let risk = &risks[&cand.project_id];
        let last_days_ago = last_session
            .get(&cand.project_id)
            .map(|date| (req.now - *date).num_days());
        let input = ScoreInput {
            candidate: cand,
            risk,
            weights: profile.weights,
            mode: req.mode,
            now: req.now,
            last_session_days_ago: last_days_ago,
            slices_already_in_plan: 0,
        };
        match score::score_candidate(&input) {
            ScoreOutcome::Scored(s) => scored.push(s),
            ScoreOutcome::Blocked(b) => blockers.push(b),
        }
    }

    score::canonical_sort(&mut scored);

    let max_slices = req
        .max_slices
        .unwrap_or(profile.default_max_slices)
        .max(1) as usize;
    let outcome = allocate::allocate(&scored, req.available_min, max_slices, req.enforce_variation);
    blockers.extend(outcome.blockers);

    if outcome.slices.is_empty() {
        policy_messages.push(match req.mode {
            PlanningMode::Critical => {
                "nothing allocated: no critical project has workable items right now".to_string()
            }
            PlanningMode::Balanced => {
                "nothing allocated: every candidate is blocked or the budget is below the smallest session minimum"
                    .to_string()
            }
        });
    }

    let mut top_risk: Vec<RiskAssessment> = risks
        .into_values()
        .filter(|r| r.level != RiskLevel::OnTrack)
        .collect();
    top_risk.sort_by(|a, b| {
        a.level
            .priority()
            .cmp(&b.level.priority())
            .then_with(|| a.project_name.cmp(&b.project_name))
    });

    debug!(
        slices = outcome.slices.len(),
        blockers = blockers.len(),
        allocated = outcome.allocated_min,
        "recommendation assembled"
    );

    WhatNowResponse {
        mode: req.mode,
        requested_min: req.available_min,
        allocated_min: outcome.allocated_min,
        recommendations: outcome.slices,
        blockers,
        top_risk_projects: top_risk,
        policy_messages,
    }
}

fn risk_input(
    now: NaiveDate,
    cand: &CandidateRow,
    agg: &CompletionAggregates,
    profile: &UserProfile,
    recent_minutes: &HashMap<String, i64>,
) -> RiskInput {
    let recent_daily = *recent_minutes.get(&cand.project_id).unwrap_or(&0) as f64
        / RECENT_WINDOW_DAYS as f64;
    let progress_pct = if agg.planned_min_total > 0 {
        (agg.logged_min_total as f64 / agg.planned_min_total as f64).clamp(0.0, 1.0)
    } else {
        0.0
    };
    let time_elapsed_pct = match cand.project_target_date {
        Some(target) => {
            let span = (target - cand.project_start_date).num_days();
            if span <= 0 {
                0.0
            } else {
                ((now - cand.project_start_date).num_days() as f64 / span as f64).clamp(0.0, 1.0)
            }
        }
        None => 0.0,
    };
    let due_based_expected_pct = if agg.planned_min_total > 0 {
        (agg.planned_min_due_by as f64 / agg.planned_min_total as f64).clamp(0.0, 1.0)
    } else {
        0.0
    };
    RiskInput {
        now,
        target_date: cand.project_target_date,
        planned_min: agg.planned_min_total,
        logged_min: agg.logged_min_total,
        buffer_pct: profile.buffer_pct,
        recent_daily_min: recent_daily,
        progress_pct,
        time_elapsed_pct,
        due_based_expected_pct,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use kairos_store::repo::{dependencies, items, nodes, projects, sessions};
    use kairos_types::{
        Dependency, DurationMode, NodeKind, PlanNode, Project, ProjectStatus, SessionPolicy,
        UnitTracking, WorkItem, WorkItemStatus, WorkSessionLog,
    };

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn project(id: &str, name: &str, start: NaiveDate, target: Option<NaiveDate>) -> Project {
        Project {
            id: id.to_string(),
            short_id: String::new(),
            name: name.to_string(),
            domain: "study".into(),
            start_date: start,
            target_date: target,
            status: ProjectStatus::Active,
            archived_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn node(id: &str, project_id: &str) -> PlanNode {
        PlanNode {
            id: id.to_string(),
            project_id: project_id.to_string(),
            parent_id: None,
            title: "Week 1".into(),
            kind: NodeKind::Week,
            order_index: 0,
            due_date: None,
            not_before: None,
            not_after: None,
            planned_min_budget: None,
            seq: 1,
            is_default: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn item(id: &str, node_id: &str, planned: i64) -> WorkItem {
        WorkItem {
            id: id.to_string(),
            node_id: node_id.to_string(),
            seq: 2,
            title: format!("Item {id}"),
            description: String::new(),
            item_type: "reading".into(),
            status: WorkItemStatus::Todo,
            archived_at: None,
            completed_at: None,
            duration_mode: DurationMode::Estimate,
            planned_min: planned,
            logged_min: 0,
            duration_source: "manual".into(),
            estimate_confidence: 0.5,
            session: SessionPolicy {
                min_session_min: 15,
                max_session_min: 60,
                default_session_min: 30,
            },
            splittable: true,
            units: UnitTracking::default(),
            due_date: None,
            not_before: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    // S1: one active project five days from target, 1000 planned
    // minutes, ~30 min/day of recent activity. Classifier lands on
    // critical; one slice within session bounds comes back.
    #[tokio::test]
    async fn single_project_pressure_yields_one_critical_slice() {
        let store = Store::open_in_memory().await.unwrap();
        let now = date(2026, 3, 1);
        let session_day = Utc.with_ymd_and_hms(2026, 2, 27, 18, 0, 0).unwrap();
        store
            .with_unit_of_work(|conn| {
                projects::insert(
                    conn,
                    &project("p1", "Thesis", date(2026, 1, 30), Some(date(2026, 3, 6))),
                )?;
                nodes::insert(conn, &node("n1", "p1"))?;
                let mut wi = item("a", "n1", 1000);
                wi.due_date = Some(date(2026, 3, 1));
                items::insert(conn, &wi)?;
                sessions::log(
                    conn,
                    &WorkSessionLog {
                        id: "s1".into(),
                        work_item_id: "a".into(),
                        started_at: session_day,
                        minutes: 210,
                        units_done_delta: 0,
                        note: None,
                        created_at: session_day,
                    },
                )
            })
            .await
            .unwrap();

        let response = recommend(&store, &RecommendRequest::new(now, 60))
            .await
            .unwrap();

        assert_eq!(response.recommendations.len(), 1);
        let slice = &response.recommendations[0];
        assert_eq!(slice.work_item_id, "a");
        assert_eq!(slice.risk, RiskLevel::Critical);
        assert!(slice.alloc_min >= 15 && slice.alloc_min <= 60);
        assert!(slice.score > 0.0);
        assert_eq!(response.top_risk_projects.len(), 1);
        assert_eq!(response.top_risk_projects[0].level, RiskLevel::Critical);
        // 1.1 buffer over 790 remaining across 5 days vs 30/day recent
        assert!(response.top_risk_projects[0].required_daily_min > 100.0);
    }

    // S4: a successor behind an unfinished predecessor is reported as a
    // DEPENDENCY blocker, never a slice; the predecessor still gets one.
    #[tokio::test]
    async fn blocked_successor_becomes_dependency_blocker() {
        let store = Store::open_in_memory().await.unwrap();
        store
            .with_unit_of_work(|conn| {
                projects::insert(conn, &project("p1", "Course", date(2026, 1, 1), None))?;
                nodes::insert(conn, &node("n1", "p1"))?;
                items::insert(conn, &item("wi1", "n1", 120))?;
                items::insert(conn, &item("wi2", "n1", 120))?;
                dependencies::insert(
                    conn,
                    &Dependency {
                        predecessor_id: "wi1".into(),
                        successor_id: "wi2".into(),
                    },
                )
            })
            .await
            .unwrap();

        let response = recommend(&store, &RecommendRequest::new(date(2026, 2, 1), 90))
            .await
            .unwrap();

        let sliced: Vec<&str> = response
            .recommendations
            .iter()
            .map(|s| s.work_item_id.as_str())
            .collect();
        assert_eq!(sliced, vec!["wi1"]);
        assert!(response
            .blockers
            .iter()
            .any(|b| b.entity_id == "wi2" && b.code == codes::DEPENDENCY));
    }

    #[tokio::test]
    async fn empty_candidate_set_returns_policy_message() {
        let store = Store::open_in_memory().await.unwrap();
        let response = recommend(&store, &RecommendRequest::new(date(2026, 2, 1), 60))
            .await
            .unwrap();
        assert!(response.recommendations.is_empty());
        assert_eq!(response.policy_messages.len(), 1);
        assert_eq!(response.allocated_min, 0);
    }

    #[tokio::test]
    async fn critical_mode_blocks_on_track_projects() {
        let store = Store::open_in_memory().await.unwrap();
        store
            .with_unit_of_work(|conn| {
                projects::insert(conn, &project("p1", "Leisure", date(2026, 1, 1), None))?;
                nodes::insert(conn, &node("n1", "p1"))?;
                items::insert(conn, &item("wi1", "n1", 120))
            })
            .await
            .unwrap();
        let mut req = RecommendRequest::new(date(2026, 2, 1), 60);
        req.mode = PlanningMode::Critical;
        let response = recommend(&store, &req).await.unwrap();
        assert!(response.recommendations.is_empty());
        assert!(response
            .blockers
            .iter()
            .any(|b| b.code == codes::CRITICAL_ONLY));
        assert!(!response.policy_messages.is_empty());
    }

    #[tokio::test]
    async fn output_is_deterministic_for_fixed_inputs() {
        let store = Store::open_in_memory().await.unwrap();
        store
            .with_unit_of_work(|conn| {
                projects::insert(
                    conn,
                    &project("p1", "Alpha", date(2026, 1, 1), Some(date(2026, 6, 1))),
                )?;
                projects::insert(
                    conn,
                    &project("p2", "Beta", date(2026, 1, 1), Some(date(2026, 5, 1))),
                )?;
                nodes::insert(conn, &node("n1", "p1"))?;
                nodes::insert(conn, &node("n2", "p2"))?;
                items::insert(conn, &item("a1", "n1", 300))?;
                items::insert(conn, &item("a2", "n1", 300))?;
                items::insert(conn, &item("b1", "n2", 300))
            })
            .await
            .unwrap();
        let req = RecommendRequest::new(date(2026, 2, 1), 120);
        let first = recommend(&store, &req).await.unwrap();
        let second = recommend(&store, &req).await.unwrap();
        let ids = |r: &WhatNowResponse| {
            r.recommendations
                .iter()
                .map(|s| (s.work_item_id.clone(), s.alloc_min, s.score))
                .collect::<Vec<_>>()
        };
        assert_eq!(ids(&first), ids(&second));
        assert_eq!(first.allocated_min, second.allocated_min);
    }

    #[tokio::test]
    async fn negative_budget_is_rejected() {
        let store = Store::open_in_memory().await.unwrap();
        let err = recommend(&store, &RecommendRequest::new(date(2026, 2, 1), -5))
            .await
            .unwrap_err();
        assert!(matches!(err, PlanError::Validation(_)));
    }
}
