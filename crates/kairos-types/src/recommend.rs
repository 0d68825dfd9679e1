// Recommendation surface types: risk grades, scoring traces, slices
// and the responses the shell renders. Everything here is plain data;
// the planner produces it and the LLM boundary may only cite it.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::entity::SessionPolicy;

/// Reason and blocker codes. Stable strings: the explanation grounding
/// validator matches trace keys against them verbatim.
pub mod codes {
    pub const DEADLINE: &str = "DEADLINE";
    pub const BEHIND_PACE: &str = "BEHIND_PACE";
    pub const SPACING: &str = "SPACING";
    pub const VARIATION: &str = "VARIATION";
    pub const CRITICAL_FOCUS: &str = "CRITICAL_FOCUS";
    pub const SAFE_MIX: &str = "SAFE_MIX";
    pub const BOUNDS_APPLIED: &str = "BOUNDS_APPLIED";

    pub const DEPENDENCY: &str = "DEPENDENCY";
    pub const WORK_COMPLETE: &str = "WORK_COMPLETE";
    pub const MIN_SESSION: &str = "MIN_SESSION";
    pub const CRITICAL_ONLY: &str = "CRITICAL_ONLY";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    OnTrack,
    AtRisk,
    Critical,
}

impl RiskLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            RiskLevel::OnTrack => "on_track",
            RiskLevel::AtRisk => "at_risk",
            RiskLevel::Critical => "critical",
        }
    }

    /// Sort rank for the canonical order: critical first.
    pub fn priority(self) -> u8 {
        match self {
            RiskLevel::Critical => 0,
            RiskLevel::AtRisk => 1,
            RiskLevel::OnTrack => 2,
        }
    }
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Risk grade plus the derived numbers that justify it. The scorer and
/// the explainer cite these, so they are carried rather than recomputed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub project_id: String,
    pub project_name: String,
    pub level: RiskLevel,
    pub days_left: Option<i64>,
    pub remaining_min: i64,
    pub required_daily_min: f64,
    pub slack_min_per_day: f64,
    pub progress_pct: f64,
    pub time_elapsed_pct: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PlanningMode {
    #[default]
    Balanced,
    Critical,
}

impl PlanningMode {
    pub fn as_str(self) -> &'static str {
        match self {
            PlanningMode::Balanced => "balanced",
            PlanningMode::Critical => "critical",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "balanced" => Some(PlanningMode::Balanced),
            "critical" => Some(PlanningMode::Critical),
            _ => None,
        }
    }
}

/// One scoring factor's contribution to a candidate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReasonEntry {
    pub code: String,
    pub message: String,
    pub weight_delta: f64,
}

impl ReasonEntry {
    pub fn new(code: &str, message: impl Into<String>, weight_delta: f64) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
            weight_delta,
        }
    }
}

/// Why an entity was excluded from the plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Blocker {
    pub entity_id: String,
    pub entity_title: String,
    pub code: String,
    pub message: String,
}

/// A concrete allocation of minutes to one work item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Slice {
    pub work_item_id: String,
    pub project_id: String,
    pub node_id: String,
    pub title: String,
    pub alloc_min: i64,
    #[serde(flatten)]
    pub session: SessionPolicy,
    pub splittable: bool,
    pub due_date: Option<NaiveDate>,
    pub risk: RiskLevel,
    pub score: f64,
    pub reasons: Vec<ReasonEntry>,
    /// Planned-minus-logged at allocation time, for items that carry a
    /// plan; bounds how far this slice may be extended.
    pub work_remaining_min: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WhatNowResponse {
    pub mode: PlanningMode,
    pub requested_min: i64,
    pub allocated_min: i64,
    pub recommendations: Vec<Slice>,
    pub blockers: Vec<Blocker>,
    pub top_risk_projects: Vec<RiskAssessment>,
    pub policy_messages: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectStatusRow {
    pub risk: RiskAssessment,
    pub items_total: i64,
    pub items_done: i64,
    pub items_skipped: i64,
    pub planned_min_total: i64,
    pub logged_min_total: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub projects: Vec<ProjectStatusRow>,
}

/// A single re-estimate applied by the re-planner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplanUpdate {
    pub work_item_id: String,
    pub title: String,
    pub old_planned_min: i64,
    pub new_planned_min: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplanResponse {
    pub updates: Vec<ReplanUpdate>,
    pub risks: Vec<RiskAssessment>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn risk_priority_orders_critical_first() {
        assert!(RiskLevel::Critical.priority() < RiskLevel::AtRisk.priority());
        assert!(RiskLevel::AtRisk.priority() < RiskLevel::OnTrack.priority());
    }

    #[test]
    fn planning_mode_round_trips() {
        assert_eq!(PlanningMode::parse("balanced"), Some(PlanningMode::Balanced));
        assert_eq!(PlanningMode::parse("critical"), Some(PlanningMode::Critical));
        assert_eq!(PlanningMode::parse("focus"), None);
    }
}
