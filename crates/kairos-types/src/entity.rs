// Core planner entities
// All identifiers are opaque UUID strings; `seq` is a project-scoped
// integer used only for human display.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectStatus {
    Active,
    Paused,
    Done,
    Archived,
}

impl ProjectStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ProjectStatus::Active => "active",
            ProjectStatus::Paused => "paused",
            ProjectStatus::Done => "done",
            ProjectStatus::Archived => "archived",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "active" => Some(ProjectStatus::Active),
            "paused" => Some(ProjectStatus::Paused),
            "done" => Some(ProjectStatus::Done),
            "archived" => Some(ProjectStatus::Archived),
            _ => None,
        }
    }
}

impl std::fmt::Display for ProjectStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub id: String,
    /// 3-6 uppercase letters + 2-4 digits, unique when non-empty.
    pub short_id: String,
    pub name: String,
    pub domain: String,
    pub start_date: NaiveDate,
    pub target_date: Option<NaiveDate>,
    pub status: ProjectStatus,
    /// Non-null iff `status == Archived`.
    pub archived_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Project {
    /// Short-id format check: 3-6 uppercase letters followed by 2-4 digits.
    /// An empty short_id is allowed (no display code assigned yet).
    pub fn short_id_is_valid(short_id: &str) -> bool {
        if short_id.is_empty() {
            return true;
        }
        let letters = short_id.chars().take_while(|c| c.is_ascii_uppercase()).count();
        let digits = short_id.chars().skip(letters).count();
        (3..=6).contains(&letters)
            && (2..=4).contains(&digits)
            && short_id.chars().skip(letters).all(|c| c.is_ascii_digit())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Week,
    Module,
    Book,
    Stage,
    Section,
    Assessment,
    Generic,
}

impl NodeKind {
    pub fn as_str(self) -> &'static str {
        match self {
            NodeKind::Week => "week",
            NodeKind::Module => "module",
            NodeKind::Book => "book",
            NodeKind::Stage => "stage",
            NodeKind::Section => "section",
            NodeKind::Assessment => "assessment",
            NodeKind::Generic => "generic",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "week" => Some(NodeKind::Week),
            "module" => Some(NodeKind::Module),
            "book" => Some(NodeKind::Book),
            "stage" => Some(NodeKind::Stage),
            "section" => Some(NodeKind::Section),
            "assessment" => Some(NodeKind::Assessment),
            "generic" => Some(NodeKind::Generic),
            _ => None,
        }
    }
}

/// Hierarchical subdivision of a project. Parent links form a tree
/// within one project; children cascade with the project.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanNode {
    pub id: String,
    pub project_id: String,
    pub parent_id: Option<String>,
    pub title: String,
    pub kind: NodeKind,
    pub order_index: i64,
    pub due_date: Option<NaiveDate>,
    pub not_before: Option<NaiveDate>,
    pub not_after: Option<NaiveDate>,
    pub planned_min_budget: Option<i64>,
    pub seq: i64,
    pub is_default: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkItemStatus {
    Todo,
    InProgress,
    Done,
    Skipped,
    Archived,
}

impl WorkItemStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            WorkItemStatus::Todo => "todo",
            WorkItemStatus::InProgress => "in_progress",
            WorkItemStatus::Done => "done",
            WorkItemStatus::Skipped => "skipped",
            WorkItemStatus::Archived => "archived",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "todo" => Some(WorkItemStatus::Todo),
            "in_progress" => Some(WorkItemStatus::InProgress),
            "done" => Some(WorkItemStatus::Done),
            "skipped" => Some(WorkItemStatus::Skipped),
            "archived" => Some(WorkItemStatus::Archived),
            _ => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            WorkItemStatus::Done | WorkItemStatus::Skipped | WorkItemStatus::Archived
        )
    }
}

impl std::fmt::Display for WorkItemStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DurationMode {
    Fixed,
    Estimate,
    Derived,
}

impl DurationMode {
    pub fn as_str(self) -> &'static str {
        match self {
            DurationMode::Fixed => "fixed",
            DurationMode::Estimate => "estimate",
            DurationMode::Derived => "derived",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "fixed" => Some(DurationMode::Fixed),
            "estimate" => Some(DurationMode::Estimate),
            "derived" => Some(DurationMode::Derived),
            _ => None,
        }
    }
}

/// Per-item session policy: how small, how large and how long by
/// default one sitting on this item should be.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SessionPolicy {
    pub min_session_min: i64,
    pub max_session_min: i64,
    pub default_session_min: i64,
}

impl SessionPolicy {
    pub fn is_valid(&self) -> bool {
        self.min_session_min > 0
            && self.min_session_min <= self.default_session_min
            && self.default_session_min <= self.max_session_min
    }
}

impl Default for SessionPolicy {
    fn default() -> Self {
        Self {
            min_session_min: 15,
            max_session_min: 60,
            default_session_min: 30,
        }
    }
}

/// Optional unit tracking (pages, exercises, ...) used by the
/// re-estimator to infer pace.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct UnitTracking {
    pub units_kind: Option<String>,
    pub units_total: Option<i64>,
    pub units_done: Option<i64>,
}

/// A concrete task under a plan node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkItem {
    pub id: String,
    pub node_id: String,
    pub seq: i64,
    pub title: String,
    pub description: String,
    #[serde(rename = "type")]
    pub item_type: String,
    pub status: WorkItemStatus,
    pub archived_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub duration_mode: DurationMode,
    pub planned_min: i64,
    pub logged_min: i64,
    pub duration_source: String,
    /// Confidence in the current estimate, in [0, 1].
    pub estimate_confidence: f64,
    #[serde(flatten)]
    pub session: SessionPolicy,
    pub splittable: bool,
    #[serde(flatten)]
    pub units: UnitTracking,
    pub due_date: Option<NaiveDate>,
    pub not_before: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WorkItem {
    /// Minutes that count as done: completed items are credited with at
    /// least their plan, so a fast finish never reads as under-delivery.
    pub fn effective_logged_min(&self) -> i64 {
        if self.status == WorkItemStatus::Done {
            self.logged_min.max(self.planned_min)
        } else {
            self.logged_min
        }
    }

    pub fn remaining_min(&self) -> i64 {
        (self.planned_min - self.logged_min).max(0)
    }

    /// Field-level checks that do not need storage access.
    pub fn validate(&self) -> Result<(), String> {
        if self.title.trim().is_empty() {
            return Err("work item title must not be empty".to_string());
        }
        if self.logged_min < 0 {
            return Err("logged_min must be >= 0".to_string());
        }
        if self.planned_min < 0 {
            return Err("planned_min must be >= 0".to_string());
        }
        if !(0.0..=1.0).contains(&self.estimate_confidence) {
            return Err("estimate_confidence must be within [0, 1]".to_string());
        }
        if !self.session.is_valid() {
            return Err(
                "session policy requires 0 < min <= default <= max".to_string(),
            );
        }
        if (self.status == WorkItemStatus::Done) != self.completed_at.is_some() {
            return Err("completed_at must be set iff status is done".to_string());
        }
        Ok(())
    }
}

/// Unordered predecessor/successor pair between two work items of the
/// same project. The successor is blocked while the predecessor is not
/// in a terminal status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dependency {
    pub predecessor_id: String,
    pub successor_id: String,
}

/// One logged sitting on a work item. Append-only in normal use,
/// deletable for correction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkSessionLog {
    pub id: String,
    pub work_item_id: String,
    pub started_at: DateTime<Utc>,
    pub minutes: i64,
    pub units_done_delta: i64,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Schedulable candidate row: a non-terminal work item joined with its
/// node and active project, as returned by the store's candidate query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateRow {
    pub item: WorkItem,
    pub node_id: String,
    pub node_title: String,
    pub node_due_date: Option<NaiveDate>,
    pub project_id: String,
    pub project_name: String,
    pub project_domain: String,
    pub project_start_date: NaiveDate,
    pub project_target_date: Option<NaiveDate>,
}

impl CandidateRow {
    /// Earlier of the item and node due dates; the date the scorer's
    /// deadline-pressure factor works from.
    pub fn effective_due_date(&self) -> Option<NaiveDate> {
        match (self.item.due_date, self.node_due_date) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (Some(a), None) => Some(a),
            (None, Some(b)) => Some(b),
            (None, None) => None,
        }
    }
}
