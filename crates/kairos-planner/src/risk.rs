// Per-project risk grading.
//
// A project is graded from deadline, progress and recent-activity
// signals alone; the result carries the derived numbers so downstream
// scoring and explanation can cite them instead of recomputing.

use chrono::NaiveDate;

use kairos_types::{RiskAssessment, RiskLevel};

#[derive(Debug, Clone)]
pub struct RiskInput {
    pub now: NaiveDate,
    pub target_date: Option<NaiveDate>,
    pub planned_min: i64,
    pub logged_min: i64,
    pub buffer_pct: f64,
    /// Mean minutes/day over the trailing window.
    pub recent_daily_min: f64,
    /// Share of planned work already delivered, in [0, 1].
    pub progress_pct: f64,
    /// Share of the start→target span already elapsed, in [0, 1].
    pub time_elapsed_pct: f64,
    /// Share of planned work whose due dates have passed, in [0, 1].
    pub due_based_expected_pct: f64,
}

pub fn classify(project_id: &str, project_name: &str, input: &RiskInput) -> RiskAssessment {
    let remaining_raw = (input.planned_min - input.logged_min) as f64;
    let remaining = (remaining_raw * (1.0 + input.buffer_pct)).max(0.0);
    let remaining_min = remaining.round() as i64;

    let days_left = input
        .target_date
        .map(|target| (target - input.now).num_days());

    let required_daily = match days_left {
        Some(d) => remaining / d.max(1) as f64,
        None => 0.0,
    };
    let slack = input.recent_daily_min - required_daily;

    let level = grade(input, days_left, remaining);

    RiskAssessment {
        project_id: project_id.to_string(),
        project_name: project_name.to_string(),
        level,
        days_left,
        remaining_min,
        required_daily_min: required_daily,
        slack_min_per_day: slack,
        progress_pct: input.progress_pct,
        time_elapsed_pct: input.time_elapsed_pct,
    }
}

fn grade(input: &RiskInput, days_left: Option<i64>, remaining: f64) -> RiskLevel {
    let Some(days_left) = days_left else {
        return RiskLevel::OnTrack;
    };
    if days_left <= 0 {
        return RiskLevel::Critical;
    }

    // Two independent "on pace" reads: linear elapsed time and the
    // due-date-weighted expectation. Either one caps an otherwise
    // critical grade so correctly back-loaded plans are not punished.
    let on_pace = input.progress_pct > 0.0
        && (input.progress_pct >= input.time_elapsed_pct
            || input.progress_pct >= input.due_based_expected_pct);
    let cap = |level: RiskLevel| {
        if level == RiskLevel::Critical && on_pace {
            RiskLevel::AtRisk
        } else {
            level
        }
    };

    if input.recent_daily_min == 0.0 && remaining > 0.0 {
        return cap(RiskLevel::Critical);
    }

    let required_daily = remaining / days_left.max(1) as f64;
    let ratio = required_daily / input.recent_daily_min.max(1.0);
    if ratio > 1.5 {
        return cap(RiskLevel::Critical);
    }
    if ratio > 1.0 {
        return RiskLevel::AtRisk;
    }
    if days_left <= 3 && remaining > input.recent_daily_min * days_left as f64 {
        return RiskLevel::AtRisk;
    }
    RiskLevel::OnTrack
}
