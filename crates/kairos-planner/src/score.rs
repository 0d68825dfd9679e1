// Candidate scoring and the canonical sort.
//
// Scoring is pure: the same inputs always produce the same score and
// the same reason chain, in the same factor order. The reason codes are
// part of the external contract (the explanation grounding validator
// matches on them), so the order and codes here must stay stable.

use std::cmp::Ordering;

use chrono::NaiveDate;

use kairos_types::{
    codes, Blocker, CandidateRow, FactorWeights, PlanningMode, ReasonEntry, RiskAssessment,
    RiskLevel,
};

#[derive(Debug, Clone)]
pub struct ScoreInput<'a> {
    pub candidate: &'a CandidateRow,
    pub risk: &'a RiskAssessment,
    pub weights: FactorWeights,
    pub mode: PlanningMode,
    pub now: NaiveDate,
    /// Whole calendar days since the last session on this project;
    /// None when the project has never been worked.
    pub last_session_days_ago: Option<i64>,
    /// Slices already allocated from this project in the current plan.
    /// The recommender passes 0; the allocator keeps its own count.
    pub slices_already_in_plan: usize,
}

#[derive(Debug, Clone)]
pub struct ScoredCandidate {
    pub candidate: CandidateRow,
    pub risk: RiskLevel,
    pub due_date: Option<NaiveDate>,
    pub score: f64,
    pub reasons: Vec<ReasonEntry>,
}

#[derive(Debug, Clone)]
pub enum ScoreOutcome {
    Scored(ScoredCandidate),
    /// Critical planning mode hard-blocks everything that is not
    /// critical; such candidates are not scored at all.
    Blocked(Blocker),
}

pub fn score_candidate(input: &ScoreInput<'_>) -> ScoreOutcome {
    let candidate = input.candidate;
    let risk_level = input.risk.level;

    if input.mode == PlanningMode::Critical && risk_level != RiskLevel::Critical {
        return ScoreOutcome::Blocked(Blocker {
            entity_id: candidate.item.id.clone(),
            entity_title: candidate.item.title.clone(),
            code: codes::CRITICAL_ONLY.to_string(),
            message: format!(
                "{} is {}; critical mode only schedules critical projects",
                candidate.project_name,
                risk_level.as_str()
            ),
        });
    }

    let mut score = 0.0;
    let mut reasons = Vec::new();
    let due_date = candidate.effective_due_date();

    // 1. deadline pressure
    if let Some(due) = due_date {
        let d = (due - input.now).num_days();
        let raw = deadline_pressure(d);
        let delta = raw * input.weights.deadline_pressure;
        score += delta;
        let message = if d <= 0 {
            format!("due {} days ago", -d)
        } else {
            format!("due in {d} days")
        };
        reasons.push(ReasonEntry::new(codes::DEADLINE, message, delta));
    }

    // 2. behind pace
    let behind = match risk_level {
        RiskLevel::Critical => 30.0,
        RiskLevel::AtRisk => 15.0,
        RiskLevel::OnTrack => 0.0,
    };
    if behind > 0.0 {
        let delta = behind * input.weights.behind_pace;
        score += delta;
        reasons.push(ReasonEntry::new(
            codes::BEHIND_PACE,
            format!(
                "project {} needs {:.0} min/day",
                risk_level.as_str(),
                input.risk.required_daily_min
            ),
            delta,
        ));
    }

    // 3. spacing
    let (spacing_raw, spacing_msg) = match input.last_session_days_ago {
        Some(0) => (-10.0, "already worked today".to_string()),
        Some(a @ 1..=3) => (5.0, format!("last session {a} days ago")),
        Some(a) => (3.0, format!("last session {a} days ago")),
        None => (3.0, "no sessions yet".to_string()),
    };
    let spacing_delta = spacing_raw * input.weights.spacing;
    score += spacing_delta;
    reasons.push(ReasonEntry::new(codes::SPACING, spacing_msg, spacing_delta));

    // 4. variation
    let k = input.slices_already_in_plan;
    let variation_raw = match k {
        0 => 10.0,
        1 => 0.0,
        _ => -5.0 * k as f64,
    };
    let variation_delta = variation_raw * input.weights.variation;
    score += variation_delta;
    reasons.push(ReasonEntry::new(
        codes::VARIATION,
        format!("{k} slices from this project already planned"),
        variation_delta,
    ));

    // 5. critical focus bonus (flat, unweighted)
    if input.mode == PlanningMode::Critical {
        score += 50.0;
        reasons.push(ReasonEntry::new(
            codes::CRITICAL_FOCUS,
            "critical project prioritised in critical mode",
            50.0,
        ));
    }

    // 6. safe-mix annotation
    if input.mode == PlanningMode::Balanced && risk_level == RiskLevel::OnTrack {
        reasons.push(ReasonEntry::new(
            codes::SAFE_MIX,
            "on track; included as safe variety",
            0.0,
        ));
    }

    ScoreOutcome::Scored(ScoredCandidate {
        candidate: candidate.clone(),
        risk: risk_level,
        due_date,
        score,
        reasons,
    })
}

fn deadline_pressure(days_until_due: i64) -> f64 {
    let d = days_until_due;
    if d <= 0 {
        100.0
    } else if d <= 3 {
        80.0 / d as f64
    } else if d <= 7 {
        40.0 / d as f64
    } else if d <= 14 {
        20.0 / d as f64
    } else {
        10.0 / d as f64
    }
}

/// Deterministic total order: risk priority, due date ascending with
/// missing-last, score descending, project name, work item id.
pub fn canonical_sort(candidates: &mut [ScoredCandidate]) {
    candidates.sort_by(compare);
}

fn compare(a: &ScoredCandidate, b: &ScoredCandidate) -> Ordering {
    a.risk
        .priority()
        .cmp(&b.risk.priority())
        .then_with(|| match (a.due_date, b.due_date) {
            (Some(x), Some(y)) => x.cmp(&y),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        })
        .then_with(|| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal))
        .then_with(|| a.candidate.project_name.cmp(&b.candidate.project_name))
        .then_with(|| a.candidate.item.id.cmp(&b.candidate.item.id))
}
