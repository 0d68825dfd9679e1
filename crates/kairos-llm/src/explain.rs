// Evidence-grounded explanation.
//
// The recommender's response is flattened into a trace whose keys name
// every factual claim a narrative may cite: a slice's score, a reason
// code, a blocker, a risk number. The model gets the trace and must tie
// each factor to one key; a single unknown key discards the whole
// output in favour of the deterministic fallback. The model can phrase
// the story, never change it.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use kairos_types::{RiskAssessment, WhatNowResponse};

use crate::client::{Generate, LlmTask};
use crate::intent::extract_json_object;
use crate::prompts;
use crate::Grounded;

/// Flattening of a WhatNowResponse into citable facts.
#[derive(Debug, Clone, Serialize)]
pub struct RecommendationTrace {
    pub keys: BTreeSet<String>,
    pub response: WhatNowResponse,
}

impl RecommendationTrace {
    pub fn from_response(response: &WhatNowResponse) -> Self {
        Self::build(response.clone())
    }

    /// Trace narrowed to one work item: only that item's slice and
    /// blockers stay citable; project risk context is kept. Asking
    /// about an item the plan never mentions yields an empty focus
    /// plus a policy note saying so.
    pub fn focused(response: &WhatNowResponse, work_item_id: &str) -> Self {
        let mut scoped = response.clone();
        scoped
            .recommendations
            .retain(|slice| slice.work_item_id == work_item_id);
        scoped.blockers.retain(|b| b.entity_id == work_item_id);
        if scoped.recommendations.is_empty() && scoped.blockers.is_empty() {
            scoped
                .policy_messages
                .push(format!("work item {work_item_id} is not part of this plan"));
        }
        Self::build(scoped)
    }

    fn build(response: WhatNowResponse) -> Self {
        let mut keys = BTreeSet::new();
        for slice in &response.recommendations {
            let id = &slice.work_item_id;
            keys.insert(format!("rec.{id}.score"));
            keys.insert(format!("rec.{id}.risk_level"));
            keys.insert(format!("rec.{id}.allocated_min"));
            for reason in &slice.reasons {
                keys.insert(format!("rec.{id}.reason.{}", reason.code));
            }
        }
        for blocker in &response.blockers {
            keys.insert(format!("blocker.{}.{}", blocker.entity_id, blocker.code));
        }
        for risk in &response.top_risk_projects {
            let id = &risk.project_id;
            keys.insert(format!("risk.{id}.days_left"));
            keys.insert(format!("risk.{id}.remaining_min"));
            keys.insert(format!("risk.{id}.required_daily_min"));
            keys.insert(format!("risk.{id}.slack_min_per_day"));
        }
        Self { keys, response }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.keys.contains(key)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExplanationFactor {
    pub name: String,
    pub impact: f64,
    /// "up" or "down": which way this factor moved the outcome.
    pub direction: String,
    pub evidence_ref_type: String,
    pub evidence_ref_key: String,
    pub summary: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmExplanation {
    pub context: String,
    pub summary_short: String,
    pub summary_detailed: String,
    pub factors: Vec<ExplanationFactor>,
    #[serde(default)]
    pub counterfactuals: Option<Vec<String>>,
    #[serde(default)]
    pub confidence: f64,
}

/// Narrate a recommendation, optionally focused on one work item.
/// Never errors: any model failure or grounding violation produces the
/// deterministic rendition instead.
pub async fn explain(
    generator: &dyn Generate,
    response: &WhatNowResponse,
    focus: Option<&str>,
    cancel: &CancellationToken,
) -> Grounded<LlmExplanation> {
    let trace = match focus {
        Some(work_item_id) => RecommendationTrace::focused(response, work_item_id),
        None => RecommendationTrace::from_response(response),
    };
    match llm_explanation(generator, &trace, cancel).await {
        Some(explanation) => explanation,
        None => Grounded::deterministic(deterministic_explanation(&trace)),
    }
}

async fn llm_explanation(
    generator: &dyn Generate,
    trace: &RecommendationTrace,
    cancel: &CancellationToken,
) -> Option<Grounded<LlmExplanation>> {
    let prompt = match serde_json::to_string(trace) {
        Ok(prompt) => prompt,
        Err(_) => return None,
    };
    let raw = generator
        .generate(LlmTask::Explain, prompts::EXPLAIN_SYSTEM, &prompt, cancel)
        .await
        .ok()?;
    let json_text = extract_json_object(&raw)?;
    let explanation: LlmExplanation = serde_json::from_str(json_text).ok()?;

    // Grounding: one bad key poisons the lot.
    for factor in &explanation.factors {
        if !trace.contains(&factor.evidence_ref_key) {
            debug!(
                key = factor.evidence_ref_key,
                "explanation factor cited an unknown trace key; discarding llm output"
            );
            return None;
        }
    }
    if explanation.factors.is_empty() && !trace.keys.is_empty() {
        return None;
    }
    let confidence = explanation.confidence;
    Some(Grounded::llm(explanation, confidence))
}

/// Fallback built straight from reason records, blockers and risk rows.
pub fn deterministic_explanation(trace: &RecommendationTrace) -> LlmExplanation {
    let response = &trace.response;
    let mut factors = Vec::new();

    for slice in response.recommendations.iter().take(3) {
        let top_reason = slice
            .reasons
            .iter()
            .max_by(|a, b| {
                a.weight_delta
                    .abs()
                    .partial_cmp(&b.weight_delta.abs())
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
        match top_reason {
            Some(reason) => factors.push(ExplanationFactor {
                name: reason.code.clone(),
                impact: reason.weight_delta,
                direction: if reason.weight_delta < 0.0 { "down" } else { "up" }.to_string(),
                evidence_ref_type: "reason".to_string(),
                evidence_ref_key: format!("rec.{}.reason.{}", slice.work_item_id, reason.code),
                summary: format!("{}: {}", slice.title, reason.message),
            }),
            None => factors.push(ExplanationFactor {
                name: "score".to_string(),
                impact: slice.score,
                direction: "up".to_string(),
                evidence_ref_type: "score".to_string(),
                evidence_ref_key: format!("rec.{}.score", slice.work_item_id),
                summary: format!("{} scored {:.1}", slice.title, slice.score),
            }),
        }
    }

    for blocker in response.blockers.iter().take(3) {
        factors.push(ExplanationFactor {
            name: blocker.code.clone(),
            impact: 0.0,
            direction: "down".to_string(),
            evidence_ref_type: "blocker".to_string(),
            evidence_ref_key: format!("blocker.{}.{}", blocker.entity_id, blocker.code),
            summary: format!("{}: {}", blocker.entity_title, blocker.message),
        });
    }

    for risk in response.top_risk_projects.iter().take(2) {
        factors.push(ExplanationFactor {
            name: "required_daily".to_string(),
            impact: risk.required_daily_min,
            direction: "up".to_string(),
            evidence_ref_type: "risk".to_string(),
            evidence_ref_key: format!("risk.{}.required_daily_min", risk.project_id),
            summary: risk_summary(risk),
        });
    }

    let summary_short = if response.recommendations.is_empty() {
        "No work allocated for this request.".to_string()
    } else {
        let first = &response.recommendations[0];
        format!(
            "{} slices over {} of {} requested minutes; start with {} ({} min).",
            response.recommendations.len(),
            response.allocated_min,
            response.requested_min,
            first.title,
            first.alloc_min
        )
    };

    let mut detail_lines: Vec<String> = response
        .recommendations
        .iter()
        .map(|s| {
            format!(
                "{} min on {} ({}, score {:.1})",
                s.alloc_min,
                s.title,
                s.risk.as_str(),
                s.score
            )
        })
        .collect();
    detail_lines.extend(response.policy_messages.iter().cloned());

    LlmExplanation {
        context: "recommendation".to_string(),
        summary_short,
        summary_detailed: detail_lines.join("; "),
        factors,
        counterfactuals: None,
        confidence: 1.0,
    }
}

fn risk_summary(risk: &RiskAssessment) -> String {
    match risk.days_left {
        Some(days) => format!(
            "{} is {} with {} min remaining and {} days left ({:.0} min/day needed)",
            risk.project_name,
            risk.level.as_str(),
            risk.remaining_min,
            days,
            risk.required_daily_min
        ),
        None => format!("{} is {}", risk.project_name, risk.level.as_str()),
    }
}
