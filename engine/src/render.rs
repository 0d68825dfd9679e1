// Plain-text rendering for the shell. No colour, no tables wider than
// a terminal, nothing clever.

use kairos_llm::explain::LlmExplanation;
use kairos_llm::help::HelpAnswer;
use kairos_llm::intent::{IntentRisk, ParsedIntent};
use kairos_llm::{Grounded, Source};
use kairos_types::{Project, ReplanResponse, StatusResponse, WhatNowResponse};

pub fn what_now(response: &WhatNowResponse) -> String {
    let mut out = Vec::new();
    out.push(format!(
        "plan ({} mode): {} of {} min allocated",
        response.mode.as_str(),
        response.allocated_min,
        response.requested_min
    ));
    for (index, slice) in response.recommendations.iter().enumerate() {
        let due = slice
            .due_date
            .map(|d| format!(", due {}", d.format("%Y-%m-%d")))
            .unwrap_or_default();
        out.push(format!(
            "  {}. {} — {} min ({}, score {:.1}{})",
            index + 1,
            slice.title,
            slice.alloc_min,
            slice.risk.as_str(),
            slice.score,
            due
        ));
        for reason in &slice.reasons {
            out.push(format!(
                "       [{}] {} ({:+.1})",
                reason.code, reason.message, reason.weight_delta
            ));
        }
    }
    if !response.blockers.is_empty() {
        out.push("blocked:".to_string());
        for blocker in &response.blockers {
            out.push(format!(
                "  - {} [{}]: {}",
                blocker.entity_title, blocker.code, blocker.message
            ));
        }
    }
    if !response.top_risk_projects.is_empty() {
        out.push("at risk:".to_string());
        for risk in &response.top_risk_projects {
            let days = risk
                .days_left
                .map(|d| format!("{d} days left"))
                .unwrap_or_else(|| "no target".to_string());
            out.push(format!(
                "  - {} ({}): {} min remaining, {}, {:.0} min/day needed",
                risk.project_name,
                risk.level.as_str(),
                risk.remaining_min,
                days,
                risk.required_daily_min
            ));
        }
    }
    for message in &response.policy_messages {
        out.push(format!("note: {message}"));
    }
    out.join("\n")
}

pub fn status(response: &StatusResponse) -> String {
    if response.projects.is_empty() {
        return "no projects".to_string();
    }
    let mut out = Vec::new();
    for row in &response.projects {
        let progress = if row.planned_min_total > 0 {
            format!(
                "{:.0}%",
                100.0 * row.logged_min_total as f64 / row.planned_min_total as f64
            )
        } else {
            "-".to_string()
        };
        out.push(format!(
            "{} [{}] {} done / {} items, {} of {} min ({}), {:.0} min/day needed",
            row.risk.project_name,
            row.risk.level.as_str(),
            row.items_done,
            row.items_total,
            row.logged_min_total,
            row.planned_min_total,
            progress,
            row.risk.required_daily_min
        ));
    }
    out.join("\n")
}

pub fn type_mix(mix: &[kairos_store::SessionTypeAggregate]) -> String {
    let mut out = vec!["last 4 weeks by type:".to_string()];
    for row in mix {
        out.push(format!(
            "  {} — {} min over {} sessions",
            row.item_type, row.minutes, row.sessions
        ));
    }
    out.join("\n")
}

pub fn replan(response: &ReplanResponse) -> String {
    let mut out = Vec::new();
    if response.updates.is_empty() {
        out.push("no estimates changed".to_string());
    }
    for update in &response.updates {
        out.push(format!(
            "{}: {} -> {} min",
            update.title, update.old_planned_min, update.new_planned_min
        ));
    }
    for risk in &response.risks {
        out.push(format!(
            "{}: {}",
            risk.project_name,
            risk.level.as_str()
        ));
    }
    out.join("\n")
}

pub fn projects(listed: &[Project]) -> String {
    if listed.is_empty() {
        return "no projects".to_string();
    }
    listed
        .iter()
        .map(|p| {
            let short = if p.short_id.is_empty() {
                String::new()
            } else {
                format!(" [{}]", p.short_id)
            };
            let target = p
                .target_date
                .map(|d| format!(" target {}", d.format("%Y-%m-%d")))
                .unwrap_or_default();
            format!("{}{} ({}){} — {}", p.name, short, p.status, target, p.id)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn explanation(grounded: &Grounded<LlmExplanation>) -> String {
    let provenance = match grounded.source {
        Source::Llm => format!("narrated (confidence {:.2})", grounded.confidence),
        Source::Deterministic => "deterministic summary".to_string(),
    };
    let mut out = vec![format!("-- {provenance} --")];
    out.push(grounded.value.summary_short.clone());
    if !grounded.value.summary_detailed.is_empty() {
        out.push(grounded.value.summary_detailed.clone());
    }
    for factor in &grounded.value.factors {
        out.push(format!(
            "  {} {} ({:+.1}) <{}>",
            factor.direction, factor.name, factor.impact, factor.evidence_ref_key
        ));
    }
    out.join("\n")
}

pub fn help(answer: &Grounded<HelpAnswer>) -> String {
    let mut out = vec![answer.value.answer.clone()];
    for command in &answer.value.commands {
        if command.flags.is_empty() {
            out.push(format!("  kairos {}", command.path));
        } else {
            out.push(format!("  kairos {} {}", command.path, command.flags.join(" ")));
        }
    }
    out.join("\n")
}

pub fn intent_summary(parsed: &ParsedIntent) -> String {
    let risk = match parsed.risk {
        IntentRisk::Write => "write",
        IntentRisk::ReadOnly => "read-only",
    };
    let mut out = vec![format!(
        "{} ({risk}, confidence {:.2})",
        parsed.intent.as_str(),
        parsed.confidence
    )];
    if let Ok(args) = serde_json::to_string_pretty(&parsed.args) {
        out.push(args);
    }
    if let Some(rationale) = &parsed.rationale {
        out.push(format!("rationale: {rationale}"));
    }
    out.join("\n")
}
