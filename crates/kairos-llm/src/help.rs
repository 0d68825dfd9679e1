// Grounded help.
//
// A separate agent answers "how do I..." questions, but only the
// command spec below is citable: every command path and flag the model
// suggests is checked against it, unknowns are stripped, and when
// nothing survives the deterministic generator answers from the spec
// table alone.

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::client::{Generate, LlmTask};
use crate::intent::extract_json_object;
use crate::prompts;
use crate::Grounded;

#[derive(Debug, Clone, Copy)]
pub struct CommandSpec {
    pub path: &'static str,
    pub about: &'static str,
    pub flags: &'static [&'static str],
}

/// The shell's command surface. The help agent may only reference what
/// is listed here.
pub const COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        path: "recommend",
        about: "recommend what to work on for the minutes you have",
        flags: &["--minutes", "--mode", "--project", "--max-slices", "--no-variation"],
    },
    CommandSpec {
        path: "status",
        about: "per-project risk and progress",
        flags: &["--project"],
    },
    CommandSpec {
        path: "replan",
        about: "re-estimate plans from observed pace and refresh risk",
        flags: &["--project"],
    },
    CommandSpec {
        path: "log",
        about: "log a work session on an item",
        flags: &["--item", "--minutes", "--units", "--note", "--date"],
    },
    CommandSpec {
        path: "project add",
        about: "create a project",
        flags: &["--name", "--domain", "--short-id", "--start", "--target"],
    },
    CommandSpec {
        path: "project list",
        about: "list projects",
        flags: &["--all"],
    },
    CommandSpec {
        path: "project archive",
        about: "archive a project",
        flags: &[],
    },
    CommandSpec {
        path: "project remove",
        about: "delete a project and everything under it",
        flags: &[],
    },
    CommandSpec {
        path: "ask",
        about: "free-text command, parsed and confirmed before any write",
        flags: &[],
    },
    CommandSpec {
        path: "shell",
        about: "interactive loop",
        flags: &[],
    },
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuggestedCommand {
    pub path: String,
    #[serde(default)]
    pub flags: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HelpAnswer {
    pub answer: String,
    #[serde(default)]
    pub commands: Vec<SuggestedCommand>,
}

pub async fn answer(
    generator: &dyn Generate,
    question: &str,
    cancel: &CancellationToken,
) -> Grounded<HelpAnswer> {
    match llm_answer(generator, question, cancel).await {
        Some(answer) => answer,
        None => Grounded::deterministic(deterministic_answer(question)),
    }
}

async fn llm_answer(
    generator: &dyn Generate,
    question: &str,
    cancel: &CancellationToken,
) -> Option<Grounded<HelpAnswer>> {
    let raw = generator
        .generate(LlmTask::Help, prompts::HELP_SYSTEM, question, cancel)
        .await
        .ok()?;
    let json_text = extract_json_object(&raw)?;
    let mut answer: HelpAnswer = serde_json::from_str(json_text).ok()?;

    // Strip anything the spec does not know; drop commands whose path
    // itself is unknown.
    answer.commands.retain_mut(|cmd| {
        let Some(spec) = COMMANDS.iter().find(|spec| spec.path == cmd.path) else {
            return false;
        };
        cmd.flags.retain(|flag| spec.flags.contains(&flag.as_str()));
        true
    });

    if answer.commands.is_empty() {
        return None;
    }
    Some(Grounded::llm(answer, 0.9))
}

/// Keyword match over the spec table; always answers.
pub fn deterministic_answer(question: &str) -> HelpAnswer {
    let lowered = question.to_lowercase();
    let mut matched: Vec<&CommandSpec> = COMMANDS
        .iter()
        .filter(|spec| {
            spec.path.split_whitespace().any(|w| lowered.contains(w))
                || spec
                    .about
                    .split_whitespace()
                    .any(|w| w.len() > 3 && lowered.contains(w))
        })
        .collect();
    if matched.is_empty() {
        matched = COMMANDS.iter().collect();
    }

    let commands = matched
        .iter()
        .map(|spec| SuggestedCommand {
            path: spec.path.to_string(),
            flags: spec.flags.iter().map(|f| f.to_string()).collect(),
        })
        .collect();
    let answer = matched
        .iter()
        .map(|spec| format!("`{}` — {}", spec.path, spec.about))
        .collect::<Vec<_>>()
        .join("\n");
    HelpAnswer { answer, commands }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intent::tests::FakeGenerator;
    use crate::{LlmError, Source};
    use serde_json::json;

    #[tokio::test]
    async fn known_commands_survive_validation() {
        let payload = json!({
            "answer": "Use recommend with a minute budget.",
            "commands": [
                {"path": "recommend", "flags": ["--minutes", "--mode"]},
                {"path": "status", "flags": ["--project"]}
            ]
        });
        let generator = FakeGenerator::new(vec![Ok(payload.to_string())]);
        let cancel = CancellationToken::new();
        let result = answer(&generator, "how do I plan my morning?", &cancel).await;
        assert_eq!(result.source, Source::Llm);
        assert_eq!(result.value.commands.len(), 2);
    }

    #[tokio::test]
    async fn unknown_paths_and_flags_are_stripped() {
        let payload = json!({
            "answer": "Try these.",
            "commands": [
                {"path": "recommend", "flags": ["--minutes", "--yolo"]},
                {"path": "sudo-everything", "flags": []}
            ]
        });
        let generator = FakeGenerator::new(vec![Ok(payload.to_string())]);
        let cancel = CancellationToken::new();
        let result = answer(&generator, "plan?", &cancel).await;
        assert_eq!(result.source, Source::Llm);
        assert_eq!(result.value.commands.len(), 1);
        assert_eq!(result.value.commands[0].path, "recommend");
        assert_eq!(result.value.commands[0].flags, vec!["--minutes"]);
    }

    #[tokio::test]
    async fn nothing_surviving_falls_back_to_spec_table() {
        let payload = json!({
            "answer": "Made-up commands only.",
            "commands": [{"path": "imaginary", "flags": ["--nope"]}]
        });
        let generator = FakeGenerator::new(vec![Ok(payload.to_string())]);
        let cancel = CancellationToken::new();
        let result = answer(&generator, "how do I log a session?", &cancel).await;
        assert_eq!(result.source, Source::Deterministic);
        assert_eq!(result.confidence, 1.0);
        assert!(result.value.commands.iter().any(|c| c.path == "log"));
    }

    #[tokio::test]
    async fn llm_failure_falls_back() {
        let generator = FakeGenerator::new(vec![Err(LlmError::Unavailable("down".into()))]);
        let cancel = CancellationToken::new();
        let result = answer(&generator, "how do I archive a project?", &cancel).await;
        assert_eq!(result.source, Source::Deterministic);
        assert!(result
            .value
            .commands
            .iter()
            .any(|c| c.path == "project archive"));
    }

    #[test]
    fn deterministic_answer_always_has_content() {
        let answer = deterministic_answer("completely unrelated gibberish xyzzy");
        assert!(!answer.commands.is_empty());
        assert!(!answer.answer.is_empty());
    }
}
