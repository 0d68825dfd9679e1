// Free-text command parsing.
//
// The model proposes; this module disposes. Whatever the LLM labels an
// intent, membership in the static write set is what decides risk and
// confirmation, and every intent's arguments pass a typed schema before
// anything executes. The freeform JSON map exists only at the
// serialization boundary; past `validate_args` everything is a tagged
// sum.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;

use kairos_types::PlanningMode;

use crate::client::{Generate, LlmTask};
use crate::prompts;
use crate::{LlmError, LlmResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    WhatNow,
    Status,
    Help,
    Explain,
    Replan,
    SessionLog,
    ProjectAdd,
    ProjectArchive,
    ProjectRemove,
    NodeAdd,
    NodeRemove,
    ItemAdd,
    ItemUpdate,
    ItemRemove,
    DependencyAdd,
    DependencyRemove,
    ProfileUpdate,
}

impl Intent {
    pub fn parse(raw: &str) -> Option<Self> {
        serde_json::from_value(Value::String(raw.trim().to_string())).ok()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Intent::WhatNow => "what_now",
            Intent::Status => "status",
            Intent::Help => "help",
            Intent::Explain => "explain",
            Intent::Replan => "replan",
            Intent::SessionLog => "session_log",
            Intent::ProjectAdd => "project_add",
            Intent::ProjectArchive => "project_archive",
            Intent::ProjectRemove => "project_remove",
            Intent::NodeAdd => "node_add",
            Intent::NodeRemove => "node_remove",
            Intent::ItemAdd => "item_add",
            Intent::ItemUpdate => "item_update",
            Intent::ItemRemove => "item_remove",
            Intent::DependencyAdd => "dependency_add",
            Intent::DependencyRemove => "dependency_remove",
            Intent::ProfileUpdate => "profile_update",
        }
    }

    /// The static write set. Membership here, not the model's opinion,
    /// decides that an intent mutates state.
    pub fn is_write(self) -> bool {
        !matches!(
            self,
            Intent::WhatNow | Intent::Status | Intent::Help | Intent::Explain
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentRisk {
    ReadOnly,
    Write,
}

/// Typed argument record, one variant per intent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "intent", rename_all = "snake_case")]
pub enum IntentArgs {
    WhatNow {
        available_min: i64,
        mode: Option<PlanningMode>,
        project_id: Option<String>,
    },
    Status {
        project_id: Option<String>,
    },
    Help {
        topic: Option<String>,
    },
    Explain {
        work_item_id: Option<String>,
    },
    Replan {
        project_id: Option<String>,
    },
    SessionLog {
        work_item_id: String,
        minutes: i64,
        units_done: Option<i64>,
        note: Option<String>,
    },
    ProjectAdd {
        name: String,
        domain: Option<String>,
        target_date: Option<NaiveDate>,
    },
    ProjectArchive {
        project_id: String,
    },
    ProjectRemove {
        project_id: String,
    },
    NodeAdd {
        project_id: String,
        title: String,
        kind: Option<String>,
    },
    NodeRemove {
        node_id: String,
    },
    ItemAdd {
        node_id: String,
        title: String,
        planned_min: Option<i64>,
    },
    ItemUpdate {
        work_item_id: String,
        status: Option<String>,
        planned_min: Option<i64>,
    },
    ItemRemove {
        work_item_id: String,
    },
    DependencyAdd {
        predecessor_id: String,
        successor_id: String,
    },
    DependencyRemove {
        predecessor_id: String,
        successor_id: String,
    },
    ProfileUpdate {
        buffer_pct: Option<f64>,
        default_max_slices: Option<i64>,
        baseline_daily_min: Option<i64>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedIntent {
    pub intent: Intent,
    pub risk: IntentRisk,
    pub args: IntentArgs,
    pub confidence: f64,
    pub requires_confirmation: bool,
    pub clarification_options: Vec<String>,
    pub rationale: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedIntentError {
    pub code: String,
    pub message: String,
    pub clarification_options: Vec<String>,
}

/// Terminal resolution of one ask.
#[derive(Debug, Clone, PartialEq)]
pub enum AskResolution {
    Executed(ParsedIntent),
    NeedsConfirmation(ParsedIntent),
    NeedsClarification(ParsedIntent),
    Rejected(ParsedIntentError),
}

/// What the model actually returns, before any enforcement.
#[derive(Debug, Clone, Deserialize)]
struct RawParsedIntent {
    intent: String,
    #[serde(default)]
    risk: Option<String>,
    #[serde(default)]
    arguments: Map<String, Value>,
    #[serde(default)]
    confidence: f64,
    #[serde(default)]
    requires_confirmation: bool,
    #[serde(default)]
    clarification_options: Vec<String>,
    #[serde(default)]
    rationale: Option<String>,
}

/// Parse free text through the model, then resolve deterministically.
/// LLM failures surface typed; everything after the raw JSON is local.
pub async fn parse(
    generator: &dyn Generate,
    auto_execute_read_threshold: f64,
    text: &str,
    cancel: &CancellationToken,
) -> LlmResult<AskResolution> {
    let raw_text = generator
        .generate(LlmTask::Intent, prompts::INTENT_SYSTEM, text, cancel)
        .await?;
    let raw = decode_raw(&raw_text)?;
    Ok(resolve(raw, auto_execute_read_threshold))
}

fn decode_raw(raw_text: &str) -> LlmResult<RawParsedIntent> {
    let json_text = extract_json_object(raw_text)
        .ok_or_else(|| LlmError::InvalidOutput("no JSON object in intent response".into()))?;
    serde_json::from_str::<RawParsedIntent>(json_text)
        .map_err(|e| LlmError::InvalidOutput(format!("intent JSON did not match schema: {e}")))
}

/// Deterministic second half: write-safety enforcement, argument schema
/// validation, then the confirmation policy.
fn resolve(raw: RawParsedIntent, auto_execute_read_threshold: f64) -> AskResolution {
    let Some(intent) = Intent::parse(&raw.intent) else {
        return AskResolution::Rejected(ParsedIntentError {
            code: "UNKNOWN_INTENT".to_string(),
            message: format!("`{}` is not a known command intent", raw.intent),
            clarification_options: raw.clarification_options,
        });
    };

    // 1. write-safety: the static set or the model's own label, whichever
    //    is stricter, and confirmation is forced along with it.
    let model_says_write = raw.risk.as_deref() == Some("write");
    let (risk, requires_confirmation) = if intent.is_write() || model_says_write {
        (IntentRisk::Write, true)
    } else {
        (IntentRisk::ReadOnly, raw.requires_confirmation)
    };

    // 2. per-intent argument schema
    let args = match validate_args(intent, &raw.arguments) {
        Ok(args) => args,
        Err(err) => return AskResolution::Rejected(err),
    };

    let parsed = ParsedIntent {
        intent,
        risk,
        args,
        confidence: raw.confidence.clamp(0.0, 1.0),
        requires_confirmation,
        clarification_options: raw.clarification_options,
        rationale: raw.rationale,
    };

    // 3. confirmation policy
    if parsed.risk == IntentRisk::Write {
        AskResolution::NeedsConfirmation(parsed)
    } else if parsed.confidence >= auto_execute_read_threshold {
        AskResolution::Executed(parsed)
    } else {
        AskResolution::NeedsClarification(parsed)
    }
}

fn validate_args(intent: Intent, args: &Map<String, Value>) -> Result<IntentArgs, ParsedIntentError> {
    match intent {
        Intent::WhatNow => {
            let available_min = require_positive_int(args, "available_min")?;
            let mode = match optional_string(args, "mode") {
                Some(raw) => Some(PlanningMode::parse(&raw).ok_or_else(|| {
                    invalid("mode", format!("`{raw}` is not balanced or critical"))
                })?),
                None => None,
            };
            Ok(IntentArgs::WhatNow {
                available_min,
                mode,
                project_id: optional_string(args, "project_id"),
            })
        }
        Intent::Status => Ok(IntentArgs::Status {
            project_id: optional_string(args, "project_id"),
        }),
        Intent::Help => Ok(IntentArgs::Help {
            topic: optional_string(args, "topic"),
        }),
        Intent::Explain => Ok(IntentArgs::Explain {
            work_item_id: optional_string(args, "work_item_id"),
        }),
        Intent::Replan => Ok(IntentArgs::Replan {
            project_id: optional_string(args, "project_id"),
        }),
        Intent::SessionLog => Ok(IntentArgs::SessionLog {
            work_item_id: require_string(args, "work_item_id")?,
            minutes: require_positive_int(args, "minutes")?,
            units_done: optional_int(args, "units_done"),
            note: optional_string(args, "note"),
        }),
        Intent::ProjectAdd => Ok(IntentArgs::ProjectAdd {
            name: require_string(args, "name")?,
            domain: optional_string(args, "domain"),
            target_date: optional_date(args, "target_date")?,
        }),
        Intent::ProjectArchive => Ok(IntentArgs::ProjectArchive {
            project_id: require_string(args, "project_id")?,
        }),
        Intent::ProjectRemove => Ok(IntentArgs::ProjectRemove {
            project_id: require_string(args, "project_id")?,
        }),
        Intent::NodeAdd => Ok(IntentArgs::NodeAdd {
            project_id: require_string(args, "project_id")?,
            title: require_string(args, "title")?,
            kind: optional_string(args, "kind"),
        }),
        Intent::NodeRemove => Ok(IntentArgs::NodeRemove {
            node_id: require_string(args, "node_id")?,
        }),
        Intent::ItemAdd => Ok(IntentArgs::ItemAdd {
            node_id: require_string(args, "node_id")?,
            title: require_string(args, "title")?,
            planned_min: optional_int(args, "planned_min"),
        }),
        Intent::ItemUpdate => Ok(IntentArgs::ItemUpdate {
            work_item_id: require_string(args, "work_item_id")?,
            status: optional_string(args, "status"),
            planned_min: optional_int(args, "planned_min"),
        }),
        Intent::ItemRemove => Ok(IntentArgs::ItemRemove {
            work_item_id: require_string(args, "work_item_id")?,
        }),
        Intent::DependencyAdd => Ok(IntentArgs::DependencyAdd {
            predecessor_id: require_string(args, "predecessor_id")?,
            successor_id: require_string(args, "successor_id")?,
        }),
        Intent::DependencyRemove => Ok(IntentArgs::DependencyRemove {
            predecessor_id: require_string(args, "predecessor_id")?,
            successor_id: require_string(args, "successor_id")?,
        }),
        Intent::ProfileUpdate => {
            let buffer_pct = match args.get("buffer_pct") {
                Some(value) => Some(value.as_f64().filter(|v| *v >= 0.0).ok_or_else(|| {
                    invalid("buffer_pct", "must be a non-negative number".to_string())
                })?),
                None => None,
            };
            Ok(IntentArgs::ProfileUpdate {
                buffer_pct,
                default_max_slices: optional_int(args, "default_max_slices"),
                baseline_daily_min: optional_int(args, "baseline_daily_min"),
            })
        }
    }
}

fn invalid(field: &str, message: String) -> ParsedIntentError {
    ParsedIntentError {
        code: "VALIDATION".to_string(),
        message: format!("{field}: {message}"),
        clarification_options: Vec::new(),
    }
}

fn require_string(args: &Map<String, Value>, field: &str) -> Result<String, ParsedIntentError> {
    optional_string(args, field)
        .ok_or_else(|| invalid(field, "required field is missing".to_string()))
}

fn optional_string(args: &Map<String, Value>, field: &str) -> Option<String> {
    args.get(field)
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
}

fn require_positive_int(args: &Map<String, Value>, field: &str) -> Result<i64, ParsedIntentError> {
    let value = args
        .get(field)
        .and_then(value_as_int)
        .ok_or_else(|| invalid(field, "required integer is missing".to_string()))?;
    if value <= 0 {
        return Err(invalid(field, format!("must be > 0, got {value}")));
    }
    Ok(value)
}

fn optional_int(args: &Map<String, Value>, field: &str) -> Option<i64> {
    args.get(field).and_then(value_as_int)
}

/// Models frequently emit numbers as strings; accept both.
fn value_as_int(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn optional_date(
    args: &Map<String, Value>,
    field: &str,
) -> Result<Option<NaiveDate>, ParsedIntentError> {
    match optional_string(args, field) {
        Some(raw) => NaiveDate::parse_from_str(&raw, "%Y-%m-%d")
            .map(Some)
            .map_err(|_| invalid(field, format!("`{raw}` is not a YYYY-MM-DD date"))),
        None => Ok(None),
    }
}

/// Pull the outermost JSON object out of a possibly chatty completion
/// (code fences, prose around the payload).
pub(crate) fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end <= start {
        return None;
    }
    Some(&text[start..=end])
}
