use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessKind {
    Engine,
    Shell,
}

impl ProcessKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ProcessKind::Engine => "engine",
            ProcessKind::Shell => "shell",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LoggingInitInfo {
    pub process: String,
    pub logs_dir: String,
    pub prefix: String,
    pub retention_days: u64,
    pub initialized_at: DateTime<Utc>,
}

/// One structured record per advisory-LLM call. Emitted whether or not
/// the call succeeded, so latency and failure-rate questions are
/// answerable from the log alone.
#[derive(Debug, Clone, Serialize)]
pub struct LlmCallEvent<'a> {
    pub task: &'a str,
    pub model: &'a str,
    pub latency_ms: u64,
    pub success: bool,
    pub error_code: Option<&'a str>,
}

/// One structured record per use-case invocation, behind the
/// log-usecases toggle.
#[derive(Debug, Clone, Serialize)]
pub struct UseCaseEvent<'a> {
    pub use_case: &'a str,
    pub outcome: &'a str,
    pub detail: Option<&'a str>,
}

/// Replace user text with a length + fingerprint marker. The
/// fingerprint lets two log lines be compared for same-input without
/// the log ever holding the input itself.
pub fn redact_text(input: &str) -> String {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return String::new();
    }
    format!(
        "[redacted {} chars fnv1a={:016x}]",
        trimmed.chars().count(),
        content_fingerprint(trimmed)
    )
}

/// 64-bit FNV-1a over the UTF-8 bytes. Stable across runs and
/// platforms, which DefaultHasher does not guarantee; not
/// collision-resistant and never used for anything security-shaped.
pub fn content_fingerprint(input: &str) -> u64 {
    const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;
    let mut hash = FNV_OFFSET;
    for byte in input.as_bytes() {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

pub fn emit_llm_call(level: Level, event: LlmCallEvent<'_>) {
    match level {
        Level::ERROR => tracing::error!(
            target: "kairos.obs",
            task = event.task,
            model = event.model,
            latency_ms = event.latency_ms,
            success = event.success,
            error_code = event.error_code.unwrap_or(""),
            "llm_call"
        ),
        Level::WARN => tracing::warn!(
            target: "kairos.obs",
            task = event.task,
            model = event.model,
            latency_ms = event.latency_ms,
            success = event.success,
            error_code = event.error_code.unwrap_or(""),
            "llm_call"
        ),
        _ => tracing::info!(
            target: "kairos.obs",
            task = event.task,
            model = event.model,
            latency_ms = event.latency_ms,
            success = event.success,
            error_code = event.error_code.unwrap_or(""),
            "llm_call"
        ),
    }
}

pub fn emit_use_case(event: UseCaseEvent<'_>) {
    tracing::info!(
        target: "kairos.obs",
        use_case = event.use_case,
        outcome = event.outcome,
        detail = event.detail.unwrap_or(""),
        "use_case"
    );
}

/// Set up process-wide logging: a compact console layer plus a daily
/// JSONL file under `logs_dir`, filtered by RUST_LOG (default info).
/// Files older than the retention window are pruned on startup.
/// The returned guard must stay alive for the file writer to flush.
pub fn init_process_logging(
    process: ProcessKind,
    logs_dir: &Path,
    retention_days: u64,
) -> anyhow::Result<(WorkerGuard, LoggingInitInfo)> {
    let prefix = format!("kairos.{}", process.as_str());
    fs::create_dir_all(logs_dir)?;

    let today = Utc::now().date_naive();
    let pruned = prune_stale_logs(logs_dir, &prefix, today, retention_days)?;
    if pruned > 0 {
        eprintln!("pruned {pruned} expired log file(s) from {}", logs_dir.display());
    }

    let appender = tracing_appender::rolling::Builder::new()
        .rotation(tracing_appender::rolling::Rotation::DAILY)
        .filename_prefix(&prefix)
        .filename_suffix("jsonl")
        .build(logs_dir)?;
    let (file_writer, guard) = tracing_appender::non_blocking(appender);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .compact()
                .with_target(true)
                .with_ansi(true),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(file_writer)
                .with_ansi(false)
                .with_current_span(false)
                .with_span_list(false),
        )
        .try_init()
        .ok();

    Ok((
        guard,
        LoggingInitInfo {
            process: process.as_str().to_string(),
            logs_dir: logs_dir.display().to_string(),
            prefix,
            retention_days,
            initialized_at: Utc::now(),
        },
    ))
}

/// Delete `<prefix>.YYYY-MM-DD.jsonl` files dated before the retention
/// window. Anything that does not match the naming scheme exactly is
/// left alone. Returns how many files were removed.
pub fn prune_stale_logs(
    logs_dir: &Path,
    prefix: &str,
    today: NaiveDate,
    retention_days: u64,
) -> anyhow::Result<usize> {
    let cutoff = today - chrono::Duration::days(retention_days as i64);

    let stale: Vec<PathBuf> = fs::read_dir(logs_dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .filter(|path| {
            path.file_name()
                .and_then(|name| name.to_str())
                .and_then(|name| log_file_date(name, prefix))
                .is_some_and(|date| date < cutoff)
        })
        .collect();

    let mut removed = 0;
    for path in stale {
        if fs::remove_file(&path).is_ok() {
            removed += 1;
        }
    }
    Ok(removed)
}

/// Parse the date out of a `<prefix>.YYYY-MM-DD.jsonl` file name;
/// None for anything else.
fn log_file_date(file_name: &str, prefix: &str) -> Option<NaiveDate> {
    let rest = file_name.strip_prefix(prefix)?.strip_prefix('.')?;
    let date_part = rest.strip_suffix(".jsonl")?;
    NaiveDate::parse_from_str(date_part, "%Y-%m-%d").ok()
}

/// Log files live next to the store, under `<root>/logs`.
pub fn default_logs_dir(root: &Path) -> PathBuf {
    root.join("logs")
}
