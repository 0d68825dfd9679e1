// HTTP generation client.
//
// One endpoint, one request shape: POST {model, system, prompt,
// stream:false, options{temperature, num_predict}}, response
// {model, response}. Every call races its per-task timeout against the
// caller's cancellation token and emits one observability event.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::{warn, Level};

use kairos_observability::{emit_llm_call, redact_text, LlmCallEvent};

use crate::{LlmError, LlmResult};

#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub enabled: bool,
    pub url: String,
    pub model: String,
    /// Global default timeout; per-task values override it.
    pub timeout: Duration,
    pub retries: u32,
    pub intent_timeout: Duration,
    pub explain_timeout: Duration,
    pub draft_timeout: Duration,
    pub project_draft_timeout: Duration,
    /// Read intents at or above this confidence auto-execute.
    pub auto_execute_read_threshold: f64,
    pub log_calls: bool,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            url: "http://127.0.0.1:11434/api/generate".to_string(),
            model: "llama3.1:8b".to_string(),
            timeout: Duration::from_secs(6),
            retries: 1,
            intent_timeout: Duration::from_secs(3),
            explain_timeout: Duration::from_secs(6),
            draft_timeout: Duration::from_secs(8),
            project_draft_timeout: Duration::from_secs(30),
            auto_execute_read_threshold: 0.8,
            log_calls: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmTask {
    Intent,
    Explain,
    Help,
    Draft,
    ProjectDraft,
}

impl LlmTask {
    pub fn as_str(self) -> &'static str {
        match self {
            LlmTask::Intent => "intent",
            LlmTask::Explain => "explain",
            LlmTask::Help => "help",
            LlmTask::Draft => "draft",
            LlmTask::ProjectDraft => "project_draft",
        }
    }

    pub fn timeout(self, config: &LlmConfig) -> Duration {
        match self {
            LlmTask::Intent => config.intent_timeout,
            LlmTask::Explain => config.explain_timeout,
            LlmTask::Help => config.timeout,
            LlmTask::Draft => config.draft_timeout,
            LlmTask::ProjectDraft => config.project_draft_timeout,
        }
    }

    /// Structured-output tasks run cold; prose can wander a little.
    fn temperature(self) -> f64 {
        match self {
            LlmTask::Intent | LlmTask::ProjectDraft => 0.1,
            LlmTask::Explain | LlmTask::Help | LlmTask::Draft => 0.3,
        }
    }

    fn num_predict(self) -> u32 {
        match self {
            LlmTask::Intent => 512,
            LlmTask::Explain | LlmTask::Help | LlmTask::Draft => 1024,
            LlmTask::ProjectDraft => 2048,
        }
    }
}

/// The seam between the boundary and the model. Production code uses
/// [`HttpGenerator`]; tests script responses through a fake.
#[async_trait]
pub trait Generate: Send + Sync {
    async fn generate(
        &self,
        task: LlmTask,
        system: &str,
        prompt: &str,
        cancel: &CancellationToken,
    ) -> LlmResult<String>;
}

pub struct HttpGenerator {
    config: LlmConfig,
    client: Client,
}

impl HttpGenerator {
    pub fn new(config: LlmConfig) -> Self {
        Self {
            config,
            client: Client::new(),
        }
    }

    pub fn config(&self) -> &LlmConfig {
        &self.config
    }

    async fn post(&self, task: LlmTask, system: &str, prompt: &str) -> LlmResult<String> {
        let body = json!({
            "model": self.config.model,
            "system": system,
            "prompt": prompt,
            "stream": false,
            "options": {
                "temperature": task.temperature(),
                "num_predict": task.num_predict(),
            }
        });
        let response = self
            .client
            .post(&self.config.url)
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::Unavailable(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(LlmError::Unavailable(format!(
                "generation endpoint returned {status}: {}",
                truncate_for_error(&text, 300)
            )));
        }
        let value: serde_json::Value = response
            .json()
            .await
            .map_err(|e| LlmError::InvalidOutput(e.to_string()))?;
        value
            .get("response")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
            .ok_or_else(|| {
                LlmError::InvalidOutput("generation response carried no `response` field".into())
            })
    }
}

#[async_trait]
impl Generate for HttpGenerator {
    async fn generate(
        &self,
        task: LlmTask,
        system: &str,
        prompt: &str,
        cancel: &CancellationToken,
    ) -> LlmResult<String> {
        if !self.config.enabled {
            return Err(LlmError::Disabled);
        }

        let timeout = task.timeout(&self.config);
        let mut attempts_left = self.config.retries + 1;

        loop {
            attempts_left -= 1;
            let started = Instant::now();

            let result = tokio::select! {
                _ = cancel.cancelled() => Err(LlmError::Cancelled),
                _ = tokio::time::sleep(timeout) => Err(LlmError::Timeout),
                result = self.post(task, system, prompt) => result,
            };
            let latency_ms = started.elapsed().as_millis() as u64;

            let (success, error_code) = match &result {
                Ok(_) => (true, None),
                Err(err) => (false, Some(error_code(err))),
            };
            emit_llm_call(
                if success { Level::INFO } else { Level::WARN },
                LlmCallEvent {
                    task: task.as_str(),
                    model: &self.config.model,
                    latency_ms,
                    success,
                    error_code,
                },
            );
            if self.config.log_calls {
                tracing::debug!(
                    target: "kairos.obs",
                    task = task.as_str(),
                    prompt = %redact_text(prompt),
                    "llm_call_payload"
                );
            }

            match result {
                Ok(text) => return Ok(text),
                Err(err @ LlmError::Unavailable(_)) => {
                    if attempts_left > 0 {
                        warn!(task = task.as_str(), "transient llm failure, retrying once");
                        continue;
                    }
                    // a retried call that stayed transient reports as
                    // exhausted; a single-attempt config keeps the cause
                    return Err(if self.config.retries > 0 {
                        LlmError::RetryExhausted
                    } else {
                        err
                    });
                }
                Err(err) => return Err(err),
            }
        }
    }
}

pub fn error_code(err: &LlmError) -> &'static str {
    match err {
        LlmError::Disabled => "disabled",
        LlmError::Unavailable(_) => "unavailable",
        LlmError::Timeout => "timeout",
        LlmError::InvalidOutput(_) => "invalid_output",
        LlmError::RetryExhausted => "retry_exhausted",
        LlmError::Cancelled => "cancelled",
    }
}

fn truncate_for_error(input: &str, max_len: usize) -> String {
    if input.len() <= max_len {
        input.to_string()
    } else {
        format!("{}...", &input[..max_len])
    }
}
