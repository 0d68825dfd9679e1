// Environment configuration. Everything is a KAIROS_* variable with a
// sensible default; the CLI's --db flag overrides the store path.

use std::path::PathBuf;
use std::time::Duration;

use kairos_llm::client::LlmConfig;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub db_path: PathBuf,
    pub template_dir: PathBuf,
    pub log_usecases: bool,
    pub llm: LlmConfig,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let defaults = LlmConfig::default();
        let llm = LlmConfig {
            enabled: env_bool("KAIROS_LLM_ENABLED").unwrap_or(defaults.enabled),
            url: env_string("KAIROS_LLM_URL").unwrap_or(defaults.url),
            model: env_string("KAIROS_LLM_MODEL").unwrap_or(defaults.model),
            timeout: env_secs("KAIROS_LLM_TIMEOUT_SECS").unwrap_or(defaults.timeout),
            retries: env_u32("KAIROS_LLM_RETRIES").unwrap_or(defaults.retries),
            intent_timeout: env_secs("KAIROS_LLM_INTENT_TIMEOUT_SECS")
                .unwrap_or(defaults.intent_timeout),
            explain_timeout: env_secs("KAIROS_LLM_EXPLAIN_TIMEOUT_SECS")
                .unwrap_or(defaults.explain_timeout),
            draft_timeout: env_secs("KAIROS_LLM_DRAFT_TIMEOUT_SECS")
                .unwrap_or(defaults.draft_timeout),
            project_draft_timeout: env_secs("KAIROS_LLM_PROJECT_DRAFT_TIMEOUT_SECS")
                .unwrap_or(defaults.project_draft_timeout),
            auto_execute_read_threshold: env_f64("KAIROS_LLM_CONFIDENCE_THRESHOLD")
                .filter(|v| (0.0..=1.0).contains(v))
                .unwrap_or(defaults.auto_execute_read_threshold),
            log_calls: env_bool("KAIROS_LOG_LLM_CALLS").unwrap_or(defaults.log_calls),
        };

        Self {
            db_path: resolve_db_path(None),
            template_dir: resolve_template_dir(),
            log_usecases: env_bool("KAIROS_LOG_USECASES").unwrap_or(false),
            llm,
        }
    }

    pub fn with_db_override(mut self, flag: Option<String>) -> Self {
        if flag.is_some() {
            self.db_path = resolve_db_path(flag);
        }
        self
    }
}

pub fn resolve_db_path(flag: Option<String>) -> PathBuf {
    if let Some(path) = flag {
        return PathBuf::from(path);
    }
    if let Some(path) = env_string("KAIROS_DB") {
        return PathBuf::from(path);
    }
    if let Some(data_dir) = dirs::data_dir() {
        return data_dir.join("kairos").join("kairos.db");
    }
    PathBuf::from(".kairos/kairos.db")
}

fn resolve_template_dir() -> PathBuf {
    if let Some(path) = env_string("KAIROS_TEMPLATE_DIR") {
        return PathBuf::from(path);
    }
    if let Some(config_dir) = dirs::config_dir() {
        return config_dir.join("kairos").join("templates");
    }
    PathBuf::from(".kairos/templates")
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn env_bool(key: &str) -> Option<bool> {
    env_string(key).and_then(|v| parse_bool_like(&v))
}

fn env_u32(key: &str) -> Option<u32> {
    env_string(key).and_then(|v| v.trim().parse().ok())
}

fn env_f64(key: &str) -> Option<f64> {
    env_string(key).and_then(|v| v.trim().parse().ok())
}

fn env_secs(key: &str) -> Option<Duration> {
    env_u32(key).map(|secs| Duration::from_secs(secs as u64))
}

pub fn parse_bool_like(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bool_parsing_accepts_common_spellings() {
        assert_eq!(parse_bool_like("1"), Some(true));
        assert_eq!(parse_bool_like("Yes"), Some(true));
        assert_eq!(parse_bool_like("off"), Some(false));
        assert_eq!(parse_bool_like("maybe"), None);
    }

    #[test]
    fn flag_override_wins_over_env() {
        let path = resolve_db_path(Some("/tmp/custom.db".to_string()));
        assert_eq!(path, PathBuf::from("/tmp/custom.db"));
    }
}
