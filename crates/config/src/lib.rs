//! Configuration loading and validation for Pagemind.
//!
//! An agent is fully described by one config file (TOML or JSON, picked by
//! extension) naming the model endpoint, the per-phase prompts, the memory
//! limits, and the paths of the two memory files. Environment variables
//! override the endpoint credentials so keys stay out of checked-in files.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use pagemind_core::{Phase, Value};

/// The root configuration for one agent.
#[derive(Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Full URL of the chat-completions endpoint.
    pub endpoint: String,

    /// Model name sent in the request body.
    pub model: String,

    /// Sampling temperature.
    #[serde(default = "default_temperature")]
    pub temperature: f64,

    /// Bearer token for the endpoint. Optional; local endpoints such as
    /// LM Studio accept unauthenticated requests.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// The per-phase prompts plus the shared system prompt.
    pub prompts: PromptConfig,

    /// Phase the agent starts in.
    #[serde(default = "default_initial_phase")]
    pub initial_phase: Phase,

    /// Snapshot size that forces a paging transition after a step.
    #[serde(default = "default_soft_limit")]
    pub soft_limit_bytes: u64,

    /// Memory size that triggers the overflow manager. Also the capacity
    /// ceiling for the tiered store.
    #[serde(default = "default_hard_limit")]
    pub hard_limit_bytes: u64,

    /// Path of the on-disk memory file.
    #[serde(default = "default_memory_path")]
    pub memory_path: PathBuf,

    /// Path of the on-disk directory file.
    #[serde(default = "default_directory_path")]
    pub directory_path: PathBuf,

    /// How many rotating `thinking_log_NNN` slots to keep.
    #[serde(default = "default_max_thinking_logs")]
    pub max_thinking_logs: u32,

    /// How many `evaluation_log_NNN` slots to keep.
    #[serde(default = "default_max_evaluation_logs")]
    pub max_evaluation_logs: u32,
}

/// The prompt set. Each prompt is an arbitrary JSON value; the composer
/// serializes it verbatim into the message content.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptConfig {
    pub system: Value,
    pub thinking: Value,
    pub paging: Value,
    pub evaluating: Value,
    pub executing: Value,
}

impl PromptConfig {
    /// The prompt for a phase. Unrecognized phases fall back to the
    /// thinking prompt, which is what the loop does as well.
    pub fn for_phase(&self, phase: Phase) -> &Value {
        match phase {
            Phase::Thinking => &self.thinking,
            Phase::Paging => &self.paging,
            Phase::Evaluating => &self.evaluating,
            Phase::Executing => &self.executing,
        }
    }
}

fn default_temperature() -> f64 {
    0.7
}
fn default_initial_phase() -> Phase {
    Phase::Thinking
}
fn default_soft_limit() -> u64 {
    32 * 1024
}
fn default_hard_limit() -> u64 {
    256 * 1024
}
fn default_memory_path() -> PathBuf {
    PathBuf::from("memory.json")
}
fn default_directory_path() -> PathBuf {
    PathBuf::from("directory.json")
}
fn default_max_thinking_logs() -> u32 {
    4
}
fn default_max_evaluation_logs() -> u32 {
    10
}

impl std::fmt::Debug for AgentConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentConfig")
            .field("endpoint", &self.endpoint)
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("api_key", if self.api_key.is_some() { &"[REDACTED]" } else { &"None" })
            .field("initial_phase", &self.initial_phase)
            .field("soft_limit_bytes", &self.soft_limit_bytes)
            .field("hard_limit_bytes", &self.hard_limit_bytes)
            .field("memory_path", &self.memory_path)
            .field("directory_path", &self.directory_path)
            .field("max_thinking_logs", &self.max_thinking_logs)
            .field("max_evaluation_logs", &self.max_evaluation_logs)
            .finish()
    }
}

impl AgentConfig {
    /// Load a config file, apply environment overrides, and validate.
    ///
    /// `.json` files are parsed as JSON; anything else as TOML.
    /// Environment overrides, highest priority first:
    /// - `PAGEMIND_API_KEY` replaces `api_key`
    /// - `PAGEMIND_ENDPOINT` replaces `endpoint`
    /// - `PAGEMIND_MODEL` replaces `model`
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load_from(path)?;

        if let Ok(key) = std::env::var("PAGEMIND_API_KEY") {
            config.api_key = Some(key);
        }
        if let Ok(endpoint) = std::env::var("PAGEMIND_ENDPOINT") {
            config.endpoint = endpoint;
        }
        if let Ok(model) = std::env::var("PAGEMIND_MODEL") {
            config.model = model;
        }

        config.validate()?;
        Ok(config)
    }

    /// Load a config file without environment overrides.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = if path.extension().is_some_and(|ext| ext == "json") {
            serde_json::from_str(&content).map_err(|e| ConfigError::Parse {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?
        } else {
            toml::from_str(&content).map_err(|e| ConfigError::Parse {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?
        };

        tracing::debug!(path = %path.display(), "Loaded agent config");
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.endpoint.starts_with("http://") && !self.endpoint.starts_with("https://") {
            return Err(ConfigError::Validation(format!(
                "endpoint must be an http(s) URL, got '{}'",
                self.endpoint
            )));
        }
        if self.model.trim().is_empty() {
            return Err(ConfigError::Validation("model must not be empty".into()));
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(ConfigError::Validation(
                "temperature must be between 0.0 and 2.0".into(),
            ));
        }
        if self.soft_limit_bytes == 0 || self.hard_limit_bytes == 0 {
            return Err(ConfigError::Validation(
                "soft_limit_bytes and hard_limit_bytes must be non-zero".into(),
            ));
        }
        if self.soft_limit_bytes > self.hard_limit_bytes {
            return Err(ConfigError::Validation(format!(
                "soft_limit_bytes ({}) must not exceed hard_limit_bytes ({})",
                self.soft_limit_bytes, self.hard_limit_bytes
            )));
        }
        if self.max_thinking_logs == 0 {
            return Err(ConfigError::Validation(
                "max_thinking_logs must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    Read { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    Parse { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    Validation(String),
}

impl From<ConfigError> for pagemind_core::Error {
    fn from(err: ConfigError) -> Self {
        pagemind_core::Error::Config {
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    fn sample_toml() -> &'static str {
        r#"
endpoint = "http://localhost:1234/v1/chat/completions"
model = "qwen3-30b"
temperature = 0.6
initial_phase = "thinking"
soft_limit_bytes = 4096
hard_limit_bytes = 65536
memory_path = "data/memory.json"
directory_path = "data/directory.json"

[prompts]
system = { role = "autonomous agent" }
thinking = { instruction = "think" }
paging = { instruction = "page" }
evaluating = { instruction = "evaluate" }
executing = { instruction = "execute" }
"#
    }

    fn write_temp(contents: &str, suffix: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new()
            .suffix(suffix)
            .tempfile()
            .unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn toml_config_loads() {
        let file = write_temp(sample_toml(), ".toml");
        let config = AgentConfig::load_from(file.path()).unwrap();
        assert_eq!(config.model, "qwen3-30b");
        assert_eq!(config.initial_phase, Phase::Thinking);
        assert_eq!(config.soft_limit_bytes, 4096);
        assert_eq!(config.max_thinking_logs, 4);
        assert_eq!(
            config.prompts.thinking.get("instruction").and_then(Value::as_str),
            Some("think")
        );
    }

    #[test]
    fn json_config_loads() {
        let json = r#"{
            "endpoint": "http://localhost:1234/v1/chat/completions",
            "model": "qwen3-30b",
            "prompts": {
                "system": {"role": "agent"},
                "thinking": "think",
                "paging": "page",
                "evaluating": "evaluate",
                "executing": "execute"
            }
        }"#;
        let file = write_temp(json, ".json");
        let config = AgentConfig::load_from(file.path()).unwrap();
        assert_eq!(config.temperature, 0.7);
        assert_eq!(config.hard_limit_bytes, default_hard_limit());
        assert_eq!(config.prompts.executing.as_str(), Some("execute"));
    }

    #[test]
    fn missing_file_is_read_error() {
        let result = AgentConfig::load_from(Path::new("/nonexistent/agent.toml"));
        assert!(matches!(result, Err(ConfigError::Read { .. })));
    }

    #[test]
    fn bad_endpoint_rejected() {
        let file = write_temp(
            &sample_toml().replace("http://localhost:1234/v1/chat/completions", "ftp://x"),
            ".toml",
        );
        let config = AgentConfig::load_from(file.path()).unwrap();
        assert!(matches!(config.validate(), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn inverted_limits_rejected() {
        let file = write_temp(
            &sample_toml().replace("soft_limit_bytes = 4096", "soft_limit_bytes = 131072"),
            ".toml",
        );
        let config = AgentConfig::load_from(file.path()).unwrap();
        assert!(matches!(config.validate(), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn prompt_fallback_by_phase() {
        let file = write_temp(sample_toml(), ".toml");
        let config = AgentConfig::load_from(file.path()).unwrap();
        assert_eq!(
            config.prompts.for_phase(Phase::Paging).get("instruction").and_then(Value::as_str),
            Some("page")
        );
    }

    #[test]
    fn debug_redacts_api_key() {
        let file = write_temp(sample_toml(), ".toml");
        let mut config = AgentConfig::load_from(file.path()).unwrap();
        config.api_key = Some("sk-secret".into());
        let debug = format!("{config:?}");
        assert!(!debug.contains("sk-secret"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn config_error_folds_into_core_error() {
        let err: pagemind_core::Error = ConfigError::Validation("bad".into()).into();
        assert!(err.to_string().contains("bad"));
    }
}
