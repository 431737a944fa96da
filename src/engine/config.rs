use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::{Error, ErrorContext};
use crate::Result;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 10;
/// `code-*` completion models are throttled much harder upstream.
pub const CODE_MODEL_MAX_ATTEMPTS: u32 = 30;
pub const DEFAULT_RATE_LIMIT_WAIT: Duration = Duration::from_secs(10);
pub const DEFAULT_ERROR_WAIT: Duration = Duration::from_secs(10);

/// Upstream API flavor an engine speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineMode {
    /// Raw-text completion; supports batching, echo and logprobs.
    TextCompletion,
    /// Structured chat; one conversation per call, no echo, no logprobs.
    Chat,
}

/// One upstream model configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub model: String,
    pub mode: EngineMode,
    pub max_attempts: u32,
    pub rate_limit_wait: Duration,
    pub error_wait: Duration,
    /// `QueryParams::extra` keys that take part in the cache key.
    pub hashed_extra_keys: Vec<String>,
}

impl EngineConfig {
    pub fn new(model: impl Into<String>, mode: EngineMode) -> Self {
        let model = model.into();
        let max_attempts = if mode == EngineMode::TextCompletion && model.starts_with("code-") {
            CODE_MODEL_MAX_ATTEMPTS
        } else {
            DEFAULT_MAX_ATTEMPTS
        };
        Self {
            model,
            mode,
            max_attempts,
            rate_limit_wait: DEFAULT_RATE_LIMIT_WAIT,
            error_wait: DEFAULT_ERROR_WAIT,
            hashed_extra_keys: Vec::new(),
        }
    }

    pub fn text_completion(model: impl Into<String>) -> Self {
        Self::new(model, EngineMode::TextCompletion)
    }

    pub fn chat(model: impl Into<String>) -> Self {
        Self::new(model, EngineMode::Chat)
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    pub fn with_rate_limit_wait(mut self, wait: Duration) -> Self {
        self.rate_limit_wait = wait;
        self
    }

    pub fn with_error_wait(mut self, wait: Duration) -> Self {
        self.error_wait = wait;
        self
    }

    pub fn with_hashed_extra_key(mut self, key: impl Into<String>) -> Self {
        self.hashed_extra_keys.push(key.into());
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.model.trim().is_empty() {
            return Err(Error::configuration_with_context(
                "model identity must not be empty",
                ErrorContext::new()
                    .with_field_path("engine.model")
                    .with_source("engine_config"),
            ));
        }
        if self.max_attempts == 0 {
            return Err(Error::configuration_with_context(
                "max_attempts must be at least 1",
                ErrorContext::new()
                    .with_field_path("engine.max_attempts")
                    .with_source("engine_config"),
            ));
        }
        Ok(())
    }

    /// Parse a YAML engine description:
    ///
    /// ```yaml
    /// model: gpt-3.5-turbo
    /// mode: chat
    /// max_attempts: 12        # optional
    /// rate_limit_wait_ms: 20000
    /// error_wait_ms: 5000
    /// hashed_extra_keys: [seed]
    /// ```
    pub fn from_yaml_str(text: &str) -> Result<Self> {
        let file: EngineConfigFile = serde_yaml::from_str(text)?;
        let mut config = Self::new(file.model, file.mode);
        if let Some(attempts) = file.max_attempts {
            config.max_attempts = attempts;
        }
        if let Some(ms) = file.rate_limit_wait_ms {
            config.rate_limit_wait = Duration::from_millis(ms);
        }
        if let Some(ms) = file.error_wait_ms {
            config.error_wait = Duration::from_millis(ms);
        }
        config.hashed_extra_keys = file.hashed_extra_keys;
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&text)
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct EngineConfigFile {
    model: String,
    mode: EngineMode,
    max_attempts: Option<u32>,
    rate_limit_wait_ms: Option<u64>,
    error_wait_ms: Option<u64>,
    #[serde(default)]
    hashed_extra_keys: Vec<String>,
}
