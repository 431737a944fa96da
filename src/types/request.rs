//! Prompt and sampling parameter types.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::error::{Error, ErrorContext};
use crate::types::message::ChatMessage;
use crate::Result;

/// A single prompt: raw text for completion engines, a conversation for chat engines.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Prompt {
    Text(String),
    Chat(Vec<ChatMessage>),
}

impl Prompt {
    pub fn text(text: impl Into<String>) -> Self {
        Prompt::Text(text.into())
    }

    pub fn chat(messages: Vec<ChatMessage>) -> Self {
        Prompt::Chat(messages)
    }

    pub fn shape(&self) -> &'static str {
        match self {
            Prompt::Text(_) => "text",
            Prompt::Chat(_) => "chat",
        }
    }
}

impl From<&str> for Prompt {
    fn from(s: &str) -> Self {
        Prompt::Text(s.to_string())
    }
}

impl From<String> for Prompt {
    fn from(s: String) -> Self {
        Prompt::Text(s)
    }
}

impl From<Vec<ChatMessage>> for Prompt {
    fn from(messages: Vec<ChatMessage>) -> Self {
        Prompt::Chat(messages)
    }
}

/// Stop sequence(s); the upstream accepts either a single string or a list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StopTokens {
    One(String),
    Many(Vec<String>),
}

impl From<&str> for StopTokens {
    fn from(s: &str) -> Self {
        StopTokens::One(s.to_string())
    }
}

impl From<Vec<String>> for StopTokens {
    fn from(v: Vec<String>) -> Self {
        StopTokens::Many(v)
    }
}

/// Sampling parameters shared by every prompt of a query.
///
/// Transport concerns such as the sub-batch size are deliberately not part of
/// this struct, so they can never leak into the cache key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryParams {
    pub max_tokens: u32,
    pub temperature: f64,
    pub top_p: f64,
    /// Number of samples per prompt.
    pub n: u32,
    pub logprobs: Option<u32>,
    pub stop: Option<StopTokens>,
    pub echo_prompt: bool,
    /// Provider-specific knobs, forwarded verbatim to the upstream.
    ///
    /// Only keys listed in the engine's `hashed_extra_keys` take part in the
    /// cache key.
    #[serde(default)]
    pub extra: BTreeMap<String, Value>,
}

impl Default for QueryParams {
    fn default() -> Self {
        Self {
            max_tokens: 0,
            temperature: 0.0,
            top_p: 1.0,
            n: 1,
            logprobs: None,
            stop: None,
            echo_prompt: false,
            extra: BTreeMap::new(),
        }
    }
}

impl QueryParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_top_p(mut self, top_p: f64) -> Self {
        self.top_p = top_p;
        self
    }

    pub fn with_n(mut self, n: u32) -> Self {
        self.n = n;
        self
    }

    pub fn with_logprobs(mut self, logprobs: u32) -> Self {
        self.logprobs = Some(logprobs);
        self
    }

    pub fn with_stop(mut self, stop: impl Into<StopTokens>) -> Self {
        self.stop = Some(stop.into());
        self
    }

    pub fn with_echo_prompt(mut self, echo: bool) -> Self {
        self.echo_prompt = echo;
        self
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }

    pub fn include_logprobs(&self) -> bool {
        self.logprobs.is_some()
    }

    /// Reject parameter combinations the upstream would refuse or that make no sense.
    pub fn validate(&self) -> Result<()> {
        if !self.temperature.is_finite() || self.temperature < 0.0 {
            return Err(invalid(
                "temperature must be a finite value >= 0",
                "params.temperature",
                self.temperature,
            ));
        }
        if !self.top_p.is_finite() || self.top_p <= 0.0 || self.top_p > 1.0 {
            return Err(invalid(
                "top_p must lie in (0, 1]",
                "params.top_p",
                self.top_p,
            ));
        }
        if self.temperature > 0.0 && self.top_p < 1.0 {
            return Err(Error::validation_with_context(
                "temperature and top_p sampling are mutually exclusive",
                ErrorContext::new()
                    .with_field_path("params.top_p")
                    .with_details(format!(
                        "temperature={}, top_p={}",
                        self.temperature, self.top_p
                    ))
                    .with_source("query_params"),
            ));
        }
        if self.n == 0 {
            return Err(invalid("n must be at least 1", "params.n", self.n));
        }
        Ok(())
    }
}

fn invalid(msg: &str, field: &str, value: impl std::fmt::Display) -> Error {
    Error::validation_with_context(
        msg,
        ErrorContext::new()
            .with_field_path(field)
            .with_details(format!("got {}", value))
            .with_source("query_params"),
    )
}
