//! Upstream call boundary.
//!
//! The engine needs exactly one thing from a transport: place a single call
//! with already-translated arguments and either hand back the JSON body or
//! fail with one of three error classes.

mod http;

pub use http::{HttpTransport, HttpTransportConfig};

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use crate::engine::EngineMode;
use crate::error_code::{ErrorClass, StandardErrorCode};

/// Failure of a single upstream call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UpstreamError {
    /// Rejected by the service; retrying cannot help.
    #[error("invalid request: {message}")]
    InvalidRequest { message: String },

    #[error("rate limited: {message}")]
    RateLimited { message: String },

    /// Anything else: network failures, timeouts, 5xx, undecodable bodies.
    #[error("upstream error: {message}")]
    Transient { message: String },
}

impl UpstreamError {
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest {
            message: message.into(),
        }
    }

    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self::RateLimited {
            message: message.into(),
        }
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self::Transient {
            message: message.into(),
        }
    }

    pub fn from_code(code: StandardErrorCode, message: impl Into<String>) -> Self {
        match code.class() {
            ErrorClass::Fatal => Self::invalid_request(message),
            ErrorClass::RateLimited => Self::rate_limited(message),
            ErrorClass::Transient => Self::transient(message),
        }
    }

    pub fn class(&self) -> ErrorClass {
        match self {
            Self::InvalidRequest { .. } => ErrorClass::Fatal,
            Self::RateLimited { .. } => ErrorClass::RateLimited,
            Self::Transient { .. } => ErrorClass::Transient,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Self::InvalidRequest { message }
            | Self::RateLimited { message }
            | Self::Transient { message } => message,
        }
    }
}

/// Token usage statistics reported by the upstream.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct UsageInfo {
    #[serde(default)]
    pub prompt_tokens: u64,
    #[serde(default)]
    pub completion_tokens: u64,
    #[serde(default)]
    pub total_tokens: u64,
}

/// Places one upstream completion call.
///
/// `args` is the fully translated request body (model, sampling parameters,
/// and `prompt` or `messages`). On success the raw response body is returned;
/// the engine extracts `choices` and `usage` from it.
#[async_trait]
pub trait CompletionTransport: Send + Sync {
    async fn create(&self, mode: EngineMode, args: &Value) -> Result<Value, UpstreamError>;

    fn name(&self) -> &'static str;
}
