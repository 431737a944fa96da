use async_trait::async_trait;
use serde_json::Value;
use std::env;
use std::time::Duration;
use tracing::info;

use super::{CompletionTransport, UpstreamError};
use crate::engine::EngineMode;
use crate::error::{Error, ErrorContext};
use crate::error_code::StandardErrorCode;
use crate::Result;

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Connection settings for an OpenAI-compatible endpoint.
#[derive(Debug, Clone)]
pub struct HttpTransportConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub organization: Option<String>,
    pub timeout: Duration,
}

impl HttpTransportConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: None,
            organization: None,
            timeout: Duration::from_secs(60),
        }
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn with_organization(mut self, org: impl Into<String>) -> Self {
        self.organization = Some(org.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Reads `OPENAI_API_KEY` (or `OPENAI_KEY`), `OPENAI_ORG`, `OPENAI_BASE_URL`
    /// and `CACHED_LLM_HTTP_TIMEOUT_SECS`.
    pub fn from_env() -> Result<Self> {
        let api_key = env::var("OPENAI_API_KEY")
            .or_else(|_| env::var("OPENAI_KEY"))
            .map_err(|_| {
                Error::configuration_with_context(
                    "no API key in environment",
                    ErrorContext::new()
                        .with_field_path("OPENAI_API_KEY")
                        .with_source("http_transport"),
                )
            })?;

        let timeout_secs = env::var("CACHED_LLM_HTTP_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(60);

        let mut config = Self::new(
            env::var("OPENAI_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string()),
        )
        .with_api_key(api_key)
        .with_timeout(Duration::from_secs(timeout_secs));
        if let Ok(org) = env::var("OPENAI_ORG") {
            config = config.with_organization(org);
        }
        Ok(config)
    }
}

/// `reqwest`-based transport for `/completions` and `/chat/completions`.
pub struct HttpTransport {
    client: reqwest::Client,
    config: HttpTransportConfig,
}

impl HttpTransport {
    pub fn new(config: HttpTransportConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .pool_max_idle_per_host(8)
            .build()?;
        Ok(Self { client, config })
    }

    pub fn from_env() -> Result<Self> {
        Self::new(HttpTransportConfig::from_env()?)
    }

    fn endpoint(&self, mode: EngineMode) -> String {
        let base = self.config.base_url.trim_end_matches('/');
        match mode {
            EngineMode::TextCompletion => format!("{}/completions", base),
            EngineMode::Chat => format!("{}/chat/completions", base),
        }
    }
}

/// Pull `(provider_code, message)` out of an OpenAI-style error body.
fn error_details(body: &str) -> (Option<String>, String) {
    let parsed: Option<Value> = serde_json::from_str(body).ok();
    let err = parsed.as_ref().and_then(|v| v.get("error"));
    let code = err.and_then(|e| {
        e.get("code")
            .and_then(Value::as_str)
            .or_else(|| e.get("type").and_then(Value::as_str))
            .map(str::to_string)
    });
    let message = err
        .and_then(|e| e.get("message"))
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| body.to_string());
    (code, message)
}

#[async_trait]
impl CompletionTransport for HttpTransport {
    async fn create(&self, mode: EngineMode, args: &Value) -> std::result::Result<Value, UpstreamError> {
        let url = self.endpoint(mode);
        let mut req = self.client.post(&url).json(args);
        if let Some(key) = &self.config.api_key {
            req = req.bearer_auth(key);
        }
        if let Some(org) = &self.config.organization {
            req = req.header("OpenAI-Organization", org);
        }

        let resp = req
            .send()
            .await
            .map_err(|e| UpstreamError::transient(e.to_string()))?;
        let status = resp.status().as_u16();
        let body = resp
            .text()
            .await
            .map_err(|e| UpstreamError::transient(e.to_string()))?;

        if !(200..300).contains(&status) {
            let (provider_code, message) = error_details(&body);
            let code = StandardErrorCode::classify(status, provider_code.as_deref());
            info!(
                http_status = status,
                error_class = code.name(),
                endpoint = url.as_str(),
                "completion request failed"
            );
            return Err(UpstreamError::from_code(
                code,
                format!("HTTP {}: {}", status, message),
            ));
        }

        serde_json::from_str(&body)
            .map_err(|e| UpstreamError::transient(format!("undecodable response body: {}", e)))
    }

    fn name(&self) -> &'static str {
        "http"
    }
}
