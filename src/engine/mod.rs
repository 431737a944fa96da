//! # Completion Engine
//!
//! One upstream model identity plus its mode. The engine:
//! - fingerprints requests ([`CompletionEngine::hash_request`]),
//! - translates a batch of prompts into one upstream call through its
//!   mode driver,
//! - runs that call under the [`RetryPolicy`],
//! - splits the returned choices per prompt and normalizes them.
//!
//! When transient failures exhaust the retry budget the engine does not
//! fail: it returns `n` placeholder choices per prompt with finish reason
//! `"api_error"`. Callers must check [`MetaResponse::is_degraded`] (or each
//! choice's finish reason) before trusting the text.

mod config;
mod retry;

pub use config::{
    EngineConfig, EngineMode, CODE_MODEL_MAX_ATTEMPTS, DEFAULT_ERROR_WAIT, DEFAULT_MAX_ATTEMPTS,
    DEFAULT_RATE_LIMIT_WAIT,
};
pub use retry::{CallOutcome, RetryPolicy};

use serde::Deserialize;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, error};

use crate::cache::{default_query_args, model_args, CacheKey, CacheKeyGenerator};
use crate::drivers::{create_driver, EngineDriver};
use crate::error::Error;
use crate::transport::{CompletionTransport, UsageInfo};
use crate::types::{CompletionChoice, MetaResponse, Prompt, QueryParams};
use crate::Result;

#[derive(Debug, Deserialize)]
struct RawCompletion {
    choices: Vec<CompletionChoice>,
    #[serde(default)]
    usage: Option<UsageInfo>,
}

pub struct CompletionEngine {
    config: EngineConfig,
    driver: Box<dyn EngineDriver>,
    transport: Arc<dyn CompletionTransport>,
    retry: RetryPolicy,
    total_usage: AtomicU64,
}

impl std::fmt::Debug for CompletionEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompletionEngine")
            .field("config", &self.config)
            .field("transport", &self.transport.name())
            .field("total_usage", &self.usage())
            .finish()
    }
}

impl CompletionEngine {
    pub fn new(config: EngineConfig, transport: Arc<dyn CompletionTransport>) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            driver: create_driver(config.mode),
            retry: RetryPolicy::from_config(&config),
            config,
            transport,
            total_usage: AtomicU64::new(0),
        })
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }

    pub fn mode(&self) -> EngineMode {
        self.config.mode
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Cumulative `total_tokens` reported by the upstream since creation or the last reset.
    pub fn usage(&self) -> u64 {
        self.total_usage.load(Ordering::Relaxed)
    }

    pub fn reset_usage(&self) {
        self.total_usage.store(0, Ordering::Relaxed);
    }

    pub fn model_args(&self) -> String {
        model_args(&self.config.model)
    }

    pub fn query_args(&self, params: &QueryParams) -> String {
        default_query_args(params, &self.config.hashed_extra_keys)
    }

    pub fn canonical_prompt(&self, prompt: &Prompt) -> Result<String> {
        self.driver.canonical_prompt(prompt)
    }

    /// Cache key of `prompt` under `params`, optionally salted with a sample tag.
    pub fn hash_request(
        &self,
        prompt: &Prompt,
        params: &QueryParams,
        sample_tag: Option<&str>,
    ) -> Result<CacheKey> {
        let canonical = self.driver.canonical_prompt(prompt)?;
        let mut generator = CacheKeyGenerator::new();
        if let Some(tag) = sample_tag {
            generator = generator.with_sample_tag(tag);
        }
        Ok(generator
            .generate(&self.model_args(), &self.query_args(params), &canonical)
            .with_model(self.config.model.clone()))
    }

    /// Complete every prompt in one upstream call; one response per prompt, in order.
    pub async fn complete_batch(
        &self,
        prompts: &[Prompt],
        params: &QueryParams,
    ) -> Result<Vec<MetaResponse>> {
        if prompts.is_empty() {
            return Ok(Vec::new());
        }
        params.validate()?;
        self.driver.preflight(prompts, params)?;
        let args = self.driver.build_args(&self.config.model, prompts, params)?;

        let n = params.n as usize;
        let mode = self.config.mode;
        let outcome = self
            .retry
            .execute(|| self.transport.create(mode, &args))
            .await?;

        let choices = match outcome {
            CallOutcome::Completed { value, attempts } => {
                debug!(model = self.model(), attempts, prompts = prompts.len(), "upstream call succeeded");
                self.accept(value, prompts.len() * n)?
            }
            CallOutcome::Exhausted {
                last_error,
                attempts,
            } => {
                error!(
                    model = self.model(),
                    attempts,
                    prompts = prompts.len(),
                    error = %last_error,
                    "retries exhausted, returning api_error placeholders"
                );
                let message = last_error.to_string();
                prompts
                    .iter()
                    .flat_map(|_| (0..params.n).map(|j| self.driver.placeholder(&message, j)))
                    .collect()
            }
        };

        let mut choices = choices.into_iter();
        prompts
            .iter()
            .map(|prompt| {
                let group: Vec<CompletionChoice> = choices.by_ref().take(n).collect();
                self.driver
                    .normalize(&self.config.model, prompt, group, params)
            })
            .collect()
    }

    /// Record usage and return the choices ordered by their `index`.
    fn accept(&self, body: Value, expected: usize) -> Result<Vec<CompletionChoice>> {
        let raw: RawCompletion = serde_json::from_value(body)
            .map_err(|e| Error::malformed(format!("cannot decode completion body: {}", e)))?;
        if let Some(usage) = raw.usage {
            self.total_usage
                .fetch_add(usage.total_tokens, Ordering::Relaxed);
        }

        let mut choices = raw.choices;
        if choices.len() != expected {
            return Err(Error::malformed(format!(
                "expected {} choices, upstream returned {}",
                expected,
                choices.len()
            )));
        }
        choices.sort_by_key(|c| c.index);
        Ok(choices)
    }
}
