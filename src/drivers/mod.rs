//! Per-mode request translation and response normalization.
//!
//! An engine delegates everything that differs between raw-text completion
//! and chat to a `Box<dyn EngineDriver>`: which prompt shape it accepts, how
//! that prompt is canonicalized for hashing, what it refuses up front, how
//! the upstream arguments look, and how raw choices become a
//! [`MetaResponse`]. The retry loop itself is shared and lives in the engine.

pub mod chat;
pub mod completion;

use serde_json::{Map, Value};
use tracing::warn;

use crate::engine::EngineMode;
use crate::types::{CompletionChoice, MetaResponse, Prompt, QueryParams};
use crate::Result;

pub use chat::ChatDriver;
pub use completion::CompletionDriver;

/// Argument names the drivers own; `QueryParams::extra` may not overwrite them.
const RESERVED_ARGS: &[&str] = &[
    "model",
    "prompt",
    "messages",
    "max_tokens",
    "temperature",
    "top_p",
    "n",
    "logprobs",
    "echo",
    "stop",
];

pub trait EngineDriver: Send + Sync + std::fmt::Debug {
    fn mode(&self) -> EngineMode;

    /// Prompt string used as hash material. Fails if the prompt has the wrong shape.
    fn canonical_prompt(&self, prompt: &Prompt) -> Result<String>;

    /// Reject a batch this mode cannot serve, before any network call.
    fn preflight(&self, prompts: &[Prompt], params: &QueryParams) -> Result<()>;

    /// Upstream request body for the whole batch.
    fn build_args(&self, model: &str, prompts: &[Prompt], params: &QueryParams) -> Result<Value>;

    /// Turn the `n` raw choices of one prompt into its response record.
    fn normalize(
        &self,
        model: &str,
        prompt: &Prompt,
        choices: Vec<CompletionChoice>,
        params: &QueryParams,
    ) -> Result<MetaResponse>;

    /// Stand-in choice used when retries are exhausted.
    fn placeholder(&self, message: &str, index: u32) -> CompletionChoice;
}

pub fn create_driver(mode: EngineMode) -> Box<dyn EngineDriver> {
    match mode {
        EngineMode::TextCompletion => Box::new(CompletionDriver),
        EngineMode::Chat => Box::new(ChatDriver),
    }
}

/// Sampling arguments common to both modes. Defaults are omitted, the way
/// the upstream expects them.
pub(crate) fn sampling_args(model: &str, params: &QueryParams) -> Map<String, Value> {
    let mut args = Map::new();
    args.insert("model".into(), Value::from(model));
    args.insert("max_tokens".into(), Value::from(params.max_tokens));
    args.insert("temperature".into(), Value::from(params.temperature));
    if params.top_p != 1.0 {
        args.insert("top_p".into(), Value::from(params.top_p));
    }
    args.insert("n".into(), Value::from(params.n));
    if let Some(logprobs) = params.logprobs {
        args.insert("logprobs".into(), Value::from(logprobs));
    }
    if params.echo_prompt {
        args.insert("echo".into(), Value::Bool(true));
    }
    if let Some(ref stop) = params.stop {
        args.insert(
            "stop".into(),
            serde_json::to_value(stop).unwrap_or(Value::Null),
        );
    }

    for (key, value) in &params.extra {
        if RESERVED_ARGS.contains(&key.as_str()) {
            warn!(key = key.as_str(), "ignoring extra option that shadows a named parameter");
            continue;
        }
        args.insert(key.clone(), value.clone());
    }
    args
}
