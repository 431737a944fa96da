//! Shared fixtures for integration tests.
#![allow(dead_code)]

use async_trait::async_trait;
use cached_llm::engine::EngineMode;
use cached_llm::{CompletionEngine, CompletionTransport, EngineConfig, UpstreamError};
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// One scripted upstream reaction.
#[derive(Debug, Clone)]
pub enum Step {
    /// Synthesize a well-formed reply from the request arguments.
    Auto,
    Reply(Value),
    Fail(UpstreamError),
}

/// In-process transport that records every call and plays back queued steps.
/// Once the queue is empty it keeps answering with `fallback`.
pub struct ScriptedTransport {
    steps: Mutex<VecDeque<Step>>,
    fallback: Step,
    calls: Mutex<Vec<(EngineMode, Value)>>,
}

impl ScriptedTransport {
    pub fn new() -> Arc<Self> {
        Self::with_fallback(Step::Auto)
    }

    /// Every call fails with `err`.
    pub fn failing(err: UpstreamError) -> Arc<Self> {
        Self::with_fallback(Step::Fail(err))
    }

    pub fn with_fallback(fallback: Step) -> Arc<Self> {
        Arc::new(Self {
            steps: Mutex::new(VecDeque::new()),
            fallback,
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn push(&self, step: Step) {
        self.steps.lock().unwrap().push_back(step);
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn calls(&self) -> Vec<(EngineMode, Value)> {
        self.calls.lock().unwrap().clone()
    }

    /// Prompts sent with each text-completion call, in call order.
    pub fn sent_prompts(&self) -> Vec<Vec<String>> {
        self.calls()
            .iter()
            .map(|(_, args)| {
                args["prompt"]
                    .as_array()
                    .map(|a| {
                        a.iter()
                            .map(|p| p.as_str().unwrap_or_default().to_string())
                            .collect()
                    })
                    .unwrap_or_default()
            })
            .collect()
    }
}

/// Text reply the auto responder gives for sample `j` of `prompt`.
pub fn auto_text(prompt: &str, j: u64) -> String {
    format!(" answer to [{}] #{}", prompt, j)
}

fn auto_reply(mode: EngineMode, args: &Value) -> Value {
    let n = args["n"].as_u64().unwrap_or(1);
    let mut choices = Vec::new();
    match mode {
        EngineMode::TextCompletion => {
            let prompts = args["prompt"].as_array().cloned().unwrap_or_default();
            for (i, prompt) in prompts.iter().enumerate() {
                let prompt = prompt.as_str().unwrap_or_default();
                for j in 0..n {
                    let index = i as u64 * n + j;
                    choices.push(json!({
                        "text": auto_text(prompt, j),
                        "index": index,
                        "logprobs": null,
                        "finish_reason": "stop"
                    }));
                }
            }
        }
        EngineMode::Chat => {
            let last = args["messages"]
                .as_array()
                .and_then(|m| m.last())
                .and_then(|m| m["content"].as_str())
                .unwrap_or_default()
                .to_string();
            for j in 0..n {
                choices.push(json!({
                    "message": {"role": "assistant", "content": auto_text(&last, j)},
                    "index": j,
                    "finish_reason": "stop"
                }));
            }
        }
    }
    let total = choices.len() as u64 * 10;
    json!({
        "object": "text_completion",
        "choices": choices,
        "usage": {"prompt_tokens": total / 2, "completion_tokens": total / 2, "total_tokens": total}
    })
}

#[async_trait]
impl CompletionTransport for ScriptedTransport {
    async fn create(&self, mode: EngineMode, args: &Value) -> Result<Value, UpstreamError> {
        self.calls.lock().unwrap().push((mode, args.clone()));
        let step = self
            .steps
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone());
        match step {
            Step::Auto => Ok(auto_reply(mode, args)),
            Step::Reply(body) => Ok(body),
            Step::Fail(err) => Err(err),
        }
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

/// Engine config with zero waits so retry paths finish instantly.
pub fn fast(config: EngineConfig) -> EngineConfig {
    config
        .with_rate_limit_wait(Duration::ZERO)
        .with_error_wait(Duration::ZERO)
}

pub fn text_engine(transport: Arc<ScriptedTransport>) -> CompletionEngine {
    CompletionEngine::new(fast(EngineConfig::text_completion("davinci-002")), transport).unwrap()
}

pub fn chat_engine(transport: Arc<ScriptedTransport>) -> CompletionEngine {
    CompletionEngine::new(fast(EngineConfig::chat("gpt-4o-mini")), transport).unwrap()
}
