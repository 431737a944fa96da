//! Canonical per-prompt response records, as stored in the cache.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::types::message::ChatMessage;

/// Finish reason carried by placeholder choices synthesized after retries run out.
pub const FINISH_REASON_API_ERROR: &str = "api_error";

/// Per-token log-probability data, as parallel arrays aligned on `text_offset`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TokenLogprobs {
    #[serde(default)]
    pub tokens: Vec<String>,
    #[serde(default)]
    pub token_logprobs: Vec<Option<f64>>,
    #[serde(default)]
    pub top_logprobs: Vec<Option<BTreeMap<String, f64>>>,
    /// Character offset of each token into the text the upstream scored.
    #[serde(default)]
    pub text_offset: Vec<usize>,
}

impl TokenLogprobs {
    pub fn len(&self) -> usize {
        self.text_offset.len()
    }

    pub fn is_empty(&self) -> bool {
        self.text_offset.is_empty()
    }

    /// Index of the first token starting at or after `offset`, or `len()` if none does.
    pub fn first_index_at_or_after(&self, offset: usize) -> usize {
        self.text_offset
            .iter()
            .position(|&o| o >= offset)
            .unwrap_or(self.text_offset.len())
    }

    /// Split every parallel array at `index`; the left half is returned.
    pub fn split_off_front(&mut self, index: usize) -> TokenLogprobs {
        TokenLogprobs {
            tokens: take_front(&mut self.tokens, index),
            token_logprobs: take_front(&mut self.token_logprobs, index),
            top_logprobs: take_front(&mut self.top_logprobs, index),
            text_offset: take_front(&mut self.text_offset, index),
        }
    }

    /// Drop the leading entry of every parallel array.
    pub fn drop_first(&mut self) {
        let _ = self.split_off_front(1);
    }
}

fn take_front<T>(v: &mut Vec<T>, index: usize) -> Vec<T> {
    let at = index.min(v.len());
    let tail = v.split_off(at);
    std::mem::replace(v, tail)
}

/// One sampled completion.
///
/// Text engines fill `text` (and optionally `logprobs`); chat engines fill `message`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionChoice {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<ChatMessage>,
    #[serde(default)]
    pub logprobs: Option<TokenLogprobs>,
    #[serde(default)]
    pub index: u32,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

impl CompletionChoice {
    pub fn text(text: impl Into<String>, finish_reason: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            message: None,
            logprobs: None,
            index: 0,
            finish_reason: Some(finish_reason.into()),
        }
    }

    pub fn message(message: ChatMessage, finish_reason: impl Into<String>) -> Self {
        Self {
            text: None,
            message: Some(message),
            logprobs: None,
            index: 0,
            finish_reason: Some(finish_reason.into()),
        }
    }

    pub fn with_index(mut self, index: u32) -> Self {
        self.index = index;
        self
    }

    /// Whether this is a degraded placeholder rather than a real completion.
    pub fn is_api_error(&self) -> bool {
        self.finish_reason.as_deref() == Some(FINISH_REASON_API_ERROR)
    }

    /// Generated text, whichever mode produced it.
    pub fn content(&self) -> Option<&str> {
        self.text
            .as_deref()
            .or_else(|| self.message.as_ref().map(|m| m.content.as_str()))
    }
}

/// The prompt side of a response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PromptEcho {
    Text {
        text: String,
        logprobs: Option<TokenLogprobs>,
    },
    Chat {
        message: Vec<ChatMessage>,
    },
}

/// Normalized response for one prompt: the unit written to the cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetaResponse {
    pub prompt: PromptEcho,
    pub completions: Vec<CompletionChoice>,
    /// Model identity that produced the completions.
    pub model: String,
}

impl MetaResponse {
    /// True if any choice is an `api_error` placeholder.
    pub fn is_degraded(&self) -> bool {
        self.completions.iter().any(CompletionChoice::is_api_error)
    }
}
