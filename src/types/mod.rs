//! # Types Module
//!
//! Strongly-typed representations of what flows through the cache layer:
//! prompts and sampling parameters on the way in, normalized per-prompt
//! responses on the way out.
//!
//! ## Key Types
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Prompt`] | Plain text prompt or chat conversation |
//! | [`QueryParams`] | Sampling parameters shared by a batch |
//! | [`MetaResponse`] | Normalized response for one prompt (the cached unit) |
//! | [`CompletionChoice`] | One sampled completion, possibly an `api_error` placeholder |
//! | [`TokenLogprobs`] | Offset-aligned per-token log-probabilities |
//!
//! ## Example
//!
//! ```rust
//! use cached_llm::types::{ChatMessage, Prompt, QueryParams};
//!
//! let text = Prompt::text("Q: What is 2+2?\nA:");
//! let chat = Prompt::chat(vec![
//!     ChatMessage::system("You answer math questions."),
//!     ChatMessage::user("What is 2+2?"),
//! ]);
//! let params = QueryParams::new().with_max_tokens(16).with_stop("\n");
//! assert!(params.validate().is_ok());
//! ```

pub mod message;
pub mod request;
pub mod response;

pub use message::{ChatMessage, MessageRole};
pub use request::{Prompt, QueryParams, StopTokens};
pub use response::{
    CompletionChoice, MetaResponse, PromptEcho, TokenLogprobs, FINISH_REASON_API_ERROR,
};
