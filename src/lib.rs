//! # cached-llm
//!
//! Request-deduplicating cache and resilient retry layer in front of LLM
//! completion APIs.
//!
//! ## Overview
//!
//! Every request is reduced to a deterministic fingerprint of everything
//! that affects its result (model, sampling parameters, prompt). Responses
//! are stored under that fingerprint, so re-running an evaluation only pays
//! for prompts that were never answered before. Misses go upstream in
//! bounded sub-batches under a retry policy that tells fatal, rate-limited
//! and transient failures apart.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use cached_llm::{
//!     CachedQueryInterface, CompletionEngine, EngineConfig, HttpTransport, Prompt, QueryParams,
//! };
//!
//! #[tokio::main]
//! async fn main() -> cached_llm::Result<()> {
//!     let transport = Arc::new(HttpTransport::from_env()?);
//!     let engine = CompletionEngine::new(EngineConfig::text_completion("davinci-002"), transport)?;
//!     let query = CachedQueryInterface::with_sqlite(engine, "cache/davinci.sqlite")?;
//!
//!     let prompts = vec![Prompt::text("2+2="), Prompt::text("3+3=")];
//!     let params = QueryParams::new().with_max_tokens(4);
//!     for response in query.complete_prompts(&prompts, &params, 20).await? {
//!         if !response.is_degraded() {
//!             println!("{:?}", response.completions[0].content());
//!         }
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Module Organization
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`types`] | Prompts, sampling parameters and normalized responses |
//! | [`cache`] | Request fingerprinting and cache stores (SQLite, memory) |
//! | [`engine`] | Completion engine, its configuration and retry policy |
//! | [`drivers`] | Per-mode argument translation and response normalization |
//! | [`transport`] | Upstream call boundary and the OpenAI-compatible HTTP client |
//! | [`query`] | Cache-first batch front end |
//! | [`error_code`] | Upstream failure classification |

pub mod cache;
pub mod drivers;
pub mod engine;
pub mod error;
pub mod error_code;
pub mod query;
pub mod transport;
pub mod types;

// Re-export main types for convenience
pub use cache::{CacheKey, CacheStore, MemoryCache, SqliteCache};
pub use engine::{CompletionEngine, EngineConfig, EngineMode, RetryPolicy};
pub use error::{Error, ErrorContext};
pub use query::{BatchProgress, CachedQueryInterface};
pub use transport::{CompletionTransport, HttpTransport, HttpTransportConfig, UpstreamError};
pub use types::{
    ChatMessage, CompletionChoice, MessageRole, MetaResponse, Prompt, PromptEcho, QueryParams,
};

/// Result type alias for the library
pub type Result<T> = std::result::Result<T, Error>;
