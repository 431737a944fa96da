//! Cached Completion Example
//!
//! Runs the same small batch twice through a SQLite-backed cache. The first
//! run goes upstream, the second is answered entirely from the cache.
//!
//! Usage:
//!   OPENAI_API_KEY=sk-... cargo run --example cached_completion
//!
//! Optional: `CACHED_LLM_MODEL` (default `gpt-3.5-turbo-instruct`),
//! `CACHED_LLM_CACHE` (default `cache/demo.sqlite`), `RUST_LOG`.

use std::sync::Arc;

use anyhow::Context;
use cached_llm::{
    CachedQueryInterface, CompletionEngine, EngineConfig, HttpTransport, Prompt, QueryParams,
};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("cached_llm=info")),
        )
        .init();

    let model =
        std::env::var("CACHED_LLM_MODEL").unwrap_or_else(|_| "gpt-3.5-turbo-instruct".to_string());
    let cache_path =
        std::env::var("CACHED_LLM_CACHE").unwrap_or_else(|_| "cache/demo.sqlite".to_string());

    let transport = Arc::new(HttpTransport::from_env().context("building HTTP transport")?);
    let engine = CompletionEngine::new(EngineConfig::text_completion(&model), transport)?;
    let query = CachedQueryInterface::with_sqlite(engine, &cache_path)
        .with_context(|| format!("opening cache at {}", cache_path))?;

    let prompts: Vec<Prompt> = ["2+2=", "The capital of France is", "def fib(n):"]
        .into_iter()
        .map(Prompt::text)
        .collect();
    let params = QueryParams::new()
        .with_max_tokens(16)
        .with_stop("\n");

    println!("=== Cached completion demo ({}) ===\n", model);

    for run in 1..=2 {
        query.engine().reset_usage();
        let responses = query.complete_prompts(&prompts, &params, 2).await?;

        println!("--- Run {} ---", run);
        for response in &responses {
            let prompt = match &response.prompt {
                cached_llm::PromptEcho::Text { text, .. } => text.as_str(),
                cached_llm::PromptEcho::Chat { .. } => "<chat>",
            };
            let choice = &response.completions[0];
            let marker = if response.is_degraded() { " [api_error]" } else { "" };
            println!("{:?} -> {:?}{}", prompt, choice.content().unwrap_or_default(), marker);
        }
        println!("tokens used this run: {}\n", query.engine().usage());
    }

    let stats = query.cache().stats();
    println!(
        "cache: {} entries, {} hits, {} misses, hit ratio {:.2}",
        query.cache().len().await?,
        stats.hits,
        stats.misses,
        stats.hit_ratio()
    );
    Ok(())
}
