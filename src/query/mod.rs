//! Cache-first query front end.
//!
//! [`CachedQueryInterface`] looks every prompt up in the cache store, sends
//! only the misses upstream in sequential sub-batches, writes each fresh
//! response back under its key, and returns results in input order.
//!
//! Responses are cached as returned, degraded `"api_error"` placeholders
//! included. A caller that wants to retry degraded prompts later has to
//! detect them with [`MetaResponse::is_degraded`] and re-sample them under a
//! different sample tag.

mod progress;

pub use progress::BatchProgress;

use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

use crate::cache::{CacheKey, CacheStore, MemoryCache, SqliteCache};
use crate::engine::CompletionEngine;
use crate::error::{Error, ErrorContext};
use crate::types::{MetaResponse, Prompt, QueryParams};
use crate::Result;

/// A miss waiting for the upstream: where its result goes and the key it is stored under.
struct PendingPrompt<'a> {
    slot: usize,
    key: CacheKey,
    prompt: &'a Prompt,
}

pub struct CachedQueryInterface {
    engine: CompletionEngine,
    cache: CacheStore,
    progress: Arc<BatchProgress>,
}

impl CachedQueryInterface {
    pub fn new(engine: CompletionEngine, cache: CacheStore) -> Self {
        Self {
            engine,
            cache,
            progress: Arc::new(BatchProgress::new()),
        }
    }

    /// Persistent cache in the SQLite file at `path`.
    pub fn with_sqlite(engine: CompletionEngine, path: impl AsRef<Path>) -> Result<Self> {
        let backend = SqliteCache::open(path)?;
        Ok(Self::new(engine, CacheStore::new(Box::new(backend))))
    }

    pub fn in_memory(engine: CompletionEngine) -> Self {
        Self::new(engine, CacheStore::new(Box::new(MemoryCache::new())))
    }

    pub fn engine(&self) -> &CompletionEngine {
        &self.engine
    }

    pub fn cache(&self) -> &CacheStore {
        &self.cache
    }

    pub fn progress(&self) -> Arc<BatchProgress> {
        Arc::clone(&self.progress)
    }

    /// Key of the request and the cached response, if there is one.
    pub async fn response_lookup(
        &self,
        prompt: &Prompt,
        params: &QueryParams,
        sample_tag: Option<&str>,
    ) -> Result<(CacheKey, Option<MetaResponse>)> {
        let key = self.engine.hash_request(prompt, params, sample_tag)?;
        let cached = self.cache.lookup::<MetaResponse>(&key).await?;
        Ok((key, cached))
    }

    /// One response per prompt, in input order. Misses are sent upstream
    /// `batch_size` at a time; `batch_size` does not affect cache keys.
    pub async fn complete_prompts(
        &self,
        prompts: &[Prompt],
        params: &QueryParams,
        batch_size: usize,
    ) -> Result<Vec<MetaResponse>> {
        if batch_size == 0 {
            return Err(Error::configuration_with_context(
                "batch_size must be at least 1",
                ErrorContext::new()
                    .with_field_path("batch_size")
                    .with_source("cached_query"),
            ));
        }

        let mut slots: Vec<Option<MetaResponse>> = Vec::with_capacity(prompts.len());
        let mut pending = Vec::new();
        for (slot, prompt) in prompts.iter().enumerate() {
            let (key, cached) = self.response_lookup(prompt, params, None).await?;
            if cached.is_none() {
                pending.push(PendingPrompt { slot, key, prompt });
            }
            slots.push(cached);
        }

        let sub_batches = pending.len().div_ceil(batch_size);
        info!(
            model = self.engine.model(),
            prompts = prompts.len(),
            hits = prompts.len() - pending.len(),
            misses = pending.len(),
            sub_batches,
            "completing prompts"
        );

        self.progress.start(sub_batches);
        for (sub_batch, chunk) in pending.chunks(batch_size).enumerate() {
            let batch: Vec<Prompt> = chunk.iter().map(|p| p.prompt.clone()).collect();
            let responses = self.engine.complete_batch(&batch, params).await?;

            for (pending, response) in chunk.iter().zip(responses) {
                self.cache.write(&pending.key, &response).await?;
                slots[pending.slot] = Some(response);
            }
            let done = self.progress.advance();
            debug!(
                model = self.engine.model(),
                sub_batch,
                size = chunk.len(),
                done,
                total = sub_batches,
                "sub-batch cached"
            );
        }

        slots
            .into_iter()
            .enumerate()
            .map(|(i, slot)| {
                slot.ok_or_else(|| Error::malformed(format!("no response produced for prompt {}", i)))
            })
            .collect()
    }

    /// Single prompt, optionally salted with `sample_tag`. The same tag
    /// always hits the same cache entry; a different tag is a different
    /// request and gets its own sample.
    pub async fn complete_prompt(
        &self,
        prompt: &Prompt,
        params: &QueryParams,
        sample_tag: Option<&str>,
    ) -> Result<MetaResponse> {
        let (key, cached) = self.response_lookup(prompt, params, sample_tag).await?;
        if let Some(response) = cached {
            debug!(model = self.engine.model(), key = %key, "cache hit");
            return Ok(response);
        }

        let response = self
            .engine
            .complete_batch(std::slice::from_ref(prompt), params)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| Error::malformed("upstream produced no response for the prompt"))?;
        self.cache.write(&key, &response).await?;
        Ok(response)
    }
}
