//! # Response Cache Module
//!
//! Persistent, append-only deduplication of completion requests.
//!
//! ## Key Components
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`CacheKeyGenerator`] | Hashes engine identity, normalized parameters and prompt into a key |
//! | [`CacheKey`] | Fixed-length hex digest identifying one request |
//! | [`CacheBackend`] | Byte-level point lookup / point write contract |
//! | [`SqliteCache`] | Persistent SQLite backend |
//! | [`MemoryCache`] | In-process backend for tests and throwaway runs |
//! | [`CacheStore`] | Typed (JSON) access over a backend, with hit/miss statistics |
//!
//! ## Example
//!
//! ```rust
//! use cached_llm::cache::{CacheStore, SqliteCache};
//!
//! # fn main() -> cached_llm::Result<()> {
//! let store = CacheStore::new(Box::new(SqliteCache::open_in_memory()?));
//! assert_eq!(store.backend_name(), "sqlite");
//! # Ok(())
//! # }
//! ```
//!
//! There is no eviction and no TTL. Keys are SHA-256 digests, so stores
//! written by SHA-1 based tools are not reused.

mod backend;
mod key;
mod manager;
mod sqlite;

pub use backend::{CacheBackend, MemoryCache};
pub use key::{canonical_float, default_query_args, model_args, CacheKey, CacheKeyGenerator};
pub use manager::{CacheStats, CacheStore};
pub use sqlite::SqliteCache;
