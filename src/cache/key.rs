//! Cache key generation.
//!
//! A key is the SHA-256 digest of three blocks of text: the engine identity,
//! one `NAME=value` line per result-affecting sampling parameter, and the
//! canonical prompt string. Transport-only settings never reach this module.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::types::{QueryParams, StopTokens};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey {
    /// Lowercase hex digest, 64 characters.
    pub hash: String,
    pub model: Option<String>,
}

impl CacheKey {
    pub fn new(hash: impl Into<String>) -> Self {
        Self {
            hash: hash.into(),
            model: None,
        }
    }
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }
    pub fn as_str(&self) -> &str {
        &self.hash
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.hash)
    }
}

impl From<&str> for CacheKey {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}
impl From<String> for CacheKey {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

/// Combines engine identity, normalized parameters and a canonical prompt into a [`CacheKey`].
#[derive(Debug, Clone, Default)]
pub struct CacheKeyGenerator {
    sample_tag: Option<String>,
}

impl CacheKeyGenerator {
    pub fn new() -> Self {
        Self { sample_tag: None }
    }

    /// Mix a sample variation tag into the key, so the same logical request
    /// can be cached once per tag.
    pub fn with_sample_tag(mut self, tag: impl Into<String>) -> Self {
        self.sample_tag = Some(tag.into());
        self
    }

    pub fn generate(&self, model_args: &str, query_args: &str, canonical_prompt: &str) -> CacheKey {
        let mut hasher = Sha256::new();
        // Leading, so a crafted prompt can never reproduce a tagged key.
        if let Some(ref tag) = self.sample_tag {
            hasher.update(format!("SAMPLE_TAG={}\n", json_string(tag)).as_bytes());
        }
        hasher.update(model_args.as_bytes());
        hasher.update(query_args.as_bytes());
        hasher.update(canonical_prompt.as_bytes());
        let hash: String = hasher
            .finalize()
            .iter()
            .map(|b| format!("{:02x}", b))
            .collect();
        CacheKey::new(hash)
    }
}

/// Engine identity block.
pub fn model_args(model: &str) -> String {
    format!("MODEL={}\n", model)
}

/// Default projection of [`QueryParams`] onto the hashed parameter block.
///
/// Fields appear in a fixed order. `extra` entries are included only when
/// their key is listed in `hashed_extra_keys`.
pub fn default_query_args(params: &QueryParams, hashed_extra_keys: &[String]) -> String {
    let mut out = format!(
        "MAX_TOKENS={}\nTEMPERATURE={}\nTOP_P={}\nN={}\nLOGPROBS={}\nSTOP_TOKENS={}\nECHO_PROMPT={}\n",
        params.max_tokens,
        canonical_float(params.temperature),
        canonical_float(params.top_p),
        params.n,
        params
            .logprobs
            .map(|l| l.to_string())
            .unwrap_or_else(|| "None".into()),
        stop_repr(params.stop.as_ref()),
        params.echo_prompt,
    );

    let mut keys: Vec<&String> = hashed_extra_keys.iter().collect();
    keys.sort();
    keys.dedup();
    for key in keys {
        let value = params
            .extra
            .get(key)
            .map(|v| v.to_string())
            .unwrap_or_else(|| "None".into());
        out.push_str(&format!("EXTRA[{}]={}\n", key, value));
    }
    out
}

/// Stable textual form of a float: `0`, `0.0` and `-0.0` all render as `0.0`.
pub fn canonical_float(v: f64) -> String {
    if v == 0.0 {
        return "0.0".to_string();
    }
    format!("{:?}", v)
}

fn stop_repr(stop: Option<&StopTokens>) -> String {
    match stop {
        None => "None".into(),
        Some(StopTokens::One(s)) => json_string(s),
        Some(StopTokens::Many(list)) => {
            let items: Vec<String> = list.iter().map(|s| json_string(s)).collect();
            format!("[{}]", items.join(","))
        }
    }
}

fn json_string(s: &str) -> String {
    serde_json::Value::String(s.to_string()).to_string()
}
