//! Upstream error codes and their retry class.
//!
//! The HTTP transport maps a failed call (status code plus the provider's
//! `error.type` / `error.code` string) to a [`StandardErrorCode`], and every
//! code belongs to exactly one [`ErrorClass`]. The retry loop only ever looks
//! at the class.
//!
//! | Class | Codes | Retry behavior |
//! |-------|-------|----------------|
//! | fatal | invalid_request, authentication, permission_denied, not_found, request_too_large | abort immediately |
//! | rate_limited | rate_limited, quota_exhausted | long wait, escalate on exhaustion |
//! | transient | server_error, overloaded, timeout, conflict, unknown | short wait, degrade on exhaustion |
//!
//! ```rust
//! use cached_llm::error_code::{ErrorClass, StandardErrorCode};
//!
//! let code = StandardErrorCode::from_http_status(429);
//! assert_eq!(code.class(), ErrorClass::RateLimited);
//! assert_eq!(StandardErrorCode::from_http_status(502).class(), ErrorClass::Transient);
//! ```

use std::fmt;

/// Three-way classification the retry loop acts on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    Fatal,
    RateLimited,
    Transient,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StandardErrorCode {
    /// Malformed request, invalid parameters, or rejected content
    InvalidRequest,
    /// Invalid, expired, or missing API key
    Authentication,
    /// Valid credentials but insufficient permissions
    PermissionDenied,
    /// Requested model or endpoint does not exist
    NotFound,
    /// Input exceeds context window or payload size limit
    RequestTooLarge,
    RateLimited,
    /// Account usage quota or billing limit reached
    QuotaExhausted,
    ServerError,
    Overloaded,
    Timeout,
    Conflict,
    Unknown,
}

impl StandardErrorCode {
    #[inline]
    pub fn name(&self) -> &'static str {
        match self {
            Self::InvalidRequest => "invalid_request",
            Self::Authentication => "authentication",
            Self::PermissionDenied => "permission_denied",
            Self::NotFound => "not_found",
            Self::RequestTooLarge => "request_too_large",
            Self::RateLimited => "rate_limited",
            Self::QuotaExhausted => "quota_exhausted",
            Self::ServerError => "server_error",
            Self::Overloaded => "overloaded",
            Self::Timeout => "timeout",
            Self::Conflict => "conflict",
            Self::Unknown => "unknown",
        }
    }

    #[inline]
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::InvalidRequest
            | Self::Authentication
            | Self::PermissionDenied
            | Self::NotFound
            | Self::RequestTooLarge => ErrorClass::Fatal,
            Self::RateLimited | Self::QuotaExhausted => ErrorClass::RateLimited,
            Self::ServerError
            | Self::Overloaded
            | Self::Timeout
            | Self::Conflict
            | Self::Unknown => ErrorClass::Transient,
        }
    }

    /// Maps a provider error code/type string, e.g. `"invalid_request_error"`,
    /// `"context_length_exceeded"`, `"insufficient_quota"`.
    pub fn from_provider_code(provider_code: &str) -> Option<Self> {
        let code = match provider_code {
            "invalid_request" | "invalid_request_error" => Self::InvalidRequest,
            "authentication" | "invalid_api_key" | "authentication_error" => Self::Authentication,
            "permission_denied" | "permission_error" => Self::PermissionDenied,
            "not_found" | "model_not_found" => Self::NotFound,
            "request_too_large" | "context_length_exceeded" => Self::RequestTooLarge,
            "rate_limited" | "rate_limit_exceeded" => Self::RateLimited,
            "quota_exhausted" | "insufficient_quota" => Self::QuotaExhausted,
            "server_error" => Self::ServerError,
            "overloaded" | "overloaded_error" => Self::Overloaded,
            "timeout" => Self::Timeout,
            "conflict" => Self::Conflict,
            _ => return None,
        };
        Some(code)
    }

    pub fn from_http_status(status: u16) -> Self {
        match status {
            400 | 422 => Self::InvalidRequest,
            401 => Self::Authentication,
            403 => Self::PermissionDenied,
            404 => Self::NotFound,
            408 => Self::Timeout,
            409 => Self::Conflict,
            413 => Self::RequestTooLarge,
            429 => Self::RateLimited,
            500 | 502 => Self::ServerError,
            503 | 529 => Self::Overloaded,
            504 => Self::Timeout,
            _ => Self::Unknown,
        }
    }

    /// Status first, refined by the provider code when the status alone is ambiguous.
    ///
    /// A 429 stays rate-limited whatever the body says; a provider code can
    /// only reclassify statuses that mapped to `Unknown`.
    pub fn classify(status: u16, provider_code: Option<&str>) -> Self {
        let from_status = Self::from_http_status(status);
        match (from_status, provider_code.and_then(Self::from_provider_code)) {
            (Self::RateLimited, Some(Self::QuotaExhausted)) => Self::QuotaExhausted,
            (Self::Unknown, Some(code)) => code,
            (code, _) => code,
        }
    }
}

impl fmt::Display for StandardErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}
