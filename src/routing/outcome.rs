//! Classification of a single upstream attempt.

use crate::transport::{TransportError, UpstreamResponse};
use crate::{Error, ErrorContext, Result};

/// Result of forwarding a request to one endpoint.
#[derive(Debug)]
pub enum AttemptOutcome {
    /// HTTP 200.
    Success(UpstreamResponse),
    /// HTTP 429.
    RateLimited(UpstreamResponse),
    /// Any other status.
    UpstreamError(UpstreamResponse),
    /// The request never produced a usable response.
    TransportError(TransportError),
}

impl AttemptOutcome {
    pub fn classify(result: std::result::Result<UpstreamResponse, TransportError>) -> Self {
        match result {
            Ok(resp) => match resp.status {
                200 => AttemptOutcome::Success(resp),
                429 => AttemptOutcome::RateLimited(resp),
                _ => AttemptOutcome::UpstreamError(resp),
            },
            Err(e) => AttemptOutcome::TransportError(e),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            AttemptOutcome::Success(_) => "success",
            AttemptOutcome::RateLimited(_) => "rate_limited",
            AttemptOutcome::UpstreamError(_) => "upstream_error",
            AttemptOutcome::TransportError(_) => "transport_error",
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, AttemptOutcome::Success(_))
    }
}

/// Coarse class of an upstream error status, for logs.
pub fn status_class(status: u16) -> &'static str {
    match status {
        400 => "invalid_request",
        401 => "authentication",
        403 => "permission_denied",
        404 => "not_found",
        408 | 504 => "timeout",
        409 => "conflict",
        413 => "request_too_large",
        429 => "rate_limited",
        500 => "server_error",
        503 | 529 => "overloaded",
        s if (400..500).contains(&s) => "client_error",
        s if (500..600).contains(&s) => "server_error",
        _ => "unexpected_status",
    }
}

/// `usage.total_tokens` from a completion body.
///
/// A body without usage counts as zero tokens. A usage value that is not a
/// non-negative integer is rejected so it never reaches the counters.
pub fn usage_tokens(body: &serde_json::Value) -> Result<u64> {
    let Some(raw) = body.get("usage").and_then(|u| u.get("total_tokens")) else {
        return Ok(0);
    };
    if raw.is_null() {
        return Ok(0);
    }
    raw.as_u64().ok_or_else(|| {
        Error::validation_with_context(
            "token count must be a non-negative integer",
            ErrorContext::new()
                .with_field_path("usage.total_tokens")
                .with_details(raw.to_string())
                .with_source("usage_tokens"),
        )
    })
}
