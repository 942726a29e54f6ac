//! Outbound transport: one attempt against one endpoint.
//!
//! The router talks to backends through [`Forwarder`], so tests and embedders
//! can substitute their own transport. [`HttpTransport`] is the reqwest
//! implementation used in production.

pub mod http;

pub use http::HttpTransport;

use crate::routing::EndpointDescriptor;
use async_trait::async_trait;
use reqwest::Method;

/// What came back from one upstream attempt that reached the server.
#[derive(Debug, Clone, PartialEq)]
pub struct UpstreamResponse {
    pub status: u16,
    pub body: serde_json::Value,
    pub retry_after_secs: Option<u64>,
}

impl UpstreamResponse {
    pub fn new(status: u16, body: serde_json::Value) -> Self {
        Self {
            status,
            body,
            retry_after_secs: None,
        }
    }

    pub fn with_retry_after(mut self, secs: u64) -> Self {
        self.retry_after_secs = Some(secs);
        self
    }
}

#[async_trait]
pub trait Forwarder: Send + Sync {
    /// Send `payload` to `endpoint` once. Connection and timeout failures come
    /// back as [`TransportError`]; any HTTP status is a response.
    async fn forward(
        &self,
        endpoint: &EndpointDescriptor,
        method: &Method,
        payload: &serde_json::Value,
        request_id: &str,
    ) -> std::result::Result<UpstreamResponse, TransportError>;
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Transport error: {0}")]
    Other(String),
}

impl TransportError {
    /// Short label for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            TransportError::Http(e) if e.is_timeout() => "timeout",
            TransportError::Http(e) if e.is_connect() => "connect",
            TransportError::Http(_) => "http",
            TransportError::Other(_) => "other",
        }
    }
}
