use super::{Forwarder, TransportError, UpstreamResponse};
use crate::config::RouterConfig;
use crate::routing::EndpointDescriptor;
use crate::Result;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, CONTENT_TYPE, RETRY_AFTER};
use reqwest::{Method, Proxy};
use std::time::Duration;
use tracing::warn;

/// Header carrying the endpoint credential.
pub const API_KEY_HEADER: &str = "api-key";
/// Correlation id attached to every outbound attempt.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// reqwest-backed forwarder shared by all routing calls.
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(cfg: &RouterConfig) -> Result<Self> {
        cfg.validate()?;
        let mut builder = reqwest::Client::builder()
            .timeout(cfg.attempt_timeout)
            .pool_max_idle_per_host(cfg.pool_max_idle_per_host)
            .pool_idle_timeout(Some(Duration::from_secs(90)));

        if let Some(proxy_url) = &cfg.proxy_url {
            let proxy = Proxy::all(proxy_url).map_err(|e| TransportError::Other(e.to_string()))?;
            builder = builder.proxy(proxy);
        }

        let client = builder
            .build()
            .map_err(|e| TransportError::Other(e.to_string()))?;
        Ok(Self { client })
    }

    /// `retry-after` in whole seconds, if present and numeric.
    fn retry_after_secs(headers: &HeaderMap) -> Option<u64> {
        headers
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.trim().parse::<f64>().ok())
            .filter(|secs| secs.is_finite() && *secs >= 0.0)
            .map(|secs| secs.ceil() as u64)
    }
}

#[async_trait]
impl Forwarder for HttpTransport {
    async fn forward(
        &self,
        endpoint: &EndpointDescriptor,
        method: &Method,
        payload: &serde_json::Value,
        request_id: &str,
    ) -> std::result::Result<UpstreamResponse, TransportError> {
        let mut req = self
            .client
            .request(method.clone(), &endpoint.uri)
            .header(API_KEY_HEADER, &endpoint.api_key)
            .header(CONTENT_TYPE, "application/json")
            .header(REQUEST_ID_HEADER, request_id);
        if *method != Method::GET {
            req = req.json(payload);
        }

        let resp = req.send().await?;
        let status = resp.status().as_u16();
        let retry_after_secs = Self::retry_after_secs(resp.headers());
        let text = resp.text().await?;

        // A 200 is final even when the body is not JSON.
        let body = match serde_json::from_str(&text) {
            Ok(body) => body,
            Err(e) => {
                if status == 200 {
                    warn!(
                        endpoint = endpoint.uri.as_str(),
                        request_id,
                        error = %e,
                        "successful response is not JSON, passing it through as text"
                    );
                }
                serde_json::Value::String(text)
            }
        };

        Ok(UpstreamResponse {
            status,
            body,
            retry_after_secs,
        })
    }
}
