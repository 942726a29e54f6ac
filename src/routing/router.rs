//! Priority-ordered failover across backend endpoints.

use super::descriptor::{EndpointDescriptor, RouteRequest};
use super::outcome::{status_class, usage_tokens, AttemptOutcome};
use crate::config::{RouterConfig, UpstreamErrorPolicy};
use crate::metrics::endpoint::EndpointMetrics;
use crate::metrics::report::display_time;
use crate::metrics::MetricsRegistry;
use crate::transport::{Forwarder, HttpTransport};
use crate::Result;
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Status returned when every endpoint failed.
pub const EXHAUSTED_STATUS: u16 = 503;
pub const EXHAUSTED_MESSAGE: &str = "All backend servers are busy. Retry later.";

/// Body returned when no endpoint could serve the request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExhaustionBody {
    pub endpoint: String,
    pub date: String,
    pub err_msg: String,
}

/// What the caller gets back from [`Router::route`].
#[derive(Debug, Clone, PartialEq)]
pub struct RouteResponse {
    pub status: u16,
    pub body: serde_json::Value,
    /// Smallest `retry-after` reported by a rate-limited endpoint, on exhaustion.
    pub retry_after_secs: Option<u64>,
    /// Endpoint whose response is being returned.
    pub served_by: Option<String>,
}

impl RouteResponse {
    pub fn is_success(&self) -> bool {
        self.status == 200
    }
}

pub struct Router {
    transport: Arc<dyn Forwarder>,
    metrics: Arc<MetricsRegistry>,
    policy: UpstreamErrorPolicy,
}

impl Router {
    pub fn new(transport: Arc<dyn Forwarder>, metrics: Arc<MetricsRegistry>, cfg: &RouterConfig) -> Self {
        Self {
            transport,
            metrics,
            policy: cfg.upstream_error_policy,
        }
    }

    /// Router over a fresh [`HttpTransport`].
    pub fn with_http(cfg: &RouterConfig, metrics: Arc<MetricsRegistry>) -> Result<Self> {
        let transport = Arc::new(HttpTransport::new(cfg)?);
        Ok(Self::new(transport, metrics, cfg))
    }

    pub fn metrics(&self) -> &Arc<MetricsRegistry> {
        &self.metrics
    }

    fn update_metrics(&self, endpoint: &EndpointDescriptor, f: impl FnOnce(&EndpointMetrics) -> Result<()>) {
        let outcome = self.metrics.metrics_for(endpoint).and_then(|m| f(m.as_ref()));
        if let Err(e) = outcome {
            warn!(
                endpoint = endpoint.uri.as_str(),
                error = %e,
                "failed to update endpoint metrics"
            );
        }
    }

    /// Try `request.endpoints` in order and return the first 200.
    ///
    /// Endpoints are awaited one at a time. Each is attempted at most once.
    pub async fn route(&self, request: &RouteRequest) -> RouteResponse {
        let request_id = Uuid::new_v4().to_string();
        let app_id = request.app_id.as_deref().unwrap_or("-");
        self.metrics.record_routed();
        let mut retry_after: Option<u64> = None;

        for (priority, endpoint) in request.endpoints.iter().enumerate() {
            debug!(
                request_id = request_id.as_str(),
                app_id,
                priority,
                endpoint = endpoint.uri.as_str(),
                "forwarding request"
            );
            let start = Instant::now();
            let result = self
                .transport
                .forward(endpoint, &request.method, &request.payload, &request_id)
                .await;
            let latency = start.elapsed();

            match AttemptOutcome::classify(result) {
                AttemptOutcome::Success(resp) => {
                    let tokens = match usage_tokens(&resp.body) {
                        Ok(tokens) => tokens,
                        Err(e) => {
                            warn!(
                                request_id = request_id.as_str(),
                                endpoint = endpoint.uri.as_str(),
                                error = %e,
                                "ignoring malformed token usage"
                            );
                            0
                        }
                    };
                    self.update_metrics(endpoint, |m| m.record_success(tokens, latency));
                    info!(
                        request_id = request_id.as_str(),
                        app_id,
                        priority,
                        endpoint = endpoint.uri.as_str(),
                        tokens,
                        duration_ms = latency.as_millis(),
                        "request served"
                    );
                    return RouteResponse {
                        status: resp.status,
                        body: resp.body,
                        retry_after_secs: None,
                        served_by: Some(endpoint.uri.clone()),
                    };
                }
                AttemptOutcome::RateLimited(resp) => {
                    if let Some(secs) = resp.retry_after_secs {
                        retry_after = Some(retry_after.map_or(secs, |cur| cur.min(secs)));
                    }
                    warn!(
                        request_id = request_id.as_str(),
                        app_id,
                        endpoint = endpoint.uri.as_str(),
                        http_status = resp.status,
                        retry_after_secs = resp.retry_after_secs,
                        "endpoint rate limited, trying next"
                    );
                    self.update_metrics(endpoint, |m| m.record_failure(Some(resp.status)));
                }
                AttemptOutcome::UpstreamError(resp) => {
                    warn!(
                        request_id = request_id.as_str(),
                        app_id,
                        endpoint = endpoint.uri.as_str(),
                        http_status = resp.status,
                        error_class = status_class(resp.status),
                        duration_ms = latency.as_millis(),
                        "upstream returned an error"
                    );
                    self.update_metrics(endpoint, |m| m.record_failure(Some(resp.status)));
                    if self.policy == UpstreamErrorPolicy::Surface {
                        return RouteResponse {
                            status: resp.status,
                            body: resp.body,
                            retry_after_secs: resp.retry_after_secs,
                            served_by: Some(endpoint.uri.clone()),
                        };
                    }
                }
                AttemptOutcome::TransportError(e) => {
                    warn!(
                        request_id = request_id.as_str(),
                        app_id,
                        endpoint = endpoint.uri.as_str(),
                        kind = e.kind(),
                        error = %e,
                        duration_ms = latency.as_millis(),
                        "endpoint unreachable, trying next"
                    );
                    self.update_metrics(endpoint, |m| m.record_failure(None));
                }
            }
        }

        self.metrics.record_exhausted();
        warn!(
            request_id = request_id.as_str(),
            app_id,
            attempted = request.endpoints.len(),
            retry_after_secs = retry_after,
            "all endpoints failed"
        );
        let body = ExhaustionBody {
            endpoint: request.inbound_uri.clone(),
            date: display_time(Utc::now()),
            err_msg: EXHAUSTED_MESSAGE.to_string(),
        };
        RouteResponse {
            status: EXHAUSTED_STATUS,
            body: serde_json::to_value(body).unwrap_or(serde_json::Value::Null),
            retry_after_secs: retry_after,
            served_by: None,
        }
    }
}
