//! Serializable views rendered by the metrics and status APIs.

use super::endpoint::EndpointMetricsSnapshot;
use chrono::{DateTime, Local, Utc};
use serde::Serialize;

/// Local, human-readable timestamp (`4/22/2024, 10:15:30 AM`).
pub fn display_time(at: DateTime<Utc>) -> String {
    at.with_timezone(&Local)
        .format("%-m/%-d/%Y, %-I:%M:%S %p")
        .to_string()
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointReport {
    pub endpoint: String,
    pub priority: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rate_limit_hint: Option<u32>,
    pub metrics: EndpointMetricsSnapshot,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationMetrics {
    pub application_id: String,
    pub endpoint_metrics: Vec<EndpointReport>,
}

/// Instance-wide view over every tracked endpoint.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayMetricsReport {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instance_name: Option<String>,
    pub collection_interval: u32,
    pub history_count: usize,
    pub application_metrics: Vec<ApplicationMetrics>,
    /// Endpoints that were routed to without belonging to a registered application.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub other_endpoint_metrics: Vec<EndpointReport>,
    pub success_api_calls: u64,
    pub failed_api_calls: u64,
    pub total_api_calls: u64,
    pub current_date: String,
    pub status: &'static str,
}

/// Liveness probe body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusReport {
    pub endpoint: String,
    pub date: String,
    pub status: String,
}

impl StatusReport {
    pub fn ok(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            date: display_time(Utc::now()),
            status: "OK".to_string(),
        }
    }
}
