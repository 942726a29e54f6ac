use crate::{Error, ErrorContext, Result};
use reqwest::Method;
use serde::{Deserialize, Serialize};

/// One backend endpoint a request can be routed to.
///
/// Priority is not stored: it is the descriptor's position in the list handed
/// to the router.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointDescriptor {
    pub uri: String,
    #[serde(alias = "apikey")]
    pub api_key: String,
    /// Stable id; metrics are keyed by it when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Requests-per-minute hint from configuration. Informational only.
    #[serde(default, alias = "rpm", skip_serializing_if = "Option::is_none")]
    pub rate_limit_hint: Option<u32>,
}

impl EndpointDescriptor {
    pub fn new(uri: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            api_key: api_key.into(),
            id: None,
            rate_limit_hint: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_rate_limit_hint(mut self, rpm: u32) -> Self {
        self.rate_limit_hint = Some(rpm);
        self
    }

    /// Identity used by the metrics registry.
    pub fn metrics_key(&self) -> &str {
        self.id.as_deref().unwrap_or(&self.uri)
    }

    pub fn validate(&self) -> Result<()> {
        let parsed = url::Url::parse(&self.uri).map_err(|e| {
            Error::validation_with_context(
                format!("invalid endpoint uri: {}", e),
                ErrorContext::new()
                    .with_field_path("endpoint.uri")
                    .with_details(self.uri.clone())
                    .with_source("endpoint_descriptor"),
            )
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(Error::validation_with_context(
                format!("unsupported scheme {:?}", parsed.scheme()),
                ErrorContext::new()
                    .with_field_path("endpoint.uri")
                    .with_details(self.uri.clone())
                    .with_source("endpoint_descriptor"),
            ));
        }
        if self.api_key.trim().is_empty() {
            return Err(Error::validation_with_context(
                "api key must not be empty",
                ErrorContext::new()
                    .with_field_path("endpoint.api_key")
                    .with_details(self.uri.clone())
                    .with_source("endpoint_descriptor"),
            ));
        }
        Ok(())
    }
}

impl std::fmt::Debug for EndpointDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EndpointDescriptor")
            .field("uri", &self.uri)
            .field("api_key", &"<redacted>")
            .field("id", &self.id)
            .field("rate_limit_hint", &self.rate_limit_hint)
            .finish()
    }
}

/// A single inbound request plus the endpoints it may be served by.
#[derive(Debug, Clone)]
pub struct RouteRequest {
    /// Inbound path, echoed as `endpoint` in gateway-generated error bodies.
    pub inbound_uri: String,
    pub app_id: Option<String>,
    pub method: Method,
    pub endpoints: Vec<EndpointDescriptor>,
    pub payload: serde_json::Value,
}

impl RouteRequest {
    pub fn new(
        inbound_uri: impl Into<String>,
        endpoints: Vec<EndpointDescriptor>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            inbound_uri: inbound_uri.into(),
            app_id: None,
            method: Method::POST,
            endpoints,
            payload,
        }
    }

    pub fn with_app_id(mut self, app_id: impl Into<String>) -> Self {
        self.app_id = Some(app_id.into());
        self
    }

    pub fn with_method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }
}
