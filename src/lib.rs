//! # ai-gateway-router
//!
//! Priority-ordered failover routing for AI completion endpoints, with rolling
//! per-endpoint usage metrics.
//!
//! ## Overview
//!
//! An inbound completion request arrives with an ordered list of backend
//! endpoints. The [`Router`] forwards it to each in turn until one answers
//! 200, and records every attempt in that endpoint's [`EndpointMetrics`].
//! Metrics live in time windows; a closed window becomes an immutable
//! snapshot in a bounded history.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use ai_gateway_router::config::{MetricsConfig, RouterConfig};
//! use ai_gateway_router::{EndpointDescriptor, MetricsRegistry, RouteRequest, Router};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let metrics = Arc::new(MetricsRegistry::new(MetricsConfig::from_env()?)?);
//!     let router = Router::with_http(&RouterConfig::from_env()?, metrics.clone())?;
//!
//!     let endpoints = vec![
//!         EndpointDescriptor::new("https://east.example/openai/chat/completions", "key-1"),
//!         EndpointDescriptor::new("https://west.example/openai/chat/completions", "key-2"),
//!     ];
//!     let request = RouteRequest::new(
//!         "/api/v1/dev/lb/chat",
//!         endpoints,
//!         serde_json::json!({"messages": [{"role": "user", "content": "Hi"}]}),
//!     );
//!
//!     let response = router.route(&request).await;
//!     println!("{} {}", response.status, response.body);
//!     println!("{}", serde_json::to_string_pretty(&metrics.report(None)?)?);
//!     Ok(())
//! }
//! ```
//!
//! ## Module Organization
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`routing`] | Endpoint descriptors, outcome classification, the failover loop |
//! | [`metrics`] | Ring history, per-endpoint counters, registry and reports |
//! | [`transport`] | The `Forwarder` seam and its reqwest implementation |
//! | [`config`] | Env-overridable metrics and router settings |
//! | [`clock`] | Wall-clock abstraction for window rollover |

pub mod clock;
pub mod config;
pub mod metrics;
pub mod routing;
pub mod transport;

pub use metrics::{EndpointMetrics, EndpointMetricsSnapshot, MetricsRegistry};
pub use routing::{EndpointDescriptor, RouteRequest, RouteResponse, Router};

/// Result type alias for the library
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for the library
pub mod error;
pub use error::{Error, ErrorContext};
