//! Per-endpoint usage metrics.
//!
//! ## Key Components
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`history::RingHistory`] | Fixed-capacity FIFO of closed windows |
//! | [`EndpointMetrics`] | Live counters with time-windowed rollover |
//! | [`MetricsRegistry`] | Owned map of endpoint identity to metrics |
//! | [`report`] | Serializable gateway report and status probe bodies |
//!
//! Each call outcome the router classifies lands in exactly one
//! [`EndpointMetrics`]. When the current window has elapsed, the next update
//! first closes it into a [`HistoryEntry`] and zeroes the live counters.
//! Failures carry the upstream status so 429s and 400s are counted apart.
//!
//! ```rust
//! use ai_gateway_router::config::MetricsConfig;
//! use ai_gateway_router::metrics::MetricsRegistry;
//! use ai_gateway_router::routing::EndpointDescriptor;
//! use std::time::Duration;
//!
//! let registry = MetricsRegistry::new(MetricsConfig::default()).unwrap();
//! let endpoint = EndpointDescriptor::new("https://oai.example/chat", "key");
//! let metrics = registry.metrics_for(&endpoint).unwrap();
//! metrics.record_success(1200, Duration::from_millis(350)).unwrap();
//!
//! let snapshot = metrics.to_snapshot().unwrap();
//! assert_eq!(snapshot.k_inference_tokens, 1.2);
//! ```

pub mod endpoint;
pub mod history;
pub mod registry;
pub mod report;

pub use endpoint::{
    k_tokens, EndpointMetrics, EndpointMetricsSnapshot, HistoryEntry, LiveCounters, WindowMetrics,
};
pub use history::RingHistory;
pub use registry::MetricsRegistry;
pub use report::{GatewayMetricsReport, StatusReport};
