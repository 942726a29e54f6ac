//! Per-endpoint rolling counters.

use super::history::RingHistory;
use super::report::display_time;
use crate::clock::Clock;
use crate::config::MetricsConfig;
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::debug;

/// Multiplier behind `avgRequestsPerCall`. Undocumented upstream; kept numerically.
pub const REQUESTS_PER_KTOKEN_HEURISTIC: f64 = 6.0;

/// Token totals above this are reported in thousands.
const KTOKEN_THRESHOLD: u64 = 1000;

/// Failure status counted as throttled.
pub const THROTTLED_STATUS: u16 = 429;
/// Failure status counted as content-filtered.
pub const FILTERED_STATUS: u16 = 400;

/// Tokens in thousands when the total exceeds 1000, otherwise the raw count.
///
/// The jump at the threshold is intentional: 1000 reports as 1000, 1001 as 1.001.
pub fn k_tokens(total_tokens: u64) -> f64 {
    if total_tokens > KTOKEN_THRESHOLD {
        total_tokens as f64 / 1000.0
    } else {
        total_tokens as f64
    }
}

/// Aggregates of one closed window.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WindowMetrics {
    pub total_api_calls: u64,
    pub failed_calls: u64,
    pub throttled_calls: u64,
    pub filtered_calls: u64,
    pub k_tokens_per_window: f64,
    pub avg_tokens_per_call: f64,
    pub avg_requests_per_call: f64,
    /// Tokens over the configured interval, not the observed span.
    pub tokens_per_minute: f64,
    pub requests_per_minute: f64,
    pub avg_response_time_msec: f64,
}

/// Immutable record produced at rollover.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub collection_time: String,
    pub collected_metrics: WindowMetrics,
}

/// Read model handed to metrics reporters.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointMetricsSnapshot {
    pub successful_calls: u64,
    pub failed_calls: u64,
    pub throttled_calls: u64,
    pub filtered_calls: u64,
    pub total_calls: u64,
    pub k_inference_tokens: f64,
    pub tokens_per_minute: f64,
    pub requests_per_minute: f64,
    pub history: Vec<HistoryEntry>,
}

/// Live counters of the current window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LiveCounters {
    pub successful_calls: u64,
    pub failed_calls: u64,
    /// Failures answered with 429.
    pub throttled_calls: u64,
    /// Failures answered with 400 (content filter).
    pub filtered_calls: u64,
    pub total_calls: u64,
    pub total_tokens: u64,
    pub total_latency: Duration,
}

impl LiveCounters {
    /// `(tokens_per_minute, requests_per_minute)` over an interval of `minutes`.
    fn per_minute(&self, minutes: u32) -> (f64, f64) {
        if minutes == 0 {
            return (0.0, 0.0);
        }
        let minutes = f64::from(minutes);
        (
            self.total_tokens as f64 / minutes,
            self.successful_calls as f64 / minutes,
        )
    }

    fn summarize(&self, interval_minutes: u32) -> WindowMetrics {
        let (tokens_per_minute, requests_per_minute) = self.per_minute(interval_minutes);
        let (avg_tokens, avg_latency_ms) = if self.successful_calls > 0 {
            let calls = self.successful_calls as f64;
            (
                self.total_tokens as f64 / calls,
                self.total_latency.as_micros() as f64 / 1000.0 / calls,
            )
        } else {
            (0.0, 0.0)
        };
        WindowMetrics {
            total_api_calls: self.total_calls,
            failed_calls: self.failed_calls,
            throttled_calls: self.throttled_calls,
            filtered_calls: self.filtered_calls,
            k_tokens_per_window: k_tokens(self.total_tokens),
            avg_tokens_per_call: avg_tokens,
            avg_requests_per_call: avg_tokens * REQUESTS_PER_KTOKEN_HEURISTIC / 1000.0,
            tokens_per_minute,
            requests_per_minute,
            avg_response_time_msec: avg_latency_ms,
        }
    }
}

#[derive(Debug)]
struct Window {
    live: LiveCounters,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    history: RingHistory<HistoryEntry>,
}

/// Usage counters for one backend endpoint.
///
/// The rollover check and the counter update run under one lock, so parallel
/// routing calls can neither double-roll a window nor tear an increment.
pub struct EndpointMetrics {
    key: String,
    interval_minutes: u32,
    interval: chrono::Duration,
    clock: Arc<dyn Clock>,
    window: Mutex<Window>,
}

impl EndpointMetrics {
    pub fn new(key: impl Into<String>, cfg: &MetricsConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        let capacity = cfg.history_capacity_nonzero()?;
        let interval = cfg.interval();
        let start = clock.now();
        let key = key.into();
        debug!(
            endpoint = key.as_str(),
            interval_minutes = cfg.interval_minutes,
            history_capacity = cfg.history_capacity,
            "endpoint metrics created"
        );
        Ok(Self {
            key,
            interval_minutes: cfg.interval_minutes,
            interval,
            clock,
            window: Mutex::new(Window {
                live: LiveCounters::default(),
                start,
                end: start + interval,
                history: RingHistory::new(capacity),
            }),
        })
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    fn lock(&self) -> Result<MutexGuard<'_, Window>> {
        self.window.lock().map_err(|_| Error::poisoned("endpoint_metrics"))
    }

    fn roll_locked(&self, w: &mut Window) -> bool {
        let now = self.clock.now();
        if now <= w.end {
            return false;
        }
        let entry = HistoryEntry {
            collection_time: display_time(w.start),
            collected_metrics: w.live.summarize(self.interval_minutes),
        };
        debug!(
            endpoint = self.key.as_str(),
            total_calls = w.live.total_calls,
            failed_calls = w.live.failed_calls,
            throttled_calls = w.live.throttled_calls,
            "metrics window rolled over"
        );
        w.history.enqueue(entry);
        w.live = LiveCounters::default();
        w.start = now;
        w.end = now + self.interval;
        true
    }

    /// Close the current window if it has elapsed. Returns whether it rolled.
    pub fn rollover_if_due(&self) -> Result<bool> {
        let mut w = self.lock()?;
        Ok(self.roll_locked(&mut w))
    }

    pub fn record_success(&self, tokens: u64, latency: Duration) -> Result<()> {
        let mut w = self.lock()?;
        self.roll_locked(&mut w);
        w.live.successful_calls += 1;
        w.live.total_calls += 1;
        w.live.total_tokens = w.live.total_tokens.saturating_add(tokens);
        w.live.total_latency = w.live.total_latency.saturating_add(latency);
        Ok(())
    }

    /// Count a failed attempt. `status` is the upstream HTTP status, or `None`
    /// when the endpoint never answered.
    pub fn record_failure(&self, status: Option<u16>) -> Result<()> {
        let mut w = self.lock()?;
        self.roll_locked(&mut w);
        w.live.failed_calls += 1;
        w.live.total_calls += 1;
        match status {
            Some(THROTTLED_STATUS) => w.live.throttled_calls += 1,
            Some(FILTERED_STATUS) => w.live.filtered_calls += 1,
            _ => {}
        }
        Ok(())
    }

    pub fn live(&self) -> Result<LiveCounters> {
        Ok(self.lock()?.live)
    }

    /// `(window_start, window_end)` of the current window.
    pub fn window_bounds(&self) -> Result<(DateTime<Utc>, DateTime<Utc>)> {
        let w = self.lock()?;
        Ok((w.start, w.end))
    }

    pub fn to_snapshot(&self) -> Result<EndpointMetricsSnapshot> {
        let w = self.lock()?;
        let (tokens_per_minute, requests_per_minute) = w.live.per_minute(self.interval_minutes);
        Ok(EndpointMetricsSnapshot {
            successful_calls: w.live.successful_calls,
            failed_calls: w.live.failed_calls,
            throttled_calls: w.live.throttled_calls,
            filtered_calls: w.live.filtered_calls,
            total_calls: w.live.total_calls,
            k_inference_tokens: k_tokens(w.live.total_tokens),
            tokens_per_minute,
            requests_per_minute,
            history: w.history.snapshot_view(),
        })
    }
}

impl std::fmt::Debug for EndpointMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EndpointMetrics")
            .field("key", &self.key)
            .field("interval", &self.interval)
            .finish_non_exhaustive()
    }
}
