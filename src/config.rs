//! Runtime knobs for metrics windows and the router.
//!
//! Everything has a working default and can be overridden from the
//! environment; there is no config file layer.

use crate::{Error, ErrorContext, Result};
use std::env;
use std::num::NonZeroUsize;
use std::time::Duration;

/// Default metrics collection interval, in minutes.
pub const DEFAULT_INTERVAL_MINUTES: u32 = 60;
/// Default number of rolled-up windows kept per endpoint.
pub const DEFAULT_HISTORY_CAPACITY: usize = 5;
/// Default per-attempt upstream timeout.
pub const DEFAULT_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(30);

fn env_parse<T: std::str::FromStr>(key: &str) -> Result<Option<T>> {
    match env::var(key) {
        Ok(raw) => raw.trim().parse::<T>().map(Some).map_err(|_| {
            Error::configuration_with_context(
                format!("invalid value {:?}", raw),
                ErrorContext::new().with_field_path(key).with_source("env"),
            )
        }),
        Err(_) => Ok(None),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricsConfig {
    pub interval_minutes: u32,
    pub history_capacity: usize,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            interval_minutes: DEFAULT_INTERVAL_MINUTES,
            history_capacity: DEFAULT_HISTORY_CAPACITY,
        }
    }
}

impl MetricsConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_interval_minutes(mut self, minutes: u32) -> Self {
        self.interval_minutes = minutes;
        self
    }

    pub fn with_history_capacity(mut self, capacity: usize) -> Self {
        self.history_capacity = capacity;
        self
    }

    /// Reads `API_GATEWAY_METRICS_CINTERVAL` and `API_GATEWAY_METRICS_CHISTORY`.
    pub fn from_env() -> Result<Self> {
        let mut cfg = Self::default();
        if let Some(minutes) = env_parse::<u32>("API_GATEWAY_METRICS_CINTERVAL")? {
            cfg.interval_minutes = minutes;
        }
        if let Some(count) = env_parse::<usize>("API_GATEWAY_METRICS_CHISTORY")? {
            cfg.history_capacity = count;
        }
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        self.history_capacity_nonzero().map(|_| ())
    }

    pub(crate) fn history_capacity_nonzero(&self) -> Result<NonZeroUsize> {
        NonZeroUsize::new(self.history_capacity).ok_or_else(|| {
            Error::configuration_with_context(
                "history capacity must be at least 1",
                ErrorContext::new()
                    .with_field_path("metrics.history_capacity")
                    .with_source("metrics_config"),
            )
        })
    }

    pub fn interval(&self) -> chrono::Duration {
        chrono::Duration::minutes(i64::from(self.interval_minutes))
    }
}

/// What the router does with a non-200, non-429 upstream status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UpstreamErrorPolicy {
    /// Count the failure and try the next endpoint.
    #[default]
    Failover,
    /// Count the failure and hand the upstream status and body to the caller.
    Surface,
}

impl std::str::FromStr for UpstreamErrorPolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "failover" => Ok(Self::Failover),
            "surface" => Ok(Self::Surface),
            other => Err(Error::configuration_with_context(
                format!("unknown upstream error policy {:?}", other),
                ErrorContext::new()
                    .with_field_path("router.upstream_error_policy")
                    .with_details("expected \"failover\" or \"surface\""),
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouterConfig {
    pub attempt_timeout: Duration,
    pub upstream_error_policy: UpstreamErrorPolicy,
    pub pool_max_idle_per_host: usize,
    pub proxy_url: Option<String>,
    /// Reported as `instanceName` in the gateway metrics report.
    pub instance_name: Option<String>,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            attempt_timeout: DEFAULT_ATTEMPT_TIMEOUT,
            upstream_error_policy: UpstreamErrorPolicy::Failover,
            pool_max_idle_per_host: 32,
            proxy_url: None,
            instance_name: None,
        }
    }
}

impl RouterConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = timeout;
        self
    }

    pub fn with_upstream_error_policy(mut self, policy: UpstreamErrorPolicy) -> Self {
        self.upstream_error_policy = policy;
        self
    }

    pub fn with_proxy_url(mut self, url: impl Into<String>) -> Self {
        self.proxy_url = Some(url.into());
        self
    }

    pub fn with_instance_name(mut self, name: impl Into<String>) -> Self {
        self.instance_name = Some(name.into());
        self
    }

    pub fn from_env() -> Result<Self> {
        let mut cfg = Self::default();
        if let Some(secs) = env_parse::<u64>("API_GATEWAY_ATTEMPT_TIMEOUT_SECS")? {
            cfg.attempt_timeout = Duration::from_secs(secs);
        }
        if let Some(policy) = env_parse::<UpstreamErrorPolicy>("API_GATEWAY_UPSTREAM_ERROR_POLICY")? {
            cfg.upstream_error_policy = policy;
        }
        if let Some(n) = env_parse::<usize>("API_GATEWAY_HTTP_POOL_MAX_IDLE_PER_HOST")? {
            cfg.pool_max_idle_per_host = n;
        }
        cfg.proxy_url = env::var("API_GATEWAY_PROXY_URL").ok().filter(|s| !s.is_empty());
        cfg.instance_name = env::var("API_GATEWAY_NAME").ok().filter(|s| !s.is_empty());
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if self.attempt_timeout.is_zero() {
            return Err(Error::configuration_with_context(
                "attempt timeout must be greater than zero",
                ErrorContext::new()
                    .with_field_path("router.attempt_timeout")
                    .with_source("router_config"),
            ));
        }
        if let Some(proxy) = &self.proxy_url {
            url::Url::parse(proxy).map_err(|e| {
                Error::configuration_with_context(
                    format!("invalid proxy url: {}", e),
                    ErrorContext::new()
                        .with_field_path("router.proxy_url")
                        .with_source("router_config"),
                )
            })?;
        }
        Ok(())
    }
}
