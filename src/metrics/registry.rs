use super::endpoint::{EndpointMetrics, EndpointMetricsSnapshot};
use super::report::{display_time, ApplicationMetrics, EndpointReport, GatewayMetricsReport};
use crate::clock::{Clock, SystemClock};
use crate::config::MetricsConfig;
use crate::routing::EndpointDescriptor;
use crate::{Error, Result};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use tracing::info;

/// Owned home of every endpoint's metrics.
///
/// Built once per process and shared by `Arc` between the router (writer) and
/// whatever renders metrics (reader).
pub struct MetricsRegistry {
    cfg: MetricsConfig,
    clock: Arc<dyn Clock>,
    endpoints: RwLock<HashMap<String, Arc<EndpointMetrics>>>,
    /// Application id -> endpoints in priority order.
    applications: RwLock<BTreeMap<String, Vec<EndpointDescriptor>>>,
    routed_requests: AtomicU64,
    exhausted_requests: AtomicU64,
}

impl MetricsRegistry {
    pub fn new(cfg: MetricsConfig) -> Result<Self> {
        Self::with_clock(cfg, Arc::new(SystemClock))
    }

    pub fn with_clock(cfg: MetricsConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        cfg.validate()?;
        Ok(Self {
            cfg,
            clock,
            endpoints: RwLock::new(HashMap::new()),
            applications: RwLock::new(BTreeMap::new()),
            routed_requests: AtomicU64::new(0),
            exhausted_requests: AtomicU64::new(0),
        })
    }

    pub fn config(&self) -> &MetricsConfig {
        &self.cfg
    }

    pub fn get(&self, key: &str) -> Result<Option<Arc<EndpointMetrics>>> {
        Ok(self
            .endpoints
            .read()
            .map_err(|_| Error::poisoned("metrics_registry"))?
            .get(key)
            .cloned())
    }

    /// Metrics for `endpoint`, created on first sight.
    pub fn metrics_for(&self, endpoint: &EndpointDescriptor) -> Result<Arc<EndpointMetrics>> {
        let key = endpoint.metrics_key();
        if let Some(existing) = self.get(key)? {
            return Ok(existing);
        }
        let mut map = self
            .endpoints
            .write()
            .map_err(|_| Error::poisoned("metrics_registry"))?;
        if let Some(existing) = map.get(key) {
            return Ok(existing.clone());
        }
        let created = Arc::new(EndpointMetrics::new(key, &self.cfg, self.clock.clone())?);
        map.insert(key.to_string(), created.clone());
        Ok(created)
    }

    /// Record an application's endpoints (in priority order) and create their metrics.
    pub fn register_application(&self, app_id: &str, endpoints: &[EndpointDescriptor]) -> Result<()> {
        for endpoint in endpoints {
            endpoint.validate()?;
            self.metrics_for(endpoint)?;
        }
        self.applications
            .write()
            .map_err(|_| Error::poisoned("metrics_registry"))?
            .insert(app_id.to_string(), endpoints.to_vec());
        info!(
            app_id,
            endpoints = endpoints.len(),
            "application endpoints registered"
        );
        Ok(())
    }

    pub fn application_endpoints(&self, app_id: &str) -> Result<Option<Vec<EndpointDescriptor>>> {
        Ok(self
            .applications
            .read()
            .map_err(|_| Error::poisoned("metrics_registry"))?
            .get(app_id)
            .cloned())
    }

    /// Drop an endpoint's metrics. Returns whether it was tracked.
    pub fn remove_endpoint(&self, key: &str) -> Result<bool> {
        let removed = self
            .endpoints
            .write()
            .map_err(|_| Error::poisoned("metrics_registry"))?
            .remove(key)
            .is_some();
        if removed {
            let mut apps = self
                .applications
                .write()
                .map_err(|_| Error::poisoned("metrics_registry"))?;
            for endpoints in apps.values_mut() {
                endpoints.retain(|e| e.metrics_key() != key);
            }
        }
        Ok(removed)
    }

    /// Forget all endpoints, applications and instance counters.
    pub fn reset(&self) -> Result<()> {
        self.endpoints
            .write()
            .map_err(|_| Error::poisoned("metrics_registry"))?
            .clear();
        self.applications
            .write()
            .map_err(|_| Error::poisoned("metrics_registry"))?
            .clear();
        self.routed_requests.store(0, Ordering::Relaxed);
        self.exhausted_requests.store(0, Ordering::Relaxed);
        info!("metrics registry reset");
        Ok(())
    }

    pub fn snapshot(&self, key: &str) -> Result<Option<EndpointMetricsSnapshot>> {
        self.get(key)?.map(|m| m.to_snapshot()).transpose()
    }

    pub(crate) fn record_routed(&self) {
        self.routed_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_exhausted(&self) {
        self.exhausted_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn routed_requests(&self) -> u64 {
        self.routed_requests.load(Ordering::Relaxed)
    }

    pub fn exhausted_requests(&self) -> u64 {
        self.exhausted_requests.load(Ordering::Relaxed)
    }

    fn endpoint_report(&self, endpoint: &EndpointDescriptor, priority: usize) -> Result<Option<EndpointReport>> {
        let Some(metrics) = self.get(endpoint.metrics_key())? else {
            return Ok(None);
        };
        Ok(Some(EndpointReport {
            endpoint: endpoint.uri.clone(),
            priority,
            rate_limit_hint: endpoint.rate_limit_hint,
            metrics: metrics.to_snapshot()?,
        }))
    }

    pub fn report(&self, instance_name: Option<&str>) -> Result<GatewayMetricsReport> {
        let apps = self
            .applications
            .read()
            .map_err(|_| Error::poisoned("metrics_registry"))?
            .clone();

        let mut grouped = HashSet::new();
        let mut application_metrics = Vec::with_capacity(apps.len());
        for (app_id, endpoints) in &apps {
            let mut endpoint_metrics = Vec::with_capacity(endpoints.len());
            for (priority, endpoint) in endpoints.iter().enumerate() {
                grouped.insert(endpoint.metrics_key().to_string());
                if let Some(report) = self.endpoint_report(endpoint, priority)? {
                    endpoint_metrics.push(report);
                }
            }
            application_metrics.push(ApplicationMetrics {
                application_id: app_id.clone(),
                endpoint_metrics,
            });
        }

        let mut others: Vec<(String, Arc<EndpointMetrics>)> = self
            .endpoints
            .read()
            .map_err(|_| Error::poisoned("metrics_registry"))?
            .iter()
            .filter(|(key, _)| !grouped.contains(*key))
            .map(|(key, m)| (key.clone(), m.clone()))
            .collect();
        others.sort_by(|a, b| a.0.cmp(&b.0));
        let other_endpoint_metrics = others
            .into_iter()
            .map(|(key, m)| {
                Ok(EndpointReport {
                    endpoint: key,
                    priority: 0,
                    rate_limit_hint: None,
                    metrics: m.to_snapshot()?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let total = self.routed_requests();
        let failed = self.exhausted_requests();
        Ok(GatewayMetricsReport {
            instance_name: instance_name.map(str::to_string),
            collection_interval: self.cfg.interval_minutes,
            history_count: self.cfg.history_capacity,
            application_metrics,
            other_endpoint_metrics,
            success_api_calls: total.saturating_sub(failed),
            failed_api_calls: failed,
            total_api_calls: total,
            current_date: display_time(self.clock.now()),
            status: "OK",
        })
    }
}

impl std::fmt::Debug for MetricsRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricsRegistry")
            .field("cfg", &self.cfg)
            .field("routed_requests", &self.routed_requests())
            .field("exhausted_requests", &self.exhausted_requests())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use std::time::Duration;

    fn registry() -> MetricsRegistry {
        MetricsRegistry::with_clock(MetricsConfig::default(), Arc::new(ManualClock::default())).unwrap()
    }

    fn ep(uri: &str) -> EndpointDescriptor {
        EndpointDescriptor::new(uri, "key")
    }

    #[test]
    fn test_metrics_for_is_get_or_create() {
        let reg = registry();
        let a1 = reg.metrics_for(&ep("https://a.example")).unwrap();
        let a2 = reg.metrics_for(&ep("https://a.example")).unwrap();
        assert!(Arc::ptr_eq(&a1, &a2));
        let b = reg.metrics_for(&ep("https://b.example")).unwrap();
        assert!(!Arc::ptr_eq(&a1, &b));
    }

    #[test]
    fn test_rejects_zero_history() {
        let cfg = MetricsConfig::new().with_history_capacity(0);
        assert!(MetricsRegistry::new(cfg).is_err());
    }

    #[test]
    fn test_register_application_validates() {
        let reg = registry();
        let err = reg
            .register_application("app", &[ep("https://a.example"), ep("nope")])
            .unwrap_err();
        assert!(matches!(err, Error::Validation { .. }));
        assert!(reg.application_endpoints("app").unwrap().is_none());
    }

    #[test]
    fn test_report_groups_by_application_in_priority_order() {
        let reg = registry();
        let primary = ep("https://a.example").with_rate_limit_hint(60);
        let secondary = ep("https://b.example");
        reg.register_application("chat", &[primary.clone(), secondary.clone()])
            .unwrap();
        reg.metrics_for(&primary)
            .unwrap()
            .record_success(50, Duration::from_millis(10))
            .unwrap();
        reg.metrics_for(&ep("https://adhoc.example"))
            .unwrap()
            .record_failure(None)
            .unwrap();
        reg.record_routed();
        reg.record_routed();
        reg.record_exhausted();

        let report = reg.report(Some("gw-1")).unwrap();
        assert_eq!(report.application_metrics.len(), 1);
        let chat = &report.application_metrics[0];
        assert_eq!(chat.application_id, "chat");
        assert_eq!(chat.endpoint_metrics[0].endpoint, "https://a.example");
        assert_eq!(chat.endpoint_metrics[0].priority, 0);
        assert_eq!(chat.endpoint_metrics[0].rate_limit_hint, Some(60));
        assert_eq!(chat.endpoint_metrics[0].metrics.successful_calls, 1);
        assert_eq!(chat.endpoint_metrics[1].priority, 1);
        assert_eq!(report.other_endpoint_metrics.len(), 1);
        assert_eq!(report.other_endpoint_metrics[0].metrics.failed_calls, 1);
        assert_eq!(report.total_api_calls, 2);
        assert_eq!(report.failed_api_calls, 1);
        assert_eq!(report.success_api_calls, 1);

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["instanceName"], "gw-1");
        assert_eq!(json["collectionInterval"], 60);
        assert_eq!(json["historyCount"], 5);
        assert_eq!(json["status"], "OK");
        assert_eq!(
            json["applicationMetrics"][0]["endpointMetrics"][0]["metrics"]["successfulCalls"],
            1
        );
        assert!(!json.to_string().contains("\"key\""));
    }

    #[test]
    fn test_remove_and_reset() {
        let reg = registry();
        let a = ep("https://a.example");
        reg.register_application("chat", &[a.clone()]).unwrap();
        reg.record_routed();
        assert!(reg.remove_endpoint(a.metrics_key()).unwrap());
        assert!(!reg.remove_endpoint(a.metrics_key()).unwrap());
        assert!(reg.get(a.metrics_key()).unwrap().is_none());
        assert!(reg.application_endpoints("chat").unwrap().unwrap().is_empty());

        reg.reset().unwrap();
        assert_eq!(reg.routed_requests(), 0);
        assert!(reg.application_endpoints("chat").unwrap().is_none());
    }

    #[test]
    fn test_poisoned_locks_surface_as_runtime_errors() {
        let reg = Arc::new(registry());
        let a = ep("https://a.example");
        reg.register_application("chat", &[a.clone()]).unwrap();

        let poisoner = Arc::clone(&reg);
        let _ = std::thread::spawn(move || {
            let _endpoints = poisoner.endpoints.write().unwrap();
            let _apps = poisoner.applications.write().unwrap();
            panic!("writer panicked while holding the registry locks");
        })
        .join();

        assert!(matches!(reg.get(a.metrics_key()), Err(Error::Runtime { .. })));
        assert!(matches!(
            reg.application_endpoints("chat"),
            Err(Error::Runtime { .. })
        ));
        assert!(reg.snapshot(a.metrics_key()).is_err());
        assert!(reg.metrics_for(&a).is_err());
    }
}
