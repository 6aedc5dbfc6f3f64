//! Metrics collection and export for resource pools

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Metrics snapshot for a pool
///
/// # Examples
///
/// ```
/// use leasepool::{PoolConfiguration, PoolContainer, PoolProperties, PoolResult, Resource};
///
/// struct Conn;
///
/// impl Resource for Conn {
///     type Error = std::io::Error;
///     fn discard(&mut self) -> Result<(), Self::Error> { Ok(()) }
/// }
///
/// let pool: PoolContainer<Conn> = PoolContainer::new(
///     "db",
///     PoolConfiguration::new().with_max(3),
///     |_: &PoolProperties| -> PoolResult<Conn> { Ok(Conn) },
/// ).unwrap();
///
/// {
///     let _conn = pool.get_object().unwrap();
///     let metrics = pool.get_metrics();
///     assert_eq!(metrics.total_retrieved, 1);
///     assert_eq!(metrics.total_created, 1);
///     assert_eq!(metrics.checked_out_objects, 1);
/// }
/// ```
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PoolMetrics {
    /// Leases handed out
    pub total_retrieved: usize,

    /// Leases returned
    pub total_returned: usize,

    /// Resources built by the filler
    pub total_created: usize,

    /// Resources discarded
    pub total_discarded: usize,

    /// Discards that reported an error
    pub discard_failures: usize,

    /// Probes that found a dead resource
    pub liveness_failures: usize,

    /// Filler calls that failed
    pub creation_failures: usize,

    /// Checkouts that had to wait at least once
    pub wait_events: usize,

    /// Backpressure signals sent
    pub backpressure_signals: usize,

    /// Handles created beyond `max`
    pub overshoots: usize,

    /// Checkouts that failed for lack of a handle
    pub exhausted_events: usize,

    /// Handles currently in the pool
    pub total_objects: usize,

    /// Handles currently available
    pub available_objects: usize,

    /// Handles currently leased
    pub checked_out_objects: usize,

    /// Occupancy ratio (total / max)
    pub utilization: f64,

    /// Capacity ceiling
    pub max_capacity: usize,
}

impl PoolMetrics {
    /// Export metrics as a HashMap
    pub fn export(&self) -> HashMap<String, String> {
        let mut metrics = HashMap::new();
        metrics.insert("total_retrieved".to_string(), self.total_retrieved.to_string());
        metrics.insert("total_returned".to_string(), self.total_returned.to_string());
        metrics.insert("total_created".to_string(), self.total_created.to_string());
        metrics.insert("total_discarded".to_string(), self.total_discarded.to_string());
        metrics.insert("discard_failures".to_string(), self.discard_failures.to_string());
        metrics.insert("liveness_failures".to_string(), self.liveness_failures.to_string());
        metrics.insert("creation_failures".to_string(), self.creation_failures.to_string());
        metrics.insert("wait_events".to_string(), self.wait_events.to_string());
        metrics.insert("backpressure_signals".to_string(), self.backpressure_signals.to_string());
        metrics.insert("overshoots".to_string(), self.overshoots.to_string());
        metrics.insert("exhausted_events".to_string(), self.exhausted_events.to_string());
        metrics.insert("total_objects".to_string(), self.total_objects.to_string());
        metrics.insert("available_objects".to_string(), self.available_objects.to_string());
        metrics.insert("checked_out_objects".to_string(), self.checked_out_objects.to_string());
        metrics.insert("utilization".to_string(), format!("{:.2}", self.utilization));
        metrics.insert("max_capacity".to_string(), self.max_capacity.to_string());
        metrics
    }
}

/// Metrics exporter for Prometheus format
#[cfg(feature = "metrics")]
pub struct MetricsExporter;

#[cfg(feature = "metrics")]
impl MetricsExporter {
    /// Export metrics in Prometheus exposition format
    ///
    /// # Examples
    ///
    /// ```
    /// use leasepool::{MetricsExporter, PoolConfiguration, PoolContainer, PoolProperties, PoolResult, Resource};
    /// use std::collections::HashMap;
    ///
    /// struct Conn;
    ///
    /// impl Resource for Conn {
    ///     type Error = std::io::Error;
    ///     fn discard(&mut self) -> Result<(), Self::Error> { Ok(()) }
    /// }
    ///
    /// let pool: PoolContainer<Conn> = PoolContainer::new(
    ///     "orders",
    ///     PoolConfiguration::new(),
    ///     |_: &PoolProperties| -> PoolResult<Conn> { Ok(Conn) },
    /// ).unwrap();
    ///
    /// let mut tags = HashMap::new();
    /// tags.insert("service".to_string(), "api".to_string());
    ///
    /// let output = MetricsExporter::export_prometheus(&pool.get_metrics(), pool.name(), Some(&tags)).unwrap();
    /// assert!(output.contains("leasepool_objects_total"));
    /// assert!(output.contains("service=\"api\""));
    /// ```
    pub fn export_prometheus(
        metrics: &PoolMetrics,
        pool_name: &str,
        tags: Option<&HashMap<String, String>>,
    ) -> crate::errors::PoolResult<String> {
        use prometheus::{Encoder, IntCounter, IntGauge, Opts, Registry, TextEncoder};

        let to_err = |e: prometheus::Error| crate::errors::PoolError::Metrics(e.to_string());
        let labels = Self::labels(pool_name, tags);
        let registry = Registry::new();

        let gauges = [
            ("leasepool_objects_total", "Handles currently in the pool", metrics.total_objects),
            ("leasepool_objects_available", "Handles currently available", metrics.available_objects),
            ("leasepool_objects_checked_out", "Handles currently leased", metrics.checked_out_objects),
            ("leasepool_capacity", "Capacity ceiling", metrics.max_capacity),
        ];
        for (name, help, value) in gauges {
            let gauge = IntGauge::with_opts(Opts::new(name, help).const_labels(labels.clone()))
                .map_err(to_err)?;
            gauge.set(value as i64);
            registry.register(Box::new(gauge)).map_err(to_err)?;
        }

        let counters = [
            ("leasepool_retrieved_total", "Leases handed out", metrics.total_retrieved),
            ("leasepool_returned_total", "Leases returned", metrics.total_returned),
            ("leasepool_created_total", "Resources created", metrics.total_created),
            ("leasepool_discarded_total", "Resources discarded", metrics.total_discarded),
            ("leasepool_discard_failures_total", "Failed discards", metrics.discard_failures),
            ("leasepool_liveness_failures_total", "Failed liveness probes", metrics.liveness_failures),
            ("leasepool_creation_failures_total", "Failed creations", metrics.creation_failures),
            ("leasepool_overshoots_total", "Handles created beyond max", metrics.overshoots),
            ("leasepool_exhausted_total", "Checkouts that found no handle", metrics.exhausted_events),
        ];
        for (name, help, value) in counters {
            let counter = IntCounter::with_opts(Opts::new(name, help).const_labels(labels.clone()))
                .map_err(to_err)?;
            counter.inc_by(value as u64);
            registry.register(Box::new(counter)).map_err(to_err)?;
        }

        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&registry.gather(), &mut buffer)
            .map_err(to_err)?;
        String::from_utf8(buffer).map_err(|e| crate::errors::PoolError::Metrics(e.to_string()))
    }

    fn labels(pool_name: &str, tags: Option<&HashMap<String, String>>) -> HashMap<String, String> {
        let mut labels = HashMap::new();
        labels.insert("pool".to_string(), pool_name.to_string());

        if let Some(tags) = tags {
            for (key, value) in tags {
                labels.insert(key.clone(), value.clone());
            }
        }

        labels
    }
}

/// Internal metrics tracker
#[derive(Debug, Default)]
pub(crate) struct MetricsTracker {
    pub total_retrieved: AtomicUsize,
    pub total_returned: AtomicUsize,
    pub total_created: AtomicUsize,
    pub total_discarded: AtomicUsize,
    pub discard_failures: AtomicUsize,
    pub liveness_failures: AtomicUsize,
    pub creation_failures: AtomicUsize,
    pub wait_events: AtomicUsize,
    pub backpressure_signals: AtomicUsize,
    pub overshoots: AtomicUsize,
    pub exhausted_events: AtomicUsize,
}

impl MetricsTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn incr(counter: &AtomicUsize) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_discard(&self, ok: bool) {
        Self::incr(&self.total_discarded);
        if !ok {
            Self::incr(&self.discard_failures);
        }
    }

    pub fn get_metrics(&self, total: usize, available: usize, checked_out: usize, capacity: usize) -> PoolMetrics {
        let utilization = if capacity > 0 {
            total as f64 / capacity as f64
        } else {
            0.0
        };

        PoolMetrics {
            total_retrieved: self.total_retrieved.load(Ordering::Relaxed),
            total_returned: self.total_returned.load(Ordering::Relaxed),
            total_created: self.total_created.load(Ordering::Relaxed),
            total_discarded: self.total_discarded.load(Ordering::Relaxed),
            discard_failures: self.discard_failures.load(Ordering::Relaxed),
            liveness_failures: self.liveness_failures.load(Ordering::Relaxed),
            creation_failures: self.creation_failures.load(Ordering::Relaxed),
            wait_events: self.wait_events.load(Ordering::Relaxed),
            backpressure_signals: self.backpressure_signals.load(Ordering::Relaxed),
            overshoots: self.overshoots.load(Ordering::Relaxed),
            exhausted_events: self.exhausted_events.load(Ordering::Relaxed),
            total_objects: total,
            available_objects: available,
            checked_out_objects: checked_out,
            utilization,
            max_capacity: capacity,
        }
    }
}
