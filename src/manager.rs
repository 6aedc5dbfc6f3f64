//! Registry of named pools sharing one configuration source

use crate::config::{PoolConfiguration, PoolProperties};
use crate::errors::{PoolError, PoolResult};
use crate::health::HealthStatus;
use crate::metrics::PoolMetrics;
use crate::pool::{IdSequence, PoolContainer};
use crate::resource::{BackpressureSignal, NoBackpressure, PoolFiller, Resource};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Type-erased view of a pool used for maintenance and diagnostics
pub trait ManagedPool: Send + Sync {
    fn name(&self) -> &str;
    fn prune(&self) -> PoolResult<()>;
    fn close(&self);
    fn total_objects(&self) -> usize;
    fn available_objects(&self) -> usize;
    fn get_metrics(&self) -> PoolMetrics;
    fn get_health_status(&self) -> HealthStatus;
    fn describe(&self) -> String;
}

impl<R: Resource> ManagedPool for PoolContainer<R> {
    fn name(&self) -> &str {
        PoolContainer::name(self)
    }

    fn prune(&self) -> PoolResult<()> {
        PoolContainer::prune(self)
    }

    fn close(&self) {
        PoolContainer::close(self)
    }

    fn total_objects(&self) -> usize {
        PoolContainer::total_objects(self)
    }

    fn available_objects(&self) -> usize {
        PoolContainer::available_objects(self)
    }

    fn get_metrics(&self) -> PoolMetrics {
        PoolContainer::get_metrics(self)
    }

    fn get_health_status(&self) -> HealthStatus {
        PoolContainer::get_health_status(self)
    }

    fn describe(&self) -> String {
        self.to_string()
    }
}

/// Owns every pool of a process.
///
/// Pools read their `<name>.*` settings from the manager's properties and
/// share its id sequence and backpressure signal. Each pool's filler gets the
/// same namespace as a [`PoolProperties`].
///
/// # Examples
///
/// ```
/// use leasepool::{PoolManager, PoolProperties, PoolResult, Resource};
/// use std::collections::HashMap;
///
/// struct Worker;
///
/// impl Resource for Worker {
///     type Error = std::io::Error;
///     fn discard(&mut self) -> Result<(), Self::Error> { Ok(()) }
/// }
///
/// let mut props = HashMap::new();
/// props.insert("workers.start".to_string(), "2".to_string());
///
/// let manager = PoolManager::new(props);
/// let workers = manager
///     .create_pool("workers", |_: &PoolProperties| -> PoolResult<Worker> { Ok(Worker) })
///     .unwrap();
///
/// assert_eq!(workers.total_objects(), 2);
/// assert_eq!(manager.pool_names(), vec!["workers".to_string()]);
/// ```
pub struct PoolManager {
    properties: Arc<HashMap<String, String>>,
    ids: IdSequence,
    signal: Arc<dyn BackpressureSignal>,
    pools: DashMap<String, Arc<dyn ManagedPool>>,
}

impl PoolManager {
    pub fn new(properties: HashMap<String, String>) -> Self {
        Self {
            properties: Arc::new(properties),
            ids: IdSequence::new(),
            signal: Arc::new(NoBackpressure),
            pools: DashMap::new(),
        }
    }

    /// Use `signal` for pools created from now on
    pub fn with_backpressure(mut self, signal: Arc<dyn BackpressureSignal>) -> Self {
        self.signal = signal;
        self
    }

    /// Configuration the manager would give the pool `name`
    pub fn configuration(&self, name: &str) -> PoolResult<PoolConfiguration> {
        self.properties(name).configuration()
    }

    /// The `<name>.*` namespace handed to that pool's filler
    pub fn properties(&self, name: &str) -> PoolProperties {
        PoolProperties::new(name, Arc::clone(&self.properties))
    }

    /// Build and register a pool configured from the `<name>.*` properties
    pub fn create_pool<R, F>(&self, name: &str, filler: F) -> PoolResult<PoolContainer<R>>
    where
        R: Resource,
        F: PoolFiller<R> + 'static,
    {
        let config = self.configuration(name)?;
        self.create_pool_with(name, config, filler)
    }

    /// Build and register a pool with an explicit configuration
    pub fn create_pool_with<R, F>(
        &self,
        name: &str,
        config: PoolConfiguration,
        filler: F,
    ) -> PoolResult<PoolContainer<R>>
    where
        R: Resource,
        F: PoolFiller<R> + 'static,
    {
        if self.pools.contains_key(name) {
            return Err(PoolError::DuplicatePool(name.to_string()));
        }

        let pool = PoolContainer::with_collaborators(
            self.properties(name),
            config,
            filler,
            Arc::clone(&self.signal),
            self.ids.clone(),
        )?;

        match self.pools.entry(name.to_string()) {
            Entry::Occupied(_) => {
                pool.close();
                Err(PoolError::DuplicatePool(name.to_string()))
            }
            Entry::Vacant(slot) => {
                slot.insert(Arc::new(pool.clone()));
                Ok(pool)
            }
        }
    }

    /// Registered pool names, sorted
    pub fn pool_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.pools.iter().map(|p| p.key().clone()).collect();
        names.sort();
        names
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn ManagedPool>> {
        self.pools.get(name).map(|p| Arc::clone(p.value()))
    }

    /// Prune every pool. Returns the failures; the other pools are still pruned.
    pub fn prune_all(&self) -> Vec<(String, PoolError)> {
        let pools: Vec<Arc<dyn ManagedPool>> = self.pools.iter().map(|p| Arc::clone(p.value())).collect();

        pools
            .into_iter()
            .filter_map(|pool| match pool.prune() {
                Ok(()) => None,
                Err(e) => {
                    tracing::warn!(pool = %pool.name(), error = %e, "Prune failed");
                    Some((pool.name().to_string(), e))
                }
            })
            .collect()
    }

    /// Unregister and close a pool
    pub fn remove_pool(&self, name: &str) -> bool {
        match self.pools.remove(name) {
            Some((_, pool)) => {
                pool.close();
                true
            }
            None => false,
        }
    }

    /// Close and unregister every pool
    pub fn shutdown(&self) {
        for name in self.pool_names() {
            self.remove_pool(&name);
        }
        tracing::info!("Pool manager shut down");
    }

    /// Prune all pools every `interval` on the tokio runtime.
    ///
    /// Prunes run on the blocking pool; the task ends when the manager is dropped.
    pub fn spawn_maintenance(self: &Arc<Self>, interval: Duration) -> tokio::task::JoinHandle<()> {
        let manager = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(manager) = manager.upgrade() else {
                    break;
                };
                let failures = tokio::task::spawn_blocking(move || manager.prune_all()).await;
                match failures {
                    Ok(failures) if !failures.is_empty() => {
                        tracing::debug!(failed = failures.len(), "Maintenance pass finished with failures");
                    }
                    Ok(_) => {}
                    Err(e) => {
                        tracing::warn!(error = %e, "Maintenance pass aborted");
                    }
                }
            }
        })
    }
}

impl fmt::Display for PoolManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for name in self.pool_names() {
            if let Some(pool) = self.get(&name) {
                f.write_str(&pool.describe())?;
            }
        }
        Ok(())
    }
}

impl fmt::Debug for PoolManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolManager")
            .field("pools", &self.pool_names())
            .finish_non_exhaustive()
    }
}
