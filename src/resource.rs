//! Capabilities a pooled resource and its factory provide

use crate::config::{PoolConfiguration, PoolProperties};
use crate::errors::PoolResult;

/// A physical resource that can live in a pool.
///
/// Implemented once per resource kind (connections, worker threads, ...).
/// All methods may block; the pool never calls them while holding its lock.
///
/// # Examples
///
/// ```
/// use leasepool::Resource;
///
/// struct Socket {
///     open: bool,
/// }
///
/// impl Resource for Socket {
///     type Error = std::io::Error;
///
///     fn is_alive(&mut self) -> bool {
///         self.open
///     }
///
///     fn discard(&mut self) -> Result<(), Self::Error> {
///         self.open = false;
///         Ok(())
///     }
/// }
/// ```
pub trait Resource: Send + 'static {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Prepare the resource for a new lease. A failure marks the handle dead.
    fn activate(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }

    /// Probe whether the resource still works
    fn is_alive(&mut self) -> bool {
        true
    }

    /// Release the underlying resource. Called at most once per resource.
    fn discard(&mut self) -> Result<(), Self::Error>;
}

/// Factory that constructs fresh resources for a named pool.
///
/// Closures taking the pool's [`PoolProperties`] are fillers too.
///
/// # Examples
///
/// ```
/// use leasepool::{PoolError, PoolManager, PoolProperties, PoolResult, Resource};
/// use std::collections::HashMap;
///
/// struct Conn {
///     url: String,
/// }
///
/// impl Resource for Conn {
///     type Error = std::io::Error;
///     fn discard(&mut self) -> Result<(), Self::Error> { Ok(()) }
/// }
///
/// fn connect(props: &PoolProperties) -> PoolResult<Conn> {
///     let url = props
///         .get("url")
///         .ok_or_else(|| PoolError::creation(props.pool(), "missing url"))?;
///     Ok(Conn { url: url.to_string() })
/// }
///
/// let mut props = HashMap::new();
/// props.insert("db.url".to_string(), "postgres://localhost/app".to_string());
///
/// let manager = PoolManager::new(props);
/// let db = manager.create_pool("db", connect).unwrap();
/// assert_eq!(db.get_object().unwrap().url, "postgres://localhost/app");
/// ```
pub trait PoolFiller<R>: Send + Sync {
    /// Build one resource for the pool owning `properties`
    fn fill(&self, properties: &PoolProperties, config: &PoolConfiguration) -> PoolResult<R>;
}

impl<R, F> PoolFiller<R> for F
where
    F: Fn(&PoolProperties) -> PoolResult<R> + Send + Sync,
{
    fn fill(&self, properties: &PoolProperties, _config: &PoolConfiguration) -> PoolResult<R> {
        self(properties)
    }
}

/// Process-wide hint that unreachable resources should be reclaimed.
///
/// Invoked at most once per blocked checkout and never awaited.
pub trait BackpressureSignal: Send + Sync {
    fn collect(&self);
}

/// Signal that does nothing
#[derive(Debug, Clone, Copy, Default)]
pub struct NoBackpressure;

impl BackpressureSignal for NoBackpressure {
    fn collect(&self) {}
}

impl<F> BackpressureSignal for F
where
    F: Fn() + Send + Sync,
{
    fn collect(&self) {
        self()
    }
}
