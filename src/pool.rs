//! Pool container: checkout, check-in, prune and diagnostics

use crate::config::{PoolConfiguration, PoolProperties};
use crate::errors::{PoolError, PoolResult};
use crate::eviction::{adaptive_max_age, PruneStatus};
use crate::handle::{discard_resource, Handle, HandleState};
use crate::health::HealthStatus;
use crate::metrics::{MetricsTracker, PoolMetrics};
use crate::resource::{BackpressureSignal, NoBackpressure, PoolFiller, Resource};

use parking_lot::{Condvar, Mutex, MutexGuard};
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Waits a checkout performs before the last-resort creation
pub const MAX_RETRIES: usize = 6;

/// Longest uninterrupted wait while a cancel token is attached
const CANCEL_POLL: Duration = Duration::from_millis(20);

/// Source of unique, increasing handle identities. Clones share the counter.
#[derive(Debug, Clone, Default)]
pub struct IdSequence(Arc<AtomicU64>);

impl IdSequence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Next identity, starting at 1
    pub fn next_id(&self) -> u64 {
        self.0.fetch_add(1, Ordering::Relaxed) + 1
    }
}

/// Cooperative cancellation for a blocked checkout
///
/// # Examples
///
/// ```
/// use leasepool::CancelToken;
///
/// let token = CancelToken::new();
/// let observer = token.clone();
/// token.cancel();
/// assert!(observer.is_cancelled());
/// ```
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Deadline and cancellation for one checkout
#[derive(Debug, Clone, Default)]
pub struct CheckoutOptions {
    deadline: Option<Instant>,
    cancel: Option<CancelToken>,
}

impl CheckoutOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Give up at `deadline`
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Give up once `timeout` has passed from now
    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Give up when `token` is cancelled
    pub fn with_cancel(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    fn check(&self, started: Instant) -> PoolResult<()> {
        if self.cancel.as_ref().is_some_and(CancelToken::is_cancelled) {
            return Err(PoolError::Cancelled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => {
                Err(PoolError::Timeout(started.elapsed()))
            }
            _ => Ok(()),
        }
    }
}

/// A leased resource that returns to its pool when dropped
pub struct PooledObject<R: Resource> {
    value: Option<R>,
    object_id: u64,
    pool: PoolContainer<R>,
}

impl<R: Resource> PooledObject<R> {
    /// Identity of the underlying handle
    pub fn object_id(&self) -> u64 {
        self.object_id
    }

    /// Name of the pool this lease came from
    pub fn pool_name(&self) -> &str {
        self.pool.name()
    }

    /// Return the resource as broken. Its handle is dead and gets pruned.
    pub fn invalidate(mut self) {
        if let Some(value) = self.value.take() {
            self.pool.retire(self.object_id, value);
            self.pool.inner.returned.notify_one();
        }
    }
}

impl<R: Resource> Deref for PooledObject<R> {
    type Target = R;

    fn deref(&self) -> &Self::Target {
        self.value.as_ref().expect("Value already returned")
    }
}

impl<R: Resource> DerefMut for PooledObject<R> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.value.as_mut().expect("Value already returned")
    }
}

impl<R: Resource> Drop for PooledObject<R> {
    fn drop(&mut self) {
        if let Some(value) = self.value.take() {
            self.pool.check_in(self.object_id, value);
        }
    }
}

impl<R: Resource> fmt::Debug for PooledObject<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledObject")
            .field("pool", &self.pool.name())
            .field("object_id", &self.object_id)
            .finish()
    }
}

/// Handles of one pool plus the creations currently in flight
struct Inventory<R> {
    handles: VecDeque<Handle<R>>,
    pending: usize,
    closed: bool,
}

impl<R: Resource> Inventory<R> {
    fn total(&self) -> usize {
        self.handles.len() + self.pending
    }

    /// Count a creation against capacity. Returns the size it was made at.
    fn reserve(&mut self) -> usize {
        let size = self.total();
        self.pending += 1;
        size
    }

    fn position(&self, object_id: u64) -> Option<usize> {
        self.handles.iter().position(|h| h.object_id() == object_id)
    }

    fn count(&self, state: HandleState) -> usize {
        self.handles.iter().filter(|h| h.state() == state).count()
    }

    /// Check out the first live candidate and move it to the back
    fn select(&mut self) -> Option<(u64, R)> {
        let index = self
            .handles
            .iter_mut()
            .position(|h| !h.expire_if_due() && h.is_available())?;
        let mut handle = self.handles.remove(index)?;
        let object_id = handle.object_id();
        let resource = handle.check_out();
        self.handles.push_back(handle);
        resource.map(|r| (object_id, r))
    }

    /// Remove every handle `remove` selects, keeping the order of the rest
    fn extract(&mut self, mut remove: impl FnMut(&mut Handle<R>) -> bool) -> Vec<Handle<R>> {
        let mut removed = Vec::new();
        let mut kept = VecDeque::with_capacity(self.handles.len());
        for mut handle in self.handles.drain(..) {
            if !handle.is_checked_out() && remove(&mut handle) {
                removed.push(handle);
            } else {
                kept.push_back(handle);
            }
        }
        self.handles = kept;
        removed
    }
}

struct PoolInner<R: Resource> {
    name: Arc<str>,
    properties: PoolProperties,
    config: PoolConfiguration,
    filler: Box<dyn PoolFiller<R>>,
    signal: Arc<dyn BackpressureSignal>,
    ids: IdSequence,
    inventory: Mutex<Inventory<R>>,
    returned: Condvar,
    metrics: MetricsTracker,
}

impl<R: Resource> Drop for PoolInner<R> {
    fn drop(&mut self) {
        let inventory = self.inventory.get_mut();
        for mut handle in inventory.handles.drain(..) {
            handle.discard();
        }
    }
}

/// Thread-safe pool of leased resources
///
/// # Examples
///
/// ```
/// use leasepool::{PoolConfiguration, PoolContainer, PoolProperties, PoolResult, Resource};
///
/// struct Conn(u32);
///
/// impl Resource for Conn {
///     type Error = std::io::Error;
///     fn discard(&mut self) -> Result<(), Self::Error> { Ok(()) }
/// }
///
/// let config = PoolConfiguration::new().with_min(1).with_start(1).with_max(4);
/// let pool: PoolContainer<Conn> =
///     PoolContainer::new("db", config, |_: &PoolProperties| -> PoolResult<Conn> { Ok(Conn(7)) }).unwrap();
/// {
///     let conn = pool.get_object().unwrap();
///     assert_eq!(conn.0, 7);
///     // returned to the pool when `conn` goes out of scope
/// }
/// assert_eq!(pool.available_objects(), 1);
/// ```
pub struct PoolContainer<R: Resource> {
    inner: Arc<PoolInner<R>>,
}

impl<R: Resource> Clone for PoolContainer<R> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<R: Resource> PoolContainer<R> {
    /// Create a pool with its own id sequence and no backpressure signal
    pub fn new<F>(name: impl Into<String>, config: PoolConfiguration, filler: F) -> PoolResult<Self>
    where
        F: PoolFiller<R> + 'static,
    {
        Self::with_collaborators(
            PoolProperties::detached(name),
            config,
            filler,
            Arc::new(NoBackpressure),
            IdSequence::new(),
        )
    }

    /// Create a pool sharing a backpressure signal and id sequence with others.
    ///
    /// The pool takes its name from `properties`, which are also handed to the
    /// filler. Eagerly creates `config.start` handles; a filler failure fails
    /// construction.
    pub fn with_collaborators<F>(
        properties: PoolProperties,
        config: PoolConfiguration,
        filler: F,
        signal: Arc<dyn BackpressureSignal>,
        ids: IdSequence,
    ) -> PoolResult<Self>
    where
        F: PoolFiller<R> + 'static,
    {
        config.validate(properties.pool())?;

        let start = config.start;
        let pool = Self {
            inner: Arc::new(PoolInner {
                name: Arc::from(properties.pool()),
                properties,
                config,
                filler: Box::new(filler),
                signal,
                ids,
                inventory: Mutex::new(Inventory {
                    handles: VecDeque::new(),
                    pending: 0,
                    closed: false,
                }),
                returned: Condvar::new(),
                metrics: MetricsTracker::new(),
            }),
        };

        if let Err(e) = pool.fill_to(start) {
            pool.close();
            return Err(e);
        }
        tracing::info!(pool = %pool.inner.name, start, max = pool.inner.config.max, "Pool created");
        Ok(pool)
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn config(&self) -> &PoolConfiguration {
        &self.inner.config
    }

    /// Property namespace the filler is built from
    pub fn properties(&self) -> &PoolProperties {
        &self.inner.properties
    }

    /// Lease a resource, bounded by the configured operation timeout if any
    pub fn get_object(&self) -> PoolResult<PooledObject<R>> {
        let options = match self.inner.config.operation_timeout {
            Some(timeout) => CheckoutOptions::new().with_timeout(timeout),
            None => CheckoutOptions::new(),
        };
        self.get_object_with(options)
    }

    /// Lease a resource.
    ///
    /// Scans for a live available handle and creates one below the yellow
    /// line, otherwise waits for a check-in up to [`MAX_RETRIES`] times,
    /// signalling backpressure halfway through. Once the budget is spent a
    /// handle is created anyway.
    ///
    /// Two policies shape this:
    ///
    /// - `yellow_zone_growth` (default on): between the yellow line and `max`
    ///   a handle is created after the first wait. With it off, only the last
    ///   resort creates there.
    /// - `allow_overshoot` (default on): the last resort may create beyond
    ///   `max`, but only while no other overshoot is outstanding, so the pool
    ///   holds at most `max + 1` handles. Otherwise the call fails with
    ///   [`PoolError::Exhausted`].
    pub fn get_object_with(&self, options: CheckoutOptions) -> PoolResult<PooledObject<R>> {
        let started = Instant::now();
        let config = &self.inner.config;
        let yellow_limit = config.yellow_limit();
        let mut waited = false;

        for retry in 0..MAX_RETRIES {
            options.check(started)?;
            if let Some(lease) = self.take_available()? {
                return Ok(lease);
            }

            let mut inventory = self.lock_open()?;
            if inventory.total() >= config.max {
                drop(inventory);
                let evicted = self.evict(false);
                inventory = self.lock_open()?;
                if evicted > 0 && inventory.total() < config.max {
                    let size = inventory.reserve();
                    drop(inventory);
                    return self.create_lease(size);
                }
            }

            let total = inventory.total();
            let grow = waited && config.yellow_zone_growth && total < config.max;
            if total < yellow_limit || grow {
                let size = inventory.reserve();
                drop(inventory);
                return self.create_lease(size);
            }

            if !waited {
                MetricsTracker::incr(&self.inner.metrics.wait_events);
                waited = true;
            }
            tracing::debug!(pool = %self.inner.name, retry, total, "Waiting for a returned object");
            self.wait_for_return(&mut inventory, &options, started)?;
            drop(inventory);

            if retry == MAX_RETRIES / 2 {
                MetricsTracker::incr(&self.inner.metrics.backpressure_signals);
                tracing::debug!(pool = %self.inner.name, "Signalling backpressure");
                self.inner.signal.collect();
            }
        }

        options.check(started)?;
        if let Some(lease) = self.take_available()? {
            return Ok(lease);
        }

        let mut inventory = self.lock_open()?;
        let total = inventory.total();
        if total >= config.max {
            if !config.allow_overshoot || total > config.max {
                MetricsTracker::incr(&self.inner.metrics.exhausted_events);
                tracing::warn!(pool = %self.inner.name, total, "Pool exhausted");
                return Err(PoolError::Exhausted {
                    pool: self.inner.name.to_string(),
                    retries: MAX_RETRIES,
                });
            }
            MetricsTracker::incr(&self.inner.metrics.overshoots);
            tracing::warn!(pool = %self.inner.name, total, max = config.max, "Creating object beyond capacity");
        }
        let size = inventory.reserve();
        drop(inventory);
        self.create_lease(size).inspect_err(|_| {
            MetricsTracker::incr(&self.inner.metrics.exhausted_events);
        })
    }

    /// Lease a resource without blocking the async runtime
    pub async fn get_object_async(&self) -> PoolResult<PooledObject<R>> {
        let pool = self.clone();
        tokio::task::spawn_blocking(move || pool.get_object())
            .await
            .map_err(|_| PoolError::Cancelled)?
    }

    /// Async form of [`get_object_with`](Self::get_object_with)
    pub async fn get_object_async_with(&self, options: CheckoutOptions) -> PoolResult<PooledObject<R>> {
        let pool = self.clone();
        tokio::task::spawn_blocking(move || pool.get_object_with(options))
            .await
            .map_err(|_| PoolError::Cancelled)?
    }

    /// Discard dead, expired and surplus idle handles, then refill to `min`.
    ///
    /// Checked-out handles are never touched. A filler failure while
    /// refilling is returned and leaves the pool below its floor.
    pub fn prune(&self) -> PoolResult<()> {
        drop(self.lock_open()?);
        let evicted = self.evict(true);
        let refilled = self.fill_to(self.inner.config.min).inspect_err(|e| {
            tracing::warn!(pool = %self.inner.name, error = %e, "Could not refill pool to its minimum");
        })?;
        tracing::debug!(pool = %self.inner.name, evicted, refilled, total = self.total_objects(), "Pruned pool");
        Ok(())
    }

    /// Close the pool: discard idle handles, refuse new checkouts.
    /// Outstanding leases are discarded when they come back.
    pub fn close(&self) {
        let removed = {
            let mut inventory = self.inner.inventory.lock();
            if inventory.closed {
                return;
            }
            inventory.closed = true;
            inventory.extract(|_| true)
        };
        self.inner.returned.notify_all();

        let count = removed.len();
        self.discard_all(removed);
        tracing::info!(pool = %self.inner.name, discarded = count, "Pool closed");
    }

    pub fn is_closed(&self) -> bool {
        self.inner.inventory.lock().closed
    }

    /// Handles in the pool, whatever their state
    pub fn total_objects(&self) -> usize {
        self.inner.inventory.lock().handles.len()
    }

    pub fn available_objects(&self) -> usize {
        self.inner.inventory.lock().count(HandleState::Available)
    }

    pub fn checked_out_objects(&self) -> usize {
        self.inner.inventory.lock().count(HandleState::CheckedOut)
    }

    pub fn get_health_status(&self) -> HealthStatus {
        let inventory = self.inner.inventory.lock();
        HealthStatus::new(
            inventory.handles.len(),
            inventory.count(HandleState::Available),
            inventory.count(HandleState::CheckedOut),
            inventory.count(HandleState::Dead),
            &self.inner.config,
        )
    }

    pub fn get_metrics(&self) -> PoolMetrics {
        let (total, available, checked_out) = {
            let inventory = self.inner.inventory.lock();
            (
                inventory.handles.len(),
                inventory.count(HandleState::Available),
                inventory.count(HandleState::CheckedOut),
            )
        };
        self.inner
            .metrics
            .get_metrics(total, available, checked_out, self.inner.config.max)
    }

    /// Export metrics
    pub fn export_metrics(&self) -> HashMap<String, String> {
        self.get_metrics().export()
    }

    /// Export metrics in Prometheus format
    #[cfg(feature = "metrics")]
    pub fn export_metrics_prometheus(&self, tags: Option<&HashMap<String, String>>) -> PoolResult<String> {
        crate::metrics::MetricsExporter::export_prometheus(&self.get_metrics(), &self.inner.name, tags)
    }

    fn lock_open(&self) -> PoolResult<MutexGuard<'_, Inventory<R>>> {
        let inventory = self.inner.inventory.lock();
        if inventory.closed {
            return Err(PoolError::Closed(self.inner.name.to_string()));
        }
        Ok(inventory)
    }

    /// Scan for an available handle and probe it outside the lock
    fn take_available(&self) -> PoolResult<Option<PooledObject<R>>> {
        loop {
            let Some((object_id, mut resource)) = self.lock_open()?.select() else {
                return Ok(None);
            };

            if self.probe(object_id, &mut resource) {
                MetricsTracker::incr(&self.inner.metrics.total_retrieved);
                return Ok(Some(self.lease(object_id, resource)));
            }

            MetricsTracker::incr(&self.inner.metrics.liveness_failures);
            self.retire(object_id, resource);
        }
    }

    fn probe(&self, object_id: u64, resource: &mut R) -> bool {
        if let Err(e) = resource.activate() {
            tracing::warn!(pool = %self.inner.name, object_id, error = %e, "Activation failed");
            return false;
        }
        if !resource.is_alive() {
            tracing::debug!(pool = %self.inner.name, object_id, "Liveness probe failed");
            return false;
        }
        true
    }

    fn lease(&self, object_id: u64, resource: R) -> PooledObject<R> {
        PooledObject {
            value: Some(resource),
            object_id,
            pool: self.clone(),
        }
    }

    /// Build a handle for a slot already reserved at `size_before`
    fn build(&self, size_before: usize) -> PoolResult<Handle<R>> {
        let config = &self.inner.config;
        match self.inner.filler.fill(&self.inner.properties, config) {
            Ok(resource) => {
                let mut handle = Handle::new(resource);
                handle.set_object_id(self.inner.ids.next_id());
                handle.set_pool_name(Arc::clone(&self.inner.name));
                handle.set_max_age(adaptive_max_age(config.max_age, size_before, config.min, config.max));
                MetricsTracker::incr(&self.inner.metrics.total_created);
                tracing::debug!(
                    pool = %self.inner.name,
                    object_id = handle.object_id(),
                    max_age = ?handle.max_age(),
                    "Created pooled object"
                );
                Ok(handle)
            }
            Err(e) => {
                MetricsTracker::incr(&self.inner.metrics.creation_failures);
                tracing::warn!(pool = %self.inner.name, error = %e, "Filler could not create an object");
                Err(e)
            }
        }
    }

    /// Build into a reserved slot and insert it, checked out if `lease`
    fn create(&self, size_before: usize, lease: bool) -> PoolResult<Option<(u64, R)>> {
        let built = self.build(size_before);

        let mut inventory = self.inner.inventory.lock();
        inventory.pending -= 1;
        let mut handle = built?;
        if inventory.closed {
            drop(inventory);
            let ok = handle.discard();
            self.inner.metrics.record_discard(ok);
            return Err(PoolError::Closed(self.inner.name.to_string()));
        }

        let object_id = handle.object_id();
        let leased = if lease {
            handle.check_out().map(|r| (object_id, r))
        } else {
            None
        };
        inventory.handles.push_back(handle);
        if !lease {
            self.inner.returned.notify_one();
        }
        Ok(leased)
    }

    fn create_lease(&self, size_before: usize) -> PoolResult<PooledObject<R>> {
        let (object_id, mut resource) = self
            .create(size_before, true)?
            .ok_or_else(|| PoolError::creation(&self.inner.name, "new object could not be leased"))?;

        if !self.probe(object_id, &mut resource) {
            MetricsTracker::incr(&self.inner.metrics.liveness_failures);
            self.retire(object_id, resource);
            return Err(PoolError::creation(&self.inner.name, "new object failed activation"));
        }

        MetricsTracker::incr(&self.inner.metrics.total_retrieved);
        Ok(self.lease(object_id, resource))
    }

    /// Create handles until the pool holds `target`. Returns how many were made.
    fn fill_to(&self, target: usize) -> PoolResult<usize> {
        let mut created = 0;
        loop {
            let size = {
                let mut inventory = self.lock_open()?;
                if inventory.total() >= target {
                    return Ok(created);
                }
                inventory.reserve()
            };
            self.create(size, false)?;
            created += 1;
        }
    }

    /// Park a checked-out resource in its handle as dead
    fn retire(&self, object_id: u64, resource: R) {
        let mut inventory = self.inner.inventory.lock();
        match inventory.position(object_id) {
            Some(index) if !inventory.closed => inventory.handles[index].mark_dead(Some(resource)),
            position => {
                if let Some(index) = position {
                    inventory.handles.remove(index);
                }
                drop(inventory);
                self.discard_resource(object_id, resource);
            }
        }
    }

    fn check_in(&self, object_id: u64, resource: R) {
        MetricsTracker::incr(&self.inner.metrics.total_returned);

        let mut inventory = self.inner.inventory.lock();
        let over_capacity = inventory.total() > self.inner.config.max;
        match inventory.position(object_id) {
            Some(index) if !inventory.closed && !over_capacity => {
                inventory.handles[index].check_in(resource);
                drop(inventory);
                self.inner.returned.notify_one();
            }
            position => {
                if let Some(index) = position {
                    inventory.handles.remove(index);
                }
                drop(inventory);
                tracing::debug!(pool = %self.inner.name, object_id, "Discarding returned object");
                self.discard_resource(object_id, resource);
            }
        }
    }

    /// Remove prunable idle handles and discard them outside the lock.
    ///
    /// Without `full` only dead and expired handles go. With it, idle handles
    /// past the idle timeout go while the pool stays at or above `min`, and
    /// any remaining surplus above `max` goes front-first.
    fn evict(&self, full: bool) -> usize {
        let config = &self.inner.config;
        let removed = {
            let mut inventory = self.inner.inventory.lock();
            let mut removed = inventory.extract(|h| {
                h.expire_if_due();
                h.prune_status(config.idle_timeout) == PruneStatus::MustClean
            });

            if full {
                let mut total = inventory.total();
                removed.extend(inventory.extract(|h| {
                    let surplus = total > config.min
                        && h.prune_status(config.idle_timeout) == PruneStatus::ShouldClean;
                    if surplus {
                        total -= 1;
                    }
                    surplus
                }));
                removed.extend(inventory.extract(|_| {
                    let surplus = total > config.max;
                    if surplus {
                        total -= 1;
                    }
                    surplus
                }));
            }
            removed
        };

        let count = removed.len();
        if count > 0 {
            self.inner.returned.notify_all();
            self.discard_all(removed);
        }
        count
    }

    fn discard_all(&self, handles: Vec<Handle<R>>) {
        for mut handle in handles {
            let ok = handle.discard();
            self.inner.metrics.record_discard(ok);
        }
    }

    fn discard_resource(&self, object_id: u64, mut resource: R) {
        let ok = discard_resource(&self.inner.name, object_id, &mut resource);
        self.inner.metrics.record_discard(ok);
    }

    fn wait_for_return(
        &self,
        inventory: &mut MutexGuard<'_, Inventory<R>>,
        options: &CheckoutOptions,
        started: Instant,
    ) -> PoolResult<()> {
        let mut until = Instant::now() + self.inner.config.retry_interval;
        if let Some(deadline) = options.deadline {
            until = until.min(deadline);
        }

        loop {
            let now = Instant::now();
            if now >= until {
                return options.check(started);
            }
            let mut slice = until - now;
            if options.cancel.is_some() {
                slice = slice.min(CANCEL_POLL);
            }
            let result = self.inner.returned.wait_for(inventory, slice);
            options.check(started)?;
            if !result.timed_out() {
                return Ok(());
            }
        }
    }
}

impl<R: Resource> fmt::Display for PoolContainer<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inventory = self.inner.inventory.lock();
        writeln!(
            f,
            "Pool '{}': total={} available={} checked-out={} dead={} min={} max={}{}",
            self.inner.name,
            inventory.handles.len(),
            inventory.count(HandleState::Available),
            inventory.count(HandleState::CheckedOut),
            inventory.count(HandleState::Dead),
            self.inner.config.min,
            self.inner.config.max,
            if inventory.closed { " (closed)" } else { "" },
        )?;
        for handle in &inventory.handles {
            match handle.max_age() {
                Some(age) => writeln!(f, "  #{} {} max_age={}ms", handle.object_id(), handle.state(), age.as_millis())?,
                None => writeln!(f, "  #{} {}", handle.object_id(), handle.state())?,
            }
        }
        Ok(())
    }
}

impl<R: Resource> fmt::Debug for PoolContainer<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolContainer")
            .field("name", &self.inner.name)
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::io;
    use std::sync::atomic::AtomicUsize;
    use std::thread;

    #[derive(Debug)]
    struct Conn {
        alive: Arc<AtomicBool>,
        discarded: Arc<AtomicUsize>,
    }

    impl Resource for Conn {
        type Error = io::Error;

        fn is_alive(&mut self) -> bool {
            self.alive.load(Ordering::SeqCst)
        }

        fn discard(&mut self) -> Result<(), io::Error> {
            self.discarded.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[derive(Default)]
    struct Factory {
        fail: AtomicBool,
        discarded: Arc<AtomicUsize>,
        flags: Mutex<Vec<Arc<AtomicBool>>>,
    }

    #[derive(Clone, Default)]
    struct TestFiller(Arc<Factory>);

    impl TestFiller {
        fn kill(&self, nth: usize) {
            self.0.flags.lock()[nth].store(false, Ordering::SeqCst);
        }

        fn discarded(&self) -> usize {
            self.0.discarded.load(Ordering::SeqCst)
        }

        fn set_failing(&self, fail: bool) {
            self.0.fail.store(fail, Ordering::SeqCst);
        }
    }

    impl PoolFiller<Conn> for TestFiller {
        fn fill(&self, properties: &PoolProperties, _config: &PoolConfiguration) -> PoolResult<Conn> {
            if self.0.fail.load(Ordering::SeqCst) {
                return Err(PoolError::creation(properties.pool(), "connection refused"));
            }
            let alive = Arc::new(AtomicBool::new(true));
            self.0.flags.lock().push(Arc::clone(&alive));
            Ok(Conn {
                alive,
                discarded: Arc::clone(&self.0.discarded),
            })
        }
    }

    /// Shorten the default retry interval; explicit intervals are kept
    fn fast(config: PoolConfiguration) -> PoolConfiguration {
        if config.retry_interval == PoolConfiguration::default().retry_interval {
            config.with_retry_interval(Duration::from_millis(10))
        } else {
            config
        }
    }

    fn pool(config: PoolConfiguration) -> (PoolContainer<Conn>, TestFiller) {
        let filler = TestFiller::default();
        let pool = PoolContainer::new("test", fast(config), filler.clone()).unwrap();
        (pool, filler)
    }

    #[test]
    fn test_start_creates_eagerly() {
        let (pool, _) = pool(PoolConfiguration::new().with_min(1).with_start(3).with_max(5));
        assert_eq!(pool.total_objects(), 3);
        assert_eq!(pool.available_objects(), 3);
    }

    #[test]
    fn test_construction_fails_when_filler_fails() {
        let filler = TestFiller::default();
        filler.set_failing(true);
        let result = PoolContainer::new("broken", PoolConfiguration::new().with_start(1), filler);
        assert!(matches!(result, Err(PoolError::Creation { .. })));
    }

    #[test]
    fn test_returned_object_is_reused() {
        let (pool, _) = pool(PoolConfiguration::new().with_max(3));
        let first = pool.get_object().unwrap().object_id();
        let second = pool.get_object().unwrap().object_id();
        assert_eq!(first, second);
        assert_eq!(pool.total_objects(), 1);
    }

    #[test]
    fn test_round_robin_reuse() {
        let (pool, _) = pool(PoolConfiguration::new().with_min(3).with_start(3).with_max(3));
        let first_pass: Vec<u64> = (0..3).map(|_| pool.get_object().unwrap().object_id()).collect();
        let second_pass: Vec<u64> = (0..3).map(|_| pool.get_object().unwrap().object_id()).collect();
        assert_eq!(first_pass, vec![1, 2, 3]);
        assert_eq!(first_pass, second_pass);
    }

    #[test]
    fn test_yellow_line_waits_once_before_growing() {
        let (pool, _) = pool(PoolConfiguration::new().with_max(4).with_yellow_line(50));
        let _a = pool.get_object().unwrap();
        let _b = pool.get_object().unwrap();
        assert_eq!(pool.get_metrics().wait_events, 0);

        let _c = pool.get_object().unwrap();
        assert_eq!(pool.get_metrics().wait_events, 1);
        assert_eq!(pool.total_objects(), 3);
    }

    #[test]
    fn test_exhaustion_overshoots_once() {
        let (pool, _) = pool(PoolConfiguration::new().with_max(2).with_yellow_line(100));
        let a = pool.get_object().unwrap();
        let b = pool.get_object().unwrap();
        let c = pool.get_object().unwrap();

        let ids: HashSet<u64> = [a.object_id(), b.object_id(), c.object_id()].into();
        assert_eq!(ids.len(), 3);
        assert_eq!(pool.total_objects(), 3);
        assert_eq!(pool.get_metrics().overshoots, 1);
        assert_eq!(pool.get_metrics().backpressure_signals, 1);

        drop(c);
        assert_eq!(pool.total_objects(), 2);
        drop((a, b));
        assert_eq!(pool.available_objects(), 2);
    }

    #[test]
    fn test_yellow_zone_without_growth_spends_budget() {
        let (pool, _) = pool(
            PoolConfiguration::new()
                .with_max(4)
                .with_yellow_line(50)
                .with_yellow_zone_growth(false),
        );
        let _a = pool.get_object().unwrap();
        let _b = pool.get_object().unwrap();

        let _c = pool.get_object().unwrap();
        let metrics = pool.get_metrics();
        assert_eq!(metrics.wait_events, 1);
        assert_eq!(metrics.backpressure_signals, 1);
        assert_eq!(metrics.overshoots, 0);
        assert_eq!(pool.total_objects(), 3);
    }

    #[test]
    fn test_only_one_overshoot_outstanding() {
        let (pool, _) = pool(PoolConfiguration::new().with_max(2).with_yellow_line(100));
        let _held: Vec<_> = (0..2).map(|_| pool.get_object().unwrap()).collect();

        let extra = pool.get_object().unwrap();
        assert_eq!(pool.total_objects(), 3);
        assert!(matches!(pool.get_object(), Err(PoolError::Exhausted { .. })));
        assert_eq!(pool.total_objects(), 3);
        assert_eq!(pool.get_metrics().overshoots, 1);
        assert_eq!(pool.get_metrics().exhausted_events, 1);

        drop(extra);
        assert_eq!(pool.total_objects(), 2);
        let _again = pool.get_object().unwrap();
        assert_eq!(pool.get_metrics().overshoots, 2);
    }

    #[test]
    fn test_concurrent_exhaustion_overshoots_once() {
        let (pool, _) = pool(PoolConfiguration::new().with_max(2).with_yellow_line(100));
        let _held: Vec<_> = (0..2).map(|_| pool.get_object().unwrap()).collect();
        let done = Arc::new(std::sync::Barrier::new(4));

        let callers: Vec<_> = (0..4)
            .map(|_| {
                let pool = pool.clone();
                let done = Arc::clone(&done);
                thread::spawn(move || {
                    let lease = pool.get_object();
                    done.wait();
                    lease.is_ok()
                })
            })
            .collect();
        let served = callers
            .into_iter()
            .map(|caller| caller.join().unwrap())
            .filter(|served| *served)
            .count();

        assert_eq!(served, 1);
        assert_eq!(pool.get_metrics().overshoots, 1);
        assert_eq!(pool.get_metrics().exhausted_events, 3);
        assert_eq!(pool.total_objects(), 2);
    }

    #[test]
    fn test_exhaustion_without_overshoot() {
        let (pool, _) = pool(PoolConfiguration::new().with_max(1).with_overshoot(false));
        let _held = pool.get_object().unwrap();
        let err = pool.get_object().unwrap_err();
        assert_eq!(
            err,
            PoolError::Exhausted {
                pool: "test".to_string(),
                retries: MAX_RETRIES
            }
        );
        assert_eq!(pool.total_objects(), 1);
    }

    #[test]
    fn test_exhaustion_when_filler_fails() {
        let (pool, filler) = pool(PoolConfiguration::new().with_max(1));
        let _held = pool.get_object().unwrap();
        filler.set_failing(true);
        assert!(matches!(pool.get_object(), Err(PoolError::Creation { .. })));
        assert_eq!(pool.total_objects(), 1);
        assert_eq!(pool.get_metrics().exhausted_events, 1);
    }

    #[test]
    fn test_backpressure_signalled_once_per_checkout() {
        let signals = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&signals);
        let pool = PoolContainer::with_collaborators(
            PoolProperties::detached("signalled"),
            fast(PoolConfiguration::new().with_max(1).with_overshoot(false)),
            TestFiller::default(),
            Arc::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
            IdSequence::new(),
        )
        .unwrap();

        let _held = pool.get_object().unwrap();
        assert!(pool.get_object().is_err());
        assert_eq!(signals.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_dead_handle_is_skipped_and_pruned() {
        let (pool, filler) = pool(PoolConfiguration::new().with_start(2).with_max(4));
        filler.kill(0);

        let lease = pool.get_object().unwrap();
        assert_eq!(lease.object_id(), 2);
        assert_eq!(pool.get_health_status().dead_objects, 1);
        assert_eq!(pool.get_metrics().liveness_failures, 1);
        drop(lease);

        pool.prune().unwrap();
        assert_eq!(pool.total_objects(), 1);
        assert_eq!(filler.discarded(), 1);
    }

    #[test]
    fn test_dead_handles_freed_at_capacity() {
        let (pool, filler) = pool(PoolConfiguration::new().with_start(2).with_max(2));
        filler.kill(0);
        filler.kill(1);

        let lease = pool.get_object().unwrap();
        assert_eq!(lease.object_id(), 3);
        assert_eq!(pool.total_objects(), 1);
        assert_eq!(filler.discarded(), 2);
    }

    #[test]
    fn test_prune_keeps_floor() {
        let (pool, _) = pool(
            PoolConfiguration::new()
                .with_min(2)
                .with_start(4)
                .with_max(5)
                .with_idle_timeout(Duration::ZERO),
        );
        pool.prune().unwrap();
        assert_eq!(pool.total_objects(), 2);
        pool.prune().unwrap();
        assert_eq!(pool.total_objects(), 2);
    }

    #[test]
    fn test_prune_replaces_expired_handles() {
        let (pool, filler) = pool(
            PoolConfiguration::new()
                .with_min(1)
                .with_start(1)
                .with_max_age(Duration::from_millis(1)),
        );
        thread::sleep(Duration::from_millis(5));

        pool.prune().unwrap();
        assert_eq!(pool.total_objects(), 1);
        assert_eq!(filler.discarded(), 1);
        assert_eq!(pool.get_object().unwrap().object_id(), 2);
    }

    #[test]
    fn test_prune_skips_checked_out() {
        let (pool, filler) = pool(PoolConfiguration::new().with_max_age(Duration::from_millis(1)));
        let lease = pool.get_object().unwrap();
        thread::sleep(Duration::from_millis(5));

        pool.prune().unwrap();
        assert_eq!(pool.total_objects(), 1);
        assert_eq!(filler.discarded(), 0);

        drop(lease);
        pool.prune().unwrap();
        assert_eq!(pool.total_objects(), 0);
        assert_eq!(filler.discarded(), 1);
    }

    #[test]
    fn test_prune_reports_refill_failure() {
        let (pool, filler) = pool(
            PoolConfiguration::new()
                .with_min(1)
                .with_start(1)
                .with_max_age(Duration::from_millis(1)),
        );
        thread::sleep(Duration::from_millis(5));
        filler.set_failing(true);

        assert!(matches!(pool.prune(), Err(PoolError::Creation { .. })));
        assert_eq!(pool.total_objects(), 0);

        filler.set_failing(false);
        pool.prune().unwrap();
        assert_eq!(pool.total_objects(), 1);
    }

    #[test]
    fn test_adaptive_age_assignment() {
        let (pool, _) = pool(
            PoolConfiguration::new()
                .with_max(10)
                .with_yellow_line(100)
                .with_max_age(Duration::from_millis(10_000)),
        );
        let leases: Vec<_> = (0..10).map(|_| pool.get_object().unwrap()).collect();

        let inventory = pool.inner.inventory.lock();
        let ages: Vec<Option<Duration>> = inventory.handles.iter().map(|h| h.max_age()).collect();
        assert_eq!(ages[0], Some(Duration::from_millis(10_000)));
        assert_eq!(ages[9], Some(Duration::from_millis(5000)));
        drop(inventory);
        drop(leases);
    }

    #[test]
    fn test_checkin_wakes_waiter() {
        let (pool, _) = pool(
            PoolConfiguration::new()
                .with_max(1)
                .with_yellow_line(100)
                .with_overshoot(false)
                .with_retry_interval(Duration::from_secs(2)),
        );
        let held = pool.get_object().unwrap();
        let held_id = held.object_id();

        let waiter = {
            let pool = pool.clone();
            thread::spawn(move || {
                let started = Instant::now();
                let id = pool.get_object().unwrap().object_id();
                (id, started.elapsed())
            })
        };
        thread::sleep(Duration::from_millis(50));
        drop(held);

        let (id, waited) = waiter.join().unwrap();
        assert_eq!(id, held_id);
        assert!(waited < Duration::from_secs(1));
    }

    #[test]
    fn test_deadline_ends_checkout() {
        let (pool, _) = pool(
            PoolConfiguration::new()
                .with_max(1)
                .with_yellow_line(100)
                .with_retry_interval(Duration::from_secs(1)),
        );
        let _held = pool.get_object().unwrap();

        let started = Instant::now();
        let result = pool.get_object_with(CheckoutOptions::new().with_timeout(Duration::from_millis(50)));
        assert!(matches!(result, Err(PoolError::Timeout(_))));
        assert!(started.elapsed() < Duration::from_secs(1));
        assert_eq!(pool.total_objects(), 1);
    }

    #[test]
    fn test_configured_timeout_applies_to_get_object() {
        let (pool, _) = pool(
            PoolConfiguration::new()
                .with_max(1)
                .with_yellow_line(100)
                .with_retry_interval(Duration::from_secs(1))
                .with_timeout(Duration::from_millis(30)),
        );
        let _held = pool.get_object().unwrap();
        assert!(matches!(pool.get_object(), Err(PoolError::Timeout(_))));
    }

    #[test]
    fn test_cancel_ends_checkout() {
        let (pool, _) = pool(
            PoolConfiguration::new()
                .with_max(1)
                .with_yellow_line(100)
                .with_retry_interval(Duration::from_secs(1)),
        );
        let _held = pool.get_object().unwrap();

        let token = CancelToken::new();
        let canceller = {
            let token = token.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(30));
                token.cancel();
            })
        };

        let started = Instant::now();
        let result = pool.get_object_with(CheckoutOptions::new().with_cancel(token));
        canceller.join().unwrap();
        assert_eq!(result.unwrap_err(), PoolError::Cancelled);
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn test_invalidate_kills_handle() {
        let (pool, filler) = pool(PoolConfiguration::new().with_max(2));
        let lease = pool.get_object().unwrap();
        let id = lease.object_id();
        lease.invalidate();

        assert_eq!(pool.get_health_status().dead_objects, 1);
        let next = pool.get_object().unwrap();
        assert_ne!(next.object_id(), id);
        drop(next);

        pool.prune().unwrap();
        assert_eq!(filler.discarded(), 1);
    }

    #[test]
    fn test_close_discards_inventory() {
        let (pool, filler) = pool(PoolConfiguration::new().with_start(2).with_max(3));
        let lease = pool.get_object().unwrap();

        pool.close();
        assert!(pool.is_closed());
        assert_eq!(filler.discarded(), 1);
        assert_eq!(pool.get_object().unwrap_err(), PoolError::Closed("test".to_string()));
        assert!(pool.prune().is_err());

        drop(lease);
        assert_eq!(filler.discarded(), 2);
        assert_eq!(pool.total_objects(), 0);
    }

    #[test]
    fn test_concurrent_checkouts_never_share_a_handle() {
        let pool = PoolContainer::new(
            "test",
            PoolConfiguration::new()
                .with_max(4)
                .with_retry_interval(Duration::from_millis(200)),
            TestFiller::default(),
        )
        .unwrap();
        let leased = Arc::new(Mutex::new(HashSet::new()));

        let workers: Vec<_> = (0..8)
            .map(|_| {
                let pool = pool.clone();
                let leased = Arc::clone(&leased);
                thread::spawn(move || {
                    for _ in 0..50 {
                        let lease = pool.get_object().unwrap();
                        assert!(leased.lock().insert(lease.object_id()));
                        thread::yield_now();
                        assert!(leased.lock().remove(&lease.object_id()));
                    }
                })
            })
            .collect();

        for worker in workers {
            worker.join().unwrap();
        }
        assert!(pool.total_objects() <= 4);
        assert_eq!(pool.checked_out_objects(), 0);
    }

    #[test]
    fn test_display_lists_handles() {
        let (pool, _) = pool(PoolConfiguration::new().with_start(1).with_min(1));
        let _lease = pool.get_object().unwrap();
        let dump = pool.to_string();
        assert!(dump.starts_with("Pool 'test': total=1 available=0 checked-out=1"));
        assert!(dump.contains("#1 checked-out"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_async_deadline_ends_checkout() {
        let (pool, _) = pool(
            PoolConfiguration::new()
                .with_max(1)
                .with_yellow_line(100)
                .with_retry_interval(Duration::from_secs(1)),
        );
        let _held = pool.get_object_async().await.unwrap();

        let started = Instant::now();
        let result = pool
            .get_object_async_with(CheckoutOptions::new().with_timeout(Duration::from_millis(50)))
            .await;
        assert!(matches!(result, Err(PoolError::Timeout(_))));
        assert!(started.elapsed() < Duration::from_secs(1));
        assert_eq!(pool.total_objects(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_async_cancel_ends_checkout() {
        let (pool, _) = pool(
            PoolConfiguration::new()
                .with_max(1)
                .with_yellow_line(100)
                .with_retry_interval(Duration::from_secs(1)),
        );
        let _held = pool.get_object().unwrap();

        let token = CancelToken::new();
        let canceller = {
            let token = token.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(30)).await;
                token.cancel();
            })
        };

        let started = Instant::now();
        let result = pool
            .get_object_async_with(CheckoutOptions::new().with_cancel(token))
            .await;
        canceller.await.unwrap();
        assert_eq!(result.unwrap_err(), PoolError::Cancelled);
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_async_checkout_served_by_checkin() {
        let (pool, _) = pool(
            PoolConfiguration::new()
                .with_max(1)
                .with_yellow_line(100)
                .with_overshoot(false)
                .with_retry_interval(Duration::from_secs(1)),
        );
        let held = pool.get_object().unwrap();
        let held_id = held.object_id();

        let waiter = {
            let pool = pool.clone();
            tokio::spawn(async move {
                pool.get_object_async_with(CheckoutOptions::new().with_timeout(Duration::from_secs(3)))
                    .await
                    .map(|lease| lease.object_id())
            })
        };
        tokio::time::sleep(Duration::from_millis(30)).await;
        drop(held);

        assert_eq!(waiter.await.unwrap().unwrap(), held_id);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_async_get() {
        let (pool, _) = pool(PoolConfiguration::new().with_max(2));
        let lease = pool.get_object_async().await.unwrap();
        assert_eq!(lease.pool_name(), "test");
        drop(lease);
        assert_eq!(pool.available_objects(), 1);
    }
}
