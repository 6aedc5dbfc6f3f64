//! Resource handle: one pooled resource plus its bookkeeping

use crate::eviction::{Lifetime, PruneStatus};
use crate::resource::Resource;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Availability of a handle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleState {
    /// Idle in the pool, ready to be leased
    Available,

    /// Owned by exactly one lease
    CheckedOut,

    /// Failed a probe or outlived its deadline, waiting for prune
    Dead,
}

impl fmt::Display for HandleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            HandleState::Available => "available",
            HandleState::CheckedOut => "checked-out",
            HandleState::Dead => "dead",
        };
        f.write_str(label)
    }
}

/// A pooled resource with identity, state and deadline.
///
/// While checked out the resource itself lives in the lease and
/// `resource` is `None`.
pub(crate) struct Handle<R> {
    object_id: u64,
    pool_name: Arc<str>,
    state: HandleState,
    resource: Option<R>,
    lifetime: Lifetime,
}

impl<R: Resource> Handle<R> {
    pub fn new(resource: R) -> Self {
        Self {
            object_id: 0,
            pool_name: Arc::from(""),
            state: HandleState::Available,
            resource: Some(resource),
            lifetime: Lifetime::new(),
        }
    }

    pub fn object_id(&self) -> u64 {
        self.object_id
    }

    pub fn set_object_id(&mut self, id: u64) {
        self.object_id = id;
    }

    pub fn set_pool_name(&mut self, name: Arc<str>) {
        self.pool_name = name;
    }

    pub fn set_max_age(&mut self, max_age: Option<Duration>) {
        self.lifetime.max_age = max_age;
    }

    pub fn max_age(&self) -> Option<Duration> {
        self.lifetime.max_age
    }

    pub fn state(&self) -> HandleState {
        self.state
    }

    pub fn is_available(&self) -> bool {
        self.state == HandleState::Available
    }

    pub fn is_checked_out(&self) -> bool {
        self.state == HandleState::CheckedOut
    }

    /// Available → CheckedOut. Hands the resource to the caller.
    pub fn check_out(&mut self) -> Option<R> {
        if self.state != HandleState::Available {
            return None;
        }
        let resource = self.resource.take()?;
        self.state = HandleState::CheckedOut;
        self.lifetime.touch();
        Some(resource)
    }

    /// CheckedOut → Available
    pub fn check_in(&mut self, resource: R) {
        debug_assert_eq!(self.state, HandleState::CheckedOut);
        self.resource = Some(resource);
        self.state = HandleState::Available;
        self.lifetime.touch();
    }

    /// Mark the handle dead. The resource, if given back, is kept for discard.
    pub fn mark_dead(&mut self, resource: Option<R>) {
        if resource.is_some() {
            self.resource = resource;
        }
        if self.state != HandleState::Dead {
            tracing::debug!(pool = %self.pool_name, object_id = self.object_id, "Handle marked dead");
        }
        self.state = HandleState::Dead;
    }

    /// Expire an idle handle whose deadline passed. Returns whether it is dead now.
    pub fn expire_if_due(&mut self) -> bool {
        if self.state == HandleState::Available && self.lifetime.is_expired() {
            self.mark_dead(None);
        }
        self.state == HandleState::Dead
    }

    pub fn prune_status(&self, idle_timeout: Option<Duration>) -> PruneStatus {
        if self.state == HandleState::Dead || self.lifetime.is_expired() {
            PruneStatus::MustClean
        } else if self.lifetime.is_idle(idle_timeout) {
            PruneStatus::ShouldClean
        } else {
            PruneStatus::Ok
        }
    }

    /// Release the underlying resource. Failures are logged, never returned.
    pub fn discard(&mut self) -> bool {
        let Some(mut resource) = self.resource.take() else {
            return true;
        };
        self.state = HandleState::Dead;
        discard_resource(&self.pool_name, self.object_id, &mut resource)
    }
}

/// Discard a bare resource, logging a failure. Returns `true` on success.
pub(crate) fn discard_resource<R: Resource>(pool: &str, object_id: u64, resource: &mut R) -> bool {
    match resource.discard() {
        Ok(()) => {
            tracing::debug!(pool = %pool, object_id, "Discarded pooled resource");
            true
        }
        Err(e) => {
            tracing::warn!(pool = %pool, object_id, error = %e, "Failed to discard pooled resource");
            false
        }
    }
}

impl<R> fmt::Debug for Handle<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handle")
            .field("object_id", &self.object_id)
            .field("pool_name", &self.pool_name)
            .field("state", &self.state)
            .field("max_age", &self.lifetime.max_age)
            .finish()
    }
}
