//! Handle lifetimes: adaptive max age and prune classification

use std::time::{Duration, Instant};

/// Shortest lifetime an aged handle is given
pub const MIN_AGE: Duration = Duration::from_millis(5000);

/// What prune should do with a handle
///
/// # Examples
///
/// ```
/// use leasepool::PruneStatus;
///
/// assert!(PruneStatus::MustClean > PruneStatus::ShouldClean);
/// assert!(PruneStatus::ShouldClean > PruneStatus::Ok);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum PruneStatus {
    /// Keep the handle
    #[default]
    Ok,

    /// Idle surplus, removable while the pool stays at or above its floor
    ShouldClean,

    /// Dead or past its max age, always removed unless checked out
    MustClean,
}

/// Lifetime for a handle created while the pool holds `current` handles.
///
/// Below or at `min` the full `base` applies. Above it the lifetime shrinks
/// linearly with occupancy, floored at [`MIN_AGE`] (or `base` if smaller).
/// A zero `base` means unlimited.
///
/// # Examples
///
/// ```
/// use leasepool::adaptive_max_age;
/// use std::time::Duration;
///
/// let base = Duration::from_millis(10_000);
/// assert_eq!(adaptive_max_age(base, 0, 0, 10), Some(base));
/// assert_eq!(adaptive_max_age(base, 9, 0, 10), Some(Duration::from_millis(5000)));
/// assert_eq!(adaptive_max_age(Duration::ZERO, 9, 0, 10), None);
/// ```
pub fn adaptive_max_age(base: Duration, current: usize, min: usize, max: usize) -> Option<Duration> {
    if base.is_zero() {
        return None;
    }
    if current <= min || max == 0 {
        return Some(base);
    }

    let remaining = 1.0 - (current as f64 / max as f64);
    let scaled = base.mul_f64(remaining.max(0.0));
    Some(scaled.max(MIN_AGE.min(base)))
}

/// Timestamps and deadline of one handle
#[derive(Debug, Clone)]
pub(crate) struct Lifetime {
    pub created_at: Instant,
    pub last_used: Instant,
    pub max_age: Option<Duration>,
}

impl Lifetime {
    pub fn new() -> Self {
        let now = Instant::now();
        Self {
            created_at: now,
            last_used: now,
            max_age: None,
        }
    }

    pub fn touch(&mut self) {
        self.last_used = Instant::now();
    }

    pub fn is_expired(&self) -> bool {
        match self.max_age {
            Some(max_age) => self.created_at.elapsed() >= max_age,
            None => false,
        }
    }

    pub fn is_idle(&self, idle_timeout: Option<Duration>) -> bool {
        match idle_timeout {
            Some(timeout) => self.last_used.elapsed() >= timeout,
            None => false,
        }
    }
}
