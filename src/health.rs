//! Health monitoring for resource pools

use crate::config::PoolConfiguration;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Health status of a pool
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct HealthStatus {
    /// Whether the pool is healthy
    pub is_healthy: bool,

    /// Number of warnings detected
    pub warning_count: usize,

    /// Occupancy relative to `max` (may exceed 1.0 after an overshoot)
    pub utilization: f64,

    /// Handles in the pool
    pub total_objects: usize,

    /// Available handles
    pub available_objects: usize,

    /// Leased handles
    pub checked_out_objects: usize,

    /// Dead handles waiting for prune
    pub dead_objects: usize,

    /// Capacity ceiling
    pub total_capacity: usize,

    /// Warning messages
    pub warnings: Vec<String>,
}

impl HealthStatus {
    /// Assess occupancy against the pool's sizing
    ///
    /// # Examples
    ///
    /// ```
    /// use leasepool::{HealthStatus, PoolConfiguration};
    ///
    /// let config = PoolConfiguration::new().with_max(10);
    /// let health = HealthStatus::new(4, 0, 4, 0, &config);
    /// assert!(health.is_healthy());
    ///
    /// let health = HealthStatus::new(11, 0, 11, 0, &config);
    /// assert!(!health.is_healthy());
    /// ```
    pub fn new(
        total: usize,
        available: usize,
        checked_out: usize,
        dead: usize,
        config: &PoolConfiguration,
    ) -> Self {
        let capacity = config.max;
        let utilization = if capacity > 0 {
            total as f64 / capacity as f64
        } else {
            0.0
        };

        let mut warnings = Vec::new();
        let mut is_healthy = true;

        if total > capacity {
            warnings.push(format!("Over capacity: {total} of {capacity}"));
            is_healthy = false;
        } else if total >= config.yellow_limit() && available == 0 {
            warnings.push(format!("Above yellow line: {:.1}%", utilization * 100.0));
        }

        if total < config.min {
            warnings.push(format!("Below floor: {total} of {}", config.min));
            is_healthy = false;
        }

        if dead > 0 {
            warnings.push(format!("{dead} dead handle(s) awaiting prune"));
        }

        Self {
            is_healthy,
            warning_count: warnings.len(),
            utilization,
            total_objects: total,
            available_objects: available,
            checked_out_objects: checked_out,
            dead_objects: dead,
            total_capacity: capacity,
            warnings,
        }
    }

    /// Check if the pool is healthy
    pub fn is_healthy(&self) -> bool {
        self.is_healthy
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_yellow_line_warns_without_failing() {
        let config = PoolConfiguration::new().with_max(4).with_yellow_line(50);
        let health = HealthStatus::new(3, 0, 3, 0, &config);
        assert!(health.is_healthy());
        assert_eq!(health.warning_count, 1);
    }

    #[test]
    fn test_below_floor_is_unhealthy() {
        let config = PoolConfiguration::new().with_min(2).with_start(2);
        let health = HealthStatus::new(1, 1, 0, 0, &config);
        assert!(!health.is_healthy());
    }

    #[test]
    fn test_dead_handles_reported() {
        let health = HealthStatus::new(2, 1, 0, 1, &PoolConfiguration::new());
        assert!(health.is_healthy());
        assert_eq!(health.dead_objects, 1);
        assert!(health.warnings[0].contains("dead"));
    }
}
