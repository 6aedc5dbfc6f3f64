//! Pool configuration options

use crate::errors::{PoolError, PoolResult};

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Configuration for one named pool
///
/// # Examples
///
/// ```
/// use leasepool::PoolConfiguration;
/// use std::time::Duration;
///
/// let config = PoolConfiguration::new()
///     .with_min(1)
///     .with_start(2)
///     .with_max(10)
///     .with_yellow_line(90)
///     .with_max_age(Duration::from_secs(60));
///
/// assert_eq!(config.max, 10);
/// assert_eq!(config.yellow_limit(), 9);
/// assert!(config.validate("db").is_ok());
/// ```
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct PoolConfiguration {
    /// Floor below which prune will not shrink the pool
    pub min: usize,

    /// Handles created eagerly when the pool is constructed
    pub start: usize,

    /// Capacity ceiling
    pub max: usize,

    /// Percentage of `max` below which checkout creates instead of waiting
    pub yellow_line: u8,

    /// Base lifetime of new handles, `Duration::ZERO` for unlimited
    pub max_age: Duration,

    /// Idle time after which a handle may be pruned above `min`
    pub idle_timeout: Option<Duration>,

    /// Create one handle beyond `max` once the retry budget is spent
    pub allow_overshoot: bool,

    /// Between the yellow line and `max`, grow after a single wait instead of
    /// spending the whole retry budget first
    pub yellow_zone_growth: bool,

    /// Wait per checkout retry
    pub retry_interval: Duration,

    /// Deadline applied by `get_object`
    pub operation_timeout: Option<Duration>,
}

impl Default for PoolConfiguration {
    fn default() -> Self {
        Self {
            min: 0,
            start: 0,
            max: 5,
            yellow_line: 75,
            max_age: Duration::ZERO,
            idle_timeout: None,
            allow_overshoot: true,
            yellow_zone_growth: true,
            retry_interval: Duration::from_millis(500),
            operation_timeout: None,
        }
    }
}

impl PoolConfiguration {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Read the `<pool>.*` keys out of a flat property map.
    ///
    /// Missing keys fall back to the defaults, `start` defaults to `min`.
    ///
    /// # Examples
    ///
    /// ```
    /// use leasepool::PoolConfiguration;
    /// use std::collections::HashMap;
    ///
    /// let mut props = HashMap::new();
    /// props.insert("jdbc.min".to_string(), "2".to_string());
    /// props.insert("jdbc.max".to_string(), "8".to_string());
    ///
    /// let config = PoolConfiguration::from_properties("jdbc", &props).unwrap();
    /// assert_eq!(config.start, 2);
    /// assert_eq!(config.yellow_line, 75);
    /// ```
    pub fn from_properties(pool: &str, props: &HashMap<String, String>) -> PoolResult<Self> {
        let defaults = Self::default();
        let min = lookup(pool, props, "min")?.unwrap_or(defaults.min);
        let config = Self {
            min,
            start: lookup(pool, props, "start")?.unwrap_or(min),
            max: lookup(pool, props, "max")?.unwrap_or(defaults.max),
            yellow_line: lookup(pool, props, "yellow_line")?.unwrap_or(defaults.yellow_line),
            max_age: lookup_millis(pool, props, "max_age")?.unwrap_or(defaults.max_age),
            idle_timeout: lookup_millis(pool, props, "idle_timeout")?.filter(|d| !d.is_zero()),
            allow_overshoot: lookup(pool, props, "allow_overshoot")?
                .unwrap_or(defaults.allow_overshoot),
            yellow_zone_growth: lookup(pool, props, "yellow_zone_growth")?
                .unwrap_or(defaults.yellow_zone_growth),
            retry_interval: lookup_millis(pool, props, "retry_interval")?
                .unwrap_or(defaults.retry_interval),
            operation_timeout: lookup_millis(pool, props, "operation_timeout")?
                .filter(|d| !d.is_zero()),
        };
        config.validate(pool)?;
        Ok(config)
    }

    /// Check the sizing invariants `min <= start <= max` and `yellow_line <= 100`
    pub fn validate(&self, pool: &str) -> PoolResult<()> {
        if self.max == 0 {
            return Err(PoolError::invalid_config(pool, "max must be greater than 0"));
        }
        if self.min > self.start || self.start > self.max {
            return Err(PoolError::invalid_config(
                pool,
                format!(
                    "expected min <= start <= max, got {} / {} / {}",
                    self.min, self.start, self.max
                ),
            ));
        }
        if self.yellow_line > 100 {
            return Err(PoolError::invalid_config(
                pool,
                format!("yellow_line must be a percentage, got {}", self.yellow_line),
            ));
        }
        Ok(())
    }

    /// Occupancy below which checkout creates a handle without waiting
    pub fn yellow_limit(&self) -> usize {
        self.max * self.yellow_line as usize / 100
    }

    /// Set the prune floor
    pub fn with_min(mut self, min: usize) -> Self {
        self.min = min;
        self
    }

    /// Set the number of handles created at construction
    pub fn with_start(mut self, start: usize) -> Self {
        self.start = start;
        self
    }

    /// Set the capacity ceiling
    pub fn with_max(mut self, max: usize) -> Self {
        self.max = max;
        self
    }

    /// Set the yellow line percentage
    pub fn with_yellow_line(mut self, percent: u8) -> Self {
        self.yellow_line = percent;
        self
    }

    /// Set the base lifetime of new handles
    pub fn with_max_age(mut self, max_age: Duration) -> Self {
        self.max_age = max_age;
        self
    }

    /// Set idle timeout for handles above the floor
    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = Some(timeout);
        self
    }

    /// Enable or disable the last-resort creation beyond `max`
    pub fn with_overshoot(mut self, allow: bool) -> Self {
        self.allow_overshoot = allow;
        self
    }

    /// Choose whether the yellow zone grows after one wait or only as a last resort
    pub fn with_yellow_zone_growth(mut self, grow: bool) -> Self {
        self.yellow_zone_growth = grow;
        self
    }

    /// Set the wait per checkout retry
    pub fn with_retry_interval(mut self, interval: Duration) -> Self {
        self.retry_interval = interval;
        self
    }

    /// Set the deadline used by `get_object`
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.operation_timeout = Some(timeout);
        self
    }
}

/// Read-only view of one pool's `<pool>.*` property namespace.
///
/// Handed to the [`PoolFiller`](crate::PoolFiller) so it can read its own
/// settings (`<pool>.url`, `<pool>.user`, ...) next to the sizing keys.
///
/// # Examples
///
/// ```
/// use leasepool::PoolProperties;
/// use std::collections::HashMap;
/// use std::sync::Arc;
///
/// let mut props = HashMap::new();
/// props.insert("db.url".to_string(), "postgres://localhost/app".to_string());
/// props.insert("cache.url".to_string(), "redis://localhost".to_string());
///
/// let db = PoolProperties::new("db", Arc::new(props));
/// assert_eq!(db.pool(), "db");
/// assert_eq!(db.get("url"), Some("postgres://localhost/app"));
/// assert_eq!(db.get("user"), None);
/// ```
#[derive(Debug, Clone)]
pub struct PoolProperties {
    pool: Arc<str>,
    values: Arc<HashMap<String, String>>,
}

impl PoolProperties {
    pub fn new(pool: impl Into<String>, values: Arc<HashMap<String, String>>) -> Self {
        Self {
            pool: Arc::from(pool.into()),
            values,
        }
    }

    /// Namespace with no properties, for pools built outside a manager
    pub fn detached(pool: impl Into<String>) -> Self {
        Self::new(pool, Arc::new(HashMap::new()))
    }

    /// Name of the pool owning this namespace
    pub fn pool(&self) -> &str {
        &self.pool
    }

    /// Raw value of `<pool>.<key>`
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values
            .get(&format!("{}.{key}", self.pool))
            .map(String::as_str)
    }

    /// Raw value of `<pool>.<key>`, or `default` when unset
    pub fn get_or<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        self.get(key).unwrap_or(default)
    }

    /// Parsed value of `<pool>.<key>`; a malformed value is a configuration error
    pub fn parse<T: FromStr>(&self, key: &str) -> PoolResult<Option<T>> {
        lookup(&self.pool, &self.values, key)
    }

    /// Keys of this namespace with the `<pool>.` prefix stripped, sorted
    pub fn keys(&self) -> Vec<&str> {
        let prefix = format!("{}.", self.pool);
        let mut keys: Vec<&str> = self
            .values
            .keys()
            .filter_map(|k| k.strip_prefix(prefix.as_str()))
            .collect();
        keys.sort_unstable();
        keys
    }

    /// Sizing configuration read from this namespace
    pub fn configuration(&self) -> PoolResult<PoolConfiguration> {
        PoolConfiguration::from_properties(&self.pool, &self.values)
    }
}

fn lookup<T: FromStr>(
    pool: &str,
    props: &HashMap<String, String>,
    key: &str,
) -> PoolResult<Option<T>> {
    let full_key = format!("{pool}.{key}");
    match props.get(&full_key) {
        None => Ok(None),
        Some(raw) => raw.trim().parse().map(Some).map_err(|_| {
            PoolError::invalid_config(pool, format!("cannot parse {full_key}={raw:?}"))
        }),
    }
}

fn lookup_millis(
    pool: &str,
    props: &HashMap<String, String>,
    key: &str,
) -> PoolResult<Option<Duration>> {
    Ok(lookup::<u64>(pool, props, key)?.map(Duration::from_millis))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn props(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_defaults_from_empty_namespace() {
        let config = PoolConfiguration::from_properties("db", &HashMap::new()).unwrap();
        assert_eq!(config, PoolConfiguration::default());
    }

    #[test]
    fn test_reads_only_own_namespace() {
        let props = props(&[
            ("db.min", "1"),
            ("db.max", "10"),
            ("db.yellow_line", "90"),
            ("db.max_age", "10000"),
            ("workers.max", "2"),
        ]);
        let config = PoolConfiguration::from_properties("db", &props).unwrap();
        assert_eq!(config.min, 1);
        assert_eq!(config.start, 1);
        assert_eq!(config.max, 10);
        assert_eq!(config.yellow_limit(), 9);
        assert_eq!(config.max_age, Duration::from_secs(10));
    }

    #[test]
    fn test_zero_timeouts_mean_disabled() {
        let props = props(&[("db.idle_timeout", "0"), ("db.operation_timeout", "0")]);
        let config = PoolConfiguration::from_properties("db", &props).unwrap();
        assert_eq!(config.idle_timeout, None);
        assert_eq!(config.operation_timeout, None);
    }

    #[test]
    fn test_rejects_malformed_values() {
        let err = PoolConfiguration::from_properties("db", &props(&[("db.max", "many")]))
            .unwrap_err();
        assert!(matches!(err, PoolError::InvalidConfiguration { .. }));

        let err = PoolConfiguration::from_properties("db", &props(&[("db.allow_overshoot", "maybe")]))
            .unwrap_err();
        assert!(matches!(err, PoolError::InvalidConfiguration { .. }));
    }

    #[test]
    fn test_yellow_zone_growth_key() {
        let config = PoolConfiguration::from_properties("db", &props(&[("db.yellow_zone_growth", "false")]))
            .unwrap();
        assert!(!config.yellow_zone_growth);
        assert!(PoolConfiguration::default().yellow_zone_growth);
    }

    #[test]
    fn test_properties_resolve_own_namespace() {
        let values = Arc::new(props(&[
            ("db.url", "postgres://db:5432/app"),
            ("db.port", "5432"),
            ("db.max", "4"),
            ("dbx.url", "wrong"),
            ("cache.url", "redis://cache"),
        ]));
        let db = PoolProperties::new("db", values);

        assert_eq!(db.get("url"), Some("postgres://db:5432/app"));
        assert_eq!(db.get_or("user", "app"), "app");
        assert_eq!(db.parse::<u16>("port").unwrap(), Some(5432));
        assert!(db.parse::<u16>("url").is_err());
        assert_eq!(db.keys(), vec!["max", "port", "url"]);
        assert_eq!(db.configuration().unwrap().max, 4);
        assert!(PoolProperties::detached("db").keys().is_empty());
    }

    #[test]
    fn test_rejects_broken_sizing() {
        assert!(PoolConfiguration::new().with_min(3).with_start(2).validate("p").is_err());
        assert!(PoolConfiguration::new().with_start(6).validate("p").is_err());
        assert!(PoolConfiguration::new().with_max(0).validate("p").is_err());
        assert!(PoolConfiguration::new().with_yellow_line(101).validate("p").is_err());
        assert!(PoolConfiguration::new().with_yellow_line(100).validate("p").is_ok());
    }
}
