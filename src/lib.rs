//! # leasepool
//!
//! Thread-safe pool for expensive resources (database connections, worker
//! threads, ...) handed out as exclusive leases.
//!
//! ## Features
//!
//! - Bounded checkout with a yellow line: the pool grows freely below it and
//!   waits for returned resources above it
//! - Liveness probes on checkout; dead resources are parked and pruned
//! - Adaptive max age: resources created under load get shorter lifetimes
//! - Pruning that never shrinks a pool below its floor
//! - Automatic return of resources via RAII (Drop trait)
//! - Deadlines, cancellation and async checkout
//! - Namespaced configuration and a process-wide pool manager
//! - Health status and metrics, with Prometheus export
//!
//! ## Quick Start
//!
//! ```rust
//! use leasepool::{PoolConfiguration, PoolContainer, PoolProperties, PoolResult, Resource};
//!
//! struct Connection {
//!     open: bool,
//! }
//!
//! impl Resource for Connection {
//!     type Error = std::io::Error;
//!
//!     fn is_alive(&mut self) -> bool {
//!         self.open
//!     }
//!
//!     fn discard(&mut self) -> Result<(), Self::Error> {
//!         self.open = false;
//!         Ok(())
//!     }
//! }
//!
//! let config = PoolConfiguration::new().with_min(1).with_start(1).with_max(10);
//! let pool: PoolContainer<Connection> =
//!     PoolContainer::new("db", config, |_: &PoolProperties| -> PoolResult<Connection> {
//!         Ok(Connection { open: true })
//!     })
//!     .unwrap();
//! {
//!     let conn = pool.get_object().unwrap();
//!     assert!(conn.open);
//!     // Connection automatically returned when `conn` goes out of scope
//! }
//! pool.prune().unwrap();
//! assert_eq!(pool.total_objects(), 1);
//! ```

mod pool;
mod config;
mod metrics;
mod health;
mod eviction;
mod handle;
mod manager;
mod resource;
mod errors;

pub use pool::{CancelToken, CheckoutOptions, IdSequence, PoolContainer, PooledObject, MAX_RETRIES};
pub use config::{PoolConfiguration, PoolProperties};
pub use metrics::PoolMetrics;
#[cfg(feature = "metrics")]
pub use metrics::MetricsExporter;
pub use health::HealthStatus;
pub use eviction::{adaptive_max_age, PruneStatus, MIN_AGE};
pub use handle::HandleState;
pub use manager::{ManagedPool, PoolManager};
pub use resource::{BackpressureSignal, NoBackpressure, PoolFiller, Resource};
pub use errors::{PoolError, PoolResult};
