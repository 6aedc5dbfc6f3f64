//! Basic usage examples for PoolContainer

use leasepool::{PoolConfiguration, PoolContainer, PoolError, PoolProperties, PoolResult, Resource};
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

#[derive(Debug)]
struct Connection {
    session: u32,
    open: bool,
}

impl Resource for Connection {
    type Error = std::io::Error;

    fn is_alive(&mut self) -> bool {
        self.open
    }

    fn discard(&mut self) -> Result<(), Self::Error> {
        self.open = false;
        Ok(())
    }
}

static SESSIONS: AtomicU32 = AtomicU32::new(100);

fn connect(props: &PoolProperties) -> PoolResult<Connection> {
    let session = SESSIONS.fetch_add(1, Ordering::Relaxed);
    println!("   [{}] opening session {session}", props.pool());
    Ok(Connection { session, open: true })
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    println!("=== leasepool - Basic Examples ===\n");

    // Example 1: Simple pool
    simple_pool();

    // Example 2: Yellow line and exhaustion
    exhaustion();

    // Example 3: Metrics and health
    metrics_and_health();
}

fn simple_pool() {
    println!("1. Simple Pool:");
    let config = PoolConfiguration::new().with_min(1).with_start(1).with_max(5);
    let pool = PoolContainer::new("simple", config, connect).unwrap();

    {
        let conn = pool.get_object().unwrap();
        println!("   Got session {} (object #{})", conn.session, conn.object_id());
        // Connection automatically returned when dropped
    }

    println!("   Available after return: {}\n", pool.available_objects());
}

fn exhaustion() {
    println!("2. Yellow Line and Exhaustion:");
    let config = PoolConfiguration::new()
        .with_max(2)
        .with_yellow_line(50)
        .with_overshoot(false)
        .with_retry_interval(Duration::from_millis(50));
    let pool = PoolContainer::new("bounded", config, connect).unwrap();

    let first = pool.get_object().unwrap();
    println!("   First lease created immediately: #{}", first.object_id());
    let second = pool.get_object().unwrap();
    println!("   Second lease created after one wait: #{}", second.object_id());

    match pool.get_object() {
        Ok(_) => println!("   Unexpected third lease"),
        Err(PoolError::Exhausted { retries, .. }) => {
            println!("   Third lease refused after {retries} retries")
        }
        Err(e) => println!("   Error: {e}"),
    }
    println!();
}

fn metrics_and_health() {
    println!("3. Metrics and Health:");
    let config = PoolConfiguration::new().with_start(3).with_max(5);
    let pool = PoolContainer::new("observed", config, connect).unwrap();

    {
        let _c1 = pool.get_object().unwrap();
        let _c2 = pool.get_object().unwrap();

        let health = pool.get_health_status();
        println!("   Health: {}", if health.is_healthy { "Healthy" } else { "Unhealthy" });
        println!("   Utilization: {:.1}%", health.utilization * 100.0);
        println!("   Leased: {}, Available: {}", health.checked_out_objects, health.available_objects);
    }

    println!("\n{pool}");
    let metrics = pool.export_metrics();
    println!("   Metrics:");
    for (key, value) in metrics {
        println!("     {}: {}", key, value);
    }
}
