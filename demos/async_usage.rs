//! Async usage examples

use leasepool::{CancelToken, CheckoutOptions, PoolConfiguration, PoolContainer, PoolManager, PoolProperties, PoolResult, Resource};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

#[derive(Debug)]
struct Client {
    endpoint: String,
}

impl Resource for Client {
    type Error = std::io::Error;

    fn discard(&mut self) -> Result<(), Self::Error> {
        println!("   closing client for {}", self.endpoint);
        Ok(())
    }
}

fn client(props: &PoolProperties) -> PoolResult<Client> {
    let endpoint = match props.get("endpoint") {
        Some(endpoint) => endpoint.to_string(),
        None => format!("https://{}.internal", props.pool()),
    };
    Ok(Client { endpoint })
}

#[tokio::main]
async fn main() {
    println!("=== leasepool - Async Examples ===\n");

    // Example 1: Async get
    async_get().await;

    // Example 2: Async with timeout
    async_with_timeout().await;

    // Example 3: Cancellation
    cancellation().await;

    // Example 4: Background maintenance
    maintenance().await;
}

async fn async_get() {
    println!("1. Async Get:");
    let pool = PoolContainer::new("api", PoolConfiguration::new().with_start(1).with_max(3), client).unwrap();

    {
        let c = pool.get_object_async().await.unwrap();
        println!("   Got client asynchronously: {}", c.endpoint);
    }

    println!();
}

async fn async_with_timeout() {
    println!("2. Async with Timeout:");

    let config = PoolConfiguration::new()
        .with_max(1)
        .with_yellow_line(100)
        .with_timeout(Duration::from_millis(100));
    let pool = PoolContainer::new("slow", config, client).unwrap();

    // Hold the only client
    let _held = pool.get_object().unwrap();

    // Try to get another (should time out)
    match pool.get_object_async().await {
        Ok(_) => println!("   Got client"),
        Err(e) => println!("   Error: {}", e),
    }

    println!();
}

async fn cancellation() {
    println!("3. Cancellation:");

    let config = PoolConfiguration::new().with_max(1).with_yellow_line(100);
    let pool = PoolContainer::new("cancel", config, client).unwrap();
    let _held = pool.get_object().unwrap();

    let token = CancelToken::new();
    let waiter = {
        let pool = pool.clone();
        let options = CheckoutOptions::new().with_cancel(token.clone());
        tokio::spawn(async move { pool.get_object_async_with(options).await.map(|c| c.object_id()) })
    };

    sleep(Duration::from_millis(100)).await;
    token.cancel();
    println!("   Waiter finished with: {:?}", waiter.await.unwrap());
    println!();
}

async fn maintenance() {
    println!("4. Background Maintenance:");

    let mut props = HashMap::new();
    props.insert("search.min".to_string(), "1".to_string());
    props.insert("search.max".to_string(), "4".to_string());
    props.insert("search.idle_timeout".to_string(), "200".to_string());
    props.insert("search.endpoint".to_string(), "https://search.example.net".to_string());

    let manager = Arc::new(PoolManager::new(props));
    let pool = manager.create_pool("search", client).unwrap();

    // Burst: four concurrent leases
    let leases: Vec<_> = (0..4).map(|_| pool.get_object().unwrap()).collect();
    println!("   During burst: {} clients", pool.total_objects());
    drop(leases);

    let task = manager.spawn_maintenance(Duration::from_millis(100));
    sleep(Duration::from_millis(500)).await;
    println!("   After idle pruning: {} client(s)", pool.total_objects());

    task.abort();
    manager.shutdown();
}
