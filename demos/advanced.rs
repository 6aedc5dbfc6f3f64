//! Advanced features: worker threads, liveness, aging, backpressure, Prometheus

use leasepool::{PoolManager, PoolProperties, PoolResult, Resource};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::{self, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

type Job = Box<dyn FnOnce() + Send>;

/// A parked OS thread that runs jobs sent to it
struct Worker {
    jobs: Option<Sender<Job>>,
    thread: Option<JoinHandle<()>>,
    crashed: Arc<AtomicBool>,
}

impl Worker {
    fn spawn(name: String) -> std::io::Result<Self> {
        let (jobs, inbox) = mpsc::channel::<Job>();
        let crashed = Arc::new(AtomicBool::new(false));
        let thread = thread::Builder::new().name(name).spawn(move || {
            for job in inbox {
                job();
            }
        })?;
        Ok(Self {
            jobs: Some(jobs),
            thread: Some(thread),
            crashed,
        })
    }

    fn run(&self, job: impl FnOnce() + Send + 'static) {
        if let Some(jobs) = &self.jobs
            && jobs.send(Box::new(job)).is_err()
        {
            self.crashed.store(true, Ordering::Relaxed);
        }
    }
}

impl Resource for Worker {
    type Error = std::io::Error;

    fn is_alive(&mut self) -> bool {
        !self.crashed.load(Ordering::Relaxed) && self.thread.as_ref().is_some_and(|t| !t.is_finished())
    }

    fn discard(&mut self) -> Result<(), Self::Error> {
        self.jobs.take();
        if let Some(thread) = self.thread.take() {
            thread
                .join()
                .map_err(|_| std::io::Error::other("worker thread panicked"))?;
        }
        Ok(())
    }
}

fn main() {
    println!("=== leasepool - Advanced Features ===\n");

    let mut props = HashMap::new();
    props.insert("workers.min".to_string(), "1".to_string());
    props.insert("workers.start".to_string(), "2".to_string());
    props.insert("workers.max".to_string(), "4".to_string());
    props.insert("workers.max_age".to_string(), "60000".to_string());
    props.insert("workers.retry_interval".to_string(), "50".to_string());
    props.insert("workers.thread_prefix".to_string(), "job-runner".to_string());

    let collections = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&collections);
    let manager = PoolManager::new(props).with_backpressure(Arc::new(move || {
        counter.fetch_add(1, Ordering::Relaxed);
    }));

    let spawned = AtomicUsize::new(0);
    let workers = manager
        .create_pool("workers", move |props: &PoolProperties| -> PoolResult<Worker> {
            let n = spawned.fetch_add(1, Ordering::Relaxed);
            let prefix = props.get_or("thread_prefix", props.pool());
            Worker::spawn(format!("{prefix}-{n}")).map_err(|e| leasepool::PoolError::creation(props.pool(), e))
        })
        .unwrap();

    // Example 1: Run jobs on leased threads
    println!("1. Leased worker threads:");
    let (done_tx, done_rx) = mpsc::channel();
    for i in 0..3 {
        let worker = workers.get_object().unwrap();
        let done = done_tx.clone();
        worker.run(move || {
            let _ = done.send(i * i);
        });
    }
    drop(done_tx);
    let results: Vec<i32> = done_rx.iter().collect();
    println!("   Results: {:?}\n", results);

    // Example 2: A crashed worker is skipped and pruned
    println!("2. Liveness:");
    {
        let worker = workers.get_object().unwrap();
        println!("   Crashing worker #{}", worker.object_id());
        worker.invalidate();
    }
    println!("{workers}");
    for (pool, error) in manager.prune_all() {
        println!("   prune of {pool} failed: {error}");
    }
    println!("   After prune:\n{workers}");

    // Example 3: Adaptive aging and overshoot under a burst
    println!("3. Burst:");
    let burst: Vec<_> = (0..5).map(|_| workers.get_object().unwrap()).collect();
    println!("{workers}");
    println!("   Backpressure signals so far: {}", collections.load(Ordering::Relaxed));
    drop(burst);
    println!("   After burst: {} workers\n", workers.total_objects());

    // Example 4: Prometheus metrics
    println!("4. Prometheus Metrics Export:");
    let mut tags = HashMap::new();
    tags.insert("service".to_string(), "example".to_string());
    println!("{}", workers.export_metrics_prometheus(Some(&tags)).unwrap());

    manager.shutdown();
}
