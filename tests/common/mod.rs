//! Shared fixtures for pool integration tests.

use leasepool::{PoolConfiguration, PoolError, PoolFiller, PoolProperties, PoolResult, Resource};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Fake database session whose liveness can be flipped from the outside
#[derive(Debug)]
pub struct Session {
    pub alive: Arc<AtomicBool>,
    discarded: Arc<AtomicUsize>,
}

impl Resource for Session {
    type Error = std::io::Error;

    fn is_alive(&mut self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    fn discard(&mut self) -> Result<(), Self::Error> {
        self.discarded.fetch_add(1, Ordering::SeqCst);
        if self.alive.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(std::io::Error::other("connection reset by peer"))
        }
    }
}

#[derive(Default)]
struct Backend {
    refuse: AtomicBool,
    discarded: Arc<AtomicUsize>,
    sessions: Mutex<Vec<Arc<AtomicBool>>>,
}

/// Filler handing out sessions; can be told to refuse connections
#[derive(Clone, Default)]
pub struct SessionFiller(Arc<Backend>);

impl SessionFiller {
    pub fn refuse(&self, refuse: bool) {
        self.0.refuse.store(refuse, Ordering::SeqCst);
    }

    pub fn kill_all(&self) {
        for alive in self.0.sessions.lock().unwrap().iter() {
            alive.store(false, Ordering::SeqCst);
        }
    }

    pub fn created(&self) -> usize {
        self.0.sessions.lock().unwrap().len()
    }

    pub fn discarded(&self) -> usize {
        self.0.discarded.load(Ordering::SeqCst)
    }
}

impl PoolFiller<Session> for SessionFiller {
    fn fill(&self, properties: &PoolProperties, _config: &PoolConfiguration) -> PoolResult<Session> {
        if self.0.refuse.load(Ordering::SeqCst) {
            return Err(PoolError::creation(properties.pool(), "connection refused"));
        }
        let alive = Arc::new(AtomicBool::new(true));
        self.0.sessions.lock().unwrap().push(Arc::clone(&alive));
        Ok(Session {
            alive,
            discarded: Arc::clone(&self.0.discarded),
        })
    }
}
