//! Inbound connection management for ipreroute.
//!
//! - [`ConnectionLimiter`]: caps concurrent connections with a semaphore
//! - [`ConnectionTracker`]: counts live connections so shutdown can drain them

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Counts live connections for graceful shutdown.
#[derive(Debug, Clone, Default)]
pub struct ConnectionTracker {
    active: Arc<AtomicUsize>,
}

impl ConnectionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a connection until the returned guard is dropped.
    pub fn track(&self) -> ConnectionGuard {
        self.active.fetch_add(1, Ordering::SeqCst);
        ConnectionGuard {
            active: self.active.clone(),
        }
    }

    /// Current live connection count.
    pub fn count(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Waits until every tracked connection is gone or `timeout` elapses.
    ///
    /// Returns false if connections were still open at the deadline.
    pub async fn wait_for_shutdown(&self, timeout: Duration) -> bool {
        let drained = async {
            while self.count() > 0 {
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
        };
        tokio::time::timeout(timeout, drained).await.is_ok()
    }
}

/// Keeps a connection counted in its [`ConnectionTracker`].
#[derive(Debug)]
pub struct ConnectionGuard {
    active: Arc<AtomicUsize>,
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Outcome of asking the [`ConnectionLimiter`] for room.
#[derive(Debug)]
pub enum Admission {
    /// No limit configured.
    Unlimited,
    /// Admitted; the slot is released when the permit drops.
    Admitted(OwnedSemaphorePermit),
    /// At capacity.
    Rejected,
}

impl Admission {
    pub fn is_rejected(&self) -> bool {
        matches!(self, Self::Rejected)
    }
}

/// Caps concurrent inbound connections. A limit of 0 disables the cap.
#[derive(Debug, Clone)]
pub struct ConnectionLimiter {
    semaphore: Option<Arc<Semaphore>>,
    max_connections: usize,
}

impl ConnectionLimiter {
    pub fn new(max_connections: usize) -> Self {
        let semaphore = (max_connections > 0).then(|| Arc::new(Semaphore::new(max_connections)));
        Self {
            semaphore,
            max_connections,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.semaphore.is_some()
    }

    /// Configured limit (0 means unlimited).
    pub fn max_connections(&self) -> usize {
        self.max_connections
    }

    /// Tries to admit one more connection without waiting.
    pub fn try_admit(&self) -> Admission {
        match &self.semaphore {
            None => Admission::Unlimited,
            Some(semaphore) => match semaphore.clone().try_acquire_owned() {
                Ok(permit) => Admission::Admitted(permit),
                Err(_) => Admission::Rejected,
            },
        }
    }

    /// Number of connections that can still be admitted, if limited.
    pub fn available(&self) -> Option<usize> {
        self.semaphore.as_ref().map(|sem| sem.available_permits())
    }
}
