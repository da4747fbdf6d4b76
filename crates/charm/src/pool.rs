//! # Session Admission
//!
//! The sole backpressure mechanism of the engine: a hard cap on concurrently
//! checked out backing-store sessions. A checkout succeeds immediately while below
//! the cap, otherwise waits up to the configured timeout and then fails with
//! [`Error::ResourceExhausted`]. Waiters are admitted in arrival order.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::error::Error;

//================================================================================================
// Types
//================================================================================================

/// A bounded pool of backing-store sessions.
#[derive(Clone, Debug)]
pub struct SessionPool {
    permits: Arc<Semaphore>,
    limit: usize,
    timeout: Duration,
}

//================================================================================================
// Impls
//================================================================================================

impl Default for SessionPool {
    fn default() -> Self {
        let store = config::StoreConfig::default();
        SessionPool::new(store.max_sessions, store.session_timeout())
    }
}

impl SessionPool {
    /// A pool admitting at most `limit` concurrent sessions, each checkout waiting
    /// at most `timeout`. A zero limit is raised to one.
    pub fn new(limit: usize, timeout: Duration) -> Self {
        let limit = limit.max(1);
        SessionPool {
            permits: Arc::new(Semaphore::new(limit)),
            limit,
            timeout,
        }
    }

    /// A pool sized from the store configuration.
    pub fn from_config(config: &config::StoreConfig) -> Self {
        SessionPool::new(config.max_sessions, config.session_timeout())
    }

    /// The session cap.
    pub fn limit(&self) -> usize {
        self.limit
    }

    /// How many sessions are currently checked out.
    pub fn in_use(&self) -> usize {
        self.limit - self.permits.available_permits()
    }

    /// Reserve a session slot, released when the returned permit drops.
    pub async fn checkout(&self) -> Result<OwnedSemaphorePermit, Error> {
        let exhausted = |waited| Error::ResourceExhausted {
            limit: self.limit,
            waited,
        };

        if let Ok(permit) = Arc::clone(&self.permits).try_acquire_owned() {
            return Ok(permit);
        }

        let start = Instant::now();
        tracing::debug!(limit = self.limit, "session pool saturated, waiting");
        match tokio::time::timeout(self.timeout, Arc::clone(&self.permits).acquire_owned()).await {
            Ok(Ok(permit)) => Ok(permit),
            Ok(Err(_closed)) => Err(exhausted(start.elapsed())),
            Err(_elapsed) => {
                let waited = start.elapsed();
                tracing::warn!(limit = self.limit, ?waited, "too many sessions in use");
                Err(exhausted(waited))
            },
        }
    }
}
