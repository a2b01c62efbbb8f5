use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, OwnedSemaphorePermit, Semaphore};
use tokio::time::{sleep, Instant};

use crate::{GisError, RateLimit, Result};

/// Bounds in-flight requests and spaces out dispatches.
///
/// Both ceilings apply at once: the semaphore caps parallelism, the
/// dispatch gate caps throughput. Clones share the same state.
#[derive(Clone, Debug)]
pub struct AdmissionController {
    slots: Arc<Semaphore>,
    capacity: usize,
    min_interval: Duration,
    last_dispatch: Arc<Mutex<Option<Instant>>>,
}

/// One admission slot, released on drop.
#[derive(Debug)]
pub struct AdmissionPermit {
    _permit: OwnedSemaphorePermit,
}

impl AdmissionController {
    pub fn new(concurrent_requests: usize, min_interval: Duration) -> Self {
        Self {
            slots: Arc::new(Semaphore::new(concurrent_requests)),
            capacity: concurrent_requests,
            min_interval,
            last_dispatch: Arc::new(Mutex::new(None)),
        }
    }

    pub fn from_rate_limit(rate_limit: &RateLimit) -> Self {
        Self::new(
            rate_limit.concurrent_requests,
            rate_limit.min_request_interval,
        )
    }

    /// Waits for a free slot, then for the dispatch interval to elapse.
    ///
    /// Fails with [`GisError::SessionNotStarted`] once the controller has
    /// been closed, including for callers already waiting.
    pub async fn acquire(&self) -> Result<AdmissionPermit> {
        let permit = Arc::clone(&self.slots)
            .acquire_owned()
            .await
            .map_err(|_| GisError::SessionNotStarted)?;

        // Held across the sleep so concurrent callers are spaced one by one.
        let mut last_dispatch = self.last_dispatch.lock().await;
        if let Some(previous) = *last_dispatch {
            let elapsed = previous.elapsed();
            if elapsed < self.min_interval {
                let delay = self.min_interval - elapsed;
                #[cfg(feature = "tracing")]
                tracing::debug!("rate limiting: sleeping {:?}", delay);
                sleep(delay).await;
            }
        }
        *last_dispatch = Some(Instant::now());

        Ok(AdmissionPermit { _permit: permit })
    }

    /// Rejects pending and future acquisitions.
    pub fn close(&self) {
        self.slots.close();
    }

    pub fn is_closed(&self) -> bool {
        self.slots.is_closed()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn in_flight(&self) -> usize {
        self.capacity
            .saturating_sub(self.slots.available_permits())
    }
}
