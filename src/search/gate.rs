use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GateError {
    #[error("no concurrency slot became free within {0:?}")]
    Timeout(Duration),

    #[error("concurrency gate is closed")]
    Closed,
}

/// Bounded admission control for outbound searches
///
/// Independent of provider count: `capacity` in-flight searches in total,
/// across all requests.
pub struct ConcurrencyGate {
    semaphore: Arc<Semaphore>,
    capacity: usize,
}

/// Slot held by one admitted attempt; dropping it frees the slot
#[must_use = "the slot is released as soon as the permit is dropped"]
#[derive(Debug)]
pub struct GatePermit {
    _permit: OwnedSemaphorePermit,
}

impl ConcurrencyGate {
    pub fn new(capacity: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    /// Wait up to `timeout` for a slot
    ///
    /// Only the calling task waits. Cancelling the returned future gives
    /// up the place in the queue without taking a slot.
    pub async fn acquire(&self, timeout: Duration) -> Result<GatePermit, GateError> {
        let acquire = Arc::clone(&self.semaphore).acquire_owned();
        match tokio::time::timeout(timeout, acquire).await {
            Ok(Ok(permit)) => Ok(GatePermit { _permit: permit }),
            Ok(Err(_)) => Err(GateError::Closed),
            Err(_) => Err(GateError::Timeout(timeout)),
        }
    }

    pub fn try_acquire(&self) -> Option<GatePermit> {
        Arc::clone(&self.semaphore)
            .try_acquire_owned()
            .ok()
            .map(|permit| GatePermit { _permit: permit })
    }

    pub fn release(&self, permit: GatePermit) {
        drop(permit);
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    pub fn in_flight(&self) -> usize {
        self.capacity.saturating_sub(self.available())
    }

    /// Fail all waiting and future acquires; held permits stay valid
    pub fn close(&self) {
        self.semaphore.close();
    }

    pub fn is_closed(&self) -> bool {
        self.semaphore.is_closed()
    }
}
