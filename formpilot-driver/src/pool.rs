use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Bounds the number of live browser contexts.
///
/// Workers acquire a permit before launching a session; when the pool is
/// saturated the acquire suspends up to a timeout, and a timeout tells the
/// worker to requeue the run instead of failing it.
#[derive(Clone)]
pub struct ContextPool {
    permits: Arc<Semaphore>,
}

/// Held for the lifetime of one browser context.
pub struct ContextPermit {
    _permit: OwnedSemaphorePermit,
}

impl ContextPool {
    pub fn new(size: usize) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(size.max(1))),
        }
    }

    /// Acquire a context slot, or `None` if the pool stays saturated for
    /// the whole timeout.
    pub async fn acquire(&self, timeout: Duration) -> Option<ContextPermit> {
        match tokio::time::timeout(timeout, self.permits.clone().acquire_owned()).await {
            Ok(Ok(permit)) => Some(ContextPermit { _permit: permit }),
            // closed semaphore or timeout both mean: no context for you now
            _ => None,
        }
    }

    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn permits_are_returned_on_drop() {
        let pool = ContextPool::new(1);
        let permit = pool.acquire(Duration::from_millis(50)).await;
        assert!(permit.is_some());
        assert_eq!(pool.available(), 0);

        drop(permit);
        assert_eq!(pool.available(), 1);
    }

    #[tokio::test]
    async fn saturated_pool_times_out_instead_of_hanging() {
        let pool = ContextPool::new(1);
        let _held = pool.acquire(Duration::from_millis(50)).await.unwrap();

        let second = pool.acquire(Duration::from_millis(50)).await;
        assert!(second.is_none());
    }

    #[tokio::test]
    async fn waiter_gets_the_permit_once_released() {
        let pool = ContextPool::new(1);
        let held = pool.acquire(Duration::from_millis(50)).await.unwrap();

        let pool2 = pool.clone();
        let waiter = tokio::spawn(async move {
            pool2.acquire(Duration::from_secs(2)).await.is_some()
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        drop(held);
        assert!(waiter.await.unwrap());
    }
}
