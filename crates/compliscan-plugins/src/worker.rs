//! Bounded worker pool a plugin dispatches its per-event work to.
//!
//! A counting semaphore enforces the `max_workers` admission bound: each
//! unit of work acquires a permit before being spawned and releases it on
//! completion, including on panic (the permit is dropped as part of the
//! spawned task's frame regardless of how it ends).

use std::future::Future;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::error;

pub struct WorkerPool {
    semaphore: Arc<Semaphore>,
    max_workers: usize,
}

impl WorkerPool {
    pub fn new(max_workers: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(max_workers)),
            max_workers,
        }
    }

    /// Acquire a slot (waiting if the pool is saturated) and spawn `fut`.
    /// A panic inside `fut` is isolated to its own task and logged; it
    /// never propagates to the caller.
    pub async fn spawn<F>(&self, fut: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .expect("worker pool semaphore is never closed while the pool is alive");

        let handle = tokio::spawn(async move {
            let _permit = permit;
            fut.await;
        });

        tokio::spawn(async move {
            if let Err(join_err) = handle.await {
                if join_err.is_panic() {
                    let message = panic_message(join_err.into_panic());
                    error!(panic = %message, "worker task panicked");
                }
            }
        });
    }

    /// Drain: wait for every outstanding task to release its permit. Once
    /// this returns, no worker task is still running.
    pub async fn drain(&self) {
        match self.semaphore.acquire_many(self.max_workers as u32).await {
            Ok(_permits) => {}
            Err(_) => error!("worker pool semaphore closed unexpectedly during drain"),
        }
    }
}

/// Extract a loggable message from a `JoinError`'s panic payload, which is
/// a `Box<dyn Any + Send>` and not `Debug` on its own.
fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn admission_is_bounded() {
        let pool = WorkerPool::new(2);
        let in_flight = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));

        for _ in 0..6 {
            let in_flight = in_flight.clone();
            let max_seen = max_seen.clone();
            pool.spawn(async move {
                let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                max_seen.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(20)).await;
                in_flight.fetch_sub(1, Ordering::SeqCst);
            })
            .await;
        }

        pool.drain().await;
        assert!(max_seen.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn panic_in_one_task_does_not_block_others() {
        let pool = WorkerPool::new(2);
        pool.spawn(async { panic!("boom") }).await;
        pool.spawn(async {}).await;
        pool.drain().await;
    }
}
