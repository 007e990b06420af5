//! Bounded pool of headless-browser instances with age-based expiration,
//! a FIFO wait queue, and a background reaper.

use crate::cleanup::cleanup_instance;
use crate::launcher::Launcher;
use compliscan_core::config::BrowserPoolConfig;
use compliscan_core::{Error, Result};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// A live, leasable browser instance.
pub struct BrowserInstance {
    pub id: u64,
    pub browser: chromiumoxide::Browser,
    pub(crate) handler: tokio::task::JoinHandle<()>,
    pub(crate) child: tokio::process::Child,
    pub pid: u32,
    pub created_at: Instant,
}

struct Inner {
    config: BrowserPoolConfig,
    launcher: Launcher,
    available: Mutex<VecDeque<BrowserInstance>>,
    waiters: Mutex<VecDeque<mpsc::Sender<BrowserInstance>>>,
    total: AtomicUsize,
    next_id: AtomicU64,
    closed: AtomicBool,
    reaper: Mutex<Option<tokio::task::JoinHandle<()>>>,
}

/// A handle to the pool. Cheap to clone.
#[derive(Clone)]
pub struct BrowserPool(Arc<Inner>);

impl BrowserPool {
    pub fn new(config: BrowserPoolConfig, launcher: Launcher) -> Self {
        let inner = Arc::new(Inner {
            config,
            launcher,
            available: Mutex::new(VecDeque::new()),
            waiters: Mutex::new(VecDeque::new()),
            total: AtomicUsize::new(0),
            next_id: AtomicU64::new(1),
            closed: AtomicBool::new(false),
            reaper: Mutex::new(None),
        });

        let reaper_inner = inner.clone();
        let handle = tokio::spawn(reap_loop(reaper_inner));
        *inner.reaper.lock() = Some(handle);

        Self(inner)
    }

    /// Lease an instance, creating one if under `max_size`, otherwise
    /// waiting in FIFO order for one to be returned. Cancelling `cancel`
    /// aborts the wait with `Error::PoolTimeout`.
    pub async fn get(&self, cancel: &CancellationToken) -> Result<BrowserLease> {
        loop {
            if let Some(instance) = self.take_valid_available() {
                return Ok(self.wrap(instance));
            }

            if let Some(instance) = self.try_create().await? {
                return Ok(self.wrap(instance));
            }

            match self.wait_for_return(cancel).await? {
                Some(instance) => return Ok(self.wrap(instance)),
                None => continue, // handed a stale waiter slot; retry the whole scan
            }
        }
    }

    /// Return a leased instance to the pool. Expired instances are
    /// scheduled for cleanup instead of being reused.
    pub fn put(&self, mut instance: BrowserInstance) {
        if instance.created_at.elapsed() >= self.0.config.max_age() {
            self.retire(instance);
            return;
        }

        let mut waiters = self.0.waiters.lock();
        while let Some(tx) = waiters.pop_front() {
            match tx.try_send(instance) {
                Ok(()) => return,
                Err(mpsc::error::TrySendError::Closed(returned))
                | Err(mpsc::error::TrySendError::Full(returned)) => {
                    instance = returned;
                    continue;
                }
            }
        }
        drop(waiters);

        self.0.available.lock().push_back(instance);
    }

    /// Stop the reaper, detach every available instance, and clean them up
    /// with a 30s overall budget; cleanups still running past that budget
    /// keep running detached.
    pub async fn close(&self) {
        self.0.closed.store(true, Ordering::SeqCst);
        if let Some(handle) = self.0.reaper.lock().take() {
            handle.abort();
        }

        let instances: Vec<BrowserInstance> = self.0.available.lock().drain(..).collect();
        self.0.total.fetch_sub(instances.len(), Ordering::SeqCst);

        let config = self.0.config.clone();
        let tasks: Vec<_> = instances
            .into_iter()
            .map(|instance| {
                let config = config.clone();
                tokio::spawn(async move { cleanup_instance(instance, &config).await })
            })
            .collect();

        if tokio::time::timeout(
            std::time::Duration::from_secs(30),
            futures::future::join_all(tasks),
        )
        .await
        .is_err()
        {
            warn!("browser pool close: cleanup budget exceeded, remaining cleanups left detached");
        }
    }

    pub fn len(&self) -> usize {
        self.0.total.load(Ordering::SeqCst)
    }

    fn take_valid_available(&self) -> Option<BrowserInstance> {
        let mut available = self.0.available.lock();
        while let Some(instance) = available.pop_front() {
            if instance.created_at.elapsed() < self.0.config.max_age() {
                return Some(instance);
            }
            drop(available);
            self.retire(instance);
            available = self.0.available.lock();
        }
        None
    }

    async fn try_create(&self) -> Result<Option<BrowserInstance>> {
        let reserved = self
            .0
            .total
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |current| {
                if current < self.0.config.max_size {
                    Some(current + 1)
                } else {
                    None
                }
            })
            .is_ok();

        if !reserved {
            return Ok(None);
        }

        match self.0.launcher.launch().await {
            Ok(launched) => {
                let id = self.0.next_id.fetch_add(1, Ordering::Relaxed);
                info!(id, pid = launched.pid, "launched browser instance");
                Ok(Some(BrowserInstance {
                    id,
                    browser: launched.browser,
                    handler: launched.handler,
                    child: launched.child,
                    pid: launched.pid,
                    created_at: Instant::now(),
                }))
            }
            Err(e) => {
                self.0.total.fetch_sub(1, Ordering::SeqCst);
                Err(e)
            }
        }
    }

    async fn wait_for_return(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Option<BrowserInstance>> {
        let (tx, mut rx) = mpsc::channel(1);
        {
            let mut waiters = self.0.waiters.lock();
            if waiters.len() >= self.0.config.wait_queue_cap {
                return Err(Error::PoolFull);
            }
            waiters.push_back(tx);
        }

        tokio::select! {
            _ = cancel.cancelled() => Err(Error::PoolTimeout),
            received = rx.recv() => Ok(received),
        }
    }

    fn retire(&self, instance: BrowserInstance) {
        self.0.total.fetch_sub(1, Ordering::SeqCst);
        let config = self.0.config.clone();
        tokio::spawn(async move { cleanup_instance(instance, &config).await });
    }

    fn wrap(&self, instance: BrowserInstance) -> BrowserLease {
        BrowserLease {
            pool: self.clone(),
            instance: Some(instance),
        }
    }
}

async fn reap_loop(inner: Arc<Inner>) {
    let mut interval = tokio::time::interval(inner.config.reap_interval());
    loop {
        interval.tick().await;
        if inner.closed.load(Ordering::SeqCst) {
            return;
        }

        let expired: Vec<BrowserInstance> = {
            let mut available = inner.available.lock();
            let max_age = inner.config.max_age();
            let (keep, expired): (VecDeque<_>, VecDeque<_>) = available
                .drain(..)
                .partition(|instance| instance.created_at.elapsed() < max_age);
            *available = keep;
            expired.into_iter().collect()
        };

        if expired.is_empty() {
            continue;
        }
        inner.total.fetch_sub(expired.len(), Ordering::SeqCst);
        for instance in expired {
            let config = inner.config.clone();
            tokio::spawn(async move { cleanup_instance(instance, &config).await });
        }
    }
}

/// RAII lease: returns the instance to the pool on drop, including on
/// panics and early returns, so a worker can never leak a leased browser.
pub struct BrowserLease {
    pool: BrowserPool,
    instance: Option<BrowserInstance>,
}

impl Deref for BrowserLease {
    type Target = chromiumoxide::Browser;
    fn deref(&self) -> &Self::Target {
        &self.instance.as_ref().expect("lease used after drop").browser
    }
}

impl DerefMut for BrowserLease {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.instance.as_mut().expect("lease used after drop").browser
    }
}

impl Drop for BrowserLease {
    fn drop(&mut self) {
        if let Some(instance) = self.instance.take() {
            self.pool.put(instance);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // These tests exercise the bookkeeping (available/waiters/total
    // counters) directly, without spawning a real Chrome process, that
    // belongs to an integration test gated on a browser binary being
    // present on the host.

    fn test_config() -> BrowserPoolConfig {
        BrowserPoolConfig {
            max_size: 1,
            max_age_secs: 3600,
            wait_queue_cap: 1,
            close_grace_ms: 10,
            sigterm_grace_ms: 1,
            sigkill_grace_ms: 1,
            reap_interval_secs: 3600,
        }
    }

    #[tokio::test]
    async fn pool_starts_empty() {
        let pool = BrowserPool::new(test_config(), Launcher::new("chromium", true));
        assert_eq!(pool.len(), 0);
        pool.close().await;
    }
}
