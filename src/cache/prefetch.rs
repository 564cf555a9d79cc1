//! Cursor-driven background preloading.

use std::sync::Mutex;

use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::chunk::ChunkItem;
use super::window::WindowedCache;

/// Default number of chunks preloaded on each side of the cursor.
pub const DEFAULT_PREFETCH_RADIUS: usize = 2;

/// Keeps the chunks around a moving cursor resident.
///
/// Each [`cursor_moved`](Self::cursor_moved) supersedes the previous one:
/// its driver task is aborted and windows it no longer wants are dropped by
/// the cache. Failures are logged and never reach the caller.
pub struct Prefetcher<T> {
    cache: WindowedCache<T>,
    radius: usize,
    driver: Mutex<Option<JoinHandle<()>>>,
}

impl<T: ChunkItem> Prefetcher<T> {
    pub fn new(cache: WindowedCache<T>) -> Self {
        Self::with_radius(cache, DEFAULT_PREFETCH_RADIUS)
    }

    pub fn with_radius(cache: WindowedCache<T>, radius: usize) -> Self {
        Self {
            cache,
            radius,
            driver: Mutex::new(None),
        }
    }

    pub fn cache(&self) -> &WindowedCache<T> {
        &self.cache
    }

    pub fn radius(&self) -> usize {
        self.radius
    }

    /// Start preloading around `addr`. Must be called within a tokio runtime.
    pub fn cursor_moved(&self, addr: u64) {
        let cache = self.cache.clone();
        let radius = self.radius;
        let task = tokio::spawn(async move {
            match cache.preload_around(addr, radius).await {
                Ok(report) => {
                    for error in &report.errors {
                        warn!(addr, error = %error, "Preload failed");
                    }
                    debug!(
                        addr,
                        loaded = report.loaded,
                        cached = report.cached,
                        superseded = report.superseded,
                        "Preload finished"
                    );
                }
                Err(e) => warn!(addr, error = %e, "Preload failed"),
            }
        });

        if let Some(previous) = self.driver().replace(task) {
            previous.abort();
        }
    }

    /// Abort the current driver and every preload it started.
    pub fn cancel(&self) {
        if let Some(task) = self.driver().take() {
            task.abort();
        }
        self.cache.cancel_preloads();
    }

    /// Wait until the latest driver finishes.
    pub async fn wait_idle(&self) {
        let task = self.driver().take();
        if let Some(task) = task {
            let _ = task.await;
        }
    }

    fn driver(&self) -> std::sync::MutexGuard<'_, Option<JoinHandle<()>>> {
        self.driver
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl<T> Drop for Prefetcher<T> {
    fn drop(&mut self) {
        let driver = self
            .driver
            .get_mut()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(task) = driver.take() {
            task.abort();
        }
    }
}

impl<T> std::fmt::Debug for Prefetcher<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Prefetcher")
            .field("cache", &self.cache)
            .field("radius", &self.radius)
            .finish()
    }
}
