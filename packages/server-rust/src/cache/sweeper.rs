//! Background sweeper that reclaims expired cache entries.
//!
//! The sweeper only bounds memory. Caches already re-check freshness on every
//! read, so correctness never depends on when (or whether) a sweep runs.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::debug;

use crate::traits::Sweepable;

/// On-demand requests handled by the sweep loop between ticks.
#[derive(Debug)]
enum SweepRequest {
    /// Run a full pass now and report how many entries were removed.
    Now { reply: oneshot::Sender<usize> },
}

/// Handle to a running sweep task.
///
/// The sweep task is spawned by [`start`](Self::start) and runs until
/// [`destroy`](Self::destroy) is awaited or the handle is dropped, so a
/// forgotten handle never leaks a timer past its owner.
#[derive(Debug)]
pub struct CacheSweeper {
    requests: Option<mpsc::Sender<SweepRequest>>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl CacheSweeper {
    /// Spawns the sweep loop over `caches`, ticking every `interval`.
    ///
    /// The first tick is skipped so no sweep runs at startup.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    #[must_use]
    pub fn start(caches: Vec<Arc<dyn Sweepable>>, interval: Duration) -> Self {
        let (tx, mut rx) = mpsc::channel::<SweepRequest>(16);
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();
        let period = interval.max(Duration::from_millis(1));

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            ticker.tick().await;

            loop {
                tokio::select! {
                    request = rx.recv() => {
                        match request {
                            Some(SweepRequest::Now { reply }) => {
                                let _ = reply.send(sweep_all(&caches));
                            }
                            None => break,
                        }
                    }
                    _ = ticker.tick() => {
                        sweep_all(&caches);
                    }
                    _ = &mut shutdown_rx => {
                        break;
                    }
                }
            }

            debug!("cache sweeper stopped");
        });

        Self {
            requests: Some(tx),
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
        }
    }

    /// Runs a sweep pass immediately and returns the number of entries removed.
    ///
    /// Returns `None` if the sweeper has been destroyed.
    pub async fn sweep_now(&self) -> Option<usize> {
        self.request_handle()?.sweep().await
    }

    /// Detached handle for requesting sweeps without borrowing the sweeper.
    #[must_use]
    pub fn request_handle(&self) -> Option<SweepHandle> {
        self.requests.clone().map(|requests| SweepHandle { requests })
    }

    /// Returns `true` until the sweeper is destroyed or its task exits.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Stops the sweep loop and waits for the task to finish. Idempotent.
    pub async fn destroy(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        self.requests.take();
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

/// Cloneable sender of on-demand sweep requests.
#[derive(Debug, Clone)]
pub struct SweepHandle {
    requests: mpsc::Sender<SweepRequest>,
}

impl SweepHandle {
    /// Requests a pass and waits for its removal count.
    ///
    /// Returns `None` if the sweep loop has stopped.
    pub async fn sweep(&self) -> Option<usize> {
        let (reply, rx) = oneshot::channel();
        self.requests.send(SweepRequest::Now { reply }).await.ok()?;
        rx.await.ok()
    }
}

impl Drop for CacheSweeper {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

/// One pass over every managed cache.
fn sweep_all(caches: &[Arc<dyn Sweepable>]) -> usize {
    let mut total = 0;
    for cache in caches {
        let removed = cache.purge_expired();
        if removed > 0 {
            metrics::counter!("tenancy_cache_swept_total", "kind" => cache.kind())
                .increment(u64::try_from(removed).unwrap_or(u64::MAX));
        }
        debug!(
            kind = cache.kind(),
            removed,
            remaining = cache.len(),
            "cache sweep"
        );
        total += removed;
    }
    total
}
