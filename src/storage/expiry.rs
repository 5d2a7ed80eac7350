//! Background Expiry Reaper
//!
//! This module implements a background task that periodically asks the store
//! for expired items and removes them. This is "active expiry", as opposed to
//! the "lazy expiry" that [`Store::get`](crate::Store::get) performs on access.
//!
//! ## Why Do We Need This?
//!
//! Lazy expiry only catches items somebody reads again. An upload that is
//! never fetched after it expires would keep its record and its blob file on
//! disk forever. The reaper reclaims those.
//!
//! ## Design
//!
//! The reaper runs as a Tokio task and:
//! 1. Sleeps for the configured interval (default: 60s)
//! 2. Runs one sweep on the blocking pool, since store I/O is synchronous
//! 3. Logs how many items were removed, or why the sweep failed
//!
//! A failed sweep never ends the loop; the next tick simply tries again.
//!
//! The reaper only holds a weak reference to what it sweeps. Once the owner
//! is dropped the loop ends on its next tick, and nothing the owner holds
//! (such as an open database) is kept alive by the task.
//!
//! ## Shutdown
//!
//! Stopping is a two-step handshake: the shutdown signal goes out over a
//! `watch` channel, then [`Reaper::stop`] awaits the task's `JoinHandle`. Once
//! `stop` returns, the loop has exited and no sweep is in flight.

use crate::config::{DEFAULT_SWEEP_INTERVAL, MIN_SWEEP_INTERVAL};
use crate::error::Result;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace};

/// Something the reaper can sweep.
pub trait ExpirySweep: Send + Sync + 'static {
    /// Removes every expired item. Returns how many were removed.
    fn sweep_expired(&self) -> Result<usize>;
}

/// Configuration for the expiry reaper.
#[derive(Debug, Clone)]
pub struct ReaperConfig {
    /// Interval between sweeps (default: 60s, at least 1ms)
    pub interval: Duration,
}

impl Default for ReaperConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_SWEEP_INTERVAL,
        }
    }
}

/// A handle to the running expiry reaper.
///
/// Dropping the handle signals the task to stop but does not wait for it;
/// use [`Reaper::stop`] for that.
#[derive(Debug)]
pub struct Reaper {
    /// Sender to signal shutdown
    shutdown_tx: watch::Sender<bool>,

    /// Joined on stop to acknowledge that the loop has exited
    task: Option<JoinHandle<()>>,
}

impl Reaper {
    /// Starts the reaper as a background task on `handle`.
    ///
    /// # Arguments
    ///
    /// * `handle` - Runtime the task is spawned on
    /// * `target` - What to sweep; the loop ends once it has been dropped
    /// * `config` - Reaper configuration; a zero interval is raised to 1ms
    ///
    /// # Returns
    ///
    /// A handle that stops the task when [`Reaper::stop`] is awaited or when
    /// it is dropped.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use keepbox::storage::expiry::{ExpirySweep, Reaper, ReaperConfig};
    /// use std::sync::Arc;
    ///
    /// struct Nothing;
    ///
    /// impl ExpirySweep for Nothing {
    ///     fn sweep_expired(&self) -> keepbox::Result<usize> {
    ///         Ok(0)
    ///     }
    /// }
    ///
    /// # async fn demo() {
    /// let target: Arc<dyn ExpirySweep> = Arc::new(Nothing);
    /// let reaper = Reaper::start(
    ///     &tokio::runtime::Handle::current(),
    ///     Arc::downgrade(&target),
    ///     ReaperConfig::default(),
    /// );
    /// reaper.stop().await;
    /// # }
    /// ```
    pub fn start(
        handle: &Handle,
        target: Weak<dyn ExpirySweep>,
        mut config: ReaperConfig,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        config.interval = config.interval.max(MIN_SWEEP_INTERVAL);

        info!(
            interval_ms = config.interval.as_millis() as u64,
            "Background expiry reaper started"
        );
        let task = handle.spawn(reaper_loop(target, config, shutdown_rx));

        Self {
            shutdown_tx,
            task: Some(task),
        }
    }

    /// Signals the reaper to stop and waits until its loop has exited.
    pub async fn stop(mut self) {
        let _ = self.shutdown_tx.send(true);

        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                error!(error = %e, "Expiry reaper task ended abnormally");
            }
        }

        info!("Background expiry reaper stopped");
    }
}

impl Drop for Reaper {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.send(true);
    }
}

/// The main reaper loop.
async fn reaper_loop(
    target: Weak<dyn ExpirySweep>,
    config: ReaperConfig,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    loop {
        // Wait for the interval or shutdown signal
        tokio::select! {
            biased;
            result = shutdown_rx.changed() => {
                if result.is_err() || *shutdown_rx.borrow() {
                    debug!("Expiry reaper received shutdown signal");
                    return;
                }
            }
            _ = tokio::time::sleep(config.interval) => {}
        }

        let Some(sweep_target) = target.upgrade() else {
            debug!("Expiry reaper target dropped, exiting");
            return;
        };
        match tokio::task::spawn_blocking(move || sweep_target.sweep_expired()).await {
            Ok(Ok(0)) => trace!("No expired items found"),
            Ok(Ok(removed)) => debug!(removed = removed, "Expired items cleaned up"),
            Ok(Err(e)) => error!(error = %e, "Deletion of expired items failed"),
            Err(e) => error!(error = %e, "Expiry sweep panicked"),
        }
    }
}
