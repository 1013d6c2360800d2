//! Periodic cleanup of idle services
//!
//! A background worker that calls
//! [`ServiceLocator::cleanup_unused_services`] every
//! [`LocatorConfig::cleanup_interval`](crate::LocatorConfig::cleanup_interval).
//! Workers hold only a [`WeakServiceLocator`], so they never keep a container
//! alive and exit on their own once it is dropped.

use crate::{ServiceLocator, WeakServiceLocator};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::Duration;

#[cfg(feature = "logging")]
use tracing::{debug, trace};

const MIN_INTERVAL: Duration = Duration::from_millis(1);

/// Owner of a cleanup thread. Stops and joins the thread when dropped.
#[derive(Debug)]
pub struct CleanupHandle {
    stop: Option<Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl CleanupHandle {
    /// Stop the worker and wait for it to exit
    pub fn stop(mut self) {
        self.halt();
    }

    /// Whether the worker thread is still running
    pub fn is_running(&self) -> bool {
        self.thread.as_ref().is_some_and(|t| !t.is_finished())
    }

    fn halt(&mut self) {
        // Disconnecting the channel wakes the worker immediately
        self.stop.take();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for CleanupHandle {
    fn drop(&mut self) {
        self.halt();
    }
}

fn cleanup_pass(locator: &WeakServiceLocator) -> bool {
    let Some(locator) = locator.upgrade() else {
        return false;
    };

    let _removed = locator.cleanup_unused_services();

    #[cfg(feature = "logging")]
    trace!(target: "service_locator", removed = _removed, "Periodic cleanup pass");

    true
}

impl ServiceLocator {
    /// Run [`cleanup_unused_services`](Self::cleanup_unused_services) on a
    /// background thread every `cleanup_interval`.
    ///
    /// Fails only if the thread cannot be spawned.
    pub fn spawn_cleanup(&self) -> std::io::Result<CleanupHandle> {
        let weak = self.downgrade();
        let interval = self.config().cleanup_interval.max(MIN_INTERVAL);
        let (stop, stopped) = mpsc::channel::<()>();

        let thread = thread::Builder::new()
            .name("service-locator-cleanup".into())
            .spawn(move || {
                #[cfg(feature = "logging")]
                debug!(
                    target: "service_locator",
                    interval_ms = interval.as_millis() as u64,
                    "Cleanup worker started"
                );

                while let Err(RecvTimeoutError::Timeout) = stopped.recv_timeout(interval) {
                    if !cleanup_pass(&weak) {
                        break;
                    }
                }

                #[cfg(feature = "logging")]
                debug!(target: "service_locator", "Cleanup worker stopped");
            })?;

        Ok(CleanupHandle {
            stop: Some(stop),
            thread: Some(thread),
        })
    }

    /// Async variant of [`spawn_cleanup`](Self::spawn_cleanup) on the current
    /// tokio runtime. Abort the returned handle to stop it.
    ///
    /// Each pass takes the container lock and may run service shutdown hooks,
    /// so it runs on the blocking pool rather than a runtime worker.
    #[cfg(feature = "async")]
    pub fn spawn_cleanup_task(&self) -> tokio::task::JoinHandle<()> {
        let weak = self.downgrade();
        let interval = self.config().cleanup_interval.max(MIN_INTERVAL);

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The first tick completes immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let pass = weak.clone();
                match tokio::task::spawn_blocking(move || cleanup_pass(&pass)).await {
                    Ok(true) => {}
                    Ok(false) => break,
                    Err(_e) => {
                        #[cfg(feature = "logging")]
                        tracing::warn!(target: "service_locator", error = %_e, "Cleanup pass panicked");
                        break;
                    }
                }
            }
        })
    }
}
