//! Shutdown coordination.

use super::RelayService;
use crate::error::Result;
use std::sync::atomic::Ordering;
use std::time::Duration;

/// How long shutdown waits for running jobs
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

impl RelayService {
    /// Gracefully shut down the service
    ///
    /// 1. Stops accepting new jobs
    /// 2. Stops the dispatcher; jobs still on the queue are dropped
    /// 3. Waits up to 30 seconds for running jobs to finish
    ///
    /// Running jobs are never interrupted: a job still running when the
    /// timeout expires keeps going until the runtime itself stops, and its
    /// slot then clears when the gate record expires.
    pub async fn shutdown(&self) -> Result<()> {
        tracing::info!("Initiating graceful shutdown");

        self.queue_state.accepting_new.store(false, Ordering::SeqCst);
        tracing::info!("Stopped accepting new jobs");

        self.queue_state.shutdown.cancel();

        match tokio::time::timeout(SHUTDOWN_TIMEOUT, self.wait_for_active_jobs()).await {
            Ok(()) => tracing::info!("All running jobs completed"),
            Err(_) => tracing::warn!(
                active_jobs = self.active_jobs(),
                "Timeout waiting for jobs to complete, proceeding with shutdown"
            ),
        }

        tracing::info!("Graceful shutdown complete");
        Ok(())
    }

    async fn wait_for_active_jobs(&self) {
        loop {
            let active = self.active_jobs();
            if active == 0 {
                return;
            }
            tracing::debug!(active, "Waiting for running jobs to complete");
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }
}
