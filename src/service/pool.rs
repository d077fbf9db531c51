//! Worker pool: drains the job queue and runs jobs under a concurrency limit.

use super::RelayService;
use std::sync::atomic::Ordering;

impl RelayService {
    /// Start the dispatcher task
    ///
    /// The dispatcher takes jobs off the queue in arrival order, waits for a
    /// permit from the concurrency limiter (`worker.max_concurrent_jobs`) and
    /// spawns each job on its own task. Jobs for different sessions run in
    /// parallel; nothing here serializes jobs that share a session key.
    ///
    /// Returns `None` when the dispatcher was already started.
    pub fn start_worker_pool(&self) -> Option<tokio::task::JoinHandle<()>> {
        let receiver = match self.queue_state.job_rx.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        let Some(mut receiver) = receiver else {
            tracing::warn!("Worker pool already started");
            return None;
        };

        let concurrent_limit = self.queue_state.concurrent_limit.clone();
        let active_jobs = self.queue_state.active_jobs.clone();
        let shutdown = self.queue_state.shutdown.clone();
        let service = self.clone();

        tracing::info!(
            max_concurrent_jobs = self.config.worker.max_concurrent_jobs,
            queue_capacity = self.config.worker.queue_capacity,
            "Worker pool started"
        );

        Some(tokio::spawn(async move {
            loop {
                let job = tokio::select! {
                    biased;
                    _ = shutdown.cancelled() => break,
                    job = receiver.recv() => match job {
                        Some(job) => job,
                        None => break,
                    },
                };

                // Blocks while max_concurrent_jobs are running
                let permit = tokio::select! {
                    biased;
                    _ = shutdown.cancelled() => {
                        tracing::warn!(job_id = job.id.0, "Shutdown before job could start, dropping it");
                        break;
                    }
                    permit = concurrent_limit.clone().acquire_owned() => match permit {
                        Ok(permit) => permit,
                        Err(_) => break,
                    },
                };

                active_jobs.fetch_add(1, Ordering::SeqCst);
                let service = service.clone();
                let active_jobs = active_jobs.clone();

                tokio::spawn(async move {
                    let _permit = permit;
                    let report = service.run_job(job.id, job.descriptor).await;
                    // The submitter may have dropped its handle
                    let _ = job.outcome_tx.send(report);
                    active_jobs.fetch_sub(1, Ordering::SeqCst);
                });
            }

            receiver.close();
            let mut dropped = 0usize;
            while receiver.try_recv().is_ok() {
                dropped += 1;
            }
            if dropped > 0 {
                tracing::warn!(dropped, "Queued jobs dropped at shutdown");
            }
            tracing::info!("Worker pool stopped");
        }))
    }
}
