//! One job run: gate check, fetch, sanitize, relay, cleanup, gate release.

use super::RelayService;
use crate::fetch::FetchOptions;
use crate::gate::{BUSY, FREE};
use crate::job::JobDescriptor;
use crate::relay::RelaySession;
use crate::sanitize::sanitize_path;
use crate::types::{Event, JobId, JobOutcome, JobReport};
use chrono::Utc;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::path::Path;

impl RelayService {
    /// Run one job to completion on the current task
    ///
    /// The slot is marked busy first; when that write fails the job is
    /// rejected without touching anything else. Otherwise the slot is marked
    /// free exactly once at the end, whatever happened in between, including
    /// a panic inside the pipeline.
    pub async fn run_job(&self, id: JobId, job: JobDescriptor) -> JobReport {
        let key = job.session_key.clone();

        if !self.gate.publish(&key, BUSY).await {
            tracing::error!(job_id = id.0, session_key = %key, "Gate unreachable, job rejected");
            self.emit(Event::JobRejected {
                id,
                session_key: key.clone(),
            });
            let report = JobReport {
                id,
                session_key: key,
                outcome: JobOutcome::Rejected,
                gate_released: false,
                finished_at: Utc::now(),
            };
            self.emit(Event::JobFinished {
                report: report.clone(),
            });
            return report;
        }

        tracing::info!(
            job_id = id.0,
            session_key = %key,
            links = job.links.len(),
            folder = %job.destination_path,
            bitrate = %job.bitrate,
            "Job started"
        );
        self.emit(Event::JobStarted {
            id,
            session_key: key.clone(),
        });

        let outcome = match AssertUnwindSafe(self.process(id, &job)).catch_unwind().await {
            Ok(outcome) => outcome,
            Err(panic) => {
                let reason = panic_message(panic.as_ref());
                tracing::error!(job_id = id.0, session_key = %key, reason = %reason, "Job aborted");
                JobOutcome::Aborted { reason }
            }
        };

        let gate_released = self.gate.publish(&key, FREE).await;
        if !gate_released {
            tracing::error!(
                job_id = id.0,
                session_key = %key,
                ttl_secs = self.gate.ttl().as_secs(),
                "Failed to release slot, it stays occupied until the record expires"
            );
        }

        let report = JobReport {
            id,
            session_key: key,
            outcome,
            gate_released,
            finished_at: Utc::now(),
        };
        tracing::info!(job_id = id.0, outcome = ?report.outcome, "Job finished");
        self.emit(Event::JobFinished {
            report: report.clone(),
        });
        report
    }

    async fn process(&self, id: JobId, job: &JobDescriptor) -> JobOutcome {
        let staging = &self.config.fetch.staging_dir;
        let options = FetchOptions {
            bitrate: job.bitrate.clone(),
            audio_format: self.config.fetch.audio_format.clone(),
        };

        let fetched = self.pipeline.fetch(&job.links, staging, &options).await;
        self.emit(Event::FetchFinished {
            id,
            fetched: fetched.fetched_count(),
            failed: fetched.failed_count(),
        });

        if fetched.fetched_count() == 0 {
            tracing::error!(job_id = id.0, "Nothing was fetched");
            return JobOutcome::NothingFetched;
        }

        let folder = job.destination_path.as_str();
        let mut relay = RelaySession::new(self.storage.clone());
        if !relay.ensure_directory(folder).await {
            tracing::error!(job_id = id.0, folder, "Problem with creating folder");
            relay.close();
            for file in fetched.files() {
                remove_staged(file).await;
            }
            return JobOutcome::DirectoryUnavailable {
                folder: folder.to_string(),
            };
        }

        let policy = self.config.relay.retry_policy();
        let mut uploaded = 0;
        let mut failed = 0;

        for source in fetched.files() {
            let target = sanitize_path(source, job.transliterate);
            let name = file_name(&target);

            if target != source {
                if let Err(e) = tokio::fs::rename(source, &target).await {
                    tracing::error!(
                        job_id = id.0,
                        from = %source.display(),
                        to = %target.display(),
                        error = %e,
                        "Rename failed"
                    );
                    remove_staged(source).await;
                    failed += 1;
                    self.emit(Event::FileFailed {
                        id,
                        name: file_name(source),
                        error: format!("rename failed: {}", e),
                    });
                    continue;
                }
                tracing::info!(job_id = id.0, path = %target.display(), "File renamed");
            }

            let ok = relay.upload_file_with_retry(&target, &policy).await;
            remove_staged(&target).await;

            if ok {
                uploaded += 1;
                tracing::info!(job_id = id.0, file = %name, folder, "Succeeded in uploading");
                self.emit(Event::FileUploaded {
                    id,
                    name,
                    folder: folder.to_string(),
                });
            } else {
                failed += 1;
                tracing::error!(job_id = id.0, file = %name, folder, "Problem in uploading");
                self.emit(Event::FileFailed {
                    id,
                    name,
                    error: "upload failed".to_string(),
                });
            }
        }

        relay.close();
        JobOutcome::Completed { uploaded, failed }
    }
}

async fn remove_staged(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        tracing::warn!(path = %path.display(), error = %e, "Failed to remove staged file");
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
