//! Job dispatch service split into focused submodules.
//!
//! The `RelayService` struct and its methods are organized by concern:
//! - [`orchestrator`] - One job run: gate, fetch, sanitize, relay, release
//! - [`pool`] - Worker pool draining the job queue
//! - [`lifecycle`] - Shutdown coordination

mod lifecycle;
mod orchestrator;
mod pool;


use crate::config::{Config, GateBackend};
use crate::error::{Error, Result};
use crate::fetch::{FetchPipeline, MediaExtractor, YtDlpExtractor};
use crate::gate::{AdmissionGate, GateStatus, GateStore, MemoryGateStore, RedisGateStore};
use crate::job::{JobDescriptor, JobRequest};
use crate::relay::{StorageBackend, WebDavBackend};
use crate::types::{Event, JobId, JobReport};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use tokio::sync::{Semaphore, broadcast, mpsc, oneshot};
use tokio_util::sync::CancellationToken;

/// Events buffered per subscriber before it starts lagging
const EVENT_CHANNEL_CAPACITY: usize = 1000;

/// External collaborators of the service
pub struct Components {
    /// Backing store of the admission gate
    pub gate_store: Arc<dyn GateStore>,
    /// Media source client
    pub extractor: Arc<dyn MediaExtractor>,
    /// Remote storage account client
    pub storage: Arc<dyn StorageBackend>,
}

/// Job waiting on the worker queue
pub(crate) struct QueuedJob {
    pub(crate) id: JobId,
    pub(crate) descriptor: JobDescriptor,
    pub(crate) outcome_tx: oneshot::Sender<JobReport>,
}

/// Queue and worker state
#[derive(Clone)]
pub(crate) struct QueueState {
    /// Sending half of the bounded job queue
    pub(crate) job_tx: mpsc::Sender<QueuedJob>,
    /// Receiving half, taken by the dispatcher when it starts
    pub(crate) job_rx: Arc<std::sync::Mutex<Option<mpsc::Receiver<QueuedJob>>>>,
    /// Limits concurrently running jobs
    pub(crate) concurrent_limit: Arc<Semaphore>,
    /// Jobs currently running
    pub(crate) active_jobs: Arc<AtomicUsize>,
    /// Cleared during shutdown
    pub(crate) accepting_new: Arc<AtomicBool>,
    /// Stops the dispatcher
    pub(crate) shutdown: CancellationToken,
    /// Next job ID
    pub(crate) next_id: Arc<AtomicU64>,
}

/// Handle returned for an accepted job
///
/// Dropping it does not affect the job.
#[derive(Debug)]
pub struct JobHandle {
    /// Job ID
    pub id: JobId,
    /// Gate slot the job will run under
    pub session_key: String,
    /// When the job was accepted
    pub queued_at: DateTime<Utc>,
    outcome: oneshot::Receiver<JobReport>,
}

impl JobHandle {
    /// Wait for the job to finish
    ///
    /// Returns `None` when the job was dropped from the queue before it ran
    /// (shutdown).
    pub async fn wait(self) -> Option<JobReport> {
        self.outcome.await.ok()
    }
}

/// Top-level service handle (cloneable - all fields are Arc-wrapped)
#[derive(Clone)]
pub struct RelayService {
    pub(crate) config: Arc<Config>,
    pub(crate) gate: AdmissionGate,
    pub(crate) pipeline: FetchPipeline,
    pub(crate) storage: Arc<dyn StorageBackend>,
    pub(crate) event_tx: broadcast::Sender<Event>,
    pub(crate) queue_state: QueueState,
}

impl RelayService {
    /// Create a service with the production collaborators
    ///
    /// The gate store is Redis or in-memory per `config.gate.backend`, media
    /// comes from yt-dlp and files go to the configured WebDAV account.
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;

        let gate_store: Arc<dyn GateStore> = match config.gate.backend {
            GateBackend::Redis => Arc::new(RedisGateStore::open(&config.gate.redis_url)?),
            GateBackend::Memory => Arc::new(MemoryGateStore::new()),
        };
        let extractor = Arc::new(YtDlpExtractor::from_config(&config.fetch));
        let storage = Arc::new(WebDavBackend::new(&config.relay)?);

        tracing::info!(
            gate_store = gate_store.name(),
            extractor = extractor.name(),
            storage = storage.name(),
            "Relay service initialized"
        );

        Ok(Self::with_components(
            config,
            Components {
                gate_store,
                extractor,
                storage,
            },
        ))
    }

    /// Create a service around the given collaborators
    pub fn with_components(config: Config, components: Components) -> Self {
        let (event_tx, _rx) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let (job_tx, job_rx) = mpsc::channel(config.worker.queue_capacity.max(1));

        let gate = AdmissionGate::new(components.gate_store, config.gate.retention);
        let pipeline = FetchPipeline::new(components.extractor, config.fetch.retry_policy());

        let queue_state = QueueState {
            job_tx,
            job_rx: Arc::new(std::sync::Mutex::new(Some(job_rx))),
            concurrent_limit: Arc::new(Semaphore::new(config.worker.max_concurrent_jobs.max(1))),
            active_jobs: Arc::new(AtomicUsize::new(0)),
            accepting_new: Arc::new(AtomicBool::new(true)),
            shutdown: CancellationToken::new(),
            next_id: Arc::new(AtomicU64::new(1)),
        };

        Self {
            config: Arc::new(config),
            gate,
            pipeline,
            storage: components.storage,
            event_tx,
            queue_state,
        }
    }

    /// Service configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Subscribe to job lifecycle events
    ///
    /// Each subscriber receives every event independently; one that falls
    /// behind by more than 1000 events gets `RecvError::Lagged`.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Whether a job can currently be submitted for `session_key`
    pub async fn queue_status(&self, session_key: &str) -> GateStatus {
        self.gate.status(session_key).await
    }

    /// Validate a request and queue it
    ///
    /// Returns as soon as the job is on the queue. The gate is only read here;
    /// it is marked busy when a worker picks the job up.
    ///
    /// # Errors
    ///
    /// - [`Error::Validation`] when the request does not describe a runnable job
    /// - [`Error::QueueBusy`] when the session's slot is occupied or the queue is full
    /// - [`Error::ShuttingDown`] once shutdown has begun
    pub async fn submit(&self, request: JobRequest) -> Result<JobHandle> {
        if !self.queue_state.accepting_new.load(Ordering::SeqCst) {
            return Err(Error::ShuttingDown);
        }

        let descriptor = JobDescriptor::from_request(request, &self.config)?;
        let session_key = descriptor.session_key.clone();

        if !self.gate.status(&session_key).await.is_available() {
            tracing::info!(session_key = %session_key, "Slot occupied, job refused");
            return Err(Error::QueueBusy { session_key });
        }

        let id = JobId(self.queue_state.next_id.fetch_add(1, Ordering::SeqCst));
        let links = descriptor.links.len();
        let (outcome_tx, outcome) = oneshot::channel();

        let job = QueuedJob {
            id,
            descriptor,
            outcome_tx,
        };
        self.queue_state.job_tx.try_send(job).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => {
                tracing::warn!(session_key = %session_key, "Worker queue is full");
                Error::QueueBusy {
                    session_key: session_key.clone(),
                }
            }
            mpsc::error::TrySendError::Closed(_) => Error::ShuttingDown,
        })?;

        tracing::info!(job_id = id.0, session_key = %session_key, links, "Job queued");
        self.emit(Event::JobQueued {
            id,
            session_key: session_key.clone(),
            links,
        });

        Ok(JobHandle {
            id,
            session_key,
            queued_at: Utc::now(),
            outcome,
        })
    }

    /// Number of jobs currently running
    pub fn active_jobs(&self) -> usize {
        self.queue_state.active_jobs.load(Ordering::SeqCst)
    }

    /// Whether new jobs are accepted
    pub fn is_accepting(&self) -> bool {
        self.queue_state.accepting_new.load(Ordering::SeqCst)
    }

    pub(crate) fn emit(&self, event: Event) {
        // No subscribers is fine
        let _ = self.event_tx.send(event);
    }
}
