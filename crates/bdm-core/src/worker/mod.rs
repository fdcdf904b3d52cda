//! Single-job worker.
//!
//! A `Worker` streams one URL to one destination on its own OS thread while
//! honouring pause and cancel from its `JobSignal`. Whatever the outcome, it
//! reports to its `CompletionSink` exactly once; it never edits scheduler
//! bookkeeping itself.

mod copy;

use std::fmt;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::thread;
use std::time::SystemTime;

use crate::control::{JobAborted, JobSignal};
use crate::job::{Job, JobId};
use crate::transfer::Transport;

/// Default read/write chunk size (256 KiB).
pub const DEFAULT_CHUNK_SIZE: usize = 256 * 1024;

/// Receives a worker once its run has ended.
pub trait CompletionSink: Send + Sync {
    fn on_worker_finished(&self, worker: &Worker);
}

/// Why a job did not succeed.
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    /// Network, stream or destination failure.
    #[error("transfer failed: {0}")]
    Transfer(#[from] io::Error),
    /// Stop was requested while the job was running or paused.
    #[error("cancelled")]
    Cancelled,
}

impl From<JobAborted> for JobError {
    fn from(_: JobAborted) -> Self {
        JobError::Cancelled
    }
}

/// Result of a worker run.
#[derive(Debug, Default)]
pub enum JobOutcome {
    #[default]
    Pending,
    Succeeded,
    Failed(JobError),
}

#[derive(Debug, Default)]
struct RunRecord {
    outcome: JobOutcome,
    start_time: Option<SystemTime>,
    finish_time: Option<SystemTime>,
}

struct WorkerInner {
    job: Job,
    chunk_size: usize,
    transport: Arc<dyn Transport>,
    signal: JobSignal,
    bytes_transferred: AtomicU64,
    started: AtomicBool,
    record: Mutex<RunRecord>,
}

/// Shared handle to one job run. Cloning is cheap; all clones see the same run.
#[derive(Clone)]
pub struct Worker {
    inner: Arc<WorkerInner>,
}

impl Worker {
    pub fn new(job: Job, transport: Arc<dyn Transport>, chunk_size: usize) -> Self {
        Self {
            inner: Arc::new(WorkerInner {
                job,
                chunk_size,
                transport,
                signal: JobSignal::new(),
                bytes_transferred: AtomicU64::new(0),
                started: AtomicBool::new(false),
                record: Mutex::new(RunRecord::default()),
            }),
        }
    }

    pub fn job(&self) -> &Job {
        &self.inner.job
    }

    pub fn id(&self) -> JobId {
        self.inner.job.id
    }

    /// Spawns the worker thread. Returns `Ok(false)` if it was already started.
    ///
    /// If the thread cannot be spawned the run is recorded as a failed
    /// transfer and the spawn error is returned; `sink` is not called.
    pub fn start(&self, sink: Weak<dyn CompletionSink>) -> io::Result<bool> {
        if self.inner.started.swap(true, Ordering::AcqRel) {
            return Ok(false);
        }
        let worker = self.clone();
        let spawned = thread::Builder::new()
            .name(format!("bdm-job-{}", self.id()))
            .spawn(move || worker.run(sink));
        match spawned {
            Ok(_) => Ok(true),
            Err(e) => {
                let mut record = self.inner.record();
                record.finish_time = Some(SystemTime::now());
                record.outcome = JobOutcome::Failed(JobError::Transfer(io::Error::new(
                    e.kind(),
                    format!("spawn worker thread: {}", e),
                )));
                Err(e)
            }
        }
    }

    pub fn pause(&self) {
        self.inner.signal.pause();
    }

    pub fn resume(&self) {
        self.inner.signal.resume();
    }

    pub fn cancel(&self) {
        self.inner.signal.cancel();
    }

    pub fn is_paused(&self) -> bool {
        self.inner.signal.is_paused()
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.signal.is_cancelled()
    }

    pub fn is_started(&self) -> bool {
        self.inner.started.load(Ordering::Acquire)
    }

    pub fn is_finished(&self) -> bool {
        !matches!(self.inner.record().outcome, JobOutcome::Pending)
    }

    pub fn bytes_transferred(&self) -> u64 {
        self.inner.bytes_transferred.load(Ordering::Relaxed)
    }

    /// `None` while running, then whether the run finished cleanly.
    pub fn succeeded(&self) -> Option<bool> {
        match self.inner.record().outcome {
            JobOutcome::Pending => None,
            JobOutcome::Succeeded => Some(true),
            JobOutcome::Failed(_) => Some(false),
        }
    }

    pub fn was_cancelled(&self) -> bool {
        matches!(self.inner.record().outcome, JobOutcome::Failed(JobError::Cancelled))
    }

    /// Error message, present iff the run failed.
    pub fn error(&self) -> Option<String> {
        match &self.inner.record().outcome {
            JobOutcome::Failed(e) => Some(e.to_string()),
            _ => None,
        }
    }

    pub fn start_time(&self) -> Option<SystemTime> {
        self.inner.record().start_time
    }

    pub fn finish_time(&self) -> Option<SystemTime> {
        self.inner.record().finish_time
    }

    /// True if both handles refer to the same run.
    pub fn ptr_eq(&self, other: &Worker) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    fn run(self, sink: Weak<dyn CompletionSink>) {
        self.inner.record().start_time = Some(SystemTime::now());
        let job = &self.inner.job;
        tracing::debug!(job_id = job.id, url = %job.url, "worker started");

        let result = copy::copy_stream(
            job,
            self.inner.transport.as_ref(),
            &self.inner.signal,
            self.inner.chunk_size,
            &self.inner.bytes_transferred,
        );

        let bytes = self.bytes_transferred();
        match &result {
            Ok(()) => tracing::info!(
                "job {} completed: {} ({} bytes)",
                job.id,
                job.destination.display(),
                bytes
            ),
            Err(JobError::Cancelled) => {
                tracing::info!("job {} cancelled after {} bytes", job.id, bytes)
            }
            Err(e) => tracing::warn!(job_id = job.id, url = %job.url, "job failed: {}", e),
        }

        {
            let mut record = self.inner.record();
            record.finish_time = Some(SystemTime::now());
            record.outcome = match result {
                Ok(()) => JobOutcome::Succeeded,
                Err(e) => JobOutcome::Failed(e),
            };
        }

        match sink.upgrade() {
            Some(sink) => sink.on_worker_finished(&self),
            None => tracing::debug!(job_id = job.id, "scheduler gone; completion dropped"),
        }
    }
}

impl WorkerInner {
    fn record(&self) -> MutexGuard<'_, RunRecord> {
        self.record.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for Worker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Worker")
            .field("job", &self.inner.job)
            .field("bytes_transferred", &self.bytes_transferred())
            .field("started", &self.is_started())
            .field("paused", &self.is_paused())
            .finish()
    }
}
