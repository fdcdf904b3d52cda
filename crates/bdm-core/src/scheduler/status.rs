//! Per-job status snapshots.

use std::path::PathBuf;
use std::time::SystemTime;

use crate::job::{Job, JobId};
use crate::worker::Worker;

/// Where a job currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    /// Not dispatched in this run.
    Queued,
    Running,
    Paused,
    /// In the completed set (this run or a previous one).
    Completed,
    Failed,
    Cancelled,
}

impl JobState {
    pub fn as_str(self) -> &'static str {
        match self {
            JobState::Queued => "queued",
            JobState::Running => "running",
            JobState::Paused => "paused",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
            JobState::Cancelled => "cancelled",
        }
    }
}

/// Status of the job at one index, as seen by the caller.
#[derive(Debug, Clone)]
pub struct JobStatus {
    pub index: usize,
    pub job_id: JobId,
    pub url: String,
    pub destination: PathBuf,
    pub state: JobState,
    pub bytes_transferred: u64,
    /// `None` until a run finished in this process.
    pub success: Option<bool>,
    /// Present iff the last run failed.
    pub error: Option<String>,
    pub start_time: Option<SystemTime>,
    pub finish_time: Option<SystemTime>,
}

impl JobStatus {
    /// Status of a job with a live or finished worker.
    pub(super) fn from_worker(worker: &Worker, completed: bool) -> Self {
        let success = worker.succeeded();
        let state = match success {
            None if worker.is_paused() => JobState::Paused,
            None => JobState::Running,
            Some(true) if completed => JobState::Completed,
            // Succeeded earlier, then forced back into the queue.
            Some(true) => JobState::Queued,
            Some(false) if worker.was_cancelled() => JobState::Cancelled,
            Some(false) => JobState::Failed,
        };
        let job = worker.job();
        Self {
            index: job.index,
            job_id: job.id,
            url: job.url.clone(),
            destination: job.destination.clone(),
            state,
            bytes_transferred: worker.bytes_transferred(),
            success,
            error: worker.error(),
            start_time: worker.start_time(),
            finish_time: worker.finish_time(),
        }
    }

    /// Status of a job that has not run in this process.
    pub(super) fn idle(job: Job, completed: bool) -> Self {
        Self {
            index: job.index,
            job_id: job.id,
            url: job.url,
            destination: job.destination,
            state: if completed { JobState::Completed } else { JobState::Queued },
            bytes_transferred: 0,
            success: completed.then_some(true),
            error: None,
            start_time: None,
            finish_time: None,
        }
    }
}
