//! Bounded-concurrency batch scheduler.
//!
//! Owns the URL list, the completed set and the active workers. At most
//! `max_concurrency` workers run at once; when one finishes, its completion
//! handler (`finish.rs`) records the result and starts the next queued job.
//! All bookkeeping lives behind one mutex, so completions are processed one at
//! a time and the bound cannot be overshot by two completions racing.

mod dispatch;
mod error;
mod finish;
mod progress;
mod state;
mod status;

pub use error::SchedulerError;
pub use progress::ProgressStats;
pub use status::{JobState, JobStatus};

use std::collections::{BTreeSet, HashSet};
use std::path::PathBuf;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError, Weak};
use std::time::{Duration, SystemTime};

use crate::job::{default_destination, positional_job_id, DestinationFn, JobId, JobIdFn};
use crate::transfer::Transport;
use crate::worker::{Worker, DEFAULT_CHUNK_SIZE};

use state::BatchState;

/// Strategies and tuning that stay fixed for the scheduler's lifetime.
#[derive(Clone)]
pub struct SchedulerOptions {
    /// Read buffer size per worker.
    pub chunk_size: usize,
    /// Job identity. Default: position in the list.
    pub job_id_fn: JobIdFn,
    /// Destination path. Default: download dir + last URL path segment.
    pub destination_fn: DestinationFn,
}

impl Default for SchedulerOptions {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            job_id_fn: Arc::new(positional_job_id),
            destination_fn: Arc::new(default_destination),
        }
    }
}

/// What to download and how wide.
#[derive(Debug, Clone, Default)]
pub struct BatchConfig {
    pub urls: Vec<String>,
    /// Job ids finished in an earlier run; they are skipped.
    pub completed_ids: Vec<JobId>,
    pub destination_dir: PathBuf,
    /// Concurrency bound (0 is treated as 1).
    pub max_concurrency: usize,
}

struct Shared {
    state: Mutex<BatchState>,
    /// Signalled after every completion.
    drained: Condvar,
    transport: Arc<dyn Transport>,
    options: SchedulerOptions,
    this: Weak<Shared>,
}

impl Shared {
    fn lock_state(&self) -> MutexGuard<'_, BatchState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn wait_while<'a>(
        &self,
        guard: MutexGuard<'a, BatchState>,
        condition: impl FnMut(&mut BatchState) -> bool,
    ) -> MutexGuard<'a, BatchState> {
        self.drained
            .wait_while(guard, condition)
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for Shared {
    fn drop(&mut self) {
        let state = self.state.get_mut().unwrap_or_else(PoisonError::into_inner);
        if !state.active.is_empty() {
            tracing::debug!("scheduler dropped; cancelling {} worker(s)", state.active.len());
        }
        for worker in state.active.values() {
            worker.cancel();
        }
    }
}

/// Handle to a batch. Clones share the same batch.
#[derive(Clone)]
pub struct Scheduler {
    shared: Arc<Shared>,
}

impl Scheduler {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self::with_options(transport, SchedulerOptions::default())
    }

    pub fn with_options(transport: Arc<dyn Transport>, options: SchedulerOptions) -> Self {
        let shared = Arc::new_cyclic(|this| Shared {
            state: Mutex::new(BatchState::default()),
            drained: Condvar::new(),
            transport,
            options,
            this: this.clone(),
        });
        Self { shared }
    }

    /// Replaces the job list, completed set, destination and bound.
    /// Fails with `Busy` while workers are active.
    pub fn configure(&self, config: BatchConfig) -> Result<(), SchedulerError> {
        let mut state = self.shared.lock_state();
        if !state.active.is_empty() {
            return Err(SchedulerError::Busy);
        }
        tracing::debug!(
            "configured batch: {} URL(s), {} completed, bound {}",
            config.urls.len(),
            config.completed_ids.len(),
            config.max_concurrency
        );
        state.reconfigure(config);
        Ok(())
    }

    /// Appends a URL. A running batch picks it up when a slot frees.
    pub fn add(&self, url: impl Into<String>) {
        self.shared.lock_state().urls.push(url.into());
    }

    /// Removes the URL at `index` while the batch is idle. The completed set is
    /// re-keyed so the remaining jobs keep their status under the id function.
    pub fn remove(&self, index: usize) -> Result<String, SchedulerError> {
        let mut state = self.shared.lock_state();
        if !state.active.is_empty() {
            return Err(SchedulerError::Busy);
        }
        self.shared.checked_job_id(&state, index)?;

        let done: Vec<bool> = (0..state.urls.len())
            .map(|i| state.completed.contains(&self.shared.job_id(&state, i)))
            .collect();
        let url = state.urls.remove(index);
        let kept = done
            .into_iter()
            .enumerate()
            .filter(|&(i, _)| i != index)
            .map(|(_, was_done)| was_done);
        let completed: HashSet<JobId> = kept
            .enumerate()
            .filter(|&(_, was_done)| was_done)
            .map(|(new_index, _)| self.shared.job_id(&state, new_index))
            .collect();
        state.completed = completed;
        state.history.clear();
        if index < state.next_index {
            state.next_index -= 1;
        }
        Ok(url)
    }

    /// Starts the batch from the top, skipping completed jobs.
    /// Returns `NoJobs` (after logging) when the list is empty.
    pub fn start_all(&self) -> Result<(), SchedulerError> {
        let mut state = self.shared.lock_state();
        self.shared.start_all_locked(&mut state)
    }

    pub fn pause_all(&self) {
        let mut state = self.shared.lock_state();
        state.paused = true;
        for worker in state.active.values() {
            worker.pause();
        }
    }

    pub fn resume_all(&self) {
        let mut state = self.shared.lock_state();
        state.paused = false;
        for worker in state.active.values() {
            worker.resume();
        }
    }

    /// Cancels every active worker and stops dispatching queued jobs until
    /// the next `start_all`.
    pub fn stop_all(&self) {
        let mut state = self.shared.lock_state();
        if !state.stopped {
            tracing::info!("stopping batch ({} active)", state.active.len());
        }
        state.stopped = true;
        for worker in state.active.values() {
            worker.cancel();
        }
    }

    /// `stop_all`, wait until every active worker has reported, then `start_all`.
    pub fn restart_all(&self) -> Result<(), SchedulerError> {
        self.stop_all();
        let state = self.shared.lock_state();
        let mut state = self.shared.wait_while(state, |s| !s.active.is_empty());
        self.shared.start_all_locked(&mut state)
    }

    /// Forces the job at `index` to download again. Spawns a worker if a slot
    /// is free (no preemption), resumes it if it is already active and paused.
    pub fn start(&self, index: usize) -> Result<(), SchedulerError> {
        let mut state = self.shared.lock_state();
        self.shared.start_locked(&mut state, index)
    }

    pub fn pause(&self, index: usize) -> bool {
        self.with_active(index, Worker::pause)
    }

    pub fn resume(&self, index: usize) -> bool {
        self.with_active(index, Worker::resume)
    }

    /// Cancels the job's worker. The freed slot goes to the next queued job
    /// unless the batch is stopped.
    pub fn stop(&self, index: usize) -> bool {
        self.with_active(index, Worker::cancel)
    }

    /// Stops the job, waits for its worker to report, then starts it again in
    /// the slot it held.
    pub fn restart(&self, index: usize) -> Result<(), SchedulerError> {
        let mut state = self.shared.lock_state();
        let id = self.shared.checked_job_id(&state, index)?;
        let was_active = state.active.get(&id).map(Worker::cancel).is_some();
        if was_active {
            state.held_slots += 1;
            state = self.shared.wait_while(state, |s| s.active.contains_key(&id));
            state.held_slots -= 1;
        }
        self.shared.start_locked(&mut state, index)
    }

    /// Blocks until no worker is active.
    pub fn wait_idle(&self) {
        let state = self.shared.lock_state();
        let _state = self.shared.wait_while(state, |s| !s.active.is_empty());
    }

    /// Like `wait_idle` with a limit; returns true if the batch went idle.
    pub fn wait_idle_timeout(&self, timeout: Duration) -> bool {
        let state = self.shared.lock_state();
        let (state, _) = self
            .shared
            .drained
            .wait_timeout_while(state, timeout, |s| !s.active.is_empty())
            .unwrap_or_else(PoisonError::into_inner);
        state.active.is_empty()
    }

    pub fn job_count(&self) -> usize {
        self.shared.lock_state().urls.len()
    }

    pub fn active_count(&self) -> usize {
        self.shared.lock_state().active.len()
    }

    pub fn is_paused(&self) -> bool {
        self.shared.lock_state().paused
    }

    pub fn is_stopped(&self) -> bool {
        self.shared.lock_state().stopped
    }

    /// True once every job is completed or skipped and no worker is active.
    pub fn is_finished(&self) -> bool {
        self.shared.lock_state().finished
    }

    pub fn start_time(&self) -> Option<SystemTime> {
        self.shared.lock_state().start_time
    }

    pub fn finish_time(&self) -> Option<SystemTime> {
        self.shared.lock_state().finish_time
    }

    /// Bytes transferred by finished runs since `configure`.
    pub fn byte_count(&self) -> u64 {
        self.shared.lock_state().byte_count
    }

    /// Completed job ids, for the caller to persist.
    pub fn completed_ids(&self) -> BTreeSet<JobId> {
        self.shared.lock_state().completed.iter().copied().collect()
    }

    pub fn job_id(&self, index: usize) -> Option<JobId> {
        let state = self.shared.lock_state();
        self.shared.checked_job_id(&state, index).ok()
    }

    /// Status of the job at `index`, or `None` if out of range.
    pub fn job_status(&self, index: usize) -> Option<JobStatus> {
        let state = self.shared.lock_state();
        let id = self.shared.checked_job_id(&state, index).ok()?;
        let completed = state.completed.contains(&id);
        let status = match state.active.get(&id).or_else(|| state.history.get(&id)) {
            Some(worker) => JobStatus::from_worker(worker, completed),
            None => JobStatus::idle(self.shared.job_at(&state, index), completed),
        };
        Some(status)
    }

    pub fn progress(&self) -> ProgressStats {
        let state = self.shared.lock_state();
        let mut jobs_done = 0;
        let mut jobs_failed = 0;
        for index in 0..state.urls.len() {
            let id = self.shared.job_id(&state, index);
            if state.completed.contains(&id) {
                jobs_done += 1;
            } else if !state.active.contains_key(&id)
                && state.history.get(&id).and_then(Worker::succeeded) == Some(false)
            {
                jobs_failed += 1;
            }
        }
        let in_flight: u64 = state.active.values().map(Worker::bytes_transferred).sum();
        let elapsed_secs = state
            .start_time
            .map(|start| {
                let end = state.finish_time.unwrap_or_else(SystemTime::now);
                end.duration_since(start).unwrap_or_default().as_secs_f64()
            })
            .unwrap_or(0.0);
        ProgressStats {
            bytes_done: state.byte_count + in_flight,
            jobs_done,
            jobs_failed,
            job_count: state.urls.len(),
            active: state.active.len(),
            elapsed_secs,
        }
    }

    fn with_active(&self, index: usize, signal: impl FnOnce(&Worker)) -> bool {
        let state = self.shared.lock_state();
        let Ok(id) = self.shared.checked_job_id(&state, index) else {
            return false;
        };
        match state.active.get(&id) {
            Some(worker) => {
                signal(worker);
                true
            }
            None => {
                tracing::debug!("job {} has no active worker", index);
                false
            }
        }
    }
}
