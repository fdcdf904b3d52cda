//! Job dispatch: cursor scan, worker spawn, batch start.
//!
//! Every function here runs with the scheduler mutex held (they take the
//! locked `BatchState`).

use std::sync::{Arc, Weak};
use std::time::SystemTime;

use crate::job::{Job, JobId};
use crate::worker::{CompletionSink, Worker};

use super::state::BatchState;
use super::{SchedulerError, Shared};

impl Shared {
    pub(super) fn job_id(&self, state: &BatchState, index: usize) -> JobId {
        (self.options.job_id_fn)(index, &state.urls)
    }

    pub(super) fn checked_job_id(&self, state: &BatchState, index: usize) -> Result<JobId, SchedulerError> {
        if index >= state.urls.len() {
            return Err(SchedulerError::UnknownJob(index));
        }
        Ok(self.job_id(state, index))
    }

    pub(super) fn job_at(&self, state: &BatchState, index: usize) -> Job {
        let url = state.urls[index].clone();
        Job {
            id: self.job_id(state, index),
            index,
            destination: (self.options.destination_fn)(&state.destination_dir, &url),
            url,
        }
    }

    fn sink(&self) -> Weak<dyn CompletionSink> {
        self.this.clone()
    }

    /// Spawns a worker for `index` and registers it as active. A worker that
    /// cannot get a thread is recorded as failed and `false` is returned.
    pub(super) fn spawn_worker(&self, state: &mut BatchState, index: usize, start_paused: bool) -> bool {
        let job = self.job_at(state, index);
        let id = job.id;
        let url = job.url.clone();
        let worker = Worker::new(job, Arc::clone(&self.transport), self.options.chunk_size);
        if start_paused {
            worker.pause();
        }
        match worker.start(self.sink()) {
            Ok(_) => {
                tracing::info!(job_id = id, index, "dispatched {}", url);
                state.active.insert(id, worker);
                true
            }
            Err(e) => {
                tracing::warn!(job_id = id, index, "could not start worker: {}", e);
                state.history.insert(id, worker);
                false
            }
        }
    }

    /// Advances the cursor to the next eligible job and dispatches it.
    /// Returns `false` once the list is exhausted or the bound is reached.
    pub(super) fn dispatch_next(&self, state: &mut BatchState) -> bool {
        while state.next_index < state.urls.len() && !state.is_saturated() {
            let index = state.next_index;
            state.next_index += 1;
            let id = self.job_id(state, index);
            if !state.is_eligible(id) {
                continue;
            }
            let start_paused = state.paused;
            if self.spawn_worker(state, index, start_paused) {
                return true;
            }
        }
        false
    }

    pub(super) fn start_all_locked(&self, state: &mut BatchState) -> Result<(), SchedulerError> {
        if state.urls.is_empty() {
            tracing::warn!("batch not started: no URLs were given");
            return Err(SchedulerError::NoJobs);
        }
        if !state.active.is_empty() {
            return Err(SchedulerError::Busy);
        }

        state.paused = false;
        state.stopped = false;
        state.finished = false;
        state.next_index = 0;
        state.start_time = Some(SystemTime::now());
        state.finish_time = None;

        let remaining = (0..state.urls.len())
            .filter(|&i| !state.completed.contains(&self.job_id(state, i)))
            .count();
        tracing::info!(
            "starting batch: {} job(s), {} remaining, up to {} at once",
            state.urls.len(),
            remaining,
            state.max_concurrency
        );
        for _ in 0..state.max_concurrency.min(remaining) {
            if !self.dispatch_next(state) {
                break;
            }
        }
        if state.active.is_empty() {
            state.mark_finished();
        }
        Ok(())
    }

    pub(super) fn start_locked(&self, state: &mut BatchState, index: usize) -> Result<(), SchedulerError> {
        let id = self.checked_job_id(state, index)?;
        state.completed.remove(&id);
        state.stopped = false;
        state.finished = false;
        state.finish_time = None;

        if let Some(worker) = state.active.get(&id) {
            worker.resume();
            return Ok(());
        }
        if state.is_saturated() {
            tracing::debug!(
                "job {} not started: {} of {} slots busy",
                index,
                state.active.len() + state.held_slots,
                state.max_concurrency
            );
            return Ok(());
        }
        if state.start_time.is_none() {
            state.start_time = Some(SystemTime::now());
        }
        if !self.spawn_worker(state, index, false) && state.is_drained() {
            state.mark_finished();
        }
        Ok(())
    }
}
