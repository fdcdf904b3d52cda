//! Completion handler: the single point where a finished worker releases its
//! slot and the next queued job takes it.

use crate::worker::{CompletionSink, Worker};

use super::Shared;

impl CompletionSink for Shared {
    fn on_worker_finished(&self, worker: &Worker) {
        let mut state = self.lock_state();
        let id = worker.id();
        match state.active.get(&id) {
            Some(registered) if registered.ptr_eq(worker) => {}
            _ => {
                tracing::debug!(job_id = id, "ignoring completion from a worker that is not active");
                return;
            }
        }

        state.active.remove(&id);
        if worker.succeeded() == Some(true) {
            state.completed.insert(id);
        }
        state.byte_count += worker.bytes_transferred();
        state.history.insert(id, worker.clone());

        let dispatched = !state.stopped && self.dispatch_next(&mut state);
        if !dispatched && state.is_drained() {
            state.mark_finished();
        }
        drop(state);
        self.drained.notify_all();
    }
}
