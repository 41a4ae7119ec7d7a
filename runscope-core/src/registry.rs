//! Run cache and run selection
//!
//! The registry keeps the latest snapshot of every run the server announced
//! and decides which run is being viewed. Selection requests are debounced:
//! a burst of requests (arrow keys held down, a flood of run updates in
//! follow mode) collapses into one subscription for the last requested run.
//!
//! Every selection that actually executes bumps the epoch. The epoch is sent
//! with the subscription request and used to tell fresh events from ones
//! that were already in flight for an earlier selection.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::debounce::Debouncer;
use crate::protocol::OutboundRequest;
use crate::types::{Run, RunId};

/// A selection that just executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Selection {
    pub run_id: RunId,
    pub epoch: u64,
}

impl Selection {
    /// The subscription request to send for this selection.
    pub fn request(&self) -> OutboundRequest {
        OutboundRequest::follow_run(self.run_id, self.epoch)
    }
}

#[derive(Debug)]
pub struct RunRegistry {
    runs: HashMap<RunId, Run>,
    /// First-seen order
    order: Vec<RunId>,
    current: Option<RunId>,
    epoch: u64,
    follow: bool,
    pending: Debouncer<RunId>,
}

impl RunRegistry {
    pub fn new(debounce: Duration) -> Self {
        Self {
            runs: HashMap::new(),
            order: Vec::new(),
            current: None,
            epoch: 0,
            follow: false,
            pending: Debouncer::new(debounce),
        }
    }

    /// Insert or replace a run snapshot. Returns `true` for a run not seen
    /// before.
    ///
    /// In follow mode any update schedules a switch to that run.
    pub fn upsert_run(&mut self, run: Run, now: Instant) -> bool {
        let id = run.id;
        let is_new = self.runs.insert(id, run).is_none();
        if is_new {
            self.order.push(id);
            tracing::debug!(run_id = id, "New run");
        }
        if self.follow {
            self.select_run(id, now);
        }
        is_new
    }

    /// Request a switch to `run_id`, debounced.
    pub fn select_run(&mut self, run_id: RunId, now: Instant) {
        self.pending.call(run_id, now);
    }

    /// Execute the pending selection if it is due.
    ///
    /// Returns `None` when nothing is due or the due run is already current.
    pub fn poll_selection(&mut self, now: Instant) -> Option<Selection> {
        let run_id = self.pending.poll(now)?;
        self.execute(run_id)
    }

    /// Select immediately, discarding any pending request.
    pub fn select_now(&mut self, run_id: RunId) -> Option<Selection> {
        self.pending.cancel();
        self.execute(run_id)
    }

    /// Start a fresh selection epoch for the current run.
    ///
    /// Used after a reconnect, when the server has forgotten the
    /// subscription.
    pub fn resubscribe(&mut self) -> Option<Selection> {
        let run_id = self.current?;
        self.epoch += 1;
        Some(Selection {
            run_id,
            epoch: self.epoch,
        })
    }

    fn execute(&mut self, run_id: RunId) -> Option<Selection> {
        if self.current == Some(run_id) {
            tracing::debug!(run_id, "Run already selected");
            return None;
        }
        self.epoch += 1;
        self.current = Some(run_id);
        tracing::info!(run_id, epoch = self.epoch, "Selected run");
        Some(Selection {
            run_id,
            epoch: self.epoch,
        })
    }

    pub fn get(&self, run_id: RunId) -> Option<&Run> {
        self.runs.get(&run_id)
    }

    pub fn current_run_id(&self) -> Option<RunId> {
        self.current
    }

    pub fn current_run(&self) -> Option<&Run> {
        self.current.and_then(|id| self.runs.get(&id))
    }

    /// The run a pending selection will switch to.
    pub fn pending_run_id(&self) -> Option<RunId> {
        self.pending.pending().copied()
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn follow(&self) -> bool {
        self.follow
    }

    pub fn set_follow(&mut self, follow: bool) {
        self.follow = follow;
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.pending.deadline()
    }

    /// Runs, most recently announced first.
    pub fn runs_newest_first(&self) -> Vec<&Run> {
        self.order
            .iter()
            .rev()
            .filter_map(|id| self.runs.get(id))
            .collect()
    }

    /// Display text for a run's configuration.
    pub fn configuration_display(&self, run_id: RunId) -> Option<String> {
        self.runs.get(&run_id).map(Run::configuration_display)
    }

    pub fn len(&self) -> usize {
        self.runs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }
}
