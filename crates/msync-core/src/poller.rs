use crate::model::Task;
use std::time::Duration;

/// Cadence of the active-task snapshot fetch while a session is live.
pub const POLL_PERIOD: Duration = Duration::from_secs(2);

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PollOutcome {
    /// The active set shrank from a non-empty previous snapshot: at
    /// least one job finished, reload the account registry once.
    Reconcile,
    Unchanged,
}

/// Snapshot slot for the completion heuristic. The comparison is on
/// cardinality, not per-task identity: if one job finishes and another
/// starts within the same tick the count stays level and the completion
/// goes unnoticed. That gap is accepted; tracking ids is future work.
#[derive(Debug, Default)]
pub struct TaskPoller {
    previous: Option<usize>,
}

impl TaskPoller {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a snapshot and report whether it implies a completion.
    /// Failed fetches must not be fed through here; the previous
    /// snapshot stays authoritative until a fetch succeeds.
    pub fn observe(&mut self, active: &[Task]) -> PollOutcome {
        let previous = self.previous.replace(active.len());
        match previous {
            Some(count) if count > 0 && active.len() < count => PollOutcome::Reconcile,
            _ => PollOutcome::Unchanged,
        }
    }

    /// Drop the snapshot. Called on logout so a later session starts
    /// from a clean slate instead of diffing against stale state.
    pub fn reset(&mut self) {
        self.previous = None;
    }
}
