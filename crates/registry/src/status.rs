use dashmap::DashMap;
use healrun_core_types::{RunId, RunStatus};

/// Read access to the persisted `Run.status` field.
pub trait RunStatusSource: Send + Sync {
    fn run_status(&self, run: &RunId) -> Option<RunStatus>;
}

/// In-memory view of run statuses. The dispatcher writes lifecycle
/// transitions here; the API layer may flip a run to `Cancelling` before the
/// run has registered its browser.
#[derive(Default)]
pub struct RunStatusBoard {
    statuses: DashMap<RunId, RunStatus>,
}

impl RunStatusBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, run: &RunId, status: RunStatus) -> Option<RunStatus> {
        self.statuses.insert(run.clone(), status)
    }

    /// Move `run` to `status` unless a cancellation is pending. A
    /// `Cancelling` run only gives way to a terminal status.
    pub fn transition(&self, run: &RunId, status: RunStatus) -> bool {
        let mut current = self.statuses.entry(run.clone()).or_insert(status);
        if *current == RunStatus::Cancelling && !status.is_terminal() {
            return false;
        }
        *current = status;
        true
    }

    /// Request cancellation unless the run already finished
    pub fn request_cancel(&self, run: &RunId) -> bool {
        match self.statuses.get_mut(run) {
            Some(mut status) if !status.is_terminal() => {
                *status = RunStatus::Cancelling;
                true
            }
            Some(_) => false,
            None => {
                self.statuses.insert(run.clone(), RunStatus::Cancelling);
                true
            }
        }
    }

    pub fn get(&self, run: &RunId) -> Option<RunStatus> {
        self.statuses.get(run).map(|status| *status)
    }

    pub fn remove(&self, run: &RunId) -> Option<RunStatus> {
        self.statuses.remove(run).map(|(_, status)| status)
    }

    pub fn snapshot(&self) -> Vec<(RunId, RunStatus)> {
        let mut entries: Vec<_> = self
            .statuses
            .iter()
            .map(|entry| (entry.key().clone(), *entry.value()))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries
    }
}

impl RunStatusSource for RunStatusBoard {
    fn run_status(&self, run: &RunId) -> Option<RunStatus> {
        self.get(run)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancel_request_does_not_reopen_finished_runs() {
        let board = RunStatusBoard::new();
        let done = RunId::from("done");
        board.set(&done, RunStatus::Passed);
        assert!(!board.request_cancel(&done));
        assert_eq!(board.get(&done), Some(RunStatus::Passed));

        let early = RunId::from("early");
        assert!(board.request_cancel(&early));
        assert_eq!(board.get(&early), Some(RunStatus::Cancelling));
    }

    #[test]
    fn pending_cancellation_is_not_overwritten_by_progress() {
        let board = RunStatusBoard::new();
        let run = RunId::from("r1");
        assert!(board.transition(&run, RunStatus::Pending));
        assert!(board.request_cancel(&run));
        assert!(!board.transition(&run, RunStatus::Running));
        assert_eq!(board.get(&run), Some(RunStatus::Cancelling));
        assert!(board.transition(&run, RunStatus::Cancelled));
        assert_eq!(board.get(&run), Some(RunStatus::Cancelled));
    }
}
