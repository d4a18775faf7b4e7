//! Job progress counters and the terminal-status rule.

use serde::{Deserialize, Serialize};

use crate::domain::JobStatus;

/// Final result of a single chunk, as reported to its job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkOutcome {
    Completed,
    Failed,
}

/// The three counters a job carries.
///
/// `completed + failed <= total` always holds for persisted jobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct JobProgress {
    pub total: i32,
    pub completed: i32,
    pub failed: i32,
}

impl JobProgress {
    #[must_use]
    pub fn new(total: i32) -> Self {
        Self {
            total,
            completed: 0,
            failed: 0,
        }
    }

    /// Every chunk has reached a final state.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.completed + self.failed >= self.total
    }

    /// Records one chunk outcome. Outcomes beyond `total` are ignored so the
    /// counter invariant cannot be broken by a duplicate report.
    ///
    /// Returns `true` when the outcome was counted.
    pub fn record(&mut self, outcome: ChunkOutcome) -> bool {
        if self.is_terminal() {
            return false;
        }
        match outcome {
            ChunkOutcome::Completed => self.completed += 1,
            ChunkOutcome::Failed => self.failed += 1,
        }
        true
    }

    /// Status implied by the counters once every chunk is final.
    ///
    /// `None` while chunks are still outstanding. Otherwise `Completed` when
    /// nothing failed, `Failed` when everything failed and `Partial` in
    /// between.
    #[must_use]
    pub fn terminal_status(&self) -> Option<JobStatus> {
        if !self.is_terminal() {
            return None;
        }
        Some(if self.failed == 0 {
            JobStatus::Completed
        } else if self.failed >= self.total {
            JobStatus::Failed
        } else {
            JobStatus::Partial
        })
    }

    /// Status to persist after this progress is recorded.
    #[must_use]
    pub fn status(&self) -> JobStatus {
        self.terminal_status().unwrap_or(JobStatus::Running)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn progress_after(total: i32, outcomes: &[ChunkOutcome]) -> JobProgress {
        let mut progress = JobProgress::new(total);
        for outcome in outcomes {
            progress.record(*outcome);
        }
        progress
    }

    use ChunkOutcome::{Completed as Done, Failed as Fail};

    #[test]
    fn not_terminal_until_all_chunks_report() {
        let progress = progress_after(3, &[Done, Done]);
        assert!(!progress.is_terminal());
        assert_eq!(progress.terminal_status(), None);
        assert_eq!(progress.status(), JobStatus::Running);
    }

    #[test]
    fn all_succeeded_is_completed() {
        let progress = progress_after(3, &[Done, Done, Done]);
        assert_eq!(progress.terminal_status(), Some(JobStatus::Completed));
    }

    #[test]
    fn some_failed_is_partial() {
        let progress = progress_after(3, &[Done, Fail, Done]);
        assert_eq!(progress.terminal_status(), Some(JobStatus::Partial));
        assert_eq!((progress.completed, progress.failed), (2, 1));
    }

    #[test]
    fn all_failed_is_failed() {
        let progress = progress_after(2, &[Fail, Fail]);
        assert_eq!(progress.terminal_status(), Some(JobStatus::Failed));
    }

    #[test]
    fn status_is_independent_of_arrival_order() {
        let orders: [&[ChunkOutcome]; 3] = [
            &[Fail, Done, Done, Fail],
            &[Done, Done, Fail, Fail],
            &[Done, Fail, Fail, Done],
        ];
        for order in orders {
            let progress = progress_after(4, order);
            assert_eq!(progress.terminal_status(), Some(JobStatus::Partial));
            assert_eq!((progress.completed, progress.failed), (2, 2));
        }
    }

    #[test]
    fn extra_outcomes_do_not_break_counter_invariant() {
        let mut progress = progress_after(1, &[Done]);
        assert!(!progress.record(Fail));
        assert_eq!((progress.completed, progress.failed), (1, 0));
        assert!(progress.completed + progress.failed <= progress.total);
    }

    #[test]
    fn empty_job_is_immediately_completed() {
        let progress = JobProgress::new(0);
        assert_eq!(progress.terminal_status(), Some(JobStatus::Completed));
    }
}
