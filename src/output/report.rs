use std::fmt;

use crate::executor::actions::StackStatus;
use crate::executor::parallel::StatusMap;

/// Execution summary report.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Report {
    pub complete: usize,
    pub failed: usize,
    pub in_progress: usize,
    pub pending: usize,
}

impl Report {
    /// Count the final statuses of a run.
    pub fn from_statuses(statuses: &StatusMap) -> Self {
        let mut report = Report::default();
        for status in statuses.values() {
            match status {
                StackStatus::Complete => report.complete += 1,
                StackStatus::Failed => report.failed += 1,
                StackStatus::InProgress => report.in_progress += 1,
                StackStatus::Pending => report.pending += 1,
            }
        }
        report
    }

    pub fn total(&self) -> usize {
        self.complete + self.failed + self.in_progress + self.pending
    }

    pub fn has_failures(&self) -> bool {
        self.failed > 0
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} stack(s): {} complete, {} failed",
            self.total(),
            self.complete,
            self.failed
        )?;
        if self.in_progress > 0 {
            write!(f, ", {} in progress", self.in_progress)?;
        }
        if self.pending > 0 {
            write!(f, ", {} pending", self.pending)?;
        }
        Ok(())
    }
}
