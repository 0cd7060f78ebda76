//! Append-only record of step outcomes for one run.
//!
//! The ledger is the only source the summary is derived from. It rejects
//! entries that would break its ordering guarantees: indices must be
//! contiguous and increasing, nothing may follow an entry that halts the run,
//! and no entry may complete before it started.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use playbook_types::execution::{
    ExecutionSummary, StepResult, StepStatus, SuccessRate, SummaryStatus,
};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    #[error("ledger is closed: step {halted_at} halted the run")]
    Closed { halted_at: usize },

    #[error("out-of-order entry: expected index {expected}, got {actual}")]
    OutOfOrder { expected: usize, actual: usize },

    #[error("step {index} completed before it started")]
    InvertedTimestamps { index: usize },

    #[error("no ledger entry for step {index}")]
    UnknownEntry { index: usize },

    #[error("step {index} already has a completion time")]
    AlreadyCompleted { index: usize },
}

/// Run-level facts the summary needs that are not per-step.
#[derive(Debug, Clone)]
pub struct RunHeader {
    pub run_id: Uuid,
    pub workflow_id: String,
    pub executed_by: String,
    pub context: HashMap<String, serde_json::Value>,
    pub started_at: DateTime<Utc>,
    pub total_steps: usize,
}

#[derive(Debug, Clone, Default)]
pub struct ExecutionLedger {
    entries: Vec<StepResult>,
}

impl ExecutionLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append the outcome of the next attempted step.
    pub fn append(&mut self, result: StepResult) -> Result<(), LedgerError> {
        if let Some(halted_at) = self.halted_at() {
            return Err(LedgerError::Closed { halted_at });
        }
        if let Some(last) = self.entries.last() {
            let expected = last.index + 1;
            if result.index != expected {
                return Err(LedgerError::OutOfOrder {
                    expected,
                    actual: result.index,
                });
            }
        }
        if let Some(completed_at) = result.completed_at {
            if completed_at < result.started_at {
                return Err(LedgerError::InvertedTimestamps {
                    index: result.index,
                });
            }
        }
        self.entries.push(result);
        Ok(())
    }

    /// Fill `completed_at` for an entry whose handler finished after it was
    /// recorded. The status is left untouched.
    pub fn mark_completed_at(
        &mut self,
        index: usize,
        completed_at: DateTime<Utc>,
    ) -> Result<(), LedgerError> {
        let entry = self
            .entries
            .iter_mut()
            .find(|e| e.index == index)
            .ok_or(LedgerError::UnknownEntry { index })?;
        if entry.completed_at.is_some() {
            return Err(LedgerError::AlreadyCompleted { index });
        }
        if completed_at < entry.started_at {
            return Err(LedgerError::InvertedTimestamps { index });
        }
        entry.completed_at = Some(completed_at);
        Ok(())
    }

    pub fn entries(&self) -> &[StepResult] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Index of the entry that halted the run, if any. Always the last entry.
    pub fn halted_at(&self) -> Option<usize> {
        self.entries
            .last()
            .filter(|e| e.status.halts_run())
            .map(|e| e.index)
    }

    pub fn completed_count(&self) -> usize {
        self.count_where(|s| s == StepStatus::Completed)
    }

    pub fn pending_count(&self) -> usize {
        self.count_where(|s| s.is_pending())
    }

    pub fn success_rate(&self) -> SuccessRate {
        SuccessRate::from_counts(self.completed_count(), self.len())
    }

    /// Overall status: cancelled, then failed, then partially completed
    /// (anything pending), else fully completed.
    pub fn status(&self) -> SummaryStatus {
        if self.count_where(|s| s == StepStatus::Cancelled) > 0 {
            SummaryStatus::Cancelled
        } else if self.count_where(|s| matches!(s, StepStatus::Error | StepStatus::UnknownType)) > 0
        {
            SummaryStatus::Failed
        } else if self.pending_count() > 0 {
            SummaryStatus::PartiallyCompleted
        } else {
            SummaryStatus::FullyCompleted
        }
    }

    /// Consume the ledger into the run's summary.
    pub fn into_summary(self, header: RunHeader, completed_at: DateTime<Utc>) -> ExecutionSummary {
        let duration_ms = (completed_at - header.started_at).num_milliseconds().max(0) as u64;
        ExecutionSummary {
            run_id: header.run_id,
            workflow_id: header.workflow_id,
            executed_by: header.executed_by,
            execution_context: header.context,
            started_at: header.started_at,
            completed_at,
            duration_ms,
            total_steps: header.total_steps,
            completed_steps: self.completed_count(),
            pending_steps: self.pending_count(),
            success_rate: self.success_rate(),
            status: self.status(),
            halted_at: self.halted_at(),
            execution_log: self.entries,
        }
    }

    fn count_where(&self, pred: impl Fn(StepStatus) -> bool) -> usize {
        self.entries.iter().filter(|e| pred(e.status)).count()
    }
}
