//! Run lifecycle events for the playbook event bus.
//!
//! `PlaybookEvent` is broadcast while a run executes. All variants are
//! Clone + Send + Sync for use with tokio broadcast channels.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::execution::{StepStatus, SummaryStatus};

/// Events emitted during playbook execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PlaybookEvent {
    /// A run has passed validation and started.
    RunStarted {
        run_id: Uuid,
        workflow_id: String,
        executed_by: String,
        total_steps: usize,
    },

    /// A step is about to be dispatched.
    StepStarted {
        run_id: Uuid,
        index: usize,
        step_id: String,
        step_type: String,
    },

    /// A step's result was appended to the ledger.
    StepFinished {
        run_id: Uuid,
        index: usize,
        step_id: String,
        status: StepStatus,
        duration_ms: u64,
    },

    /// The run finished and its summary was derived.
    RunFinished {
        run_id: Uuid,
        workflow_id: String,
        status: SummaryStatus,
        completed_steps: usize,
        duration_ms: u64,
    },
}

impl PlaybookEvent {
    pub fn run_id(&self) -> Uuid {
        match self {
            PlaybookEvent::RunStarted { run_id, .. }
            | PlaybookEvent::StepStarted { run_id, .. }
            | PlaybookEvent::StepFinished { run_id, .. }
            | PlaybookEvent::RunFinished { run_id, .. } => *run_id,
        }
    }
}
