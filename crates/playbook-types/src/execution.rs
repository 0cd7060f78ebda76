//! Execution record types: per-step ledger entries and the run summary.
//!
//! A [`StepResult`] is appended to the run's ledger for every attempted step;
//! an [`ExecutionSummary`] is derived from the ledger once the run finishes.
//! Keys are snake_case on the wire and durations are numeric milliseconds.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::playbook::{Priority, StepType};

// ---------------------------------------------------------------------------
// Step status
// ---------------------------------------------------------------------------

/// Outcome classification of a single attempted step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Completed,
    AwaitingApproval,
    Delegated,
    Error,
    UnknownType,
    Cancelled,
}

impl StepStatus {
    /// Queued for an external actor; not yet resolved.
    pub fn is_pending(&self) -> bool {
        matches!(self, StepStatus::AwaitingApproval | StepStatus::Delegated)
    }

    /// The run must not attempt any further step after this status.
    pub fn halts_run(&self) -> bool {
        matches!(
            self,
            StepStatus::Error | StepStatus::UnknownType | StepStatus::Cancelled
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StepStatus::Completed => "completed",
            StepStatus::AwaitingApproval => "awaiting_approval",
            StepStatus::Delegated => "delegated",
            StepStatus::Error => "error",
            StepStatus::UnknownType => "unknown_type",
            StepStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Step payloads
// ---------------------------------------------------------------------------

/// Risk tier reported by an analysis step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskTier {
    Minimal,
    Low,
    Medium,
    High,
}

impl RiskTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskTier::Minimal => "minimal",
            RiskTier::Low => "low",
            RiskTier::Medium => "medium",
            RiskTier::High => "high",
        }
    }
}

impl fmt::Display for RiskTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Type-specific data attached to a step result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StepPayload {
    /// A System step's executed action.
    Action {
        action: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        output: Option<serde_json::Value>,
    },
    /// Insights produced by an AI_Analysis step.
    AiInsights {
        confidence_score: u8,
        recommendations: Vec<String>,
        risk_assessment: RiskTier,
    },
    /// Delivery record of a Notification step.
    Notification {
        channels: Vec<String>,
        recipients: Vec<String>,
    },
    /// Queued approval request.
    Approval {
        approver: String,
        approval_deadline: DateTime<Utc>,
    },
    /// Queued delegation to a human.
    Delegation {
        assignee: String,
        due_date: DateTime<Utc>,
    },
    /// Time actually waited by a Delay step.
    Delay { delayed_ms: u64 },
}

// ---------------------------------------------------------------------------
// Step result (ledger entry)
// ---------------------------------------------------------------------------

/// Ledger entry for one attempted step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepResult {
    /// 0-based position of the step in the playbook.
    pub index: usize,
    pub step_id: String,
    pub title: String,
    #[serde(rename = "type")]
    pub step_type: StepType,
    pub status: StepStatus,
    pub started_at: DateTime<Utc>,
    /// Unset while the step is pending an external actor.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    pub duration_ms: u64,
    pub notes: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_to: Option<String>,
    pub priority: Priority,
    pub estimated_duration: String,
    /// External-call attempts made (1 when nothing was retried).
    pub attempts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<StepPayload>,
}

// ---------------------------------------------------------------------------
// Summary
// ---------------------------------------------------------------------------

/// Overall status of a finished run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SummaryStatus {
    FullyCompleted,
    PartiallyCompleted,
    Failed,
    Cancelled,
}

impl SummaryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SummaryStatus::FullyCompleted => "fully_completed",
            SummaryStatus::PartiallyCompleted => "partially_completed",
            SummaryStatus::Failed => "failed",
            SummaryStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for SummaryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whole-number percentage, serialized as `"67%"`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SuccessRate(u8);

impl SuccessRate {
    /// `round(completed / max(1, attempted) * 100)`.
    pub fn from_counts(completed: usize, attempted: usize) -> Self {
        let ratio = completed as f64 / attempted.max(1) as f64;
        Self((ratio * 100.0).round().clamp(0.0, 100.0) as u8)
    }

    pub fn percent(&self) -> u8 {
        self.0
    }
}

impl fmt::Display for SuccessRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}%", self.0)
    }
}

impl From<SuccessRate> for String {
    fn from(rate: SuccessRate) -> Self {
        rate.to_string()
    }
}

impl TryFrom<String> for SuccessRate {
    type Error = ParseSuccessRateError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        let digits = value.trim().trim_end_matches('%');
        let percent: u8 = digits
            .parse()
            .map_err(|_| ParseSuccessRateError(value.clone()))?;
        if percent > 100 {
            return Err(ParseSuccessRateError(value));
        }
        Ok(Self(percent))
    }
}

/// A success rate string that is not a percentage between 0% and 100%.
#[derive(Debug, thiserror::Error)]
#[error("invalid success rate: {0:?}")]
pub struct ParseSuccessRateError(String);

/// Derived, immutable record of a finished run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionSummary {
    pub run_id: Uuid,
    pub workflow_id: String,
    pub executed_by: String,
    #[serde(default)]
    pub execution_context: HashMap<String, serde_json::Value>,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub duration_ms: u64,
    /// Steps declared in the playbook, attempted or not.
    pub total_steps: usize,
    pub completed_steps: usize,
    /// Steps awaiting approval or delegated.
    pub pending_steps: usize,
    pub success_rate: SuccessRate,
    pub status: SummaryStatus,
    /// Index of the step that halted the run early, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub halted_at: Option<usize>,
    pub execution_log: Vec<StepResult>,
}

impl ExecutionSummary {
    /// Number of steps the run actually attempted.
    pub fn attempted_steps(&self) -> usize {
        self.execution_log.len()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
