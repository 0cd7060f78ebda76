//! Ports for the external collaborators a step can reach.
//!
//! Each capability is an object-safe trait returning a boxed future so that
//! implementations can be chosen at runtime (an HTTP-backed AI analyst when
//! an API key is configured, the offline analyst otherwise). `Capabilities`
//! bundles one implementation of each port and is what the step registry is
//! built from.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures_util::future::BoxFuture;
use playbook_types::execution::RiskTier;
use playbook_types::playbook::Priority;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use super::builtin::{BuiltinActions, InMemoryTaskQueue, LogNotifier, OfflineAnalyst};

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Failure reported by a capability implementation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CapabilityError {
    /// Worth retrying: rate limits, timeouts, 5xx responses, network errors.
    #[error("transient failure: {0}")]
    Transient(String),

    /// Retrying will not help: bad request, rejected credentials, bad payload.
    #[error("{0}")]
    Failed(String),
}

impl CapabilityError {
    pub fn is_transient(&self) -> bool {
        matches!(self, CapabilityError::Transient(_))
    }

    pub fn message(&self) -> &str {
        match self {
            CapabilityError::Transient(msg) | CapabilityError::Failed(msg) => msg,
        }
    }
}

// ---------------------------------------------------------------------------
// System actions
// ---------------------------------------------------------------------------

/// An action a System step asks the engine to perform.
#[derive(Debug, Clone)]
pub struct ActionCall {
    pub run_id: Uuid,
    pub workflow_id: String,
    pub step_id: String,
    pub action: String,
    pub title: String,
    pub context: Arc<HashMap<String, serde_json::Value>>,
}

/// What an executed action reports back.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionReport {
    pub note: String,
    pub output: Option<serde_json::Value>,
}

pub trait ActionExecutor: Send + Sync {
    fn execute<'a>(&'a self, call: &'a ActionCall)
    -> BoxFuture<'a, Result<ActionReport, CapabilityError>>;
}

// ---------------------------------------------------------------------------
// AI analysis
// ---------------------------------------------------------------------------

/// Input to an analysis request.
#[derive(Debug, Clone)]
pub struct AnalysisRequest {
    pub workflow_id: String,
    pub step_id: String,
    pub action: String,
    pub title: String,
    pub description: Option<String>,
    pub priority: Priority,
    pub context: Arc<HashMap<String, serde_json::Value>>,
}

/// Analyst output. `confidence_score` may be out of range; the handler clamps it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub confidence_score: i64,
    pub recommendations: Vec<String>,
    pub risk: RiskTier,
}

pub trait AiAnalyst: Send + Sync {
    fn analyze<'a>(
        &'a self,
        request: &'a AnalysisRequest,
    ) -> BoxFuture<'a, Result<AnalysisReport, CapabilityError>>;
}

// ---------------------------------------------------------------------------
// Notifications
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NotificationMessage {
    pub workflow_id: String,
    pub step_id: String,
    pub channels: Vec<String>,
    pub subject: String,
    pub body: String,
}

/// Who (or what) a notification reached.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DispatchReceipt {
    pub recipients: Vec<String>,
}

pub trait NotificationDispatcher: Send + Sync {
    fn dispatch<'a>(
        &'a self,
        message: &'a NotificationMessage,
    ) -> BoxFuture<'a, Result<DispatchReceipt, CapabilityError>>;
}

// ---------------------------------------------------------------------------
// Task queue
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    Approval,
    Delegation,
}

/// Work handed to an external actor. Resolution is out of scope for the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedTask {
    pub run_id: Uuid,
    pub workflow_id: String,
    pub step_id: String,
    pub kind: TaskKind,
    pub assignee: String,
    pub deadline: DateTime<Utc>,
    pub title: String,
    pub priority: Priority,
    pub requested_by: String,
}

pub trait TaskQueue: Send + Sync {
    fn enqueue<'a>(&'a self, task: QueuedTask) -> BoxFuture<'a, Result<(), CapabilityError>>;
}

// ---------------------------------------------------------------------------
// Capability bundle
// ---------------------------------------------------------------------------

/// One implementation of every port.
#[derive(Clone)]
pub struct Capabilities {
    pub actions: Arc<dyn ActionExecutor>,
    pub analyst: Arc<dyn AiAnalyst>,
    pub notifier: Arc<dyn NotificationDispatcher>,
    pub tasks: Arc<dyn TaskQueue>,
}

impl Capabilities {
    /// In-process implementations with no external dependencies.
    pub fn builtin() -> Self {
        Self {
            actions: Arc::new(BuiltinActions),
            analyst: Arc::new(OfflineAnalyst),
            notifier: Arc::new(LogNotifier),
            tasks: Arc::new(InMemoryTaskQueue::new()),
        }
    }

    pub fn with_actions(mut self, actions: Arc<dyn ActionExecutor>) -> Self {
        self.actions = actions;
        self
    }

    pub fn with_analyst(mut self, analyst: Arc<dyn AiAnalyst>) -> Self {
        self.analyst = analyst;
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn NotificationDispatcher>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_tasks(mut self, tasks: Arc<dyn TaskQueue>) -> Self {
        self.tasks = tasks;
        self
    }
}

impl std::fmt::Debug for Capabilities {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Capabilities").finish_non_exhaustive()
    }
}
