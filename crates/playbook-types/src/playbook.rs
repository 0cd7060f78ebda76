//! Playbook input types.
//!
//! A playbook is an ordered list of [`StepSpec`]s executed under a single run
//! context. These types form the caller-facing contract: they are what the
//! CLI reads from YAML/JSON files and what the REST API accepts as a request
//! body. Keys are camelCase on the wire.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::RetryPolicy;

// ---------------------------------------------------------------------------
// Invocation request
// ---------------------------------------------------------------------------

/// A request to execute a playbook once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaybookRequest {
    /// Identifier of the workflow/playbook being run.
    #[serde(alias = "playbookId")]
    pub workflow_id: String,
    /// Ordered step list. Position in this list is the step index.
    pub steps: Vec<StepSpec>,
    /// Identity of the actor who triggered the run.
    pub executed_by: String,
    /// Opaque caller context, echoed back in the summary.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub context: HashMap<String, serde_json::Value>,
}

impl PlaybookRequest {
    /// Create a request with an empty context.
    pub fn new(
        workflow_id: impl Into<String>,
        steps: Vec<StepSpec>,
        executed_by: impl Into<String>,
    ) -> Self {
        Self {
            workflow_id: workflow_id.into(),
            steps,
            executed_by: executed_by.into(),
            context: HashMap::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Step specification
// ---------------------------------------------------------------------------

/// A single step of a playbook, as declared by the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepSpec {
    /// Optional caller-assigned ID. Defaults to `step_<n>` (1-based).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Declared step type. Unrecognised values are preserved, not rejected.
    #[serde(rename = "type")]
    pub step_type: StepType,
    /// Action name (meaningful for System steps).
    pub action: String,
    /// Human-readable title.
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Approver (Approval) or assignee (Human).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_to: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
    /// Free-form estimate, e.g. "10 minutes".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_duration: Option<String>,
    /// Delay steps: seconds to wait.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delay_seconds: Option<f64>,
    /// Notification steps: target channels.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channels: Option<Vec<String>>,
    /// Human steps: hours until the delegated task is due.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_hours: Option<f64>,
    /// Per-step execution timeout, overriding the engine default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
    /// Per-step retry policy for external calls, overriding the engine default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry: Option<RetryPolicy>,
}

impl StepSpec {
    /// Create a step with only the required fields set.
    pub fn new(step_type: StepType, action: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: None,
            step_type,
            action: action.into(),
            title: title.into(),
            description: None,
            assigned_to: None,
            priority: None,
            estimated_duration: None,
            delay_seconds: None,
            channels: None,
            duration_hours: None,
            timeout_secs: None,
            retry: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_assignee(mut self, assignee: impl Into<String>) -> Self {
        self.assigned_to = Some(assignee.into());
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn with_channels<I, S>(mut self, channels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.channels = Some(channels.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_delay_seconds(mut self, seconds: f64) -> Self {
        self.delay_seconds = Some(seconds);
        self
    }

    pub fn with_duration_hours(mut self, hours: f64) -> Self {
        self.duration_hours = Some(hours);
        self
    }

    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = Some(secs);
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = Some(retry);
        self
    }

    /// The step ID, falling back to `step_<index + 1>`.
    pub fn resolved_id(&self, index: usize) -> String {
        self.id
            .clone()
            .unwrap_or_else(|| format!("step_{}", index + 1))
    }

    /// Declared priority, defaulting to [`Priority::Medium`].
    pub fn priority(&self) -> Priority {
        self.priority.unwrap_or_default()
    }
}

// ---------------------------------------------------------------------------
// Step type
// ---------------------------------------------------------------------------

/// The capability set the engine knows how to dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StepKind {
    /// Auto-execute an action immediately.
    System,
    /// Queue for human approval; never performs the action.
    Approval,
    /// Delegate to a human operator.
    Human,
    /// Analysis by an external AI capability.
    #[serde(rename = "AI_Analysis")]
    AiAnalysis,
    /// Send a notification.
    Notification,
    /// Wait for a configured duration.
    Delay,
}

impl StepKind {
    pub const ALL: [StepKind; 6] = [
        StepKind::System,
        StepKind::Approval,
        StepKind::Human,
        StepKind::AiAnalysis,
        StepKind::Notification,
        StepKind::Delay,
    ];

    /// Canonical wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            StepKind::System => "System",
            StepKind::Approval => "Approval",
            StepKind::Human => "Human",
            StepKind::AiAnalysis => "AI_Analysis",
            StepKind::Notification => "Notification",
            StepKind::Delay => "Delay",
        }
    }

    /// Parse a wire name, including the legacy aliases `Function` and `GPT`.
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "System" | "Function" => Some(StepKind::System),
            "Approval" => Some(StepKind::Approval),
            "Human" => Some(StepKind::Human),
            "AI_Analysis" | "GPT" => Some(StepKind::AiAnalysis),
            "Notification" => Some(StepKind::Notification),
            "Delay" => Some(StepKind::Delay),
            _ => None,
        }
    }
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A step's declared type: either a known capability or an unsupported name.
///
/// Serialized as a plain string. Unknown names deserialize successfully so
/// that the runner can classify them as `unknown_type` instead of rejecting
/// the whole request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum StepType {
    Known(StepKind),
    Unknown(String),
}

impl StepType {
    pub fn as_str(&self) -> &str {
        match self {
            StepType::Known(kind) => kind.as_str(),
            StepType::Unknown(name) => name,
        }
    }

    pub fn kind(&self) -> Option<StepKind> {
        match self {
            StepType::Known(kind) => Some(*kind),
            StepType::Unknown(_) => None,
        }
    }
}

impl From<StepKind> for StepType {
    fn from(kind: StepKind) -> Self {
        StepType::Known(kind)
    }
}

impl From<String> for StepType {
    fn from(name: String) -> Self {
        match StepKind::parse(&name) {
            Some(kind) => StepType::Known(kind),
            None => StepType::Unknown(name),
        }
    }
}

impl From<&str> for StepType {
    fn from(name: &str) -> Self {
        StepType::from(name.to_string())
    }
}

impl From<StepType> for String {
    fn from(step_type: StepType) -> Self {
        match step_type {
            StepType::Known(kind) => kind.as_str().to_string(),
            StepType::Unknown(name) => name,
        }
    }
}

impl fmt::Display for StepType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Priority
// ---------------------------------------------------------------------------

/// Step priority as declared by the playbook author.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
            Priority::Critical => "critical",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
