//! One handler per step type.
//!
//! A handler turns a `StepSpec` into a `StepOutcome` by calling the capability
//! it wraps. Handlers never touch the ledger and never decide whether the run
//! continues; they only report what happened to their step. Timeouts and
//! cancellation around a handler are the registry's job.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use futures_util::future::BoxFuture;
use playbook_types::config::{EngineConfig, RetryPolicy};
use playbook_types::execution::{StepPayload, StepStatus};
use playbook_types::playbook::{StepKind, StepSpec};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::capability::{
    ActionCall, ActionExecutor, AiAnalyst, AnalysisRequest, NotificationDispatcher,
    NotificationMessage, QueuedTask, TaskKind, TaskQueue,
};
use super::retry::{RetryError, RetryHandler};

/// Wait used by Delay steps that do not set `delaySeconds`.
pub const DEFAULT_DELAY_SECS: f64 = 1.0;

// ---------------------------------------------------------------------------
// StepOutcome / StepError
// ---------------------------------------------------------------------------

/// What a handler reports for its step.
#[derive(Debug, Clone, PartialEq)]
pub struct StepOutcome {
    pub status: StepStatus,
    pub notes: String,
    pub assigned_to: Option<String>,
    pub payload: Option<StepPayload>,
    pub attempts: u32,
}

impl StepOutcome {
    pub fn new(status: StepStatus, notes: impl Into<String>) -> Self {
        Self {
            status,
            notes: notes.into(),
            assigned_to: None,
            payload: None,
            attempts: 1,
        }
    }

    pub fn with_payload(mut self, payload: StepPayload) -> Self {
        self.payload = Some(payload);
        self
    }

    pub fn with_assignee(mut self, assignee: impl Into<String>) -> Self {
        self.assigned_to = Some(assignee.into());
        self
    }

    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts;
        self
    }
}

/// Handler failure. Becomes an `error` (or `cancelled`) ledger entry whose
/// notes are this error's message.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StepError {
    #[error("{0}")]
    ExecutionFailed(String),

    #[error("invalid step parameter: {0}")]
    InvalidParameter(String),

    /// A capability failed permanently.
    #[error("{message}")]
    CapabilityFailed { attempts: u32, message: String },

    /// A capability kept failing transiently until the retry budget ran out.
    #[error("{message} (gave up after {attempts} attempts)")]
    DependencyExhausted { attempts: u32, message: String },

    #[error("step timed out after {secs}s")]
    Timeout { secs: u64 },

    #[error("step cancelled")]
    Cancelled,
}

impl StepError {
    /// External-call attempts made before failing, when known.
    pub fn attempts(&self) -> Option<u32> {
        match self {
            StepError::CapabilityFailed { attempts, .. }
            | StepError::DependencyExhausted { attempts, .. } => Some(*attempts),
            _ => None,
        }
    }
}

impl From<RetryError> for StepError {
    fn from(err: RetryError) -> Self {
        match err {
            RetryError::Exhausted { attempts, last } => StepError::DependencyExhausted {
                attempts,
                message: last.message().to_string(),
            },
            RetryError::Permanent { attempt, error } => StepError::CapabilityFailed {
                attempts: attempt,
                message: error.message().to_string(),
            },
            RetryError::Cancelled { .. } => StepError::Cancelled,
        }
    }
}

// ---------------------------------------------------------------------------
// StepContext
// ---------------------------------------------------------------------------

/// Per-step view of the run handed to a handler.
#[derive(Debug, Clone)]
pub struct StepContext {
    pub run_id: Uuid,
    pub workflow_id: String,
    pub executed_by: String,
    pub context: Arc<HashMap<String, serde_json::Value>>,
    pub index: usize,
    pub step_id: String,
    /// Effective retry policy (step override or engine default).
    pub retry: RetryPolicy,
    pub cancel: CancellationToken,
}

// ---------------------------------------------------------------------------
// StepHandler trait
// ---------------------------------------------------------------------------

/// Executes steps of one `StepKind`.
pub trait StepHandler: Send + Sync {
    fn kind(&self) -> StepKind;

    fn handle<'a>(
        &'a self,
        step: &'a StepSpec,
        ctx: &'a StepContext,
    ) -> BoxFuture<'a, Result<StepOutcome, StepError>>;
}

/// Join non-empty note fragments with single spaces.
fn compose_notes<'a>(parts: impl IntoIterator<Item = &'a str>) -> String {
    parts
        .into_iter()
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

fn description(step: &StepSpec) -> &str {
    step.description.as_deref().unwrap_or("")
}

fn deadline_after_hours(now: DateTime<Utc>, hours: f64) -> Result<DateTime<Utc>, StepError> {
    if !hours.is_finite() || hours <= 0.0 {
        return Err(StepError::InvalidParameter(format!(
            "deadline window must be a positive number of hours, got {hours}"
        )));
    }
    TimeDelta::try_milliseconds((hours * 3_600_000.0).round() as i64)
        .and_then(|delta| now.checked_add_signed(delta))
        .ok_or_else(|| StepError::InvalidParameter(format!("deadline window too large: {hours}h")))
}

// ---------------------------------------------------------------------------
// System
// ---------------------------------------------------------------------------

pub struct SystemHandler {
    actions: Arc<dyn ActionExecutor>,
}

impl SystemHandler {
    pub fn new(actions: Arc<dyn ActionExecutor>) -> Self {
        Self { actions }
    }
}

impl StepHandler for SystemHandler {
    fn kind(&self) -> StepKind {
        StepKind::System
    }

    fn handle<'a>(
        &'a self,
        step: &'a StepSpec,
        ctx: &'a StepContext,
    ) -> BoxFuture<'a, Result<StepOutcome, StepError>> {
        Box::pin(async move {
            let call = ActionCall {
                run_id: ctx.run_id,
                workflow_id: ctx.workflow_id.clone(),
                step_id: ctx.step_id.clone(),
                action: step.action.clone(),
                title: step.title.clone(),
                context: ctx.context.clone(),
            };
            let report = self
                .actions
                .execute(&call)
                .await
                .map_err(|e| StepError::CapabilityFailed {
                    attempts: 1,
                    message: e.message().to_string(),
                })?;

            let notes = compose_notes([
                "Auto-executed by system.",
                description(step),
                report.note.as_str(),
            ]);
            Ok(
                StepOutcome::new(StepStatus::Completed, notes).with_payload(StepPayload::Action {
                    action: step.action.clone(),
                    output: report.output,
                }),
            )
        })
    }
}

// ---------------------------------------------------------------------------
// Approval
// ---------------------------------------------------------------------------

pub struct ApprovalHandler {
    tasks: Arc<dyn TaskQueue>,
    default_approver: String,
    window_hours: u32,
}

impl ApprovalHandler {
    pub fn new(tasks: Arc<dyn TaskQueue>, config: &EngineConfig) -> Self {
        Self {
            tasks,
            default_approver: config.default_approver.clone(),
            window_hours: config.approval_window_hours,
        }
    }
}

impl StepHandler for ApprovalHandler {
    fn kind(&self) -> StepKind {
        StepKind::Approval
    }

    fn handle<'a>(
        &'a self,
        step: &'a StepSpec,
        ctx: &'a StepContext,
    ) -> BoxFuture<'a, Result<StepOutcome, StepError>> {
        Box::pin(async move {
            let approver = step
                .assigned_to
                .clone()
                .unwrap_or_else(|| self.default_approver.clone());
            let deadline = deadline_after_hours(Utc::now(), f64::from(self.window_hours))?;

            self.tasks
                .enqueue(QueuedTask {
                    run_id: ctx.run_id,
                    workflow_id: ctx.workflow_id.clone(),
                    step_id: ctx.step_id.clone(),
                    kind: TaskKind::Approval,
                    assignee: approver.clone(),
                    deadline,
                    title: step.title.clone(),
                    priority: step.priority(),
                    requested_by: ctx.executed_by.clone(),
                })
                .await
                .map_err(|e| {
                    StepError::ExecutionFailed(format!("failed to queue approval: {}", e.message()))
                })?;

            let notes = compose_notes([
                format!("Approval required from {approver}.").as_str(),
                description(step),
            ]);
            Ok(StepOutcome::new(StepStatus::AwaitingApproval, notes)
                .with_assignee(approver.clone())
                .with_payload(StepPayload::Approval {
                    approver,
                    approval_deadline: deadline,
                }))
        })
    }
}

// ---------------------------------------------------------------------------
// Human
// ---------------------------------------------------------------------------

pub struct HumanHandler {
    tasks: Arc<dyn TaskQueue>,
    default_assignee: String,
    window_hours: f64,
}

impl HumanHandler {
    pub fn new(tasks: Arc<dyn TaskQueue>, config: &EngineConfig) -> Self {
        Self {
            tasks,
            default_assignee: config.default_assignee.clone(),
            window_hours: config.delegation_window_hours,
        }
    }
}

impl StepHandler for HumanHandler {
    fn kind(&self) -> StepKind {
        StepKind::Human
    }

    fn handle<'a>(
        &'a self,
        step: &'a StepSpec,
        ctx: &'a StepContext,
    ) -> BoxFuture<'a, Result<StepOutcome, StepError>> {
        Box::pin(async move {
            let assignee = step
                .assigned_to
                .clone()
                .unwrap_or_else(|| self.default_assignee.clone());
            let hours = step.duration_hours.unwrap_or(self.window_hours);
            let due_date = deadline_after_hours(Utc::now(), hours)?;

            self.tasks
                .enqueue(QueuedTask {
                    run_id: ctx.run_id,
                    workflow_id: ctx.workflow_id.clone(),
                    step_id: ctx.step_id.clone(),
                    kind: TaskKind::Delegation,
                    assignee: assignee.clone(),
                    deadline: due_date,
                    title: step.title.clone(),
                    priority: step.priority(),
                    requested_by: ctx.executed_by.clone(),
                })
                .await
                .map_err(|e| {
                    StepError::ExecutionFailed(format!(
                        "failed to queue delegation: {}",
                        e.message()
                    ))
                })?;

            let notes = compose_notes([
                format!("Delegated to {assignee} for manual execution.").as_str(),
                description(step),
            ]);
            Ok(StepOutcome::new(StepStatus::Delegated, notes)
                .with_assignee(assignee.clone())
                .with_payload(StepPayload::Delegation { assignee, due_date }))
        })
    }
}

// ---------------------------------------------------------------------------
// AI analysis
// ---------------------------------------------------------------------------

pub struct AiAnalysisHandler {
    analyst: Arc<dyn AiAnalyst>,
}

impl AiAnalysisHandler {
    pub fn new(analyst: Arc<dyn AiAnalyst>) -> Self {
        Self { analyst }
    }
}

impl StepHandler for AiAnalysisHandler {
    fn kind(&self) -> StepKind {
        StepKind::AiAnalysis
    }

    fn handle<'a>(
        &'a self,
        step: &'a StepSpec,
        ctx: &'a StepContext,
    ) -> BoxFuture<'a, Result<StepOutcome, StepError>> {
        Box::pin(async move {
            let request = AnalysisRequest {
                workflow_id: ctx.workflow_id.clone(),
                step_id: ctx.step_id.clone(),
                action: step.action.clone(),
                title: step.title.clone(),
                description: step.description.clone(),
                priority: step.priority(),
                context: ctx.context.clone(),
            };

            let retried = RetryHandler::with_retry(&ctx.retry, &ctx.cancel, |attempt| {
                tracing::debug!(step_id = %ctx.step_id, attempt, "requesting analysis");
                self.analyst.analyze(&request)
            })
            .await?;

            let report = retried.value;
            let confidence = report.confidence_score.clamp(0, 100) as u8;
            let notes = compose_notes([
                format!("AI analysis completed. Confidence: {confidence}%.").as_str(),
                description(step),
            ]);
            Ok(StepOutcome::new(StepStatus::Completed, notes)
                .with_attempts(retried.attempts)
                .with_payload(StepPayload::AiInsights {
                    confidence_score: confidence,
                    recommendations: report.recommendations,
                    risk_assessment: report.risk,
                }))
        })
    }
}

// ---------------------------------------------------------------------------
// Notification
// ---------------------------------------------------------------------------

pub struct NotificationHandler {
    notifier: Arc<dyn NotificationDispatcher>,
}

impl NotificationHandler {
    pub fn new(notifier: Arc<dyn NotificationDispatcher>) -> Self {
        Self { notifier }
    }
}

impl StepHandler for NotificationHandler {
    fn kind(&self) -> StepKind {
        StepKind::Notification
    }

    fn handle<'a>(
        &'a self,
        step: &'a StepSpec,
        ctx: &'a StepContext,
    ) -> BoxFuture<'a, Result<StepOutcome, StepError>> {
        Box::pin(async move {
            let channels = step.channels.clone().unwrap_or_default();
            let message = NotificationMessage {
                workflow_id: ctx.workflow_id.clone(),
                step_id: ctx.step_id.clone(),
                channels: channels.clone(),
                subject: step.title.clone(),
                body: step
                    .description
                    .clone()
                    .unwrap_or_else(|| step.title.clone()),
            };

            let retried = RetryHandler::with_retry(&ctx.retry, &ctx.cancel, |_| {
                self.notifier.dispatch(&message)
            })
            .await?;

            let channel_note = if channels.is_empty() {
                String::new()
            } else {
                format!("Channels: {}.", channels.join(", "))
            };
            let notes = compose_notes([
                "Notification sent successfully.",
                description(step),
                channel_note.as_str(),
            ]);
            Ok(StepOutcome::new(StepStatus::Completed, notes)
                .with_attempts(retried.attempts)
                .with_payload(StepPayload::Notification {
                    channels,
                    recipients: retried.value.recipients,
                }))
        })
    }
}

// ---------------------------------------------------------------------------
// Delay
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct DelayHandler;

impl StepHandler for DelayHandler {
    fn kind(&self) -> StepKind {
        StepKind::Delay
    }

    fn handle<'a>(
        &'a self,
        step: &'a StepSpec,
        ctx: &'a StepContext,
    ) -> BoxFuture<'a, Result<StepOutcome, StepError>> {
        Box::pin(async move {
            let secs = step.delay_seconds.unwrap_or(DEFAULT_DELAY_SECS);
            let delay = Duration::try_from_secs_f64(secs).map_err(|_| {
                StepError::InvalidParameter(format!(
                    "delaySeconds must be a non-negative number, got {secs}"
                ))
            })?;

            tokio::select! {
                _ = ctx.cancel.cancelled() => return Err(StepError::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }

            let notes = compose_notes([format!("Waited {secs}s.").as_str(), description(step)]);
            Ok(
                StepOutcome::new(StepStatus::Completed, notes).with_payload(StepPayload::Delay {
                    delayed_ms: delay.as_millis() as u64,
                }),
            )
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::playbook::builtin::{BuiltinActions, InMemoryTaskQueue, LogNotifier, OfflineAnalyst};
    use crate::playbook::capability::{AnalysisReport, CapabilityError, DispatchReceipt};
    use playbook_types::config::BackoffStrategy;
    use playbook_types::execution::RiskTier;
    use playbook_types::playbook::Priority;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn ctx() -> StepContext {
        StepContext {
            run_id: Uuid::now_v7(),
            workflow_id: "incident-response".to_string(),
            executed_by: "alice".to_string(),
            context: Arc::new(HashMap::new()),
            index: 0,
            step_id: "step_1".to_string(),
            retry: RetryPolicy {
                max_attempts: 3,
                base_delay_ms: 1,
                backoff: BackoffStrategy::Linear,
                max_delay_ms: 2,
            },
            cancel: CancellationToken::new(),
        }
    }

    fn step(kind: StepKind, action: &str) -> StepSpec {
        StepSpec::new(kind.into(), action, "Title")
    }

    /// Analyst that fails transiently a fixed number of times, then reports.
    struct FlakyAnalyst {
        failures: u32,
        calls: AtomicU32,
        confidence: i64,
    }

    impl AiAnalyst for FlakyAnalyst {
        fn analyze<'a>(
            &'a self,
            _request: &'a AnalysisRequest,
        ) -> BoxFuture<'a, Result<AnalysisReport, CapabilityError>> {
            Box::pin(async move {
                let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
                if call <= self.failures {
                    return Err(CapabilityError::Transient("rate limited".to_string()));
                }
                Ok(AnalysisReport {
                    confidence_score: self.confidence,
                    recommendations: vec!["Scale out".to_string()],
                    risk: RiskTier::Medium,
                })
            })
        }
    }

    struct BrokenQueue;

    impl TaskQueue for BrokenQueue {
        fn enqueue<'a>(&'a self, _task: QueuedTask) -> BoxFuture<'a, Result<(), CapabilityError>> {
            Box::pin(async { Err(CapabilityError::Failed("queue offline".to_string())) })
        }
    }

    struct RejectingNotifier;

    impl NotificationDispatcher for RejectingNotifier {
        fn dispatch<'a>(
            &'a self,
            _message: &'a NotificationMessage,
        ) -> BoxFuture<'a, Result<DispatchReceipt, CapabilityError>> {
            Box::pin(async { Err(CapabilityError::Transient("smtp down".to_string())) })
        }
    }

    #[test]
    fn test_compose_notes_skips_empty_parts() {
        assert_eq!(compose_notes(["a.", "", "  ", "b."]), "a. b.");
        assert_eq!(compose_notes(["only."]), "only.");
    }

    #[test]
    fn test_step_error_from_retry_error() {
        let err: StepError = RetryError::Exhausted {
            attempts: 3,
            last: CapabilityError::Transient("503".into()),
        }
        .into();
        assert_eq!(err.attempts(), Some(3));
        assert_eq!(err.to_string(), "503 (gave up after 3 attempts)");

        let err: StepError = RetryError::Cancelled { attempts: 1 }.into();
        assert_eq!(err, StepError::Cancelled);
    }

    #[tokio::test]
    async fn system_step_completes_with_action_note() {
        let handler = SystemHandler::new(Arc::new(BuiltinActions));
        let mut s = step(StepKind::System, "send_alert");
        s.description = Some("Page the team.".to_string());

        let outcome = handler.handle(&s, &ctx()).await.unwrap();
        assert_eq!(outcome.status, StepStatus::Completed);
        assert_eq!(
            outcome.notes,
            "Auto-executed by system. Page the team. Alert sent via Slack/Email."
        );
        assert_eq!(outcome.attempts, 1);
    }

    #[tokio::test]
    async fn approval_step_queues_for_default_approver() {
        let queue = Arc::new(InMemoryTaskQueue::new());
        let handler = ApprovalHandler::new(queue.clone(), &EngineConfig::default());
        let before = Utc::now();

        let outcome = handler
            .handle(&step(StepKind::Approval, "restart"), &ctx())
            .await
            .unwrap();

        assert_eq!(outcome.status, StepStatus::AwaitingApproval);
        assert_eq!(outcome.assigned_to.as_deref(), Some("manager@domain.com"));
        assert_eq!(outcome.notes, "Approval required from manager@domain.com.");
        match outcome.payload {
            Some(StepPayload::Approval {
                approval_deadline, ..
            }) => {
                assert!(approval_deadline >= before + TimeDelta::hours(24));
            }
            other => panic!("unexpected payload: {other:?}"),
        }

        let tasks = queue.snapshot().await;
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].kind, TaskKind::Approval);
        assert_eq!(tasks[0].requested_by, "alice");
    }

    #[tokio::test]
    async fn approval_queue_failure_is_an_error() {
        let handler = ApprovalHandler::new(Arc::new(BrokenQueue), &EngineConfig::default());
        let err = handler
            .handle(&step(StepKind::Approval, "restart"), &ctx())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("queue offline"));
    }

    #[tokio::test]
    async fn human_step_uses_declared_duration() {
        let queue = Arc::new(InMemoryTaskQueue::new());
        let handler = HumanHandler::new(queue.clone(), &EngineConfig::default());
        let before = Utc::now();
        let s = step(StepKind::Human, "inspect")
            .with_assignee("sre@domain.com")
            .with_duration_hours(4.0);

        let outcome = handler.handle(&s, &ctx()).await.unwrap();

        assert_eq!(outcome.status, StepStatus::Delegated);
        assert_eq!(
            outcome.notes,
            "Delegated to sre@domain.com for manual execution."
        );
        match outcome.payload {
            Some(StepPayload::Delegation { assignee, due_date }) => {
                assert_eq!(assignee, "sre@domain.com");
                assert!(due_date >= before + TimeDelta::hours(4));
                assert!(due_date < before + TimeDelta::hours(5));
            }
            other => panic!("unexpected payload: {other:?}"),
        }
        assert_eq!(queue.snapshot().await[0].kind, TaskKind::Delegation);
    }

    #[tokio::test]
    async fn human_step_defaults_to_ops_team() {
        let handler = HumanHandler::new(Arc::new(InMemoryTaskQueue::new()), &EngineConfig::default());
        let outcome = handler
            .handle(&step(StepKind::Human, "inspect"), &ctx())
            .await
            .unwrap();
        assert_eq!(outcome.assigned_to.as_deref(), Some("ops_team"));
    }

    #[tokio::test]
    async fn ai_step_with_offline_analyst() {
        let handler = AiAnalysisHandler::new(Arc::new(OfflineAnalyst));
        let s = step(StepKind::AiAnalysis, "analyze").with_priority(Priority::High);

        let outcome = handler.handle(&s, &ctx()).await.unwrap();
        assert_eq!(outcome.status, StepStatus::Completed);
        assert_eq!(outcome.notes, "AI analysis completed. Confidence: 80%.");
        match outcome.payload {
            Some(StepPayload::AiInsights {
                confidence_score,
                recommendations,
                risk_assessment,
            }) => {
                assert_eq!(confidence_score, 80);
                assert_eq!(recommendations.len(), 3);
                assert_eq!(risk_assessment, RiskTier::Low);
            }
            other => panic!("unexpected payload: {other:?}"),
        }
    }

    #[tokio::test]
    async fn ai_step_retries_transient_failures_and_clamps_confidence() {
        let analyst = Arc::new(FlakyAnalyst {
            failures: 2,
            calls: AtomicU32::new(0),
            confidence: 140,
        });
        let handler = AiAnalysisHandler::new(analyst.clone());

        let outcome = handler
            .handle(&step(StepKind::AiAnalysis, "analyze"), &ctx())
            .await
            .unwrap();

        assert_eq!(outcome.attempts, 3);
        assert_eq!(analyst.calls.load(Ordering::SeqCst), 3);
        assert!(matches!(
            outcome.payload,
            Some(StepPayload::AiInsights {
                confidence_score: 100,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn ai_step_exhausts_retry_budget() {
        let analyst = Arc::new(FlakyAnalyst {
            failures: 10,
            calls: AtomicU32::new(0),
            confidence: 90,
        });
        let handler = AiAnalysisHandler::new(analyst);

        let err = handler
            .handle(&step(StepKind::AiAnalysis, "analyze"), &ctx())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            StepError::DependencyExhausted { attempts: 3, .. }
        ));
    }

    #[tokio::test]
    async fn notification_step_lists_channels() {
        let handler = NotificationHandler::new(Arc::new(LogNotifier));
        let s = step(StepKind::Notification, "broadcast").with_channels(["slack", "email"]);

        let outcome = handler.handle(&s, &ctx()).await.unwrap();
        assert_eq!(
            outcome.notes,
            "Notification sent successfully. Channels: slack, email."
        );
        match outcome.payload {
            Some(StepPayload::Notification {
                channels,
                recipients,
            }) => {
                assert_eq!(channels, vec!["slack", "email"]);
                assert_eq!(recipients, vec!["slack", "email"]);
            }
            other => panic!("unexpected payload: {other:?}"),
        }
    }

    #[tokio::test]
    async fn notification_step_without_channels() {
        let handler = NotificationHandler::new(Arc::new(LogNotifier));
        let outcome = handler
            .handle(&step(StepKind::Notification, "broadcast"), &ctx())
            .await
            .unwrap();
        assert_eq!(outcome.notes, "Notification sent successfully.");
    }

    #[tokio::test]
    async fn notification_dispatch_failure_is_an_error() {
        let handler = NotificationHandler::new(Arc::new(RejectingNotifier));
        let err = handler
            .handle(&step(StepKind::Notification, "broadcast"), &ctx())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("smtp down"));
    }

    #[tokio::test]
    async fn delay_step_waits_and_records_duration() {
        let s = step(StepKind::Delay, "wait").with_delay_seconds(0.25);
        let outcome = DelayHandler.handle(&s, &ctx()).await.unwrap();
        assert_eq!(outcome.status, StepStatus::Completed);
        assert_eq!(outcome.payload, Some(StepPayload::Delay { delayed_ms: 250 }));
    }

    #[tokio::test]
    async fn delay_step_observes_cancellation() {
        let context = ctx();
        context.cancel.cancel();
        let s = step(StepKind::Delay, "wait").with_delay_seconds(60.0);
        let err = DelayHandler.handle(&s, &context).await.unwrap_err();
        assert_eq!(err, StepError::Cancelled);
    }

    #[tokio::test]
    async fn delay_step_rejects_negative_seconds() {
        let s = step(StepKind::Delay, "wait").with_delay_seconds(-3.0);
        let err = DelayHandler.handle(&s, &ctx()).await.unwrap_err();
        assert!(matches!(err, StepError::InvalidParameter(_)));
    }
}
