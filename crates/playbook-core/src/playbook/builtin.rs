//! In-process capability implementations.
//!
//! These need no network access and are what the engine runs with when no
//! external provider is configured. They are deterministic, which also makes
//! them the default collaborators in tests.

use futures_util::future::BoxFuture;
use playbook_types::execution::RiskTier;
use playbook_types::playbook::Priority;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::capability::{
    ActionCall, ActionExecutor, ActionReport, AiAnalyst, AnalysisReport, AnalysisRequest,
    CapabilityError, DispatchReceipt, NotificationDispatcher, NotificationMessage, QueuedTask,
    TaskQueue,
};

// ---------------------------------------------------------------------------
// Actions
// ---------------------------------------------------------------------------

/// Executes the well-known operational actions by name.
///
/// Unrecognised action names succeed with a generic note.
#[derive(Debug, Clone, Copy, Default)]
pub struct BuiltinActions;

impl BuiltinActions {
    pub fn note_for(action: &str) -> String {
        match action {
            "send_alert" => "Alert sent via Slack/Email.".to_string(),
            "update_database" => "Database updated successfully.".to_string(),
            "trigger_webhook" => "Webhook triggered successfully.".to_string(),
            "generate_report" => "Report generated and stored.".to_string(),
            "" => String::new(),
            other => format!("Action \"{other}\" executed."),
        }
    }
}

impl ActionExecutor for BuiltinActions {
    fn execute<'a>(
        &'a self,
        call: &'a ActionCall,
    ) -> BoxFuture<'a, Result<ActionReport, CapabilityError>> {
        Box::pin(async move {
            tracing::debug!(
                workflow_id = %call.workflow_id,
                step_id = %call.step_id,
                action = %call.action,
                "executing builtin action"
            );
            Ok(ActionReport {
                note: Self::note_for(&call.action),
                output: None,
            })
        })
    }
}

// ---------------------------------------------------------------------------
// Analysis
// ---------------------------------------------------------------------------

/// Deterministic analyst used when no AI provider is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct OfflineAnalyst;

impl OfflineAnalyst {
    pub const CONFIDENCE: i64 = 80;

    pub const RECOMMENDATIONS: [&'static str; 3] = [
        "Data pattern suggests 15% improvement opportunity",
        "Recommend monitoring metrics for next 48 hours",
        "Consider implementing automated response",
    ];

    pub fn risk_for(priority: Priority) -> RiskTier {
        match priority {
            Priority::High | Priority::Critical => RiskTier::Low,
            Priority::Low | Priority::Medium => RiskTier::Minimal,
        }
    }
}

impl AiAnalyst for OfflineAnalyst {
    fn analyze<'a>(
        &'a self,
        request: &'a AnalysisRequest,
    ) -> BoxFuture<'a, Result<AnalysisReport, CapabilityError>> {
        Box::pin(async move {
            Ok(AnalysisReport {
                confidence_score: Self::CONFIDENCE,
                recommendations: Self::RECOMMENDATIONS
                    .iter()
                    .map(|r| r.to_string())
                    .collect(),
                risk: Self::risk_for(request.priority),
            })
        })
    }
}

// ---------------------------------------------------------------------------
// Notifications
// ---------------------------------------------------------------------------

/// Records notifications in the log instead of delivering them.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl NotificationDispatcher for LogNotifier {
    fn dispatch<'a>(
        &'a self,
        message: &'a NotificationMessage,
    ) -> BoxFuture<'a, Result<DispatchReceipt, CapabilityError>> {
        Box::pin(async move {
            tracing::info!(
                workflow_id = %message.workflow_id,
                step_id = %message.step_id,
                channels = ?message.channels,
                subject = %message.subject,
                "notification"
            );
            Ok(DispatchReceipt {
                recipients: message.channels.clone(),
            })
        })
    }
}

// ---------------------------------------------------------------------------
// Task queue
// ---------------------------------------------------------------------------

/// Keeps queued approval and delegation tasks in memory.
#[derive(Debug, Default)]
pub struct InMemoryTaskQueue {
    tasks: Mutex<Vec<QueuedTask>>,
}

impl InMemoryTaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of every task queued so far.
    pub async fn snapshot(&self) -> Vec<QueuedTask> {
        self.tasks.lock().await.clone()
    }

    /// Remove and return every queued task.
    pub async fn drain(&self) -> Vec<QueuedTask> {
        std::mem::take(&mut *self.tasks.lock().await)
    }

    /// Remove and return the tasks queued by one run, in queue order.
    pub async fn take_for_run(&self, run_id: Uuid) -> Vec<QueuedTask> {
        let mut tasks = self.tasks.lock().await;
        let (taken, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut *tasks)
            .into_iter()
            .partition(|task| task.run_id == run_id);
        *tasks = kept;
        taken
    }

    pub async fn len(&self) -> usize {
        self.tasks.lock().await.len()
    }
}

impl TaskQueue for InMemoryTaskQueue {
    fn enqueue<'a>(&'a self, task: QueuedTask) -> BoxFuture<'a, Result<(), CapabilityError>> {
        Box::pin(async move {
            tracing::debug!(
                step_id = %task.step_id,
                kind = ?task.kind,
                assignee = %task.assignee,
                "task queued"
            );
            self.tasks.lock().await.push(task);
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::playbook::capability::TaskKind;
    use chrono::Utc;
    use std::collections::HashMap;
    use std::sync::Arc;

    fn call(action: &str) -> ActionCall {
        ActionCall {
            run_id: Uuid::now_v7(),
            workflow_id: "wf".to_string(),
            step_id: "step_1".to_string(),
            action: action.to_string(),
            title: "t".to_string(),
            context: Arc::new(HashMap::new()),
        }
    }

    #[tokio::test]
    async fn known_actions_have_specific_notes() {
        let report = BuiltinActions.execute(&call("send_alert")).await.unwrap();
        assert_eq!(report.note, "Alert sent via Slack/Email.");
        let report = BuiltinActions.execute(&call("generate_report")).await.unwrap();
        assert_eq!(report.note, "Report generated and stored.");
    }

    #[tokio::test]
    async fn unknown_action_gets_generic_note() {
        let report = BuiltinActions.execute(&call("rotate_keys")).await.unwrap();
        assert_eq!(report.note, "Action \"rotate_keys\" executed.");
    }

    #[tokio::test]
    async fn offline_analyst_is_deterministic() {
        let mut request = AnalysisRequest {
            workflow_id: "wf".to_string(),
            step_id: "step_1".to_string(),
            action: "analyze".to_string(),
            title: "Analyze".to_string(),
            description: None,
            priority: Priority::High,
            context: Arc::new(HashMap::new()),
        };
        let report = OfflineAnalyst.analyze(&request).await.unwrap();
        assert_eq!(report.confidence_score, 80);
        assert_eq!(report.recommendations.len(), 3);
        assert_eq!(report.risk, RiskTier::Low);

        request.priority = Priority::Medium;
        let report = OfflineAnalyst.analyze(&request).await.unwrap();
        assert_eq!(report.risk, RiskTier::Minimal);
    }

    #[tokio::test]
    async fn log_notifier_reports_channels_as_recipients() {
        let message = NotificationMessage {
            workflow_id: "wf".to_string(),
            step_id: "step_2".to_string(),
            channels: vec!["slack".to_string(), "email".to_string()],
            subject: "Heads up".to_string(),
            body: String::new(),
        };
        let receipt = LogNotifier.dispatch(&message).await.unwrap();
        assert_eq!(receipt.recipients, vec!["slack", "email"]);
    }

    #[tokio::test]
    async fn in_memory_queue_snapshot_and_drain() {
        let queue = InMemoryTaskQueue::new();
        queue
            .enqueue(QueuedTask {
                run_id: Uuid::now_v7(),
                workflow_id: "wf".to_string(),
                step_id: "step_1".to_string(),
                kind: TaskKind::Approval,
                assignee: "manager@domain.com".to_string(),
                deadline: Utc::now(),
                title: "Approve".to_string(),
                priority: Priority::Medium,
                requested_by: "alice".to_string(),
            })
            .await
            .unwrap();

        assert_eq!(queue.len().await, 1);
        assert_eq!(queue.snapshot().await[0].kind, TaskKind::Approval);
        assert_eq!(queue.drain().await.len(), 1);
        assert_eq!(queue.len().await, 0);
    }

    #[tokio::test]
    async fn take_for_run_leaves_other_runs_queued() {
        let queue = InMemoryTaskQueue::new();
        let mine = Uuid::now_v7();
        let theirs = Uuid::now_v7();
        for (run_id, step_id) in [(mine, "step_1"), (theirs, "step_1"), (mine, "step_2")] {
            queue
                .enqueue(QueuedTask {
                    run_id,
                    workflow_id: "wf".to_string(),
                    step_id: step_id.to_string(),
                    kind: TaskKind::Delegation,
                    assignee: "ops_team".to_string(),
                    deadline: Utc::now(),
                    title: "Restart".to_string(),
                    priority: Priority::Low,
                    requested_by: "bob".to_string(),
                })
                .await
                .unwrap();
        }

        let taken = queue.take_for_run(mine).await;
        let steps: Vec<&str> = taken.iter().map(|t| t.step_id.as_str()).collect();
        assert_eq!(steps, vec!["step_1", "step_2"]);
        assert_eq!(queue.len().await, 1);
        assert_eq!(queue.snapshot().await[0].run_id, theirs);
    }
}
