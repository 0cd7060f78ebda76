//! Dispatch table from step type to handler.
//!
//! Built once when the engine starts. `dispatch` never fails: an unsupported
//! type, a handler error, a timeout and a cancellation all come back as a
//! `StepOutcome` with the matching status.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use playbook_types::config::EngineConfig;
use playbook_types::execution::StepStatus;
use playbook_types::playbook::{StepKind, StepSpec};

use super::capability::Capabilities;
use super::handlers::{
    AiAnalysisHandler, ApprovalHandler, DelayHandler, HumanHandler, NotificationHandler,
    StepContext, StepError, StepHandler, StepOutcome, SystemHandler,
};

pub struct StepRegistry {
    handlers: HashMap<StepKind, Arc<dyn StepHandler>>,
    default_timeout: Duration,
}

impl StepRegistry {
    /// Registry with a handler for every known step type.
    pub fn new(capabilities: &Capabilities, config: &EngineConfig) -> Self {
        let mut registry = Self::empty(config.step_timeout());
        registry.register(Arc::new(SystemHandler::new(capabilities.actions.clone())));
        registry.register(Arc::new(ApprovalHandler::new(
            capabilities.tasks.clone(),
            config,
        )));
        registry.register(Arc::new(HumanHandler::new(
            capabilities.tasks.clone(),
            config,
        )));
        registry.register(Arc::new(AiAnalysisHandler::new(
            capabilities.analyst.clone(),
        )));
        registry.register(Arc::new(NotificationHandler::new(
            capabilities.notifier.clone(),
        )));
        registry.register(Arc::new(DelayHandler));
        registry
    }

    /// Registry with no handlers; every step dispatches as `unknown_type`.
    pub fn empty(default_timeout: Duration) -> Self {
        Self {
            handlers: HashMap::new(),
            default_timeout,
        }
    }

    /// Add or replace the handler for `handler.kind()`.
    pub fn register(&mut self, handler: Arc<dyn StepHandler>) {
        self.handlers.insert(handler.kind(), handler);
    }

    pub fn supports(&self, kind: StepKind) -> bool {
        self.handlers.contains_key(&kind)
    }

    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    /// Execute one step and classify the result.
    pub async fn dispatch(&self, step: &StepSpec, ctx: &StepContext) -> StepOutcome {
        let handler = step
            .step_type
            .kind()
            .and_then(|kind| self.handlers.get(&kind));
        let Some(handler) = handler else {
            tracing::warn!(
                step_id = %ctx.step_id,
                step_type = %step.step_type,
                "no handler for step type"
            );
            return StepOutcome::new(
                StepStatus::UnknownType,
                format!(
                    "Unknown step type: {}. Manual review required.",
                    step.step_type
                ),
            );
        };

        let timeout = step
            .timeout_secs
            .map(Duration::from_secs)
            .unwrap_or(self.default_timeout);

        let result = tokio::select! {
            biased;
            _ = ctx.cancel.cancelled() => Err(StepError::Cancelled),
            res = tokio::time::timeout(timeout, handler.handle(step, ctx)) => match res {
                Ok(inner) => inner,
                Err(_) => Err(StepError::Timeout { secs: timeout.as_secs() }),
            },
        };

        match result {
            Ok(outcome) => outcome,
            Err(StepError::Cancelled) => {
                StepOutcome::new(StepStatus::Cancelled, StepError::Cancelled.to_string())
            }
            Err(err) => {
                tracing::warn!(step_id = %ctx.step_id, error = %err, "step failed");
                StepOutcome::new(StepStatus::Error, err.to_string())
                    .with_attempts(err.attempts().unwrap_or(1))
            }
        }
    }
}

impl std::fmt::Debug for StepRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut kinds: Vec<_> = self.handlers.keys().map(|k| k.as_str()).collect();
        kinds.sort_unstable();
        f.debug_struct("StepRegistry")
            .field("handlers", &kinds)
            .field("default_timeout", &self.default_timeout)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::future::BoxFuture;
    use playbook_types::config::RetryPolicy;
    use tokio_util::sync::CancellationToken;
    use uuid::Uuid;

    fn ctx() -> StepContext {
        StepContext {
            run_id: Uuid::now_v7(),
            workflow_id: "wf".to_string(),
            executed_by: "alice".to_string(),
            context: Arc::new(HashMap::new()),
            index: 0,
            step_id: "step_1".to_string(),
            retry: RetryPolicy::default(),
            cancel: CancellationToken::new(),
        }
    }

    /// Handler that never finishes on its own.
    struct HangingHandler;

    impl StepHandler for HangingHandler {
        fn kind(&self) -> StepKind {
            StepKind::System
        }

        fn handle<'a>(
            &'a self,
            _step: &'a StepSpec,
            _ctx: &'a StepContext,
        ) -> BoxFuture<'a, Result<StepOutcome, StepError>> {
            Box::pin(futures_util::future::pending())
        }
    }

    struct FailingHandler;

    impl StepHandler for FailingHandler {
        fn kind(&self) -> StepKind {
            StepKind::System
        }

        fn handle<'a>(
            &'a self,
            _step: &'a StepSpec,
            _ctx: &'a StepContext,
        ) -> BoxFuture<'a, Result<StepOutcome, StepError>> {
            Box::pin(async { Err(StepError::ExecutionFailed("disk full".to_string())) })
        }
    }

    #[test]
    fn test_new_supports_every_kind() {
        let registry = StepRegistry::new(&Capabilities::builtin(), &EngineConfig::default());
        for kind in StepKind::ALL {
            assert!(registry.supports(kind), "missing handler for {kind}");
        }
        assert_eq!(registry.default_timeout(), Duration::from_secs(300));
    }

    #[tokio::test]
    async fn unknown_type_is_classified_not_raised() {
        let registry = StepRegistry::new(&Capabilities::builtin(), &EngineConfig::default());
        let step = StepSpec::new("Teleport".into(), "beam", "Beam");

        let outcome = registry.dispatch(&step, &ctx()).await;
        assert_eq!(outcome.status, StepStatus::UnknownType);
        assert_eq!(
            outcome.notes,
            "Unknown step type: Teleport. Manual review required."
        );
    }

    #[tokio::test]
    async fn known_type_without_handler_is_unknown() {
        let registry = StepRegistry::empty(Duration::from_secs(1));
        let step = StepSpec::new(StepKind::Delay.into(), "wait", "Wait");
        let outcome = registry.dispatch(&step, &ctx()).await;
        assert_eq!(outcome.status, StepStatus::UnknownType);
    }

    #[tokio::test]
    async fn handler_error_becomes_error_status() {
        let mut registry = StepRegistry::empty(Duration::from_secs(5));
        registry.register(Arc::new(FailingHandler));
        let step = StepSpec::new(StepKind::System.into(), "backup", "Backup");

        let outcome = registry.dispatch(&step, &ctx()).await;
        assert_eq!(outcome.status, StepStatus::Error);
        assert_eq!(outcome.notes, "disk full");
    }

    #[tokio::test]
    async fn step_timeout_becomes_error() {
        let mut registry = StepRegistry::empty(Duration::from_secs(300));
        registry.register(Arc::new(HangingHandler));
        let step = StepSpec::new(StepKind::System.into(), "hang", "Hang").with_timeout_secs(1);

        let outcome = registry.dispatch(&step, &ctx()).await;
        assert_eq!(outcome.status, StepStatus::Error);
        assert_eq!(outcome.notes, "step timed out after 1s");
    }

    #[tokio::test]
    async fn cancellation_interrupts_running_handler() {
        let mut registry = StepRegistry::empty(Duration::from_secs(300));
        registry.register(Arc::new(HangingHandler));
        let step = StepSpec::new(StepKind::System.into(), "hang", "Hang");

        let context = ctx();
        let trigger = context.cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            trigger.cancel();
        });

        let outcome = registry.dispatch(&step, &context).await;
        assert_eq!(outcome.status, StepStatus::Cancelled);
    }
}
