//! Playbook runner: sequential, fail-fast execution of one playbook.
//!
//! The `PlaybookRunner` dispatches steps strictly in index order through the
//! shared `StepRegistry`, appends each outcome to a ledger owned by the run,
//! and derives the summary from that ledger when the run ends.
//!
//! # Execution flow
//!
//! 1. Validate the request. This is the only failure a caller sees.
//! 2. Register the run's cancellation token under a fresh run ID.
//! 3. For each step: check for cancellation, dispatch, time it, append.
//! 4. Stop at the first `error`, `unknown_type` or `cancelled` entry.
//! 5. Unregister the token and derive the `ExecutionSummary`.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use dashmap::DashMap;
use playbook_types::config::EngineConfig;
use playbook_types::event::PlaybookEvent;
use playbook_types::execution::{ExecutionSummary, StepResult, StepStatus};
use playbook_types::playbook::PlaybookRequest;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use uuid::Uuid;

use crate::event::bus::EventBus;

use super::capability::Capabilities;
use super::handlers::{StepContext, StepOutcome};
use super::ledger::{ExecutionLedger, RunHeader};
use super::registry::StepRegistry;
use super::validation::{PlaybookError, validate_request};

// ---------------------------------------------------------------------------
// PlaybookExecutor trait
// ---------------------------------------------------------------------------

/// Trait for playbook execution engines.
pub trait PlaybookExecutor: Send + Sync {
    /// Run a playbook to completion (or until it halts).
    fn execute(
        &self,
        request: PlaybookRequest,
    ) -> impl std::future::Future<Output = Result<ExecutionSummary, PlaybookError>> + Send;

    /// Run a playbook that stops when `cancel` is triggered.
    fn execute_with_cancel(
        &self,
        request: PlaybookRequest,
        cancel: CancellationToken,
    ) -> impl std::future::Future<Output = Result<ExecutionSummary, PlaybookError>> + Send;

    /// Cancel an active run.
    fn cancel(
        &self,
        run_id: Uuid,
    ) -> impl std::future::Future<Output = Result<(), PlaybookError>> + Send;
}

// ---------------------------------------------------------------------------
// PlaybookRunner
// ---------------------------------------------------------------------------

pub struct PlaybookRunner {
    registry: Arc<StepRegistry>,
    config: Arc<EngineConfig>,
    event_bus: EventBus,
    /// Cancellation tokens keyed by run_id.
    active_runs: DashMap<Uuid, CancellationToken>,
}

impl PlaybookRunner {
    pub fn new(registry: Arc<StepRegistry>, config: EngineConfig, event_bus: EventBus) -> Self {
        Self {
            registry,
            config: Arc::new(config),
            event_bus,
            active_runs: DashMap::new(),
        }
    }

    /// Runner with a registry built from `capabilities` and a fresh event bus.
    pub fn with_capabilities(capabilities: &Capabilities, config: EngineConfig) -> Self {
        let registry = Arc::new(StepRegistry::new(capabilities, &config));
        let event_bus = EventBus::new(config.event_capacity);
        Self::new(registry, config, event_bus)
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// IDs of runs currently executing.
    pub fn active_runs(&self) -> Vec<Uuid> {
        self.active_runs.iter().map(|entry| *entry.key()).collect()
    }

    async fn run(
        &self,
        request: PlaybookRequest,
        cancel: CancellationToken,
    ) -> Result<ExecutionSummary, PlaybookError> {
        validate_request(&request)?;

        let run_id = Uuid::now_v7();
        self.active_runs.insert(run_id, cancel.clone());
        let _registration = ActiveRun {
            runs: &self.active_runs,
            run_id,
        };

        let span = tracing::info_span!(
            "playbook_run",
            run_id = %run_id,
            workflow_id = %request.workflow_id,
        );
        self.run_steps(run_id, request, cancel).instrument(span).await
    }

    async fn run_steps(
        &self,
        run_id: Uuid,
        request: PlaybookRequest,
        cancel: CancellationToken,
    ) -> Result<ExecutionSummary, PlaybookError> {
        let started_at = Utc::now();
        let clock = Instant::now();
        let total_steps = request.steps.len();

        tracing::info!(
            executed_by = %request.executed_by,
            total_steps,
            "playbook run started"
        );
        self.event_bus.publish(PlaybookEvent::RunStarted {
            run_id,
            workflow_id: request.workflow_id.clone(),
            executed_by: request.executed_by.clone(),
            total_steps,
        });

        let shared_context = Arc::new(request.context.clone());
        let mut ledger = ExecutionLedger::new();

        for (index, step) in request.steps.iter().enumerate() {
            let step_id = step.resolved_id(index);
            let step_started_at = Utc::now();
            let step_clock = Instant::now();

            let outcome = if cancel.is_cancelled() {
                StepOutcome::new(StepStatus::Cancelled, "run cancelled before step started")
            } else {
                self.event_bus.publish(PlaybookEvent::StepStarted {
                    run_id,
                    index,
                    step_id: step_id.clone(),
                    step_type: step.step_type.to_string(),
                });
                let ctx = StepContext {
                    run_id,
                    workflow_id: request.workflow_id.clone(),
                    executed_by: request.executed_by.clone(),
                    context: shared_context.clone(),
                    index,
                    step_id: step_id.clone(),
                    retry: step
                        .retry
                        .clone()
                        .unwrap_or_else(|| self.config.retry.clone()),
                    cancel: cancel.clone(),
                };
                self.registry.dispatch(step, &ctx).await
            };

            let duration_ms = step_clock.elapsed().as_millis() as u64;
            let status = outcome.status;
            let completed_at = (!status.is_pending()).then(|| Utc::now().max(step_started_at));

            tracing::info!(
                step_index = index,
                step_id = %step_id,
                step_type = %step.step_type,
                status = %status,
                duration_ms,
                attempts = outcome.attempts,
                "step finished"
            );

            let recorded = record(&mut ledger, StepResult {
                index,
                step_id: step_id.clone(),
                title: step.title.clone(),
                step_type: step.step_type.clone(),
                status,
                started_at: step_started_at,
                completed_at,
                duration_ms,
                notes: outcome.notes,
                assigned_to: outcome.assigned_to.or_else(|| step.assigned_to.clone()),
                priority: step.priority(),
                estimated_duration: step
                    .estimated_duration
                    .clone()
                    .unwrap_or_else(|| self.config.default_estimated_duration.clone()),
                attempts: outcome.attempts,
                payload: outcome.payload,
            });
            if !recorded {
                break;
            }

            self.event_bus.publish(PlaybookEvent::StepFinished {
                run_id,
                index,
                step_id,
                status,
                duration_ms,
            });

            if status.halts_run() {
                tracing::warn!(
                    step_index = index,
                    status = %status,
                    remaining = total_steps - index - 1,
                    "halting run"
                );
                break;
            }
        }

        let header = RunHeader {
            run_id,
            workflow_id: request.workflow_id,
            executed_by: request.executed_by,
            context: request.context,
            started_at,
            total_steps,
        };
        let mut summary = ledger.into_summary(header, Utc::now().max(started_at));
        summary.duration_ms = clock.elapsed().as_millis() as u64;

        tracing::info!(
            status = %summary.status,
            completed_steps = summary.completed_steps,
            pending_steps = summary.pending_steps,
            success_rate = %summary.success_rate,
            duration_ms = summary.duration_ms,
            "playbook run finished"
        );
        self.event_bus.publish(PlaybookEvent::RunFinished {
            run_id,
            workflow_id: summary.workflow_id.clone(),
            status: summary.status,
            completed_steps: summary.completed_steps,
            duration_ms: summary.duration_ms,
        });

        Ok(summary)
    }
}

impl PlaybookExecutor for PlaybookRunner {
    async fn execute(&self, request: PlaybookRequest) -> Result<ExecutionSummary, PlaybookError> {
        self.run(request, CancellationToken::new()).await
    }

    async fn execute_with_cancel(
        &self,
        request: PlaybookRequest,
        cancel: CancellationToken,
    ) -> Result<ExecutionSummary, PlaybookError> {
        self.run(request, cancel).await
    }

    async fn cancel(&self, run_id: Uuid) -> Result<(), PlaybookError> {
        let token = self
            .active_runs
            .get(&run_id)
            .map(|entry| entry.value().clone())
            .ok_or(PlaybookError::RunNotFound(run_id))?;
        token.cancel();
        tracing::info!(run_id = %run_id, "playbook run cancellation requested");
        Ok(())
    }
}

impl std::fmt::Debug for PlaybookRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlaybookRunner")
            .field("registry", &self.registry)
            .field("active_runs", &self.active_runs.len())
            .finish()
    }
}

/// Append to the run's ledger. A rejected entry halts the run instead of
/// failing it, so the caller still gets a summary of what was recorded.
fn record(ledger: &mut ExecutionLedger, result: StepResult) -> bool {
    let index = result.index;
    match ledger.append(result) {
        Ok(()) => true,
        Err(e) => {
            tracing::error!(step_index = index, error = %e, "ledger rejected step result, halting run");
            false
        }
    }
}

/// Removes a run's token when the run ends, including when its future is dropped.
struct ActiveRun<'a> {
    runs: &'a DashMap<Uuid, CancellationToken>,
    run_id: Uuid,
}

impl Drop for ActiveRun<'_> {
    fn drop(&mut self) {
        self.runs.remove(&self.run_id);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
