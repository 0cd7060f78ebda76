//! `playbook run`: execute a playbook file and print its summary.
//!
//! Ctrl+C cancels the run at its next suspension point; the summary is still
//! printed, with the interrupted step recorded as `cancelled`. The command
//! fails only when the playbook cannot be loaded or does not validate. Step
//! failures are part of the summary, not the exit status.

use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use playbook_core::playbook::capability::{QueuedTask, TaskKind};
use playbook_core::playbook::runner::PlaybookExecutor;
use playbook_core::playbook::validation::read_playbook_file;
use playbook_types::event::PlaybookEvent;
use playbook_types::execution::{ExecutionSummary, StepStatus, SummaryStatus};
use playbook_types::playbook::PlaybookRequest;

use crate::cli::validate::describe_load_error;
use crate::state::AppState;

pub async fn run_playbook(
    state: &AppState,
    file: &Path,
    executed_by: Option<String>,
    context: Option<String>,
    json: bool,
    quiet: bool,
) -> Result<()> {
    let mut request = read_playbook_file(file)
        .await
        .map_err(|e| describe_load_error(file, e))?;
    apply_overrides(&mut request, executed_by, context.as_deref())?;

    let cancel = CancellationToken::new();
    let interrupt = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("interrupt received, cancelling run");
                cancel.cancel();
            }
        })
    };

    let progress = if json || quiet {
        None
    } else {
        Some(tokio::spawn(print_progress(
            state.runner.event_bus().subscribe(),
            request.steps.len(),
        )))
    };

    let result = state.runner.execute_with_cancel(request, cancel).await;
    interrupt.abort();

    let summary = match result {
        Ok(summary) => {
            // RunFinished was published before execute returned.
            if let Some(progress) = progress {
                let _ = progress.await;
            }
            summary
        }
        Err(err) => {
            if let Some(progress) = progress {
                progress.abort();
            }
            return Err(describe_load_error(file, err));
        }
    };

    let queued = state.tasks.take_for_run(summary.run_id).await;

    if json {
        let out = serde_json::json!({
            "execution_summary": summary,
            "queued_tasks": queued,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else if !quiet {
        print_summary(&summary, &queued);
    }

    Ok(())
}

/// Apply `--executed-by` and merge `--context` over the file's context.
fn apply_overrides(
    request: &mut PlaybookRequest,
    executed_by: Option<String>,
    context: Option<&str>,
) -> Result<()> {
    if let Some(actor) = executed_by {
        request.executed_by = actor;
    }
    if let Some(raw) = context {
        let extra: HashMap<String, serde_json::Value> =
            serde_json::from_str(raw).context("--context must be a JSON object")?;
        request.context.extend(extra);
    }
    Ok(())
}

async fn print_progress(mut events: broadcast::Receiver<PlaybookEvent>, total: usize) {
    loop {
        match events.recv().await {
            Ok(PlaybookEvent::StepStarted {
                index,
                step_id,
                step_type,
                ..
            }) => {
                println!(
                    "  {} [{}/{total}] {step_id} ({step_type})",
                    style("→").dim(),
                    index + 1
                );
            }
            Ok(PlaybookEvent::StepFinished {
                step_id,
                status,
                duration_ms,
                ..
            }) => {
                println!(
                    "    {} {step_id} {} in {duration_ms}ms",
                    status_marker(status),
                    status
                );
            }
            Ok(PlaybookEvent::RunFinished { .. }) => break,
            Ok(PlaybookEvent::RunStarted { .. }) => {}
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::debug!(skipped, "progress display lagged behind run events");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

fn status_marker(status: StepStatus) -> console::StyledObject<&'static str> {
    match status {
        StepStatus::Completed => style("✓").green(),
        StepStatus::AwaitingApproval | StepStatus::Delegated => style("…").yellow(),
        StepStatus::Error | StepStatus::UnknownType => style("✗").red(),
        StepStatus::Cancelled => style("■").dim(),
    }
}

fn status_cell(status: StepStatus) -> Cell {
    let cell = Cell::new(status.as_str());
    match status {
        StepStatus::Completed => cell.fg(Color::Green),
        StepStatus::AwaitingApproval | StepStatus::Delegated => cell.fg(Color::Yellow),
        StepStatus::Error | StepStatus::UnknownType => cell.fg(Color::Red),
        StepStatus::Cancelled => cell.fg(Color::DarkGrey),
    }
}

fn headline(status: SummaryStatus) -> console::StyledObject<&'static str> {
    match status {
        SummaryStatus::FullyCompleted => style("fully completed").green().bold(),
        SummaryStatus::PartiallyCompleted => style("partially completed").yellow().bold(),
        SummaryStatus::Failed => style("failed").red().bold(),
        SummaryStatus::Cancelled => style("cancelled").dim().bold(),
    }
}

fn print_summary(summary: &ExecutionSummary, queued: &[QueuedTask]) {
    println!();
    println!(
        "  Playbook '{}' {}",
        style(&summary.workflow_id).cyan(),
        headline(summary.status)
    );
    println!("  Run ID: {}", summary.run_id);
    println!("  Executed by: {}", summary.executed_by);
    println!(
        "  Steps: {}/{} completed, {} pending ({} success)",
        summary.completed_steps,
        summary.total_steps,
        summary.pending_steps,
        summary.success_rate
    );
    println!("  Duration: {}ms", summary.duration_ms);
    println!();

    if !summary.execution_log.is_empty() {
        let mut table = Table::new();
        table
            .load_preset(presets::UTF8_FULL_CONDENSED)
            .set_content_arrangement(ContentArrangement::Dynamic)
            .set_header(vec![
                Cell::new("#").fg(Color::Cyan),
                Cell::new("Step"),
                Cell::new("Type"),
                Cell::new("Status"),
                Cell::new("Assigned"),
                Cell::new("Duration"),
                Cell::new("Notes"),
            ]);

        for entry in &summary.execution_log {
            table.add_row(vec![
                Cell::new(entry.index + 1),
                Cell::new(&entry.step_id),
                Cell::new(entry.step_type.to_string()),
                status_cell(entry.status),
                Cell::new(entry.assigned_to.as_deref().unwrap_or("-")),
                Cell::new(format!("{}ms", entry.duration_ms)),
                Cell::new(&entry.notes),
            ]);
        }
        println!("{table}");
        println!();
    }

    if let Some(index) = summary.halted_at {
        let skipped = summary.total_steps.saturating_sub(index + 1);
        println!(
            "  {} Halted at step {}; {skipped} step(s) not attempted",
            style("!").red().bold(),
            index + 1
        );
        println!();
    }

    if !queued.is_empty() {
        println!("  {}", style("Queued for follow-up:").bold());
        for task in queued {
            let kind = match task.kind {
                TaskKind::Approval => "approval",
                TaskKind::Delegation => "delegation",
            };
            println!(
                "    {} {kind} of '{}' by {} (due {})",
                style("•").dim(),
                task.title,
                style(&task.assignee).cyan(),
                task.deadline.format("%Y-%m-%d %H:%M UTC")
            );
        }
        println!();
    }
}
