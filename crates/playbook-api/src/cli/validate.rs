//! `playbook validate`: check a playbook file without running it.

use std::path::Path;

use anyhow::Result;
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;

use playbook_core::playbook::validation::{PlaybookError, load_playbook_file};
use playbook_types::playbook::PlaybookRequest;

/// Turn a load failure into a message naming the file.
pub(crate) fn describe_load_error(file: &Path, err: PlaybookError) -> anyhow::Error {
    match err {
        PlaybookError::ParseError(msg) => {
            anyhow::anyhow!("Failed to parse playbook {}: {msg}", file.display())
        }
        PlaybookError::ValidationError(msg) => {
            anyhow::anyhow!("Playbook validation failed: {msg}")
        }
        PlaybookError::IoError(e) => {
            anyhow::anyhow!("Failed to read playbook {}: {e}", file.display())
        }
        other => anyhow::anyhow!("Failed to load playbook: {other}"),
    }
}

/// Step types that parse but have no handler; a run halts on the first one.
fn unknown_types(request: &PlaybookRequest) -> Vec<(String, String)> {
    request
        .steps
        .iter()
        .enumerate()
        .filter(|(_, step)| step.step_type.kind().is_none())
        .map(|(index, step)| (step.resolved_id(index), step.step_type.to_string()))
        .collect()
}

pub fn validate_playbook(file: &Path, json: bool, quiet: bool) -> Result<()> {
    let request = load_playbook_file(file).map_err(|e| describe_load_error(file, e))?;
    let unknown = unknown_types(&request);

    if json {
        let out = serde_json::json!({
            "valid": true,
            "workflow_id": request.workflow_id,
            "executed_by": request.executed_by,
            "steps": request.steps.len(),
            "unknown_step_types": unknown
                .iter()
                .map(|(id, ty)| serde_json::json!({ "step_id": id, "type": ty }))
                .collect::<Vec<_>>(),
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    if quiet {
        return Ok(());
    }

    println!();
    println!(
        "  {} Playbook '{}' is valid ({} steps)",
        style("✓").green().bold(),
        style(&request.workflow_id).cyan(),
        request.steps.len()
    );
    println!();

    if !request.steps.is_empty() {
        let mut table = Table::new();
        table
            .load_preset(presets::UTF8_FULL_CONDENSED)
            .set_content_arrangement(ContentArrangement::Dynamic)
            .set_header(vec![
                Cell::new("#").fg(Color::Cyan),
                Cell::new("ID"),
                Cell::new("Type"),
                Cell::new("Title"),
                Cell::new("Priority"),
            ]);

        for (index, step) in request.steps.iter().enumerate() {
            let type_cell = if step.step_type.kind().is_some() {
                Cell::new(step.step_type.to_string())
            } else {
                Cell::new(step.step_type.to_string()).fg(Color::Red)
            };
            table.add_row(vec![
                Cell::new(index + 1),
                Cell::new(step.resolved_id(index)),
                type_cell,
                Cell::new(&step.title),
                Cell::new(step.priority()),
            ]);
        }
        println!("{table}");
        println!();
    }

    for (id, ty) in &unknown {
        println!(
            "  {} {id}: unknown step type '{ty}'; a run will halt here",
            style("!").yellow().bold()
        );
    }
    if !unknown.is_empty() {
        println!();
    }

    Ok(())
}
