//! Playbook request parsing and validation.
//!
//! Converts YAML/JSON documents into a `PlaybookRequest` and validates the
//! structural constraints a run depends on. Validation failures are the only
//! errors a caller ever sees from a run; everything that goes wrong inside a
//! step is recorded in the execution summary instead.

use std::collections::HashSet;
use std::path::Path;

use playbook_types::playbook::{PlaybookRequest, StepSpec};
use thiserror::Error;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors surfaced to the caller of a run.
#[derive(Debug, Error)]
pub enum PlaybookError {
    /// YAML/JSON parse failure (including missing required fields).
    #[error("parse error: {0}")]
    ParseError(String),

    /// Structural validation failure; the run never started.
    #[error("validation error: {0}")]
    ValidationError(String),

    /// Filesystem I/O failure while loading a playbook file.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Cancellation was requested for a run that is not active.
    #[error("playbook run not found: {0}")]
    RunNotFound(Uuid),
}

impl PlaybookError {
    /// True for errors caused by malformed caller input.
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            PlaybookError::ParseError(_) | PlaybookError::ValidationError(_)
        )
    }
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

/// Parse a YAML string into a validated `PlaybookRequest`.
pub fn parse_playbook_yaml(yaml: &str) -> Result<PlaybookRequest, PlaybookError> {
    let request = deserialize_yaml(yaml)?;
    validate_request(&request)?;
    Ok(request)
}

/// Parse a JSON string into a validated `PlaybookRequest`.
pub fn parse_playbook_json(json: &str) -> Result<PlaybookRequest, PlaybookError> {
    let request = deserialize_json(json)?;
    validate_request(&request)?;
    Ok(request)
}

fn deserialize_yaml(yaml: &str) -> Result<PlaybookRequest, PlaybookError> {
    serde_yaml_ng::from_str(yaml).map_err(|e| PlaybookError::ParseError(e.to_string()))
}

fn deserialize_json(json: &str) -> Result<PlaybookRequest, PlaybookError> {
    serde_json::from_str(json).map_err(|e| PlaybookError::ParseError(e.to_string()))
}

fn deserialize_file(path: &Path, content: &str) -> Result<PlaybookRequest, PlaybookError> {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("json") => deserialize_json(content),
        _ => deserialize_yaml(content),
    }
}

/// Read a playbook from a `.json`, `.yaml` or `.yml` file without validating it.
///
/// Callers that adjust the request before running it validate afterwards
/// (the runner always does). Files with any other extension are parsed as
/// YAML, which also accepts JSON.
pub async fn read_playbook_file(path: &Path) -> Result<PlaybookRequest, PlaybookError> {
    let content = tokio::fs::read_to_string(path).await?;
    deserialize_file(path, &content)
}

/// Load and validate a playbook file. Blocking; for synchronous callers.
pub fn load_playbook_file(path: &Path) -> Result<PlaybookRequest, PlaybookError> {
    let content = std::fs::read_to_string(path)?;
    let request = deserialize_file(path, &content)?;
    validate_request(&request)?;
    Ok(request)
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Validate structural constraints on a `PlaybookRequest`.
///
/// Checks:
/// - `workflow_id` and `executed_by` are non-blank
/// - explicit step IDs are non-blank and unique
/// - every step's type-specific parameters are in range
///
/// An empty step list is valid.
pub fn validate_request(request: &PlaybookRequest) -> Result<(), PlaybookError> {
    if request.workflow_id.trim().is_empty() {
        return Err(PlaybookError::ValidationError(
            "workflowId must not be empty".to_string(),
        ));
    }
    if request.executed_by.trim().is_empty() {
        return Err(PlaybookError::ValidationError(
            "executedBy must not be empty".to_string(),
        ));
    }

    let mut seen_ids = HashSet::new();
    for (index, step) in request.steps.iter().enumerate() {
        if let Some(id) = &step.id {
            if id.trim().is_empty() {
                return Err(PlaybookError::ValidationError(format!(
                    "step {index} has an empty id"
                )));
            }
        }
        let id = step.resolved_id(index);
        if !seen_ids.insert(id.clone()) {
            return Err(PlaybookError::ValidationError(format!(
                "duplicate step ID: '{id}'"
            )));
        }
        validate_step(index, step)?;
    }

    Ok(())
}

/// Validate a single step's type-specific parameters.
pub fn validate_step(index: usize, step: &StepSpec) -> Result<(), PlaybookError> {
    let invalid = |msg: String| PlaybookError::ValidationError(format!("step {index}: {msg}"));

    if let Some(secs) = step.delay_seconds {
        if !secs.is_finite() || secs < 0.0 {
            return Err(invalid(format!(
                "delaySeconds must be a non-negative number, got {secs}"
            )));
        }
    }

    if let Some(hours) = step.duration_hours {
        if !hours.is_finite() || hours <= 0.0 {
            return Err(invalid(format!(
                "durationHours must be a positive number, got {hours}"
            )));
        }
    }

    if let Some(channels) = &step.channels {
        if channels.iter().any(|c| c.trim().is_empty()) {
            return Err(invalid("channels must not contain empty names".to_string()));
        }
    }

    if step.timeout_secs == Some(0) {
        return Err(invalid("timeoutSecs must be > 0".to_string()));
    }

    if let Some(retry) = &step.retry {
        if retry.max_attempts == 0 {
            return Err(invalid("retry.max_attempts must be >= 1".to_string()));
        }
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use playbook_types::config::RetryPolicy;
    use playbook_types::playbook::StepKind;

    fn step(kind: StepKind) -> StepSpec {
        StepSpec::new(kind.into(), "do_it", "Do it")
    }

    fn request(steps: Vec<StepSpec>) -> PlaybookRequest {
        PlaybookRequest::new("incident-response", steps, "alice")
    }

    #[test]
    fn test_empty_steps_is_valid() {
        assert!(validate_request(&request(vec![])).is_ok());
    }

    #[test]
    fn test_blank_workflow_id_rejected() {
        let mut req = request(vec![]);
        req.workflow_id = "  ".to_string();
        let err = validate_request(&req).unwrap_err();
        assert!(err.is_input_error());
        assert!(err.to_string().contains("workflowId"));
    }

    #[test]
    fn test_blank_executed_by_rejected() {
        let mut req = request(vec![]);
        req.executed_by = String::new();
        let err = validate_request(&req).unwrap_err();
        assert!(err.to_string().contains("executedBy"));
    }

    #[test]
    fn test_duplicate_step_ids_rejected() {
        let req = request(vec![
            step(StepKind::System).with_id("a"),
            step(StepKind::System).with_id("a"),
        ]);
        let err = validate_request(&req).unwrap_err();
        assert!(err.to_string().contains("duplicate step ID"));
    }

    #[test]
    fn test_explicit_id_colliding_with_default_rejected() {
        let req = request(vec![step(StepKind::System), step(StepKind::System).with_id("step_1")]);
        assert!(validate_request(&req).is_err());
    }

    #[test]
    fn test_negative_delay_rejected() {
        let req = request(vec![step(StepKind::Delay).with_delay_seconds(-1.0)]);
        let err = validate_request(&req).unwrap_err();
        assert!(err.to_string().contains("delaySeconds"));
    }

    #[test]
    fn test_nan_delay_rejected() {
        let req = request(vec![step(StepKind::Delay).with_delay_seconds(f64::NAN)]);
        assert!(validate_request(&req).is_err());
    }

    #[test]
    fn test_zero_delay_accepted() {
        let req = request(vec![step(StepKind::Delay).with_delay_seconds(0.0)]);
        assert!(validate_request(&req).is_ok());
    }

    #[test]
    fn test_non_positive_duration_hours_rejected() {
        let req = request(vec![step(StepKind::Human).with_duration_hours(0.0)]);
        let err = validate_request(&req).unwrap_err();
        assert!(err.to_string().contains("durationHours"));
    }

    #[test]
    fn test_blank_channel_rejected() {
        let req = request(vec![step(StepKind::Notification).with_channels(["slack", " "])]);
        assert!(validate_request(&req).is_err());
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let req = request(vec![step(StepKind::System).with_timeout_secs(0)]);
        assert!(validate_request(&req).is_err());
    }

    #[test]
    fn test_zero_retry_attempts_rejected() {
        let req = request(vec![step(StepKind::AiAnalysis).with_retry(RetryPolicy {
            max_attempts: 0,
            ..RetryPolicy::default()
        })]);
        assert!(validate_request(&req).is_err());
    }

    #[test]
    fn test_unknown_step_type_is_not_an_input_error() {
        let req = request(vec![StepSpec::new("Teleport".into(), "beam", "Beam")]);
        assert!(validate_request(&req).is_ok());
    }

    #[test]
    fn test_parse_yaml_missing_executed_by_fails() {
        let yaml = "workflowId: wf\nsteps: []\n";
        let err = parse_playbook_yaml(yaml).unwrap_err();
        assert!(matches!(err, PlaybookError::ParseError(_)));
    }

    #[test]
    fn test_parse_json_valid() {
        let json = r#"{
            "workflowId": "wf",
            "executedBy": "bob",
            "steps": [{"type": "System", "action": "send_alert", "title": "Alert"}]
        }"#;
        let req = parse_playbook_json(json).unwrap();
        assert_eq!(req.steps.len(), 1);
    }

    #[test]
    fn test_load_playbook_file_by_extension() {
        let dir = tempfile::tempdir().unwrap();

        let json_path = dir.path().join("wf.json");
        std::fs::write(
            &json_path,
            r#"{"workflowId": "wf", "executedBy": "bob", "steps": []}"#,
        )
        .unwrap();
        assert_eq!(load_playbook_file(&json_path).unwrap().workflow_id, "wf");

        let yaml_path = dir.path().join("wf.yaml");
        std::fs::write(&yaml_path, "workflowId: wf2\nexecutedBy: bob\nsteps: []\n").unwrap();
        assert_eq!(load_playbook_file(&yaml_path).unwrap().workflow_id, "wf2");
    }

    #[tokio::test]
    async fn test_read_playbook_file_skips_validation() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("draft.yml");
        std::fs::write(&path, "workflowId: wf\nexecutedBy: ''\nsteps: []\n").unwrap();

        let draft = read_playbook_file(&path).await.unwrap();
        assert!(draft.executed_by.is_empty());
        assert!(load_playbook_file(&path).unwrap_err().is_input_error());
    }

    #[test]
    fn test_load_missing_file_is_io_error() {
        let err = load_playbook_file(Path::new("/definitely/not/here.yaml")).unwrap_err();
        assert!(matches!(err, PlaybookError::IoError(_)));
        assert!(!err.is_input_error());
    }

    #[tokio::test]
    async fn test_read_json_playbook_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wf.json");
        tokio::fs::write(
            &path,
            r#"{"workflowId": "wf", "executedBy": "bob", "steps": [{"type": "System", "action": "send_alert", "title": "Alert"}]}"#,
        )
        .await
        .unwrap();

        let request = read_playbook_file(&path).await.unwrap();
        assert_eq!(request.steps.len(), 1);

        let missing = read_playbook_file(&dir.path().join("gone.json"))
            .await
            .unwrap_err();
        assert!(matches!(missing, PlaybookError::IoError(_)));
    }
}
