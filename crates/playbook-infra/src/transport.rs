//! Failure classification shared by the HTTP-backed adapters.

use playbook_core::playbook::capability::CapabilityError;

/// Map a non-success HTTP status to a capability error.
///
/// Request timeouts, rate limits and server errors are worth retrying;
/// every other client error is permanent.
pub(crate) fn classify_status(status: reqwest::StatusCode, body: &str) -> CapabilityError {
    let message = if body.trim().is_empty() {
        format!("HTTP {status}")
    } else {
        format!("HTTP {status}: {}", body.trim())
    };
    match status.as_u16() {
        408 | 429 => CapabilityError::Transient(message),
        _ if status.is_server_error() => CapabilityError::Transient(message),
        _ => CapabilityError::Failed(message),
    }
}

/// Map a transport-level reqwest error to a capability error.
pub(crate) fn classify_send_error(err: &reqwest::Error) -> CapabilityError {
    if err.is_builder() {
        CapabilityError::Failed(format!("invalid request: {err}"))
    } else {
        CapabilityError::Transient(format!("HTTP request failed: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;

    #[test]
    fn rate_limit_and_server_errors_are_transient() {
        assert!(classify_status(StatusCode::TOO_MANY_REQUESTS, "").is_transient());
        assert!(classify_status(StatusCode::REQUEST_TIMEOUT, "").is_transient());
        assert!(classify_status(StatusCode::BAD_GATEWAY, "upstream").is_transient());
        assert!(classify_status(StatusCode::SERVICE_UNAVAILABLE, "").is_transient());
    }

    #[test]
    fn client_errors_are_permanent() {
        let err = classify_status(StatusCode::UNAUTHORIZED, "bad key");
        assert!(!err.is_transient());
        assert_eq!(err.message(), "HTTP 401 Unauthorized: bad key");
        assert!(!classify_status(StatusCode::BAD_REQUEST, "").is_transient());
        assert!(!classify_status(StatusCode::NOT_FOUND, "").is_transient());
    }
}
