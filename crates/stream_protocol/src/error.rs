use std::time::Duration;

use reqwest::StatusCode;
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("invalid stream endpoint: {0}")]
    InvalidEndpoint(String),
    #[error("invalid header {name}: {reason}")]
    InvalidHeader { name: String, reason: String },
    #[error("request error: {0}")]
    Request(#[from] reqwest::Error),
    #[error("HTTP {status} {message}")]
    Status { status: u16, message: String },
    #[error("no frame received for {}s", .idle.as_secs())]
    Stalled { idle: Duration },
    #[error("request was cancelled")]
    Cancelled,
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("runtime error: {0}")]
    Runtime(String),
}

impl ProtocolError {
    /// Whether resubmitting the same request could plausibly succeed.
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Stalled { .. } | Self::Request(_) => true,
            Self::Status { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ErrorPayload {
    error: Option<ErrorField>,
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ErrorField {
    Text(String),
    Detailed { message: Option<String> },
}

/// Extract a human-readable message from a non-2xx response body.
pub fn parse_error_message(status: StatusCode, body: &str) -> String {
    let fallback = || {
        if body.trim().is_empty() {
            status
                .canonical_reason()
                .unwrap_or("request failed")
                .to_string()
        } else {
            body.trim().to_string()
        }
    };

    let Ok(parsed) = serde_json::from_str::<ErrorPayload>(body) else {
        return fallback();
    };

    let explicit = match parsed.error {
        Some(ErrorField::Text(text)) => Some(text),
        Some(ErrorField::Detailed { message }) => message,
        None => None,
    }
    .or(parsed.message)
    .filter(|message| !message.trim().is_empty());

    explicit.unwrap_or_else(fallback)
}

#[cfg(test)]
mod tests {
    use reqwest::StatusCode;

    use super::{parse_error_message, ProtocolError};

    #[test]
    fn error_message_prefers_structured_fields() {
        assert_eq!(
            parse_error_message(StatusCode::BAD_REQUEST, r#"{"error":"Query is required"}"#),
            "Query is required"
        );
        assert_eq!(
            parse_error_message(
                StatusCode::INTERNAL_SERVER_ERROR,
                r#"{"error":{"message":"upstream down"}}"#
            ),
            "upstream down"
        );
    }

    #[test]
    fn error_message_falls_back_to_body_or_reason() {
        assert_eq!(
            parse_error_message(StatusCode::BAD_GATEWAY, "gateway exploded"),
            "gateway exploded"
        );
        assert_eq!(
            parse_error_message(StatusCode::SERVICE_UNAVAILABLE, ""),
            "Service Unavailable"
        );
    }

    #[test]
    fn recoverability_follows_status_class() {
        let server = ProtocolError::Status {
            status: 503,
            message: "busy".to_owned(),
        };
        let client = ProtocolError::Status {
            status: 400,
            message: "bad".to_owned(),
        };
        assert!(server.is_recoverable());
        assert!(!client.is_recoverable());
        assert!(!ProtocolError::Cancelled.is_recoverable());
    }
}
