//! Error taxonomy shared by adapters, cache-fronted calls and the watch engine.

use serde::{Deserialize, Serialize};

/// One entry of the server's `errors` array.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ApiErrorDetail {
    pub error_number: i32,
    pub error_code: String,
    pub source: String,
    pub description: String,
}

/// Client errors. Plain data so they can ride on the watch event stream and
/// be serialized by frontends.
#[derive(Debug, Clone, PartialEq, thiserror::Error, Serialize, Deserialize)]
pub enum SlurmError {
    #[error(
        "unsupported API version {requested} (supported: {}){}",
        .supported.join(", "),
        .nearest.as_ref().map(|n| format!("; nearest is {n}")).unwrap_or_default()
    )]
    UnsupportedVersion {
        requested: String,
        supported: Vec<String>,
        /// Closest supported version on the same `major.minor` line, as a suggestion only.
        #[serde(default)]
        nearest: Option<String>,
    },
    #[error("version detection failed: {0}")]
    VersionDetection(String),
    #[error("cannot convert {kind}: {message}")]
    Conversion { kind: String, message: String },
    #[error("transport error{}: {message}", .status.map(|s| format!(" (HTTP {s})")).unwrap_or_default())]
    Transport { status: Option<u16>, message: String },
    #[error("slurm API error (HTTP {status}, {api_version}): {}", summarize(.errors))]
    Api { status: u16, api_version: String, errors: Vec<ApiErrorDetail> },
    #[error("{operation} is not supported by API {version}")]
    UnsupportedOperation { operation: String, version: String },
    #[error("{kind} {id} not found")]
    NotFound { kind: String, id: String },
    #[error("invalid request: {0}")]
    Validation(String),
    #[error("timed out after {after_ms}ms")]
    Timeout { after_ms: u64 },
    #[error("cancelled")]
    Cancelled,
}

pub type SlurmResult<T> = Result<T, SlurmError>;

fn summarize(errors: &[ApiErrorDetail]) -> String {
    if errors.is_empty() {
        return "no error detail".to_string();
    }
    errors
        .iter()
        .map(|e| {
            if e.error_code.is_empty() {
                e.description.clone()
            } else {
                format!("{}: {}", e.error_code, e.description)
            }
        })
        .collect::<Vec<_>>()
        .join("; ")
}

impl SlurmError {
    pub fn conversion(kind: &str, message: impl Into<String>) -> Self {
        SlurmError::Conversion { kind: kind.to_string(), message: message.into() }
    }

    pub fn transport(status: Option<u16>, message: impl Into<String>) -> Self {
        SlurmError::Transport { status, message: message.into() }
    }

    pub fn unsupported_operation(operation: &str, version: &str) -> Self {
        SlurmError::UnsupportedOperation { operation: operation.to_string(), version: version.to_string() }
    }

    pub fn not_found(kind: &str, id: impl ToString) -> Self {
        SlurmError::NotFound { kind: kind.to_string(), id: id.to_string() }
    }

    /// HTTP status when the error came from the server.
    pub fn status(&self) -> Option<u16> {
        match self {
            SlurmError::Transport { status, .. } => *status,
            SlurmError::Api { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Errors that will not go away by asking again.
    pub fn is_permanent(&self) -> bool {
        matches!(self, SlurmError::UnsupportedOperation { .. } | SlurmError::UnsupportedVersion { .. })
    }

    /// Hint for the external retry layer; the core never retries.
    pub fn is_retryable(&self) -> bool {
        match self {
            SlurmError::Transport { status: None, .. } | SlurmError::Timeout { .. } => true,
            SlurmError::Transport { status: Some(s), .. } | SlurmError::Api { status: s, .. } => {
                *s == 429 || *s >= 500
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_lists_api_details() {
        let err = SlurmError::Api {
            status: 500,
            api_version: "v0.0.42".into(),
            errors: vec![ApiErrorDetail {
                error_number: 2017,
                error_code: "ESLURM_INVALID_JOB_ID".into(),
                source: "_handle_job_get".into(),
                description: "Invalid job id specified".into(),
            }],
        };
        assert_eq!(
            err.to_string(),
            "slurm API error (HTTP 500, v0.0.42): ESLURM_INVALID_JOB_ID: Invalid job id specified"
        );
        assert!(err.is_retryable());
        assert!(!err.is_permanent());
    }

    #[test]
    fn unsupported_version_names_supported_set() {
        let err = SlurmError::UnsupportedVersion {
            requested: "v9.9.9".into(),
            supported: vec!["v0.0.40".into(), "v0.0.41".into()],
            nearest: None,
        };
        assert_eq!(err.to_string(), "unsupported API version v9.9.9 (supported: v0.0.40, v0.0.41)");
        let err = SlurmError::UnsupportedVersion {
            requested: "v0.0.39".into(),
            supported: vec!["v0.0.40".into()],
            nearest: Some("v0.0.40".into()),
        };
        assert_eq!(err.to_string(), "unsupported API version v0.0.39 (supported: v0.0.40); nearest is v0.0.40");
        assert!(err.is_permanent());
    }

    #[test]
    fn transport_display_with_and_without_status() {
        assert_eq!(SlurmError::transport(Some(502), "bad gateway").to_string(), "transport error (HTTP 502): bad gateway");
        assert_eq!(SlurmError::transport(None, "connection refused").to_string(), "transport error: connection refused");
    }
}
