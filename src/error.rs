//! Orchestration Error Types
//!
//! The closed set of error kinds the orchestration core can raise, with the
//! propagation policy each one carries baked into how callers are expected to
//! react (see the `is_terminal` / `audit_cause` helpers below rather than
//! re-deriving the table at each call site).

use thiserror::Error;

/// Cause recorded against a terminal `errored` state, mirrored into
/// progress-bus events so a reconnecting client can see why a Request or
/// Solution stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidRequest,
    InvalidFilter,
    NoData,
    UnsupportedHyperparameterType,
    TransportError,
    Timeout,
    Stalled,
    StorageError,
    Cancelled,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ErrorKind::InvalidRequest => "invalid_request",
            ErrorKind::InvalidFilter => "invalid_filter",
            ErrorKind::NoData => "no_data",
            ErrorKind::UnsupportedHyperparameterType => "unsupported_hyperparameter_type",
            ErrorKind::TransportError => "transport_error",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Stalled => "stalled",
            ErrorKind::StorageError => "storage_error",
            ErrorKind::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

#[derive(Error, Debug)]
pub enum OrchestrationError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("invalid filter: {0}")]
    InvalidFilter(String),

    #[error("no data")]
    NoData,

    #[error("unsupported hyperparameter type: {0}")]
    UnsupportedHyperparameterType(String),

    #[error("transport error: {0}")]
    TransportError(String),

    #[error("pull timeout after {0:?}")]
    Timeout(std::time::Duration),

    #[error("pull loop stalled after {0} consecutive empty responses")]
    Stalled(u32),

    #[error("storage error: {0}")]
    StorageError(String),

    #[error("cancelled")]
    Cancelled,
}

impl OrchestrationError {
    /// The `ErrorKind` tag this error maps onto, for persistence/publication.
    pub fn kind(&self) -> ErrorKind {
        match self {
            OrchestrationError::InvalidRequest(_) => ErrorKind::InvalidRequest,
            OrchestrationError::InvalidFilter(_) => ErrorKind::InvalidFilter,
            OrchestrationError::NoData => ErrorKind::NoData,
            OrchestrationError::UnsupportedHyperparameterType(_) => {
                ErrorKind::UnsupportedHyperparameterType
            }
            OrchestrationError::TransportError(_) => ErrorKind::TransportError,
            OrchestrationError::Timeout(_) => ErrorKind::Timeout,
            OrchestrationError::Stalled(_) => ErrorKind::Stalled,
            OrchestrationError::StorageError(_) => ErrorKind::StorageError,
            OrchestrationError::Cancelled => ErrorKind::Cancelled,
        }
    }

    /// Per spec error-handling design: every kind but `NoData` escalates a
    /// Request/Solution to the terminal `errored` state. `NoData` instead
    /// resolves to an empty-but-successful histogram.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, OrchestrationError::NoData)
    }
}

impl From<sqlx::Error> for OrchestrationError {
    fn from(err: sqlx::Error) -> Self {
        OrchestrationError::StorageError(err.to_string())
    }
}

impl From<tonic::Status> for OrchestrationError {
    fn from(status: tonic::Status) -> Self {
        match status.code() {
            tonic::Code::DeadlineExceeded => {
                OrchestrationError::Timeout(std::time::Duration::ZERO)
            }
            tonic::Code::Cancelled => OrchestrationError::Cancelled,
            _ => OrchestrationError::TransportError(status.message().to_string()),
        }
    }
}

impl From<std::io::Error> for OrchestrationError {
    fn from(err: std::io::Error) -> Self {
        OrchestrationError::StorageError(err.to_string())
    }
}

pub type OrchestrationResult<T> = Result<T, OrchestrationError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_data_is_not_terminal() {
        assert!(!OrchestrationError::NoData.is_terminal());
    }

    #[test]
    fn transport_error_is_terminal() {
        assert!(OrchestrationError::TransportError("boom".into()).is_terminal());
    }

    #[test]
    fn kind_mapping_is_stable() {
        assert_eq!(OrchestrationError::Cancelled.kind(), ErrorKind::Cancelled);
        assert_eq!(
            OrchestrationError::Stalled(5).kind(),
            ErrorKind::Stalled
        );
    }

    #[test]
    fn error_kind_serializes_snake_case() {
        let json = serde_json::to_string(&ErrorKind::UnsupportedHyperparameterType).unwrap();
        assert_eq!(json, "\"unsupported_hyperparameter_type\"");
    }
}
