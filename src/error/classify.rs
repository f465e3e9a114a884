//! Classification cascade: exception kind + message substrings → [`SystemError`].
//!
//! Mirrors the fixed cascade in the design: connection errors are inspected
//! for a "timeout" substring before falling back to "lost"; everything else
//! matches a narrower kind before the catch-all `Unknown`.

use super::taxonomy::{ErrorCategory, ErrorSeverity, SystemError};

/// The shape of the underlying failure, as observed by the caller. Callers
/// map their local `thiserror` variants onto this before classifying —
/// the cascade itself only needs to know the kind and, for connection
/// errors, whether the message mentions a timeout.
#[derive(Debug, Clone)]
pub enum FailureKind {
    Connection { message: String },
    Timeout { message: String },
    JsonParse { message: String },
    ValueDomain { message: String },
    MissingLibrary { message: String },
    MissingField { message: String },
    Other { message: String },
}

impl FailureKind {
    fn message(&self) -> &str {
        match self {
            Self::Connection { message }
            | Self::Timeout { message }
            | Self::JsonParse { message }
            | Self::ValueDomain { message }
            | Self::MissingLibrary { message }
            | Self::MissingField { message }
            | Self::Other { message } => message,
        }
    }
}

fn mentions_timeout(message: &str) -> bool {
    let lower = message.to_lowercase();
    lower.contains("timeout") || lower.contains("timed out")
}

/// Classify a failure per the closed cascade in the design.
pub fn classify(kind: FailureKind) -> SystemError {
    let message = kind.message().to_string();
    match &kind {
        FailureKind::Connection { .. } if mentions_timeout(&message) => {
            SystemError::new(1001, ErrorCategory::Connection, ErrorSeverity::High, message)
                .with_recovery_suggestions(vec![
                    "Check network connectivity to the drone".to_string(),
                    "Retry the connection".to_string(),
                ])
                .recoverable(true)
        }
        FailureKind::Connection { .. } => {
            SystemError::new(1002, ErrorCategory::Connection, ErrorSeverity::High, message)
                .with_recovery_suggestions(vec!["Reconnect to the drone".to_string()])
                .recoverable(true)
        }
        FailureKind::Timeout { .. } => SystemError::new(
            2001,
            ErrorCategory::Timeout,
            ErrorSeverity::Medium,
            message,
        )
        .with_recovery_suggestions(vec!["Retry the command".to_string()])
        .recoverable(true),
        FailureKind::JsonParse { .. } => SystemError::new(
            3001,
            ErrorCategory::Validation,
            ErrorSeverity::Medium,
            message,
        )
        .with_recovery_suggestions(vec!["Check the message format".to_string()])
        .recoverable(true),
        FailureKind::ValueDomain { .. } => SystemError::new(
            3002,
            ErrorCategory::Validation,
            ErrorSeverity::Low,
            message,
        )
        .with_recovery_suggestions(vec!["Check the parameter is within its allowed range".to_string()])
        .recoverable(true),
        FailureKind::MissingLibrary { .. } => SystemError::new(
            9001,
            ErrorCategory::System,
            ErrorSeverity::Critical,
            message,
        )
        .with_recovery_suggestions(vec!["Install the missing runtime dependency and restart".to_string()])
        .recoverable(false),
        FailureKind::MissingField { .. } => SystemError::new(
            3003,
            ErrorCategory::Validation,
            ErrorSeverity::Medium,
            message,
        )
        .with_recovery_suggestions(vec!["Supply the missing field".to_string()])
        .recoverable(true),
        FailureKind::Other { .. } => {
            SystemError::new(9999, ErrorCategory::Unknown, ErrorSeverity::Medium, message)
                .recoverable(true)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_timeout_beats_plain_connection() {
        let err = classify(FailureKind::Connection {
            message: "connection timeout after 5s".to_string(),
        });
        assert_eq!(err.code, 1001);
        assert_eq!(err.category, ErrorCategory::Connection);
        assert!(err.recoverable);
    }

    #[test]
    fn plain_connection_is_lost() {
        let err = classify(FailureKind::Connection {
            message: "connection reset by peer".to_string(),
        });
        assert_eq!(err.code, 1002);
    }

    #[test]
    fn missing_library_is_not_recoverable() {
        let err = classify(FailureKind::MissingLibrary {
            message: "libopencv not found".to_string(),
        });
        assert_eq!(err.severity, ErrorSeverity::Critical);
        assert!(!err.recoverable);
    }

    #[test]
    fn fallthrough_is_unknown() {
        let err = classify(FailureKind::Other {
            message: "something odd".to_string(),
        });
        assert_eq!(err.category, ErrorCategory::Unknown);
    }
}
