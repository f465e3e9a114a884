//! The closed, serializable error shape delivered to clients (§4.10, §7).

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    AiConfig,
    Connection,
    CommandExecution,
    BridgeCommunication,
    Hardware,
    Validation,
    Timeout,
    Network,
    System,
    Unknown,
}

impl ErrorCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::AiConfig => "ai_config",
            Self::Connection => "connection",
            Self::CommandExecution => "command_execution",
            Self::BridgeCommunication => "bridge_communication",
            Self::Hardware => "hardware",
            Self::Validation => "validation",
            Self::Timeout => "timeout",
            Self::Network => "network",
            Self::System => "system",
            Self::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

pub type ErrorContext = BTreeMap<String, String>;

/// A fully classified, client-deliverable error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemError {
    /// Stable numeric code, unique per (category, subcode) pair.
    pub code: u32,
    pub category: ErrorCategory,
    pub severity: ErrorSeverity,
    pub message: String,
    #[serde(default)]
    pub context: ErrorContext,
    pub recovery_suggestions: Vec<String>,
    pub recoverable: bool,
    pub timestamp: DateTime<Utc>,
}

impl SystemError {
    pub fn new(
        code: u32,
        category: ErrorCategory,
        severity: ErrorSeverity,
        message: impl Into<String>,
    ) -> Self {
        Self {
            code,
            category,
            severity,
            message: message.into(),
            context: ErrorContext::new(),
            recovery_suggestions: Vec::new(),
            recoverable: true,
            timestamp: Utc::now(),
        }
    }

    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    pub fn with_recovery_suggestions(mut self, suggestions: Vec<String>) -> Self {
        self.recovery_suggestions = suggestions;
        self
    }

    pub fn recoverable(mut self, recoverable: bool) -> Self {
        self.recoverable = recoverable;
        self
    }
}
