//! Error types for weft-core

use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};
use thiserror::Error;

/// Stable error classification shared by every weft crate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidConfig,
    InvalidTemplate,
    InvalidCandidate,
    InvalidDataset,
    BudgetExhausted,
    ProviderNetwork,
    ProviderAuth,
    ProviderRateLimit,
    ProviderInvalidRequest,
    ProviderServer,
    ToolNotFound,
    ToolSchemaMismatch,
    ToolExecution,
    ToolTimeout,
    ReflectorFailure,
    PluginMissingScore,
    PluginInvalidReturn,
    Canceled,
    Serialization,
    Io,
    Database,
}

/// Failure class reported by a provider adapter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ProviderErrorKind {
    Network,
    Auth,
    RateLimit,
    InvalidRequest,
    Server,
}

impl ProviderErrorKind {
    /// Classify an HTTP status code
    pub fn from_status(status: u16) -> Self {
        match status {
            401 | 403 => Self::Auth,
            429 => Self::RateLimit,
            400..=499 => Self::InvalidRequest,
            _ => Self::Server,
        }
    }
}

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Provider error ({kind}): {message}")]
    Provider {
        kind: ProviderErrorKind,
        message: String,
    },

    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    #[error("Tool '{tool}' input does not match schema: {message}")]
    ToolSchemaMismatch { tool: String, message: String },

    #[error("Tool '{tool}' failed: {message}")]
    ToolExecution { tool: String, message: String },

    #[error("Tool '{tool}' timed out after {timeout_ms}ms")]
    ToolTimeout { tool: String, timeout_ms: u64 },

    #[error("Duplicate tool: {0}")]
    DuplicateTool(String),

    #[error("Operation canceled")]
    Canceled,

    #[error("Deadline exceeded")]
    DeadlineExceeded,

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl CoreError {
    pub fn provider(kind: ProviderErrorKind, message: impl Into<String>) -> Self {
        Self::Provider {
            kind,
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidConfig(_) | Self::DuplicateTool(_) => ErrorKind::InvalidConfig,
            Self::Provider { kind, .. } => match kind {
                ProviderErrorKind::Network => ErrorKind::ProviderNetwork,
                ProviderErrorKind::Auth => ErrorKind::ProviderAuth,
                ProviderErrorKind::RateLimit => ErrorKind::ProviderRateLimit,
                ProviderErrorKind::InvalidRequest => ErrorKind::ProviderInvalidRequest,
                ProviderErrorKind::Server => ErrorKind::ProviderServer,
            },
            Self::ToolNotFound(_) => ErrorKind::ToolNotFound,
            Self::ToolSchemaMismatch { .. } => ErrorKind::ToolSchemaMismatch,
            Self::ToolExecution { .. } => ErrorKind::ToolExecution,
            Self::ToolTimeout { .. } => ErrorKind::ToolTimeout,
            Self::Canceled | Self::DeadlineExceeded => ErrorKind::Canceled,
            Self::Serialization(_) => ErrorKind::Serialization,
        }
    }

    pub fn is_canceled(&self) -> bool {
        self.kind() == ErrorKind::Canceled
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

impl From<serde_yaml::Error> for CoreError {
    fn from(e: serde_yaml::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_status_classification() {
        assert_eq!(ProviderErrorKind::from_status(401), ProviderErrorKind::Auth);
        assert_eq!(ProviderErrorKind::from_status(429), ProviderErrorKind::RateLimit);
        assert_eq!(
            ProviderErrorKind::from_status(422),
            ProviderErrorKind::InvalidRequest
        );
        assert_eq!(ProviderErrorKind::from_status(503), ProviderErrorKind::Server);
    }

    #[test]
    fn test_kind_names() {
        let err = CoreError::provider(ProviderErrorKind::RateLimit, "slow down");
        assert_eq!(err.kind().to_string(), "provider_rate_limit");
        assert_eq!(
            ErrorKind::from_str("tool_timeout").unwrap(),
            ErrorKind::ToolTimeout
        );
        assert!(CoreError::DeadlineExceeded.is_canceled());
    }
}
