use crate::domain::model::{CampaignId, RecipientId};
use std::fmt;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MailerError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Configuration error in {field}: {message}")]
    ConfigValidationError { field: String, message: String },

    #[error("Invalid value '{value}' for {field}: {reason}")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Missing required configuration: {field}")]
    MissingConfigError { field: String },

    #[error("Campaign {id} not found")]
    CampaignNotFound { id: CampaignId },

    #[error("Recipient {id} not found")]
    RecipientNotFound { id: RecipientId },

    #[error("Recipient store error: {message}")]
    StoreError { message: String },

    #[error("Transport error: {0}")]
    TransportError(#[from] TransportError),
}

pub type Result<T> = std::result::Result<T, MailerError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Configuration,
    Storage,
    Network,
    Data,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl MailerError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            MailerError::ConfigValidationError { .. }
            | MailerError::InvalidConfigValueError { .. }
            | MailerError::MissingConfigError { .. } => ErrorCategory::Configuration,
            MailerError::IoError(_) | MailerError::StoreError { .. } => ErrorCategory::Storage,
            MailerError::TransportError(_) => ErrorCategory::Network,
            MailerError::SerializationError(_)
            | MailerError::CampaignNotFound { .. }
            | MailerError::RecipientNotFound { .. } => ErrorCategory::Data,
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self {
            MailerError::CampaignNotFound { .. } | MailerError::RecipientNotFound { .. } => {
                ErrorSeverity::Medium
            }
            MailerError::TransportError(e) if e.kind != TransportErrorKind::Authentication => {
                ErrorSeverity::Medium
            }
            MailerError::IoError(_) | MailerError::StoreError { .. } => ErrorSeverity::Critical,
            _ => ErrorSeverity::High,
        }
    }

    pub fn recovery_suggestion(&self) -> &'static str {
        match self.category() {
            ErrorCategory::Configuration => {
                "Check the configuration file and the environment variables it references"
            }
            ErrorCategory::Storage => "Check that the store file exists and is writable",
            ErrorCategory::Network => "Check SMTP host, port, TLS and credentials, then retry",
            ErrorCategory::Data => "Check the campaign and recipient ids with the `list` command",
        }
    }

    pub fn user_friendly_message(&self) -> String {
        match self {
            MailerError::CampaignNotFound { id } => format!("找不到 campaign {}", id),
            MailerError::RecipientNotFound { id } => format!("找不到 recipient {}", id),
            MailerError::MissingConfigError { field } => {
                format!("Configuration is missing '{}'", field)
            }
            other => other.to_string(),
        }
    }
}

/// Send Operation 失敗的類型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    Connection,
    Timeout,
    Authentication,
    Rejected,
    Protocol,
}

impl fmt::Display for TransportErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            TransportErrorKind::Connection => "connection",
            TransportErrorKind::Timeout => "timeout",
            TransportErrorKind::Authentication => "authentication",
            TransportErrorKind::Rejected => "rejected",
            TransportErrorKind::Protocol => "protocol",
        };
        f.write_str(label)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct TransportError {
    pub kind: TransportErrorKind,
    pub message: String,
}

impl TransportError {
    pub fn new(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn connection(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Connection, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Timeout, message)
    }

    pub fn authentication(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Authentication, message)
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Rejected, message)
    }

    pub fn protocol(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Protocol, message)
    }
}

impl From<std::io::Error> for TransportError {
    fn from(err: std::io::Error) -> Self {
        TransportError::connection(err.to_string())
    }
}
