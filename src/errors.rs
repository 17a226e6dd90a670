use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("PATH_BLOCKED: {0}")]
    Traversal(String),
    #[error("FILE_BUSY: {0}")]
    Busy(String),
    #[error("IO_FAILURE: {0}")]
    Io(String),
    #[error("NOT_FOUND: {0}")]
    NotFound(String),
    #[error("CONFIG_INVALID: {0}")]
    Config(String),
    #[error("INTERNAL: {0}")]
    Internal(String),
}

/// How a caller should react to a failed vault operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailureKind {
    /// Refused before touching the filesystem.
    Blocked,
    /// The sync client still held the file after the retry budget ran out.
    Transient,
    Permanent,
}

impl AppError {
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Traversal(_) => FailureKind::Blocked,
            Self::Busy(_) => FailureKind::Transient,
            _ => FailureKind::Permanent,
        }
    }

    pub(crate) fn io(error: std::io::Error, context: impl std::fmt::Display) -> Self {
        let message = format!("{}: {}", context, error);
        Self::classify(&error, message)
    }

    fn classify(error: &std::io::Error, message: String) -> Self {
        if crate::retry::is_transient_lock_error(error) {
            Self::Busy(message)
        } else if error.kind() == std::io::ErrorKind::NotFound {
            Self::NotFound(message)
        } else {
            Self::Io(message)
        }
    }
}

impl From<std::io::Error> for AppError {
    fn from(value: std::io::Error) -> Self {
        let message = value.to_string();
        Self::classify(&value, message)
    }
}

impl From<serde_yaml::Error> for AppError {
    fn from(value: serde_yaml::Error) -> Self {
        Self::Config(value.to_string())
    }
}

pub type AppResult<T> = Result<T, AppError>;
