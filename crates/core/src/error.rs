// Central Error Type for the Application

use thiserror::Error;

/// Application-level error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Domain error: {0}")]
    Domain(#[from] crate::domain::DomainError),

    #[error("The queue `{0}' does not exist.")]
    NonExistentQueue(String),

    #[error("Invalid worker configuration: {0}")]
    InvalidWorkerConfig(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Codec error: {0}")]
    Codec(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Execution error: {0}")]
    Execution(#[from] crate::port::ExecutionError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Configuration-time errors that must surface to the caller instead of
    /// being swallowed by a poll loop.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            AppError::NonExistentQueue(_)
                | AppError::InvalidWorkerConfig(_)
                | AppError::Domain(_)
                | AppError::Config(_)
        )
    }
}

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;

impl From<crate::port::BrokerError> for AppError {
    fn from(err: crate::port::BrokerError) -> Self {
        use crate::port::BrokerError;
        match err {
            BrokerError::QueueDoesNotExist(name) => AppError::NonExistentQueue(name),
            BrokerError::Transport(msg) => AppError::Transport(msg),
            BrokerError::InvalidRequest(msg) => AppError::Transport(msg),
        }
    }
}
