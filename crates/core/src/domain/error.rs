// Domain Error Types

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    #[error("Invalid delay: {0} (must be an integer between 1 and 960 seconds)")]
    InvalidDelay(i64),

    #[error("Invalid queue name: {0}")]
    InvalidQueueName(String),

    #[error("Reserved method name `{0}'")]
    ReservedIdentifier(String),

    #[error("Validation error: {0}")]
    ValidationError(String),
}

pub type Result<T> = std::result::Result<T, DomainError>;
