// Domain Layer - Pure queue, message and invocation model

pub mod error;
pub mod invocation;
pub mod message;
pub mod queue;

// Re-exports
pub use error::DomainError;
pub use invocation::{Arguments, Invocation};
pub use message::{BatchReport, Envelope, MessageOutcome, ReceivedMessage};
pub use queue::{
    resolve_full_name, DeadLetterLink, QueueAttributes, QueueConfig, QueueId, QueueNaming,
    RedrivePolicy,
};
