// Port Layer - Interfaces for external dependencies

pub mod broker;
pub mod deadline;
pub mod handler;
pub mod id_provider; // For deterministic testing
pub mod time_provider;

// Re-exports
pub use broker::{BrokerClient, BrokerError};
pub use deadline::Deadline;
pub use handler::{handler_fn, ExecutionError, FnHandler, MessageContext, MessageHandler};
pub use id_provider::IdProvider;
pub use time_provider::TimeProvider;
