// Message Handler Port
// Application code implements this to process messages from a queue.

use super::Deadline;
use crate::domain::ReceivedMessage;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;

/// Per-message execution errors (never fatal to the poll loop)
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExecutionError {
    #[error("Handler timed out after {budget_ms}ms")]
    Timeout { budget_ms: u64 },

    #[error("Handler failed: {0}")]
    Handler(String),

    #[error("Handler panicked: {0}")]
    Panicked(String),

    #[error("Message could not be decoded: {0}")]
    Decode(String),
}

/// View of one in-flight message, owned by the consume cycle that fetched it
#[derive(Clone, Debug)]
pub struct MessageContext {
    queue: Arc<str>,
    message: Arc<ReceivedMessage>,
    payload: Arc<serde_json::Value>,
    deadline: Deadline,
    fetched_at: i64,
    delete: Arc<AtomicBool>,
}

impl MessageContext {
    /// # Arguments
    /// * `queue` - Full queue name
    /// * `message` - Delivery as received from the broker
    /// * `payload` - Body decoded by the queue's codec
    /// * `deadline` - Execution budget for this message
    /// * `fetched_at` - Fetch timestamp (epoch ms)
    /// * `delete` - Initial acknowledgement flag
    pub fn new(
        queue: impl Into<Arc<str>>,
        message: ReceivedMessage,
        payload: serde_json::Value,
        deadline: Deadline,
        fetched_at: i64,
        delete: bool,
    ) -> Self {
        Self {
            queue: queue.into(),
            message: Arc::new(message),
            payload: Arc::new(payload),
            deadline,
            fetched_at,
            delete: Arc::new(AtomicBool::new(delete)),
        }
    }

    pub fn queue(&self) -> &str {
        &self.queue
    }

    pub fn message(&self) -> &ReceivedMessage {
        &self.message
    }

    pub fn message_id(&self) -> &str {
        &self.message.message_id
    }

    pub fn receipt_handle(&self) -> &str {
        &self.message.receipt_handle
    }

    /// Raw body as delivered
    pub fn body(&self) -> &str {
        &self.message.body
    }

    /// Body decoded by the queue's codec
    pub fn payload(&self) -> &serde_json::Value {
        &self.payload
    }

    /// Deserialize the decoded body into a concrete type
    pub fn payload_as<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        T::deserialize(self.payload.as_ref())
    }

    pub fn deadline(&self) -> &Deadline {
        &self.deadline
    }

    pub fn fetched_at(&self) -> i64 {
        self.fetched_at
    }

    /// Leave the message on the queue; it is redelivered after the visibility timeout
    pub fn skip_delete(&self) {
        self.delete.store(false, Ordering::SeqCst);
    }

    pub fn set_delete(&self, delete: bool) {
        self.delete.store(delete, Ordering::SeqCst);
    }

    /// Whether the message will be deleted after execution
    pub fn will_delete(&self) -> bool {
        self.delete.load(Ordering::SeqCst)
    }
}

/// Message handler interface
#[async_trait]
pub trait MessageHandler: Send + Sync + 'static {
    /// Process one message
    ///
    /// Returning an error leaves the message un-acknowledged; the broker
    /// redelivers it and eventually moves it to the dead-letter queue.
    async fn perform(&self, ctx: &MessageContext) -> anyhow::Result<()>;
}

/// Handler built from an async closure
pub struct FnHandler<F> {
    f: F,
}

/// Wrap an async closure as a `MessageHandler`
///
/// # Example
/// ```ignore
/// let handler = handler_fn(|ctx: MessageContext| async move {
///     tracing::info!(body = %ctx.body(), "received");
///     Ok(())
/// });
/// ```
pub fn handler_fn<F, Fut>(f: F) -> FnHandler<F>
where
    F: Fn(MessageContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    FnHandler { f }
}

#[async_trait]
impl<F, Fut> MessageHandler for FnHandler<F>
where
    F: Fn(MessageContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    async fn perform(&self, ctx: &MessageContext) -> anyhow::Result<()> {
        (self.f)(ctx.clone()).await
    }
}
