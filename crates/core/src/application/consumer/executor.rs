// Per-message execution: hooks, deadline enforcement, panic isolation, ack

use super::{BatchDeadline, ParallelMode};
use crate::application::hooks::{ConsumerHooks, ExceptionContext};
use crate::application::queue::Queue;
use crate::domain::{MessageOutcome, ReceivedMessage};
use crate::error::AppError;
use crate::port::{ExecutionError, MessageContext, MessageHandler};
use serde_json::Value;
use std::any::Any;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, warn};

/// Everything one message execution needs; cloned into each executor task
#[derive(Clone)]
pub(super) struct MessageExecutor {
    pub(super) queue: Arc<Queue>,
    pub(super) handler: Arc<dyn MessageHandler>,
    pub(super) hooks: ConsumerHooks,
    pub(super) mode: ParallelMode,
}

impl MessageExecutor {
    /// Run messages one after another, in fetch order
    pub(super) async fn run_sequential(
        &self,
        messages: &[ReceivedMessage],
        deadline: BatchDeadline,
        fetched_at: i64,
    ) -> Vec<MessageOutcome> {
        let mut outcomes = Vec::with_capacity(messages.len());
        for message in messages {
            outcomes.push(self.execute(message.clone(), deadline, fetched_at).await);
        }
        outcomes
    }

    /// Fan out over at most `executors` concurrent tasks
    ///
    /// Pool lives for this batch only; completion order is not fetch order.
    pub(super) async fn run_parallel(
        &self,
        messages: &[ReceivedMessage],
        deadline: BatchDeadline,
        fetched_at: i64,
        executors: usize,
    ) -> Vec<MessageOutcome> {
        let semaphore = Arc::new(Semaphore::new(executors));
        let mut set = JoinSet::new();

        for message in messages {
            let executor = self.clone();
            let semaphore = Arc::clone(&semaphore);
            let message = message.clone();
            set.spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok();
                executor.execute(message, deadline, fetched_at).await
            });
        }

        let mut outcomes = Vec::with_capacity(messages.len());
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(outcome) => outcomes.push(outcome),
                // Only a panicking hook can end up here
                Err(e) => error!(queue = %self.queue.name(), error = %e, "Executor task failed"),
            }
        }
        outcomes
    }

    /// Execute one message and acknowledge it if allowed
    pub(super) async fn execute(
        &self,
        message: ReceivedMessage,
        deadline: BatchDeadline,
        fetched_at: i64,
    ) -> MessageOutcome {
        let message_id = message.message_id.clone();
        let (payload, decode_error) = match self.queue.codec().load(&message.body) {
            Ok(payload) => (payload, None),
            Err(e) => (Value::Null, Some(ExecutionError::Decode(e.to_string()))),
        };

        // A floored deadline means the visibility window is already spent
        let (message_deadline, floored) = deadline.for_message();
        let ctx = MessageContext::new(
            self.queue.name(),
            message,
            payload,
            message_deadline,
            fetched_at,
            !floored && decode_error.is_none(),
        );

        let error = match decode_error {
            Some(err) => Some(err),
            None => {
                self.hooks.run_before_each(&ctx);
                let result = self.run_handler(&ctx).await.err();
                if result.is_some() {
                    ctx.set_delete(false);
                }
                self.hooks.run_after_each(&ctx);
                result
            }
        };

        if let Some(err) = &error {
            warn!(
                queue = %self.queue.name(),
                message_id = %message_id,
                error = %err,
                "Message execution failed"
            );
            self.hooks
                .run_resolver_exception(&AppError::Execution(err.clone()), ExceptionContext::Message(&ctx));
        }

        let acked = self.acknowledge(&ctx).await;
        MessageOutcome {
            message_id,
            acked,
            error,
        }
    }

    async fn acknowledge(&self, ctx: &MessageContext) -> bool {
        if !ctx.will_delete() {
            debug!(
                queue = %self.queue.name(),
                message_id = %ctx.message_id(),
                "Message left on queue"
            );
            self.hooks.run_message_not_deleted(ctx);
            return false;
        }

        match self.queue.delete(ctx.receipt_handle()).await {
            Ok(()) => true,
            Err(e) => {
                warn!(
                    queue = %self.queue.name(),
                    receipt_handle = %ctx.receipt_handle(),
                    error = %e,
                    "Message delete failed"
                );
                self.hooks
                    .run_resolver_exception(&e, ExceptionContext::Delete(ctx));
                false
            }
        }
    }

    /// Run the handler in its own task until the deadline instant
    async fn run_handler(&self, ctx: &MessageContext) -> Result<(), ExecutionError> {
        let budget = ctx.deadline().budget();
        let mut task = self.spawn_handler(ctx.clone());

        match tokio::time::timeout_at(ctx.deadline().expires_at(), &mut task).await {
            Ok(Ok(Ok(()))) => Ok(()),
            Ok(Ok(Err(e))) => Err(ExecutionError::Handler(format!("{:#}", e))),
            Ok(Err(join_error)) if join_error.is_panic() => Err(ExecutionError::Panicked(
                panic_message(join_error.into_panic()),
            )),
            Ok(Err(join_error)) => Err(ExecutionError::Handler(join_error.to_string())),
            Err(_) => {
                // Cooperative signal first; abort only stops async handlers
                ctx.deadline().expire();
                task.abort();
                Err(ExecutionError::Timeout {
                    budget_ms: budget.as_millis() as u64,
                })
            }
        }
    }

    fn spawn_handler(&self, ctx: MessageContext) -> JoinHandle<anyhow::Result<()>> {
        let handler = Arc::clone(&self.handler);
        match self.mode {
            ParallelMode::Processes => {
                let runtime = tokio::runtime::Handle::current();
                tokio::task::spawn_blocking(move || {
                    runtime.block_on(async move { handler.perform(&ctx).await })
                })
            }
            ParallelMode::Sequential | ParallelMode::Threads => {
                tokio::spawn(async move { handler.perform(&ctx).await })
            }
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "Unknown panic".to_string()
    }
}
