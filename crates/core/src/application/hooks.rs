//! Typed callback slots
//!
//! Consumers expose six fixed slots and schedulers three. Every slot is
//! optional and cheap to clone, so hooks travel into spawned executors.

use crate::domain::{Envelope, ReceivedMessage};
use crate::error::AppError;
use crate::port::MessageContext;
use std::sync::Arc;

/// Where a consumer-side error happened
#[derive(Debug, Clone, Copy)]
pub enum ExceptionContext<'a> {
    /// Fetch or other batch-level failure
    Batch,
    /// Decode, handler or timeout failure for one message
    Message(&'a MessageContext),
    /// The acknowledgement itself failed
    Delete(&'a MessageContext),
}

type BatchHook = dyn Fn(&[ReceivedMessage]) + Send + Sync;
type MessageHook = dyn Fn(&MessageContext) + Send + Sync;
type ConsumerExceptionHook = dyn Fn(&AppError, ExceptionContext<'_>) + Send + Sync;

/// Consumer callbacks
#[derive(Clone, Default)]
pub struct ConsumerHooks {
    before_all: Option<Arc<BatchHook>>,
    after_all: Option<Arc<BatchHook>>,
    before_each: Option<Arc<MessageHook>>,
    after_each: Option<Arc<MessageHook>>,
    resolver_exception: Option<Arc<ConsumerExceptionHook>>,
    message_not_deleted: Option<Arc<MessageHook>>,
}

impl ConsumerHooks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Called with the fetched batch (possibly empty) before dispatch
    pub fn before_all<F>(mut self, f: F) -> Self
    where
        F: Fn(&[ReceivedMessage]) + Send + Sync + 'static,
    {
        self.before_all = Some(Arc::new(f));
        self
    }

    /// Called with the fetched batch once every message finished
    pub fn after_all<F>(mut self, f: F) -> Self
    where
        F: Fn(&[ReceivedMessage]) + Send + Sync + 'static,
    {
        self.after_all = Some(Arc::new(f));
        self
    }

    pub fn before_each<F>(mut self, f: F) -> Self
    where
        F: Fn(&MessageContext) + Send + Sync + 'static,
    {
        self.before_each = Some(Arc::new(f));
        self
    }

    pub fn after_each<F>(mut self, f: F) -> Self
    where
        F: Fn(&MessageContext) + Send + Sync + 'static,
    {
        self.after_each = Some(Arc::new(f));
        self
    }

    pub fn resolver_exception<F>(mut self, f: F) -> Self
    where
        F: Fn(&AppError, ExceptionContext<'_>) + Send + Sync + 'static,
    {
        self.resolver_exception = Some(Arc::new(f));
        self
    }

    /// Called for every message left on the queue
    pub fn message_not_deleted<F>(mut self, f: F) -> Self
    where
        F: Fn(&MessageContext) + Send + Sync + 'static,
    {
        self.message_not_deleted = Some(Arc::new(f));
        self
    }

    pub(crate) fn run_before_all(&self, messages: &[ReceivedMessage]) {
        if let Some(hook) = &self.before_all {
            hook(messages);
        }
    }

    pub(crate) fn run_after_all(&self, messages: &[ReceivedMessage]) {
        if let Some(hook) = &self.after_all {
            hook(messages);
        }
    }

    pub(crate) fn run_before_each(&self, ctx: &MessageContext) {
        if let Some(hook) = &self.before_each {
            hook(ctx);
        }
    }

    pub(crate) fn run_after_each(&self, ctx: &MessageContext) {
        if let Some(hook) = &self.after_each {
            hook(ctx);
        }
    }

    pub(crate) fn run_resolver_exception(&self, error: &AppError, context: ExceptionContext<'_>) {
        if let Some(hook) = &self.resolver_exception {
            hook(error, context);
        }
    }

    pub(crate) fn run_message_not_deleted(&self, ctx: &MessageContext) {
        if let Some(hook) = &self.message_not_deleted {
            hook(ctx);
        }
    }
}

impl std::fmt::Debug for ConsumerHooks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConsumerHooks")
            .field("before_all", &self.before_all.is_some())
            .field("after_all", &self.after_all.is_some())
            .field("before_each", &self.before_each.is_some())
            .field("after_each", &self.after_each.is_some())
            .field("resolver_exception", &self.resolver_exception.is_some())
            .field("message_not_deleted", &self.message_not_deleted.is_some())
            .finish()
    }
}

type EnvelopeHook = dyn Fn(&Envelope) + Send + Sync;
type SendAttemptHook = dyn Fn(Option<&Envelope>) + Send + Sync;
type SchedulerExceptionHook = dyn Fn(&AppError, Option<&Envelope>) + Send + Sync;

/// Scheduler callbacks
#[derive(Clone, Default)]
pub struct SchedulerHooks {
    before_each: Option<Arc<EnvelopeHook>>,
    after_each: Option<Arc<SendAttemptHook>>,
    resolver_exception: Option<Arc<SchedulerExceptionHook>>,
}

impl SchedulerHooks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Called before each send; skipped when the URL lookup failed
    pub fn before_each<F>(mut self, f: F) -> Self
    where
        F: Fn(&Envelope) + Send + Sync + 'static,
    {
        self.before_each = Some(Arc::new(f));
        self
    }

    /// Called after every send attempt, successful or not; the envelope is
    /// absent when the URL lookup failed
    pub fn after_each<F>(mut self, f: F) -> Self
    where
        F: Fn(Option<&Envelope>) + Send + Sync + 'static,
    {
        self.after_each = Some(Arc::new(f));
        self
    }

    /// Called for swallowed send failures; the envelope is absent when the
    /// failure happened before it could be built (URL lookup)
    pub fn resolver_exception<F>(mut self, f: F) -> Self
    where
        F: Fn(&AppError, Option<&Envelope>) + Send + Sync + 'static,
    {
        self.resolver_exception = Some(Arc::new(f));
        self
    }

    pub(crate) fn run_before_each(&self, envelope: &Envelope) {
        if let Some(hook) = &self.before_each {
            hook(envelope);
        }
    }

    pub(crate) fn run_after_each(&self, envelope: Option<&Envelope>) {
        if let Some(hook) = &self.after_each {
            hook(envelope);
        }
    }

    pub(crate) fn run_resolver_exception(&self, error: &AppError, envelope: Option<&Envelope>) {
        if let Some(hook) = &self.resolver_exception {
            hook(error, envelope);
        }
    }
}

impl std::fmt::Debug for SchedulerHooks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchedulerHooks")
            .field("before_each", &self.before_each.is_some())
            .field("after_each", &self.after_each.is_some())
            .field("resolver_exception", &self.resolver_exception.is_some())
            .finish()
    }
}
