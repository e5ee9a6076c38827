//! Scheduler - Producer side of a queue
//!
//! Validates and sends one envelope, now or after a delay.
//! - `now`: delay 0
//! - `later`: delay must be an integer in 1..=960 seconds, checked before any network call
//!
//! A missing queue is a misconfiguration and propagates. Any other send
//! failure is handed to the `resolver_exception` hook and the call returns
//! `Ok(None)` so that a producer running inside a poll loop keeps it alive.

use crate::application::hooks::SchedulerHooks;
use crate::application::queue::Queue;
use crate::application::worker::constants::{MAX_DELAY_SECONDS, MIN_DELAY_SECONDS};
use crate::domain::{DomainError, Envelope};
use crate::error::{AppError, Result};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Check a delay for `later()`
pub fn validate_delay(seconds: i64) -> Result<u32> {
    if !(MIN_DELAY_SECONDS..=MAX_DELAY_SECONDS).contains(&seconds) {
        return Err(DomainError::InvalidDelay(seconds).into());
    }
    Ok(seconds as u32)
}

/// Scheduler sends messages to one queue
#[derive(Debug, Clone)]
pub struct Scheduler {
    queue: Arc<Queue>,
    hooks: SchedulerHooks,
}

impl Scheduler {
    pub fn new(queue: Arc<Queue>) -> Self {
        Self {
            queue,
            hooks: SchedulerHooks::default(),
        }
    }

    pub fn with_hooks(mut self, hooks: SchedulerHooks) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn queue(&self) -> &Arc<Queue> {
        &self.queue
    }

    /// Start a message that carries attributes
    pub fn message(&self, payload: Value) -> PendingMessage<'_> {
        PendingMessage {
            scheduler: self,
            payload,
            attributes: HashMap::new(),
        }
    }

    /// Send immediately; returns the broker message id
    pub async fn now(&self, payload: &Value) -> Result<Option<String>> {
        self.send_message(payload, 0, HashMap::new()).await
    }

    /// Send with a delivery delay
    ///
    /// # Errors
    /// - `DomainError::InvalidDelay` unless `seconds` is in 1..=960
    pub async fn later(&self, payload: &Value, seconds: i64) -> Result<Option<String>> {
        let delay = validate_delay(seconds)?;
        self.send_message(payload, delay, HashMap::new()).await
    }

    /// Encode and send one payload
    ///
    /// Returns `Ok(None)` when a non-fatal failure was routed to the hook.
    pub async fn send_message(
        &self,
        payload: &Value,
        delay_seconds: u32,
        attributes: HashMap<String, String>,
    ) -> Result<Option<String>> {
        let body = self.queue.codec().dump(payload)?;

        let url = match self.queue.url().await {
            Ok(url) => url.to_string(),
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                warn!(queue = %self.queue.name(), error = %e, "Queue url lookup failed");
                self.hooks.run_resolver_exception(&e, None);
                self.hooks.run_after_each(None);
                return Ok(None);
            }
        };

        let envelope = Envelope::new(url, body)
            .with_delay(delay_seconds)
            .with_attributes(attributes);

        self.hooks.run_before_each(&envelope);
        let result = self.queue.send(&envelope).await;
        self.hooks.run_after_each(Some(&envelope));

        match result {
            Ok(message_id) => {
                debug!(
                    queue = %self.queue.name(),
                    message_id = %message_id,
                    delay_seconds = delay_seconds,
                    "Message sent"
                );
                Ok(Some(message_id))
            }
            Err(e @ AppError::NonExistentQueue(_)) => Err(e),
            Err(e) => {
                warn!(queue = %self.queue.name(), error = %e, "Message send failed");
                self.hooks.run_resolver_exception(&e, Some(&envelope));
                Ok(None)
            }
        }
    }
}

/// Message under construction (payload + string attributes)
pub struct PendingMessage<'a> {
    scheduler: &'a Scheduler,
    payload: Value,
    attributes: HashMap<String, String>,
}

impl<'a> PendingMessage<'a> {
    pub fn attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub async fn now(self) -> Result<Option<String>> {
        self.scheduler
            .send_message(&self.payload, 0, self.attributes)
            .await
    }

    pub async fn later(self, seconds: i64) -> Result<Option<String>> {
        let delay = validate_delay(seconds)?;
        self.scheduler
            .send_message(&self.payload, delay, self.attributes)
            .await
    }
}
