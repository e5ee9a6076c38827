//! Queue binding
//!
//! Pairs a [`QueueConfig`] with the broker handle and body codec it is used
//! through. URL and ARN are looked up on first use and memoized for the life of
//! the binding.

use crate::application::worker::constants::{MAX_BATCH_SIZE, RECEIVE_WAIT_SECONDS};
use crate::codec::{BodyCodec, JsonCodec};
use crate::domain::{Envelope, QueueConfig, ReceivedMessage};
use crate::error::{AppError, Result};
use crate::port::broker::{ATTR_APPROXIMATE_MESSAGES, ATTR_QUEUE_ARN};
use crate::port::{BrokerClient, BrokerError};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, info};

/// Clamp a requested fetch size to what one receive call allows
///
/// Anything outside `1..=10` falls back to the ceiling.
pub fn effective_batch_size(requested: usize) -> usize {
    if (1..=MAX_BATCH_SIZE).contains(&requested) {
        requested
    } else {
        MAX_BATCH_SIZE
    }
}

/// A queue bound to a broker
pub struct Queue {
    config: QueueConfig,
    broker: Arc<dyn BrokerClient>,
    codec: Arc<dyn BodyCodec>,
    url: OnceCell<String>,
    arn: OnceCell<String>,
}

impl Queue {
    /// Bind a queue with the default JSON codec
    pub fn new(config: QueueConfig, broker: Arc<dyn BrokerClient>) -> Self {
        let url = match config.explicit_url() {
            Some(url) => OnceCell::new_with(Some(url.to_string())),
            None => OnceCell::new(),
        };
        Self {
            config,
            broker,
            codec: Arc::new(JsonCodec),
            url,
            arn: OnceCell::new(),
        }
    }

    /// Replace the body codec
    pub fn with_codec(mut self, codec: Arc<dyn BodyCodec>) -> Self {
        self.codec = codec;
        self
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    /// Full broker-side name
    pub fn name(&self) -> &str {
        self.config.full_name()
    }

    pub fn codec(&self) -> &dyn BodyCodec {
        self.codec.as_ref()
    }

    pub fn broker(&self) -> &Arc<dyn BrokerClient> {
        &self.broker
    }

    /// Queue URL (explicit, or looked up once)
    ///
    /// # Errors
    /// - `AppError::NonExistentQueue` if the broker has no queue by this name
    pub async fn url(&self) -> Result<&str> {
        let url = self
            .url
            .get_or_try_init(|| async {
                debug!(queue = %self.name(), "Resolving queue url");
                self.broker
                    .get_queue_url(self.name())
                    .await
                    .map_err(AppError::from)
            })
            .await?;
        Ok(url.as_str())
    }

    /// Queue ARN (looked up once from the queue attributes)
    pub async fn arn(&self) -> Result<&str> {
        let arn = self
            .arn
            .get_or_try_init(|| async {
                let attributes = self.info().await?;
                attributes.get(ATTR_QUEUE_ARN).cloned().ok_or_else(|| {
                    AppError::Transport(format!("queue {} reported no {}", self.name(), ATTR_QUEUE_ARN))
                })
            })
            .await?;
        Ok(arn.as_str())
    }

    /// Create the queue unless it already exists; returns its URL
    pub async fn create(&self) -> Result<String> {
        let url = match self.broker.get_queue_url(self.name()).await {
            Ok(url) => {
                debug!(queue = %self.name(), "Queue already exists");
                url
            }
            Err(BrokerError::QueueDoesNotExist(_)) => {
                let url = self
                    .broker
                    .create_queue(self.name(), &self.config.attributes.to_create_attributes())
                    .await?;
                info!(queue = %self.name(), url = %url, "Queue created");
                url
            }
            Err(e) => return Err(e.into()),
        };

        // An explicit URL stays authoritative
        let _ = self.url.set(url.clone());
        Ok(url)
    }

    /// All broker attributes of the queue
    pub async fn info(&self) -> Result<HashMap<String, String>> {
        let url = self.url().await?;
        Ok(self.broker.get_queue_attributes(url).await?)
    }

    /// Approximate number of visible messages (0 if not reported)
    pub async fn count_messages(&self) -> Result<u64> {
        let attributes = self.info().await?;
        Ok(attributes
            .get(ATTR_APPROXIMATE_MESSAGES)
            .and_then(|raw| raw.parse().ok())
            .unwrap_or(0))
    }

    /// Administrative attribute update
    pub async fn update_attributes(&self, attributes: HashMap<String, String>) -> Result<()> {
        let url = self.url().await?;
        self.broker.set_queue_attributes(url, &attributes).await?;
        info!(queue = %self.name(), keys = ?attributes.keys().collect::<Vec<_>>(), "Queue attributes updated");
        Ok(())
    }

    /// Non-blocking fetch of up to `max_messages` (clamped to the batch ceiling)
    pub async fn receive(&self, max_messages: usize) -> Result<Vec<ReceivedMessage>> {
        let url = self.url().await?;
        Ok(self
            .broker
            .receive_messages(url, effective_batch_size(max_messages), RECEIVE_WAIT_SECONDS)
            .await?)
    }

    /// Permanently remove one delivered message
    pub async fn delete(&self, receipt_handle: &str) -> Result<()> {
        let url = self.url().await?;
        Ok(self.broker.delete_message(url, receipt_handle).await?)
    }

    /// Send a prepared envelope
    pub async fn send(&self, envelope: &Envelope) -> Result<String> {
        Ok(self.broker.send_message(envelope).await?)
    }
}

impl std::fmt::Debug for Queue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Queue")
            .field("name", &self.name())
            .field("url", &self.url.get())
            .finish()
    }
}
