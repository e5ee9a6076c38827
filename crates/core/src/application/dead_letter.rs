//! Dead-Letter Queue
//!
//! Pairs a main queue with `<base>_dead_queue`. The broker moves a message
//! there once it has been received more than `max_receive_count` times.
//!
//! `requeue` is not atomic: each message is re-sent to the main queue and then
//! deleted from the dead queue, so a crash in between leaves a duplicate.

use crate::application::queue::Queue;
use crate::application::worker::constants::MAX_BATCH_SIZE;
use crate::domain::{DeadLetterLink, Envelope, RedrivePolicy};
use crate::error::Result;
use crate::port::broker::ATTR_REDRIVE_POLICY;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

/// How many messages `requeue` moves
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequeueAmount {
    Count(usize),
    All,
}

/// Main queue + dead-letter partner
#[derive(Debug, Clone)]
pub struct DeadLetterQueue {
    main: Arc<Queue>,
    dead: Arc<Queue>,
}

impl DeadLetterQueue {
    pub fn new(main: Arc<Queue>, dead: Arc<Queue>) -> Self {
        Self { main, dead }
    }

    /// Derive the dead queue from the main queue's config (same broker)
    pub fn for_queue(main: Arc<Queue>) -> Result<Self> {
        let config = main.config().dead_letter()?;
        let dead = Arc::new(Queue::new(config, Arc::clone(main.broker())));
        Ok(Self { main, dead })
    }

    pub fn main(&self) -> &Arc<Queue> {
        &self.main
    }

    pub fn dead(&self) -> &Arc<Queue> {
        &self.dead
    }

    pub fn link(&self) -> DeadLetterLink {
        DeadLetterLink {
            main_queue: self.main.config().base_name().to_string(),
            dead_queue: self.dead.config().base_name().to_string(),
            max_receive_count: self.main.config().attributes.max_receive_count,
        }
    }

    /// Set the main queue's redrive policy to target the dead queue
    ///
    /// Returns `false` when the policy was already in place (no write).
    pub async fn wire(&self) -> Result<bool> {
        let desired = RedrivePolicy {
            max_receive_count: self.main.config().attributes.max_receive_count,
            dead_letter_target_arn: self.dead.arn().await?.to_string(),
        };

        let current = self
            .main
            .info()
            .await?
            .get(ATTR_REDRIVE_POLICY)
            .and_then(|raw| RedrivePolicy::parse(raw));
        if current.as_ref() == Some(&desired) {
            debug!(queue = %self.main.name(), "Redrive policy already wired");
            return Ok(false);
        }

        let attributes = HashMap::from([(ATTR_REDRIVE_POLICY.to_string(), desired.to_json())]);
        self.main.update_attributes(attributes).await?;
        info!(
            queue = %self.main.name(),
            dead_queue = %self.dead.name(),
            max_receive_count = desired.max_receive_count,
            "Redrive policy wired"
        );
        Ok(true)
    }

    /// Create the dead queue if missing, then wire the main queue to it
    pub async fn create(&self) -> Result<String> {
        let url = self.dead.create().await?;
        self.wire().await?;
        Ok(url)
    }

    /// Move messages from the dead queue back to the main queue; returns the count moved
    pub async fn requeue(&self, amount: RequeueAmount) -> Result<usize> {
        let limit = match amount {
            RequeueAmount::Count(n) => n,
            RequeueAmount::All => usize::MAX,
        };
        let main_url = self.main.url().await?.to_string();

        let mut moved = 0;
        while moved < limit {
            let batch = self
                .dead
                .receive((limit - moved).min(MAX_BATCH_SIZE))
                .await?;
            if batch.is_empty() {
                break;
            }

            for message in batch {
                self.main
                    .send(&Envelope::new(main_url.as_str(), message.body))
                    .await?;
                self.dead.delete(&message.receipt_handle).await?;
                moved += 1;
            }
        }

        info!(
            queue = %self.main.name(),
            dead_queue = %self.dead.name(),
            count = moved,
            "Requeued dead messages"
        );
        Ok(moved)
    }
}
