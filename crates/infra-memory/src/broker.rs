// In-memory BrokerClient Implementation

use async_trait::async_trait;
use quiver_core::domain::{Envelope, ReceivedMessage, RedrivePolicy};
use quiver_core::port::broker::{
    ATTR_APPROXIMATE_MESSAGES, ATTR_QUEUE_ARN, ATTR_REDRIVE_POLICY, ATTR_VISIBILITY_TIMEOUT,
};
use quiver_core::port::id_provider::UuidProvider;
use quiver_core::port::time_provider::SystemTimeProvider;
use quiver_core::port::{BrokerClient, BrokerError, IdProvider, TimeProvider};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

const BASE_URL: &str = "memory://localhost/000000000000";
const ARN_PREFIX: &str = "arn:aws:sqs:local:000000000000";
const ATTR_NOT_VISIBLE: &str = "ApproximateNumberOfMessagesNotVisible";
const ATTR_DELAY_SECONDS: &str = "DelaySeconds";

/// Broker default when a queue was created without a visibility timeout
const DEFAULT_VISIBILITY_TIMEOUT_SECS: i64 = 30;

/// Behaviour for names that were never created
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BrokerMode {
    /// Unknown queue names fail with `QueueDoesNotExist`
    #[default]
    Strict,
    /// Queue URL lookups create the queue on the fly
    Lenient,
}

#[derive(Debug)]
struct StoredMessage {
    message_id: String,
    body: String,
    attributes: HashMap<String, String>,
    visible_at: i64,
    receive_count: u32,
    receipt_handle: Option<String>,
}

#[derive(Debug)]
struct MemoryQueue {
    name: String,
    arn: String,
    attributes: HashMap<String, String>,
    messages: Vec<StoredMessage>,
}

impl MemoryQueue {
    fn visibility_timeout_ms(&self) -> i64 {
        self.attributes
            .get(ATTR_VISIBILITY_TIMEOUT)
            .and_then(|v| v.parse::<i64>().ok())
            .unwrap_or(DEFAULT_VISIBILITY_TIMEOUT_SECS)
            * 1000
    }

    fn default_delay_ms(&self) -> i64 {
        self.attributes
            .get(ATTR_DELAY_SECONDS)
            .and_then(|v| v.parse::<i64>().ok())
            .unwrap_or(0)
            * 1000
    }

    fn redrive_policy(&self) -> Option<RedrivePolicy> {
        self.attributes
            .get(ATTR_REDRIVE_POLICY)
            .and_then(|raw| RedrivePolicy::parse(raw))
    }
}

#[derive(Debug, Default)]
struct State {
    /// Keyed by URL
    queues: HashMap<String, MemoryQueue>,
}

impl State {
    fn queue_mut(&mut self, url: &str) -> Result<&mut MemoryQueue, BrokerError> {
        self.queues
            .get_mut(url)
            .ok_or_else(|| BrokerError::QueueDoesNotExist(url.to_string()))
    }

    fn url_for_arn(&self, arn: &str) -> Option<String> {
        self.queues
            .iter()
            .find(|(_, q)| q.arn == arn)
            .map(|(url, _)| url.clone())
    }
}

/// Broker emulation held in process memory
///
/// Honours visibility timeouts, delivery delays, receive counts and redrive
/// policies against the injected clock, so tests can move time explicitly.
pub struct InMemoryBroker {
    state: Mutex<State>,
    mode: BrokerMode,
    time_provider: Arc<dyn TimeProvider>,
    id_provider: Arc<dyn IdProvider>,
}

impl Default for InMemoryBroker {
    fn default() -> Self {
        Self::new(BrokerMode::Strict)
    }
}

impl InMemoryBroker {
    pub fn new(mode: BrokerMode) -> Self {
        Self {
            state: Mutex::new(State::default()),
            mode,
            time_provider: Arc::new(SystemTimeProvider),
            id_provider: Arc::new(UuidProvider),
        }
    }

    pub fn with_time_provider(mut self, time_provider: Arc<dyn TimeProvider>) -> Self {
        self.time_provider = time_provider;
        self
    }

    pub fn with_id_provider(mut self, id_provider: Arc<dyn IdProvider>) -> Self {
        self.id_provider = id_provider;
        self
    }

    pub fn mode(&self) -> BrokerMode {
        self.mode
    }

    pub fn url_for(queue_name: &str) -> String {
        format!("{}/{}", BASE_URL, queue_name)
    }

    /// Drop every message of a queue
    pub fn purge(&self, queue_url: &str) -> Result<usize, BrokerError> {
        let mut state = self.lock()?;
        let queue = state.queue_mut(queue_url)?;
        let purged = queue.messages.len();
        queue.messages.clear();
        debug!(queue = %queue.name, count = purged, "Queue purged");
        Ok(purged)
    }

    /// Names of all queues, sorted
    pub fn queue_names(&self) -> Vec<String> {
        let Ok(state) = self.lock() else {
            return Vec::new();
        };
        let mut names: Vec<String> = state.queues.values().map(|q| q.name.clone()).collect();
        names.sort();
        names
    }

    /// Total stored messages of a queue (visible, delayed or in flight)
    pub fn stored_messages(&self, queue_name: &str) -> usize {
        self.lock()
            .ok()
            .and_then(|state| {
                state
                    .queues
                    .get(&Self::url_for(queue_name))
                    .map(|q| q.messages.len())
            })
            .unwrap_or(0)
    }

    fn lock(&self) -> Result<MutexGuard<'_, State>, BrokerError> {
        self.state
            .lock()
            .map_err(|_| BrokerError::Transport("broker state lock poisoned".to_string()))
    }

    fn create_locked(
        &self,
        state: &mut State,
        queue_name: &str,
        attributes: &[(String, String)],
    ) -> String {
        let url = Self::url_for(queue_name);
        state.queues.entry(url.clone()).or_insert_with(|| {
            debug!(queue = %queue_name, "Queue created");
            MemoryQueue {
                name: queue_name.to_string(),
                arn: format!("{}:{}", ARN_PREFIX, queue_name),
                attributes: attributes.iter().cloned().collect(),
                messages: Vec::new(),
            }
        });
        url
    }
}

#[async_trait]
impl BrokerClient for InMemoryBroker {
    async fn send_message(&self, envelope: &Envelope) -> Result<String, BrokerError> {
        let now = self.time_provider.now_millis();
        let message_id = self.id_provider.generate_id();

        let mut state = self.lock()?;
        let queue = state.queue_mut(&envelope.queue_url)?;
        let delay_ms = if envelope.delay_seconds > 0 {
            i64::from(envelope.delay_seconds) * 1000
        } else {
            queue.default_delay_ms()
        };
        queue.messages.push(StoredMessage {
            message_id: message_id.clone(),
            body: envelope.body.clone(),
            attributes: envelope.attributes.clone(),
            visible_at: now + delay_ms,
            receive_count: 0,
            receipt_handle: None,
        });
        Ok(message_id)
    }

    async fn receive_messages(
        &self,
        queue_url: &str,
        max_messages: usize,
        _wait_time_secs: u32,
    ) -> Result<Vec<ReceivedMessage>, BrokerError> {
        if !(1..=10).contains(&max_messages) {
            return Err(BrokerError::InvalidRequest(format!(
                "MaxNumberOfMessages must be between 1 and 10: {}",
                max_messages
            )));
        }
        let now = self.time_provider.now_millis();

        let mut state = self.lock()?;
        let queue = state.queue_mut(queue_url)?;

        // Messages past their receive limit go to the dead-letter target instead
        let policy = queue.redrive_policy();
        let mut redriven = Vec::new();
        if let Some(policy) = &policy {
            let (expired, kept): (Vec<_>, Vec<_>) =
                std::mem::take(&mut queue.messages).into_iter().partition(|m| {
                    m.visible_at <= now && m.receive_count >= policy.max_receive_count
                });
            queue.messages = kept;
            redriven = expired;
        }

        let visibility_ms = queue.visibility_timeout_ms();
        let mut batch = Vec::new();
        for message in queue.messages.iter_mut() {
            if batch.len() == max_messages {
                break;
            }
            if message.visible_at > now {
                continue;
            }
            let receipt_handle = self.id_provider.generate_id();
            message.receive_count += 1;
            message.visible_at = now + visibility_ms;
            message.receipt_handle = Some(receipt_handle.clone());
            batch.push(ReceivedMessage {
                message_id: message.message_id.clone(),
                receipt_handle,
                body: message.body.clone(),
                attributes: message.attributes.clone(),
                receive_count: Some(message.receive_count),
            });
        }

        if let (Some(policy), false) = (policy, redriven.is_empty()) {
            let source = queue.name.clone();
            match state.url_for_arn(&policy.dead_letter_target_arn) {
                Some(target_url) => {
                    let count = redriven.len();
                    let target = state.queue_mut(&target_url)?;
                    target.messages.extend(redriven.into_iter().map(|m| StoredMessage {
                        visible_at: now,
                        receive_count: 0,
                        receipt_handle: None,
                        ..m
                    }));
                    debug!(queue = %source, dead_queue = %target.name, count = count, "Messages redriven");
                }
                None => {
                    // Target missing: keep the messages where they were
                    state.queue_mut(queue_url)?.messages.extend(redriven);
                }
            }
        }

        Ok(batch)
    }

    async fn delete_message(
        &self,
        queue_url: &str,
        receipt_handle: &str,
    ) -> Result<(), BrokerError> {
        let mut state = self.lock()?;
        let queue = state.queue_mut(queue_url)?;
        // Stale handles are ignored, like the real broker does
        queue
            .messages
            .retain(|m| m.receipt_handle.as_deref() != Some(receipt_handle));
        Ok(())
    }

    async fn delete_message_batch(
        &self,
        queue_url: &str,
        receipt_handles: &[String],
    ) -> Result<Vec<String>, BrokerError> {
        let mut state = self.lock()?;
        let queue = state.queue_mut(queue_url)?;
        queue.messages.retain(|m| {
            m.receipt_handle
                .as_ref()
                .map_or(true, |handle| !receipt_handles.contains(handle))
        });
        Ok(Vec::new())
    }

    async fn get_queue_url(&self, queue_name: &str) -> Result<String, BrokerError> {
        let mut state = self.lock()?;
        let url = Self::url_for(queue_name);
        if state.queues.contains_key(&url) {
            return Ok(url);
        }
        match self.mode {
            BrokerMode::Strict => Err(BrokerError::QueueDoesNotExist(queue_name.to_string())),
            BrokerMode::Lenient => Ok(self.create_locked(&mut state, queue_name, &[])),
        }
    }

    async fn create_queue(
        &self,
        queue_name: &str,
        attributes: &[(String, String)],
    ) -> Result<String, BrokerError> {
        if queue_name.is_empty() || queue_name.len() > 80 {
            return Err(BrokerError::InvalidRequest(format!(
                "invalid queue name: {}",
                queue_name
            )));
        }
        let mut state = self.lock()?;
        Ok(self.create_locked(&mut state, queue_name, attributes))
    }

    async fn get_queue_attributes(
        &self,
        queue_url: &str,
    ) -> Result<HashMap<String, String>, BrokerError> {
        let now = self.time_provider.now_millis();
        let mut state = self.lock()?;
        let queue = state.queue_mut(queue_url)?;

        let visible = queue.messages.iter().filter(|m| m.visible_at <= now).count();
        let mut attributes = queue.attributes.clone();
        attributes.insert(ATTR_QUEUE_ARN.to_string(), queue.arn.clone());
        attributes.insert(ATTR_APPROXIMATE_MESSAGES.to_string(), visible.to_string());
        attributes.insert(
            ATTR_NOT_VISIBLE.to_string(),
            (queue.messages.len() - visible).to_string(),
        );
        Ok(attributes)
    }

    async fn set_queue_attributes(
        &self,
        queue_url: &str,
        attributes: &HashMap<String, String>,
    ) -> Result<(), BrokerError> {
        let mut state = self.lock()?;
        let queue = state.queue_mut(queue_url)?;
        queue
            .attributes
            .extend(attributes.iter().map(|(k, v)| (k.clone(), v.clone())));
        Ok(())
    }
}
