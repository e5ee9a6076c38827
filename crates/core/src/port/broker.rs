// Broker Client Port (Interface)
// Capability set over a remote queue service; any compliant SDK can back it.

use crate::domain::{Envelope, ReceivedMessage};
use async_trait::async_trait;
use std::collections::HashMap;
use thiserror::Error;

/// Broker attribute carrying the queue ARN
pub const ATTR_QUEUE_ARN: &str = "QueueArn";

/// Broker attribute carrying the redrive policy JSON
pub const ATTR_REDRIVE_POLICY: &str = "RedrivePolicy";

/// Broker attribute carrying the approximate visible message count
pub const ATTR_APPROXIMATE_MESSAGES: &str = "ApproximateNumberOfMessages";

/// Broker attribute carrying the visibility timeout (seconds)
pub const ATTR_VISIBILITY_TIMEOUT: &str = "VisibilityTimeout";

/// Errors reported by a broker implementation
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BrokerError {
    #[error("Queue does not exist: {0}")]
    QueueDoesNotExist(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

/// Broker client interface
///
/// Implementations:
/// - `quiver_infra_sqs::SqsBroker`: AWS SQS
/// - `quiver_infra_memory::InMemoryBroker`: in-process emulation
#[async_trait]
pub trait BrokerClient: Send + Sync {
    /// Send one envelope, returning the broker message id
    async fn send_message(&self, envelope: &Envelope) -> Result<String, BrokerError>;

    /// Receive up to `max_messages` (at most 10) messages
    ///
    /// `wait_time_secs = 0` makes the call non-blocking.
    async fn receive_messages(
        &self,
        queue_url: &str,
        max_messages: usize,
        wait_time_secs: u32,
    ) -> Result<Vec<ReceivedMessage>, BrokerError>;

    /// Permanently remove one delivered message
    async fn delete_message(&self, queue_url: &str, receipt_handle: &str)
        -> Result<(), BrokerError>;

    /// Remove several delivered messages; returns the receipt handles that failed
    async fn delete_message_batch(
        &self,
        queue_url: &str,
        receipt_handles: &[String],
    ) -> Result<Vec<String>, BrokerError>;

    /// Look up a queue URL by full name
    ///
    /// # Errors
    /// - `BrokerError::QueueDoesNotExist` if no queue has that name
    async fn get_queue_url(&self, queue_name: &str) -> Result<String, BrokerError>;

    /// Create a queue (or return the existing one's URL)
    async fn create_queue(
        &self,
        queue_name: &str,
        attributes: &[(String, String)],
    ) -> Result<String, BrokerError>;

    /// Fetch all queue attributes
    async fn get_queue_attributes(
        &self,
        queue_url: &str,
    ) -> Result<HashMap<String, String>, BrokerError>;

    /// Update queue attributes
    async fn set_queue_attributes(
        &self,
        queue_url: &str,
        attributes: &HashMap<String, String>,
    ) -> Result<(), BrokerError>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use std::collections::{HashSet, VecDeque};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct MockQueue {
        visible: VecDeque<ReceivedMessage>,
        in_flight: Vec<ReceivedMessage>,
        deleted: usize,
        sent: Vec<Envelope>,
        attributes: HashMap<String, String>,
    }

    /// Mock broker: FIFO queues, messages go in-flight on receive and stay
    /// there until deleted or explicitly released.
    #[derive(Default)]
    pub struct MockBroker {
        queues: Mutex<HashMap<String, MockQueue>>,
        missing: Mutex<HashSet<String>>,
        fail_receive: AtomicBool,
        fail_send: AtomicBool,
        fail_url_lookup: AtomicBool,
        next_id: AtomicUsize,
        receive_calls: AtomicUsize,
        url_lookups: AtomicUsize,
    }

    impl MockBroker {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn url_for(queue_name: &str) -> String {
            format!("mock://{}", queue_name)
        }

        /// Mark a queue name as absent: lookups fail with QueueDoesNotExist
        pub fn remove_queue(&self, queue_name: &str) {
            self.missing.lock().unwrap().insert(queue_name.to_string());
        }

        /// Enqueue a raw body directly, bypassing send hooks
        pub fn push(&self, queue_name: &str, body: impl Into<String>) {
            let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
            let mut queues = self.queues.lock().unwrap();
            queues
                .entry(Self::url_for(queue_name))
                .or_default()
                .visible
                .push_back(ReceivedMessage {
                    message_id: format!("m-{}", id),
                    receipt_handle: format!("r-{}", id),
                    body: body.into(),
                    attributes: HashMap::new(),
                    receive_count: None,
                });
        }

        pub fn fail_receive(&self, fail: bool) {
            self.fail_receive.store(fail, Ordering::SeqCst);
        }

        pub fn fail_send(&self, fail: bool) {
            self.fail_send.store(fail, Ordering::SeqCst);
        }

        pub fn fail_url_lookup(&self, fail: bool) {
            self.fail_url_lookup.store(fail, Ordering::SeqCst);
        }

        /// Return in-flight messages to the front of the queue (visibility expired)
        pub fn release_in_flight(&self, queue_name: &str) {
            let mut queues = self.queues.lock().unwrap();
            if let Some(queue) = queues.get_mut(&Self::url_for(queue_name)) {
                for message in queue.in_flight.drain(..).rev() {
                    queue.visible.push_front(message);
                }
            }
        }

        pub fn visible(&self, queue_name: &str) -> usize {
            self.with_queue(queue_name, |q| q.visible.len())
        }

        pub fn in_flight(&self, queue_name: &str) -> usize {
            self.with_queue(queue_name, |q| q.in_flight.len())
        }

        pub fn deleted(&self, queue_name: &str) -> usize {
            self.with_queue(queue_name, |q| q.deleted)
        }

        pub fn sent(&self, queue_name: &str) -> Vec<Envelope> {
            self.with_queue(queue_name, |q| q.sent.clone())
        }

        pub fn attributes(&self, queue_name: &str) -> HashMap<String, String> {
            self.with_queue(queue_name, |q| q.attributes.clone())
        }

        pub fn receive_calls(&self) -> usize {
            self.receive_calls.load(Ordering::SeqCst)
        }

        pub fn url_lookups(&self) -> usize {
            self.url_lookups.load(Ordering::SeqCst)
        }

        fn with_queue<T: Default>(&self, queue_name: &str, f: impl FnOnce(&MockQueue) -> T) -> T {
            self.queues
                .lock()
                .unwrap()
                .get(&Self::url_for(queue_name))
                .map(f)
                .unwrap_or_default()
        }

        fn name_of(url: &str) -> &str {
            url.trim_start_matches("mock://")
        }
    }

    #[async_trait]
    impl BrokerClient for MockBroker {
        async fn send_message(&self, envelope: &Envelope) -> Result<String, BrokerError> {
            if self.fail_send.load(Ordering::SeqCst) {
                return Err(BrokerError::Transport("send failed".to_string()));
            }
            let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
            let mut queues = self.queues.lock().unwrap();
            let queue = queues.entry(envelope.queue_url.clone()).or_default();
            queue.sent.push(envelope.clone());
            queue.visible.push_back(ReceivedMessage {
                message_id: format!("m-{}", id),
                receipt_handle: format!("r-{}", id),
                body: envelope.body.clone(),
                attributes: envelope.attributes.clone(),
                receive_count: None,
            });
            Ok(format!("m-{}", id))
        }

        async fn receive_messages(
            &self,
            queue_url: &str,
            max_messages: usize,
            _wait_time_secs: u32,
        ) -> Result<Vec<ReceivedMessage>, BrokerError> {
            self.receive_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_receive.load(Ordering::SeqCst) {
                return Err(BrokerError::Transport("receive failed".to_string()));
            }
            let mut queues = self.queues.lock().unwrap();
            let queue = queues.entry(queue_url.to_string()).or_default();
            let take = max_messages.min(10).min(queue.visible.len());
            let batch: Vec<ReceivedMessage> = queue.visible.drain(..take).collect();
            queue.in_flight.extend(batch.iter().cloned());
            Ok(batch)
        }

        async fn delete_message(
            &self,
            queue_url: &str,
            receipt_handle: &str,
        ) -> Result<(), BrokerError> {
            let mut queues = self.queues.lock().unwrap();
            let queue = queues.entry(queue_url.to_string()).or_default();
            let before = queue.in_flight.len();
            queue.in_flight.retain(|m| m.receipt_handle != receipt_handle);
            queue.deleted += before - queue.in_flight.len();
            Ok(())
        }

        async fn delete_message_batch(
            &self,
            queue_url: &str,
            receipt_handles: &[String],
        ) -> Result<Vec<String>, BrokerError> {
            for handle in receipt_handles {
                self.delete_message(queue_url, handle).await?;
            }
            Ok(Vec::new())
        }

        async fn get_queue_url(&self, queue_name: &str) -> Result<String, BrokerError> {
            self.url_lookups.fetch_add(1, Ordering::SeqCst);
            if self.fail_url_lookup.load(Ordering::SeqCst) {
                return Err(BrokerError::Transport("url lookup failed".to_string()));
            }
            if self.missing.lock().unwrap().contains(queue_name) {
                return Err(BrokerError::QueueDoesNotExist(queue_name.to_string()));
            }
            Ok(Self::url_for(queue_name))
        }

        async fn create_queue(
            &self,
            queue_name: &str,
            attributes: &[(String, String)],
        ) -> Result<String, BrokerError> {
            self.missing.lock().unwrap().remove(queue_name);
            let url = Self::url_for(queue_name);
            let mut queues = self.queues.lock().unwrap();
            let queue = queues.entry(url.clone()).or_default();
            queue.attributes.extend(attributes.iter().cloned());
            Ok(url)
        }

        async fn get_queue_attributes(
            &self,
            queue_url: &str,
        ) -> Result<HashMap<String, String>, BrokerError> {
            let queues = self.queues.lock().unwrap();
            let mut attributes = queues
                .get(queue_url)
                .map(|q| q.attributes.clone())
                .unwrap_or_default();
            let visible = queues.get(queue_url).map(|q| q.visible.len()).unwrap_or(0);
            attributes.insert(ATTR_APPROXIMATE_MESSAGES.to_string(), visible.to_string());
            attributes.insert(
                ATTR_QUEUE_ARN.to_string(),
                format!("arn:mock:{}", Self::name_of(queue_url)),
            );
            Ok(attributes)
        }

        async fn set_queue_attributes(
            &self,
            queue_url: &str,
            attributes: &HashMap<String, String>,
        ) -> Result<(), BrokerError> {
            let mut queues = self.queues.lock().unwrap();
            let queue = queues.entry(queue_url.to_string()).or_default();
            queue
                .attributes
                .extend(attributes.iter().map(|(k, v)| (k.clone(), v.clone())));
            Ok(())
        }
    }
}
