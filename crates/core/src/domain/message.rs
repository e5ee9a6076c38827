// Message Domain Model

use std::collections::HashMap;

/// Outbound unit handed to the broker
///
/// Built per send and never mutated afterwards; the broker owns durability.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub queue_url: String,
    pub body: String,
    pub delay_seconds: u32,
    pub attributes: HashMap<String, String>,
}

impl Envelope {
    pub fn new(queue_url: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            queue_url: queue_url.into(),
            body: body.into(),
            delay_seconds: 0,
            attributes: HashMap::new(),
        }
    }

    pub fn with_delay(mut self, delay_seconds: u32) -> Self {
        self.delay_seconds = delay_seconds;
        self
    }

    pub fn with_attributes(mut self, attributes: HashMap<String, String>) -> Self {
        self.attributes = attributes;
        self
    }
}

/// One delivery of a message, as returned by `ReceiveMessage`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedMessage {
    pub message_id: String,
    pub receipt_handle: String,
    pub body: String,
    pub attributes: HashMap<String, String>,
    /// Broker-reported delivery count (1 on first delivery), if known
    pub receive_count: Option<u32>,
}

/// Result of executing one message
#[derive(Debug)]
pub struct MessageOutcome {
    pub message_id: String,
    pub acked: bool,
    pub error: Option<crate::port::ExecutionError>,
}

impl MessageOutcome {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Aggregated result of one consume cycle
#[derive(Debug, Default)]
pub struct BatchReport {
    /// Messages fetched from the broker (what the worker schedules on)
    pub fetched: usize,
    pub outcomes: Vec<MessageOutcome>,
}

impl BatchReport {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn acked(&self) -> usize {
        self.outcomes.iter().filter(|o| o.acked).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.iter().filter(|o| !o.is_success()).count()
    }
}
