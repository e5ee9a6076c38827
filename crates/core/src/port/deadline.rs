// Cooperative deadline token handed to every handler invocation

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;

/// Remaining execution budget for one message
///
/// The executor signals expiry when the budget runs out; handlers doing long
/// or blocking work should poll `is_expired()` or await `expired()` and stop.
/// Each message gets its own token, so expiring one never touches siblings,
/// but messages of one batch share the same expiry instant.
#[derive(Clone, Debug)]
pub struct Deadline {
    budget: Duration,
    expires_at: Instant,
    tx: Arc<watch::Sender<bool>>,
    rx: watch::Receiver<bool>,
}

impl Deadline {
    pub fn new(budget: Duration) -> Self {
        Self::until(Instant::now() + budget)
    }

    /// Token expiring at a fixed instant; the budget is what is left of it now
    pub fn until(expires_at: Instant) -> Self {
        let (tx, rx) = watch::channel(false);
        Self {
            budget: expires_at.saturating_duration_since(Instant::now()),
            expires_at,
            tx: Arc::new(tx),
            rx,
        }
    }

    pub fn expires_at(&self) -> Instant {
        self.expires_at
    }

    /// Budget granted when the message started
    pub fn budget(&self) -> Duration {
        self.budget
    }

    /// Time left before the message must be finished
    pub fn remaining(&self) -> Duration {
        self.expires_at.saturating_duration_since(Instant::now())
    }

    /// True once the executor cancelled the handler or the budget ran out
    pub fn is_expired(&self) -> bool {
        *self.rx.borrow() || self.remaining().is_zero()
    }

    /// Signal cancellation to the handler
    pub fn expire(&self) {
        self.tx.send_replace(true);
    }

    /// Wait until cancellation is signalled or the budget runs out
    pub async fn expired(&self) {
        let mut rx = self.rx.clone();
        tokio::select! {
            _ = rx.wait_for(|expired| *expired) => {},
            _ = tokio::time::sleep_until(self.expires_at) => {},
        }
    }
}
