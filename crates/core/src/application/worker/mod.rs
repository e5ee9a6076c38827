// Worker - multi-queue orchestration

pub mod constants;
mod shutdown;

use constants::*;
pub use shutdown::{shutdown_channel, ShutdownSender, ShutdownToken};

use crate::application::consumer::Consumer;
use crate::error::{AppError, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, error, info};

/// How a worker cycle visits its consumers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WorkerMode {
    /// Every consumer once per cycle
    #[default]
    Fair,
    /// Strict priority: restart from the first consumer whenever one had work
    Priority,
}

/// Callback invoked after every consumer invocation with `(count, consumer)`
pub type CycleObserver = dyn Fn(usize, &Consumer) + Send + Sync;

/// Worker drives a fixed, ordered set of consumers
///
/// Order is priority order: registration order, or the order of the queue
/// filter when one is given.
pub struct Worker {
    consumers: Vec<Arc<Consumer>>,
    mode: WorkerMode,
    observer: Option<Arc<CycleObserver>>,
    idle_sleep: Duration,
}

impl Worker {
    /// Select consumers, optionally restricted to `queues` (logical names)
    ///
    /// # Errors
    /// - `AppError::InvalidWorkerConfig` listing every unknown name, in the given order
    /// - `AppError::InvalidWorkerConfig` when no consumer is left
    pub fn new(registered: &[Arc<Consumer>], queues: Option<&[String]>) -> Result<Self> {
        let consumers = match queues {
            Some(filter) if !filter.is_empty() => select_consumers(registered, filter)?,
            _ => registered.to_vec(),
        };

        if consumers.is_empty() {
            return Err(AppError::InvalidWorkerConfig(
                "No queue consumers were found in this project".to_string(),
            ));
        }

        Ok(Self {
            consumers,
            mode: WorkerMode::Fair,
            observer: None,
            idle_sleep: IDLE_SLEEP_DURATION,
        })
    }

    pub fn with_mode(mut self, mode: WorkerMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_observer<F>(mut self, observer: F) -> Self
    where
        F: Fn(usize, &Consumer) + Send + Sync + 'static,
    {
        self.observer = Some(Arc::new(observer));
        self
    }

    pub fn with_idle_sleep(mut self, idle_sleep: Duration) -> Self {
        self.idle_sleep = idle_sleep;
        self
    }

    pub fn consumers(&self) -> &[Arc<Consumer>] {
        &self.consumers
    }

    pub fn mode(&self) -> WorkerMode {
        self.mode
    }

    /// Run one cycle; returns the total number of messages fetched
    ///
    /// Transport failures are absorbed by each consumer, so only fatal
    /// errors stop a cycle.
    pub async fn perform(&self) -> Result<usize> {
        match self.mode {
            WorkerMode::Fair => self.perform_fair().await,
            WorkerMode::Priority => self.perform_priority().await,
        }
    }

    async fn perform_fair(&self) -> Result<usize> {
        let mut total = 0;
        for consumer in &self.consumers {
            total += self.invoke(consumer).await?;
        }
        Ok(total)
    }

    async fn perform_priority(&self) -> Result<usize> {
        let mut total = 0;
        let mut cursor = 0;
        while cursor < self.consumers.len() {
            let count = self.invoke(&self.consumers[cursor]).await?;
            total += count;
            cursor = if count > 0 { 0 } else { cursor + 1 };
        }
        Ok(total)
    }

    async fn invoke(&self, consumer: &Consumer) -> Result<usize> {
        let count = consumer.consume_messages().await?;
        if let Some(observer) = &self.observer {
            observer(count, consumer);
        }
        Ok(count)
    }

    /// Run cycles until shutdown
    ///
    /// Sleeps `idle_sleep` after a cycle that fetched nothing. Fatal errors end
    /// the loop and are returned.
    pub async fn run(&self, mut shutdown: ShutdownToken) -> Result<()> {
        let queues: Vec<&str> = self.consumers.iter().map(|c| c.base_name()).collect();
        info!(queues = ?queues, mode = ?self.mode, "Worker started");

        loop {
            if shutdown.is_shutdown() {
                info!("Worker shutting down");
                break;
            }
            match self.perform().await {
                Ok(0) => {
                    tokio::select! {
                        _ = sleep(self.idle_sleep) => {},
                        _ = shutdown.wait() => {
                            info!("Worker interrupted during idle");
                            break;
                        }
                    }
                }
                Ok(count) => debug!(count = count, "Worker cycle finished"),
                Err(e) if e.is_fatal() => {
                    error!(error = %e, "Worker stopped on fatal error");
                    return Err(e);
                }
                Err(e) => {
                    error!(error = %e, "Worker error");
                    tokio::select! {
                        _ = sleep(ERROR_RECOVERY_SLEEP_DURATION) => {},
                        _ = shutdown.wait() => {
                            info!("Worker interrupted during error recovery");
                            break;
                        }
                    }
                }
            }
        }
        info!("Worker stopped");
        Ok(())
    }
}

fn select_consumers(registered: &[Arc<Consumer>], filter: &[String]) -> Result<Vec<Arc<Consumer>>> {
    let invalid: Vec<&str> = filter
        .iter()
        .map(String::as_str)
        .filter(|name| !registered.iter().any(|c| c.base_name() == *name))
        .collect();
    if !invalid.is_empty() {
        return Err(AppError::InvalidWorkerConfig(format!(
            "Option queue invalid: [{}]",
            invalid.join(", ")
        )));
    }

    Ok(filter
        .iter()
        .filter_map(|name| registered.iter().find(|c| c.base_name() == name.as_str()))
        .cloned()
        .collect())
}

impl std::fmt::Debug for Worker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Worker")
            .field("consumers", &self.consumers)
            .field("mode", &self.mode)
            .field("idle_sleep", &self.idle_sleep)
            .finish()
    }
}
