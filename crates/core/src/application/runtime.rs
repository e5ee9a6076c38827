//! Runtime context
//!
//! Built once at startup and passed to whatever needs queues, consumers or
//! jobs. Holds the broker handle, the settings and the registration tables.
//! Registration happens before workers start; afterwards the runtime is only
//! read.

use crate::application::consumer::{Consumer, ParallelConfig};
use crate::application::dead_letter::DeadLetterQueue;
use crate::application::job::JobDefinition;
use crate::application::queue::Queue;
use crate::application::worker::Worker;
use crate::config::Settings;
use crate::domain::QueueConfig;
use crate::error::{AppError, Result};
use crate::port::time_provider::SystemTimeProvider;
use crate::port::{BrokerClient, MessageHandler, TimeProvider};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::info;

pub struct Runtime {
    settings: Settings,
    broker: Arc<dyn BrokerClient>,
    time_provider: Arc<dyn TimeProvider>,
    parallel: ParallelConfig,
    queues: Mutex<HashMap<String, Arc<Queue>>>,
    consumers: Vec<Arc<Consumer>>,
    jobs: Vec<Arc<JobDefinition>>,
}

impl Runtime {
    pub fn new(settings: Settings, broker: Arc<dyn BrokerClient>) -> Self {
        Self {
            settings,
            broker,
            time_provider: Arc::new(SystemTimeProvider),
            parallel: ParallelConfig::sequential(),
            queues: Mutex::new(HashMap::new()),
            consumers: Vec::new(),
            jobs: Vec::new(),
        }
    }

    pub fn with_time_provider(mut self, time_provider: Arc<dyn TimeProvider>) -> Self {
        self.time_provider = time_provider;
        self
    }

    /// Parallel strategy applied to consumers built by this runtime
    pub fn with_parallel(mut self, parallel: ParallelConfig) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn broker(&self) -> &Arc<dyn BrokerClient> {
        &self.broker
    }

    /// Queue config with the environment's prefix/suffix applied
    pub fn queue_config(&self, base_name: &str) -> Result<QueueConfig> {
        Ok(QueueConfig::with_naming(base_name, self.settings.naming())?)
    }

    /// Queue binding for a logical name, created once
    pub fn queue(&self, base_name: &str) -> Result<Arc<Queue>> {
        let mut queues = self.lock_queues()?;
        if let Some(queue) = queues.get(base_name) {
            return Ok(Arc::clone(queue));
        }
        let queue = Arc::new(Queue::new(self.queue_config(base_name)?, Arc::clone(&self.broker)));
        queues.insert(base_name.to_string(), Arc::clone(&queue));
        Ok(queue)
    }

    /// Bind a customised config, replacing any earlier binding of that name
    pub fn bind_queue(&self, config: QueueConfig) -> Result<Arc<Queue>> {
        let queue = Arc::new(Queue::new(config, Arc::clone(&self.broker)));
        self.lock_queues()?
            .insert(queue.config().base_name().to_string(), Arc::clone(&queue));
        Ok(queue)
    }

    /// Dead-letter pairing for a logical queue name
    pub fn dead_letter(&self, base_name: &str) -> Result<DeadLetterQueue> {
        DeadLetterQueue::for_queue(self.queue(base_name)?)
    }

    /// Consumer with the runtime's clock and parallel strategy
    pub fn consumer(&self, queue: Arc<Queue>, handler: Arc<dyn MessageHandler>) -> Consumer {
        self.configure(Consumer::new(queue, handler))
    }

    fn configure(&self, consumer: Consumer) -> Consumer {
        consumer
            .with_time_provider(Arc::clone(&self.time_provider))
            .with_parallel(self.parallel)
    }

    /// Register a consumer; registration order is priority order
    ///
    /// # Errors
    /// - `AppError::Config` if a consumer for the same queue is already registered
    pub fn register_consumer(&mut self, consumer: Consumer) -> Result<Arc<Consumer>> {
        if self
            .consumers
            .iter()
            .any(|c| c.base_name() == consumer.base_name())
        {
            return Err(AppError::Config(format!(
                "a consumer for queue `{}' is already registered",
                consumer.base_name()
            )));
        }
        let consumer = Arc::new(consumer);
        info!(queue = %consumer.queue().name(), "Consumer registered");
        self.consumers.push(Arc::clone(&consumer));
        Ok(consumer)
    }

    /// Register a job and, when it schedules through the broker, its consumer
    pub fn register_job(&mut self, definition: JobDefinition) -> Result<Arc<JobDefinition>> {
        if self.job(definition.name()).is_some() {
            return Err(AppError::Config(format!(
                "job `{}' is already registered",
                definition.name()
            )));
        }
        if definition.scheduling_enabled() {
            let consumer = self.configure(definition.consumer());
            self.register_consumer(consumer)?;
        }
        let definition = Arc::new(definition);
        self.jobs.push(Arc::clone(&definition));
        Ok(definition)
    }

    pub fn job(&self, name: &str) -> Option<Arc<JobDefinition>> {
        self.jobs.iter().find(|j| j.name() == name).cloned()
    }

    pub fn consumers(&self) -> &[Arc<Consumer>] {
        &self.consumers
    }

    /// Worker over the registered consumers, optionally filtered by queue name
    pub fn worker(&self, queues: Option<&[String]>) -> Result<Worker> {
        Ok(Worker::new(&self.consumers, queues)?.with_idle_sleep(self.settings.idle_sleep))
    }

    fn lock_queues(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, Arc<Queue>>>> {
        self.queues
            .lock()
            .map_err(|_| AppError::Internal("queue registry lock poisoned".to_string()))
    }
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("settings", &self.settings)
            .field("parallel", &self.parallel)
            .field("consumers", &self.consumers.len())
            .field("jobs", &self.jobs.len())
            .finish()
    }
}
