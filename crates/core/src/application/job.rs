//! Job definitions
//!
//! A job is a named handler bound to a queue. Callers enqueue an
//! [`Invocation`] (`method` + arguments); the job's consumer decodes it and
//! calls the handler. With scheduling disabled the invocation runs inline and
//! never touches the broker.
//!
//! # Example
//! ```ignore
//! let mailer = runtime.register_job(JobDefinition::new("mailer", queue, Arc::new(job_fn(
//!     |call: JobCall| async move {
//!         tracing::info!(method = ?call.method, "delivering");
//!         Ok(())
//!     },
//! )))?)?;
//!
//! mailer
//!     .enqueue(Some("deliver"), Arguments::new().arg("user@example.com"))?
//!     .later(60)
//!     .await?;
//! ```

use crate::application::consumer::Consumer;
use crate::application::hooks::SchedulerHooks;
use crate::application::queue::Queue;
use crate::application::scheduler::{validate_delay, Scheduler};
use crate::codec::invocation::{decode_invocation, encode_invocation};
use crate::domain::invocation::check_method_name;
use crate::domain::{Arguments, DomainError, Invocation};
use crate::error::{AppError, Result};
use crate::port::{ExecutionError, MessageContext, MessageHandler};
use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use tracing::debug;

/// One call of a job handler
#[derive(Debug, Clone)]
pub struct JobCall {
    pub method: Option<String>,
    pub arguments: Arguments,
    /// Delivery context; `None` for inline execution
    pub context: Option<MessageContext>,
}

/// Job handler interface
#[async_trait]
pub trait JobHandler: Send + Sync + 'static {
    async fn call(&self, call: JobCall) -> anyhow::Result<()>;
}

/// Job handler built from an async closure
pub struct FnJobHandler<F> {
    f: F,
}

/// Wrap an async closure as a `JobHandler`
pub fn job_fn<F, Fut>(f: F) -> FnJobHandler<F>
where
    F: Fn(JobCall) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    FnJobHandler { f }
}

#[async_trait]
impl<F, Fut> JobHandler for FnJobHandler<F>
where
    F: Fn(JobCall) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    async fn call(&self, call: JobCall) -> anyhow::Result<()> {
        (self.f)(call).await
    }
}

/// What happened to an enqueued invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobReceipt {
    /// Sent to the broker; `None` when the send failure went to the hook
    Enqueued(Option<String>),
    /// Run in-process (scheduling disabled)
    Executed,
}

/// Static registration of `{name, handler, queue}`
pub struct JobDefinition {
    name: String,
    queue: Arc<Queue>,
    handler: Arc<dyn JobHandler>,
    scheduling: bool,
    hooks: SchedulerHooks,
}

impl JobDefinition {
    pub fn new(name: impl Into<String>, queue: Arc<Queue>, handler: Arc<dyn JobHandler>) -> Result<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(DomainError::ValidationError("job name cannot be empty".to_string()).into());
        }
        Ok(Self {
            name,
            queue,
            handler,
            scheduling: true,
            hooks: SchedulerHooks::default(),
        })
    }

    /// Disable scheduling: invocations execute inline
    pub fn with_scheduling(mut self, enabled: bool) -> Self {
        self.scheduling = enabled;
        self
    }

    pub fn with_hooks(mut self, hooks: SchedulerHooks) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn queue(&self) -> &Arc<Queue> {
        &self.queue
    }

    pub fn scheduling_enabled(&self) -> bool {
        self.scheduling
    }

    pub fn scheduler(&self) -> Scheduler {
        Scheduler::new(Arc::clone(&self.queue)).with_hooks(self.hooks.clone())
    }

    /// Prepare an invocation of `method`
    ///
    /// # Errors
    /// - `DomainError::ReservedIdentifier` for reserved method names
    pub fn enqueue(&self, method: Option<&str>, arguments: Arguments) -> Result<PendingJob<'_>> {
        if let Some(method) = method {
            check_method_name(method)?;
        }
        Ok(PendingJob {
            definition: self,
            invocation: Invocation::new(self.name.as_str(), method.map(str::to_string), arguments),
        })
    }

    /// Run an invocation in-process
    pub async fn execute(&self, invocation: Invocation, context: Option<MessageContext>) -> Result<()> {
        if invocation.handler_id != self.name {
            return Err(AppError::Codec(format!(
                "invocation for `{}' delivered to job `{}'",
                invocation.handler_id, self.name
            )));
        }
        self.handler
            .call(JobCall {
                method: invocation.method,
                arguments: invocation.arguments,
                context,
            })
            .await
            .map_err(|e| AppError::from(ExecutionError::Handler(format!("{:#}", e))))
    }

    /// Consumer that decodes invocations from this job's queue
    pub fn consumer(&self) -> Consumer {
        let handler = JobMessageHandler {
            name: self.name.clone(),
            handler: Arc::clone(&self.handler),
        };
        Consumer::new(Arc::clone(&self.queue), Arc::new(handler))
    }
}

impl std::fmt::Debug for JobDefinition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobDefinition")
            .field("name", &self.name)
            .field("queue", &self.queue.name())
            .field("scheduling", &self.scheduling)
            .finish()
    }
}

/// Invocation waiting to be sent
#[derive(Debug)]
pub struct PendingJob<'a> {
    definition: &'a JobDefinition,
    invocation: Invocation,
}

impl<'a> PendingJob<'a> {
    pub fn invocation(&self) -> &Invocation {
        &self.invocation
    }

    pub async fn now(self) -> Result<JobReceipt> {
        self.dispatch(0).await
    }

    /// # Errors
    /// - `DomainError::InvalidDelay` unless `seconds` is in 1..=960
    pub async fn later(self, seconds: i64) -> Result<JobReceipt> {
        let delay = validate_delay(seconds)?;
        self.dispatch(delay).await
    }

    async fn dispatch(self, delay_seconds: u32) -> Result<JobReceipt> {
        let definition = self.definition;
        if !definition.scheduling {
            debug!(job = %definition.name, "Scheduling disabled, executing inline");
            definition.execute(self.invocation, None).await?;
            return Ok(JobReceipt::Executed);
        }

        let payload = encode_invocation(&self.invocation)?;
        let message_id = definition
            .scheduler()
            .send_message(&payload, delay_seconds, Default::default())
            .await?;
        Ok(JobReceipt::Enqueued(message_id))
    }
}

struct JobMessageHandler {
    name: String,
    handler: Arc<dyn JobHandler>,
}

#[async_trait]
impl MessageHandler for JobMessageHandler {
    async fn perform(&self, ctx: &MessageContext) -> anyhow::Result<()> {
        let invocation = decode_invocation(ctx.payload())?;
        if invocation.handler_id != self.name {
            anyhow::bail!(
                "invocation for `{}' delivered to job `{}'",
                invocation.handler_id,
                self.name
            );
        }
        self.handler
            .call(JobCall {
                method: invocation.method,
                arguments: invocation.arguments,
                context: Some(ctx.clone()),
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::QueueConfig;
    use crate::port::broker::mocks::MockBroker;
    use crate::port::BrokerClient;
    use serde_json::json;
    use std::sync::Mutex;
    use tokio_test::{assert_err, assert_ok};

    type Calls = Arc<Mutex<Vec<(Option<String>, Arguments)>>>;

    fn definition(broker: &Arc<MockBroker>) -> (JobDefinition, Calls) {
        let calls: Calls = Arc::new(Mutex::new(Vec::new()));
        let c = Arc::clone(&calls);
        let handler = job_fn(move |call: JobCall| {
            let c = Arc::clone(&c);
            async move {
                c.lock().unwrap().push((call.method, call.arguments));
                anyhow::Ok(())
            }
        });
        let queue = Queue::new(
            QueueConfig::new("mailer").unwrap(),
            Arc::clone(broker) as Arc<dyn BrokerClient>,
        );
        (
            JobDefinition::new("mailer", Arc::new(queue), Arc::new(handler)).unwrap(),
            calls,
        )
    }

    #[test]
    fn test_reserved_method_rejected() {
        let broker = Arc::new(MockBroker::new());
        let (job, _) = definition(&broker);
        let err = assert_err!(job.enqueue(Some("later"), Arguments::new()));
        assert_eq!(err.to_string(), "Domain error: Reserved method name `later'");
        assert!(job.enqueue(Some("deliver"), Arguments::new()).is_ok());
    }

    #[tokio::test]
    async fn test_enqueue_then_consume() {
        let broker = Arc::new(MockBroker::new());
        let (job, calls) = definition(&broker);

        let receipt = assert_ok!(
            job.enqueue(Some("deliver"), Arguments::new().arg("a@b.c").kwarg("retry", 2))
                .unwrap()
                .now()
                .await
        );
        assert!(matches!(receipt, JobReceipt::Enqueued(Some(_))));

        assert_eq!(assert_ok!(job.consumer().consume_messages().await), 1);
        let calls = calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0.as_deref(), Some("deliver"));
        assert_eq!(calls[0].1.positional, vec![json!("a@b.c")]);
        assert_eq!(calls[0].1.get_keyword("retry"), Some(&json!(2)));
        assert_eq!(broker.deleted("mailer"), 1);
    }

    #[tokio::test]
    async fn test_inline_execution() {
        let broker = Arc::new(MockBroker::new());
        let (job, calls) = definition(&broker);
        let job = job.with_scheduling(false);

        let receipt = assert_ok!(job.enqueue(None, Arguments::new()).unwrap().later(5).await);
        assert_eq!(receipt, JobReceipt::Executed);
        assert_eq!(calls.lock().unwrap().len(), 1);
        assert!(broker.sent("mailer").is_empty());
    }

    #[tokio::test]
    async fn test_later_validates_delay() {
        let broker = Arc::new(MockBroker::new());
        let (job, _) = definition(&broker);
        let err = assert_err!(job.enqueue(None, Arguments::new()).unwrap().later(0).await);
        assert!(matches!(err, AppError::Domain(DomainError::InvalidDelay(0))));
    }

    #[tokio::test]
    async fn test_foreign_invocation_is_not_acked() {
        let broker = Arc::new(MockBroker::new());
        let (job, calls) = definition(&broker);
        let foreign = encode_invocation(&Invocation::new("reports", None, Arguments::new())).unwrap();
        broker.push("mailer", foreign.to_string());

        let report = assert_ok!(job.consumer().consume_batch(10).await);
        assert_eq!(report.acked(), 0);
        assert!(calls.lock().unwrap().is_empty());
    }
}
