//! Consumer - the poll-execute-ack loop
//!
//! One call to [`Consumer::consume_batch`] is one terminal cycle:
//! 1. Fetch up to 10 messages without waiting
//! 2. Budget: visibility timeout minus fetch latency, floored at 100ms
//! 3. Dispatch sequentially or over a per-batch pool of executors
//! 4. Execute each message against the batch expiry; failures stay local
//! 5. Delete acknowledged messages, leave the rest to the broker
//!
//! The cycle reports the number of messages *fetched*, which is what the
//! worker schedules on.

mod executor;

use crate::application::hooks::{ConsumerHooks, ExceptionContext};
use crate::application::queue::{effective_batch_size, Queue};
use crate::application::worker::constants::{
    MAX_BATCH_SIZE, MAX_PARALLEL_AMOUNT, MIN_DEADLINE, MIN_PARALLEL_AMOUNT,
};
use crate::domain::BatchReport;
use crate::error::{AppError, Result};
use crate::port::time_provider::SystemTimeProvider;
use crate::port::{Deadline, MessageHandler, TimeProvider};
use executor::MessageExecutor;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, info_span, warn, Instrument};

/// Execution budget for one batch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeadlineBudget {
    pub budget: Duration,
    /// True when the budget was clamped to the floor
    pub floored: bool,
}

/// Remaining visibility window after `elapsed`, never below [`MIN_DEADLINE`]
///
/// # Example
/// ```
/// use quiver_core::application::consumer::compute_deadline;
/// use std::time::Duration;
///
/// let budget = compute_deadline(Duration::from_secs(10), Duration::from_secs(10));
/// assert_eq!(budget.budget, Duration::from_millis(100));
/// assert!(budget.floored);
/// ```
pub fn compute_deadline(visibility_timeout: Duration, elapsed: Duration) -> DeadlineBudget {
    let remaining = visibility_timeout.saturating_sub(elapsed);
    if remaining <= MIN_DEADLINE {
        DeadlineBudget {
            budget: MIN_DEADLINE,
            floored: true,
        }
    } else {
        DeadlineBudget {
            budget: remaining,
            floored: false,
        }
    }
}

/// Expiry shared by every message of one batch
///
/// Anchored at dispatch. A message starting with less than [`MIN_DEADLINE`]
/// left gets the floor and starts un-acked, since the broker may already
/// have handed it to someone else.
#[derive(Debug, Clone, Copy)]
pub(super) struct BatchDeadline {
    expires_at: Instant,
    floored: bool,
}

impl BatchDeadline {
    pub(super) fn starting_now(budget: DeadlineBudget) -> Self {
        Self {
            expires_at: Instant::now() + budget.budget,
            floored: budget.floored,
        }
    }

    /// Deadline for a message starting now, and whether it was floored
    pub(super) fn for_message(&self) -> (Deadline, bool) {
        let remaining = self.expires_at.saturating_duration_since(Instant::now());
        if self.floored || remaining <= MIN_DEADLINE {
            (Deadline::new(MIN_DEADLINE), true)
        } else {
            (Deadline::until(self.expires_at), false)
        }
    }
}

/// How a batch is executed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ParallelMode {
    #[default]
    Sequential,
    /// One async task per message
    Threads,
    /// One dedicated OS thread per message
    Processes,
}

/// Parallel strategy plus executor count
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParallelConfig {
    mode: ParallelMode,
    amount: usize,
}

impl Default for ParallelConfig {
    fn default() -> Self {
        Self::sequential()
    }
}

impl ParallelConfig {
    pub fn sequential() -> Self {
        Self {
            mode: ParallelMode::Sequential,
            amount: 1,
        }
    }

    /// # Errors
    /// - `AppError::Config` unless `amount` is in 1..=11
    pub fn new(mode: ParallelMode, amount: usize) -> Result<Self> {
        if !(MIN_PARALLEL_AMOUNT..=MAX_PARALLEL_AMOUNT).contains(&amount) {
            return Err(AppError::Config(format!(
                "parallel amount must be between {} and {}: {}",
                MIN_PARALLEL_AMOUNT, MAX_PARALLEL_AMOUNT, amount
            )));
        }
        Ok(Self { mode, amount })
    }

    pub fn mode(&self) -> ParallelMode {
        self.mode
    }

    pub fn amount(&self) -> usize {
        self.amount
    }

    /// Concurrent executors for a batch of `batch_size` (1 = sequential)
    pub fn executors(&self, batch_size: usize) -> usize {
        if self.mode != ParallelMode::Sequential && self.amount > 1 && batch_size > 1 {
            self.amount.min(batch_size)
        } else {
            1
        }
    }
}

/// Consumer binds a handler to a queue
pub struct Consumer {
    queue: Arc<Queue>,
    handler: Arc<dyn MessageHandler>,
    hooks: ConsumerHooks,
    parallel: ParallelConfig,
    max_messages: usize,
    time_provider: Arc<dyn TimeProvider>,
}

impl Consumer {
    pub fn new(queue: Arc<Queue>, handler: Arc<dyn MessageHandler>) -> Self {
        Self {
            queue,
            handler,
            hooks: ConsumerHooks::default(),
            parallel: ParallelConfig::sequential(),
            max_messages: MAX_BATCH_SIZE,
            time_provider: Arc::new(SystemTimeProvider),
        }
    }

    pub fn with_hooks(mut self, hooks: ConsumerHooks) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn with_parallel(mut self, parallel: ParallelConfig) -> Self {
        self.parallel = parallel;
        self
    }

    /// Fetch size per cycle; values outside 1..=10 fall back to 10
    pub fn with_max_messages(mut self, max_messages: usize) -> Self {
        self.max_messages = effective_batch_size(max_messages);
        self
    }

    pub fn with_time_provider(mut self, time_provider: Arc<dyn TimeProvider>) -> Self {
        self.time_provider = time_provider;
        self
    }

    pub fn queue(&self) -> &Arc<Queue> {
        &self.queue
    }

    /// Logical queue name (what worker filters match on)
    pub fn base_name(&self) -> &str {
        self.queue.config().base_name()
    }

    pub fn max_messages(&self) -> usize {
        self.max_messages
    }

    pub fn parallel(&self) -> ParallelConfig {
        self.parallel
    }

    /// Run one cycle at the configured fetch size; returns messages fetched
    pub async fn consume_messages(&self) -> Result<usize> {
        Ok(self.consume_batch(self.max_messages).await?.fetched)
    }

    /// Run one cycle and report every message outcome
    ///
    /// # Errors
    /// Only fatal errors (`NonExistentQueue`) surface; transport failures are
    /// routed to `resolver_exception` and yield an empty report.
    pub async fn consume_batch(&self, amount: usize) -> Result<BatchReport> {
        let span = info_span!("consume", queue = %self.queue.name());
        self.cycle(effective_batch_size(amount)).instrument(span).await
    }

    async fn cycle(&self, amount: usize) -> Result<BatchReport> {
        let started_at = self.time_provider.now_millis();

        let messages = match self.queue.receive(amount).await {
            Ok(messages) => messages,
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                warn!(error = %e, "Fetch failed");
                self.hooks.run_resolver_exception(&e, ExceptionContext::Batch);
                return Ok(BatchReport::empty());
            }
        };

        self.hooks.run_before_all(&messages);
        if messages.is_empty() {
            debug!("No messages");
            self.hooks.run_after_all(&messages);
            return Ok(BatchReport::empty());
        }

        let dispatched_at = self.time_provider.now_millis();
        let elapsed = Duration::from_millis((dispatched_at - started_at).max(0) as u64);
        let budget = compute_deadline(self.queue.config().visibility_timeout(), elapsed);
        if budget.floored {
            warn!(
                elapsed_ms = elapsed.as_millis() as u64,
                "Visibility window spent before dispatch"
            );
        }

        let deadline = BatchDeadline::starting_now(budget);
        let executor = MessageExecutor {
            queue: Arc::clone(&self.queue),
            handler: Arc::clone(&self.handler),
            hooks: self.hooks.clone(),
            mode: self.parallel.mode(),
        };
        let executors = self.parallel.executors(messages.len());
        let outcomes = if executors > 1 {
            executor
                .run_parallel(&messages, deadline, started_at, executors)
                .await
        } else {
            executor.run_sequential(&messages, deadline, started_at).await
        };

        self.hooks.run_after_all(&messages);

        let report = BatchReport {
            fetched: messages.len(),
            outcomes,
        };
        info!(
            count = report.fetched,
            acked = report.acked(),
            failed = report.failed(),
            budget_ms = budget.budget.as_millis() as u64,
            executors = executors,
            "Batch processed"
        );
        Ok(report)
    }
}

impl std::fmt::Debug for Consumer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Consumer")
            .field("queue", &self.queue.name())
            .field("parallel", &self.parallel)
            .field("max_messages", &self.max_messages)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::QueueConfig;
    use crate::port::broker::mocks::MockBroker;
    use crate::port::handler::handler_fn;
    use crate::port::time_provider::mocks::ManualClock;
    use crate::port::{BrokerClient, ExecutionError, MessageContext};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tokio_test::assert_ok;

    fn queue(broker: &Arc<MockBroker>, config: QueueConfig) -> Arc<Queue> {
        Arc::new(Queue::new(config, Arc::clone(broker) as Arc<dyn BrokerClient>))
    }

    fn ok_handler() -> Arc<dyn MessageHandler> {
        Arc::new(handler_fn(|_ctx: MessageContext| async move { anyhow::Ok(()) }))
    }

    #[test]
    fn test_deadline_floor() {
        let budget = compute_deadline(Duration::from_secs(10), Duration::from_secs(10));
        assert_eq!(budget.budget, Duration::from_millis(100));
        assert!(budget.floored);

        let budget = compute_deadline(Duration::from_secs(10), Duration::from_secs(30));
        assert_eq!(budget.budget, Duration::from_millis(100));

        let budget = compute_deadline(Duration::from_secs(10), Duration::from_millis(2_500));
        assert_eq!(budget.budget, Duration::from_millis(7_500));
        assert!(!budget.floored);
    }

    #[test]
    fn test_parallel_config() {
        assert!(ParallelConfig::new(ParallelMode::Threads, 0).is_err());
        assert!(ParallelConfig::new(ParallelMode::Threads, 12).is_err());

        let threads = ParallelConfig::new(ParallelMode::Threads, 4).unwrap();
        assert_eq!(threads.executors(10), 4);
        assert_eq!(threads.executors(2), 2);
        assert_eq!(threads.executors(1), 1);

        let single = ParallelConfig::new(ParallelMode::Processes, 1).unwrap();
        assert_eq!(single.executors(10), 1);
        assert_eq!(ParallelConfig::sequential().executors(10), 1);
    }

    #[test]
    fn test_max_messages_fallback() {
        let broker = Arc::new(MockBroker::new());
        let q = queue(&broker, QueueConfig::new("jobs").unwrap());
        assert_eq!(Consumer::new(Arc::clone(&q), ok_handler()).with_max_messages(0).max_messages(), 10);
        assert_eq!(Consumer::new(Arc::clone(&q), ok_handler()).with_max_messages(11).max_messages(), 10);
        assert_eq!(Consumer::new(q, ok_handler()).with_max_messages(3).max_messages(), 3);
    }

    #[tokio::test]
    async fn test_empty_fetch_fires_batch_hooks() {
        let broker = Arc::new(MockBroker::new());
        let calls = Arc::new(Mutex::new(Vec::new()));
        let (before, after) = (Arc::clone(&calls), Arc::clone(&calls));
        let consumer = Consumer::new(queue(&broker, QueueConfig::new("jobs").unwrap()), ok_handler())
            .with_hooks(
                ConsumerHooks::new()
                    .before_all(move |m| before.lock().unwrap().push(("before_all", m.len())))
                    .after_all(move |m| after.lock().unwrap().push(("after_all", m.len()))),
            );

        assert_eq!(assert_ok!(consumer.consume_messages().await), 0);
        assert_eq!(
            *calls.lock().unwrap(),
            vec![("before_all", 0), ("after_all", 0)]
        );
    }

    #[tokio::test]
    async fn test_sequential_batch_acks_in_order() {
        let broker = Arc::new(MockBroker::new());
        for i in 0..3 {
            broker.push("jobs", format!(r#"{{"n":{}}}"#, i));
        }
        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = Arc::clone(&seen);
        let handler = handler_fn(move |ctx: MessageContext| {
            let s = Arc::clone(&s);
            async move {
                s.lock().unwrap().push(ctx.payload()["n"].as_i64().unwrap_or(-1));
                anyhow::Ok(())
            }
        });
        let consumer = Consumer::new(
            queue(&broker, QueueConfig::new("jobs").unwrap()),
            Arc::new(handler),
        );

        let report = assert_ok!(consumer.consume_batch(10).await);
        assert_eq!(report.fetched, 3);
        assert_eq!(report.acked(), 3);
        assert_eq!(*seen.lock().unwrap(), vec![0, 1, 2]);
        assert_eq!(broker.deleted("jobs"), 3);
    }

    #[tokio::test]
    async fn test_failure_is_isolated_and_not_acked() {
        let broker = Arc::new(MockBroker::new());
        broker.push("jobs", r#""ok""#);
        broker.push("jobs", r#""boom""#);
        broker.push("jobs", r#""ok""#);

        let exceptions = Arc::new(AtomicUsize::new(0));
        let not_deleted = Arc::new(AtomicUsize::new(0));
        let (e, n) = (Arc::clone(&exceptions), Arc::clone(&not_deleted));
        let handler = handler_fn(|ctx: MessageContext| async move {
            if ctx.payload().as_str() == Some("boom") {
                anyhow::bail!("handler exploded");
            }
            Ok(())
        });
        let consumer = Consumer::new(
            queue(&broker, QueueConfig::new("jobs").unwrap()),
            Arc::new(handler),
        )
        .with_hooks(
            ConsumerHooks::new()
                .resolver_exception(move |err, context| {
                    assert!(matches!(err, AppError::Execution(ExecutionError::Handler(_))));
                    assert!(matches!(context, ExceptionContext::Message(_)));
                    e.fetch_add(1, Ordering::SeqCst);
                })
                .message_not_deleted(move |_| {
                    n.fetch_add(1, Ordering::SeqCst);
                }),
        );

        let report = assert_ok!(consumer.consume_batch(10).await);
        assert_eq!(report.fetched, 3);
        assert_eq!(report.acked(), 2);
        assert_eq!(report.failed(), 1);
        assert_eq!(exceptions.load(Ordering::SeqCst), 1);
        assert_eq!(not_deleted.load(Ordering::SeqCst), 1);
        assert_eq!(broker.in_flight("jobs"), 1);
    }

    #[tokio::test]
    async fn test_panic_is_contained() {
        let broker = Arc::new(MockBroker::new());
        broker.push("jobs", "1");
        broker.push("jobs", "2");
        let handler = handler_fn(|ctx: MessageContext| async move {
            if ctx.payload().as_i64() == Some(1) {
                panic!("bad input");
            }
            anyhow::Ok(())
        });
        let consumer = Consumer::new(
            queue(&broker, QueueConfig::new("jobs").unwrap()),
            Arc::new(handler),
        );

        let report = assert_ok!(consumer.consume_batch(10).await);
        assert_eq!(report.acked(), 1);
        assert!(matches!(
            report.outcomes[0].error,
            Some(ExecutionError::Panicked(ref msg)) if msg.contains("bad input")
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_leaves_message_unacked() {
        let broker = Arc::new(MockBroker::new());
        broker.push("slow", "{}");
        let handler = handler_fn(|_ctx: MessageContext| async move {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            anyhow::Ok(())
        });
        let consumer = Consumer::new(
            queue(&broker, QueueConfig::new("slow").unwrap().with_visibility_timeout(1)),
            Arc::new(handler),
        )
        .with_time_provider(Arc::new(ManualClock::new(0)));

        let report = assert_ok!(consumer.consume_batch(1).await);
        assert_eq!(report.acked(), 0);
        assert!(matches!(
            report.outcomes[0].error,
            Some(ExecutionError::Timeout { budget_ms: 1000 })
        ));
        assert_eq!(broker.in_flight("slow"), 1);
        assert_eq!(broker.deleted("slow"), 0);
    }

    fn slow_batch(broker: &Arc<MockBroker>, count: usize) -> Arc<Queue> {
        for i in 0..count {
            broker.push("slow", i.to_string());
        }
        queue(broker, QueueConfig::new("slow").unwrap().with_visibility_timeout(1))
    }

    fn sleeping_handler(millis: u64) -> Arc<dyn MessageHandler> {
        Arc::new(handler_fn(move |_ctx: MessageContext| async move {
            tokio::time::sleep(Duration::from_millis(millis)).await;
            anyhow::Ok(())
        }))
    }

    #[tokio::test(start_paused = true)]
    async fn test_sequential_batch_shares_one_deadline() {
        let broker = Arc::new(MockBroker::new());
        let consumer = Consumer::new(slow_batch(&broker, 3), sleeping_handler(600))
            .with_time_provider(Arc::new(ManualClock::new(0)));

        let report = assert_ok!(consumer.consume_batch(10).await);
        assert_eq!(report.fetched, 3);
        // First finishes at 0.6s; second is cut at 1s; third starts past the window
        assert_eq!(report.acked(), 1);
        assert!(report.outcomes[0].is_success());
        assert!(matches!(
            report.outcomes[1].error,
            Some(ExecutionError::Timeout { budget_ms: 400 })
        ));
        assert!(matches!(
            report.outcomes[2].error,
            Some(ExecutionError::Timeout { budget_ms: 100 })
        ));
        assert_eq!(broker.deleted("slow"), 1);
        assert_eq!(broker.in_flight("slow"), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_queued_thread_executor_uses_remaining_window() {
        let broker = Arc::new(MockBroker::new());
        let consumer = Consumer::new(slow_batch(&broker, 3), sleeping_handler(600))
            .with_time_provider(Arc::new(ManualClock::new(0)))
            .with_parallel(ParallelConfig::new(ParallelMode::Threads, 2).unwrap());

        let report = assert_ok!(consumer.consume_batch(10).await);
        assert_eq!(report.fetched, 3);
        // Two run at once; the third waits 0.6s for a permit and has 0.4s left
        assert_eq!(report.acked(), 2);
        let timeouts: Vec<_> = report
            .outcomes
            .iter()
            .filter(|o| matches!(o.error, Some(ExecutionError::Timeout { budget_ms: 400 })))
            .collect();
        assert_eq!(timeouts.len(), 1);
        assert_eq!(broker.deleted("slow"), 2);
    }

    #[tokio::test]
    async fn test_floored_budget_starts_unacked() {
        let broker = Arc::new(MockBroker::new());
        broker.push("jobs", "{}");
        let clock = Arc::new(ManualClock::new(0));
        // Every clock read moves 20s forward: fetch latency exceeds visibility
        clock.set_step(20_000);
        let consumer = Consumer::new(
            queue(&broker, QueueConfig::new("jobs").unwrap().with_visibility_timeout(10)),
            ok_handler(),
        )
        .with_time_provider(clock);

        let report = assert_ok!(consumer.consume_batch(10).await);
        assert_eq!(report.fetched, 1);
        assert_eq!(report.acked(), 0);
        assert!(report.outcomes[0].is_success());
        assert_eq!(broker.deleted("jobs"), 0);
    }

    #[tokio::test]
    async fn test_handler_can_skip_delete() {
        let broker = Arc::new(MockBroker::new());
        broker.push("jobs", "{}");
        let handler = handler_fn(|ctx: MessageContext| async move {
            ctx.skip_delete();
            anyhow::Ok(())
        });
        let consumer = Consumer::new(
            queue(&broker, QueueConfig::new("jobs").unwrap()),
            Arc::new(handler),
        );

        let report = assert_ok!(consumer.consume_batch(10).await);
        assert_eq!(report.acked(), 0);
        assert_eq!(report.failed(), 0);
        assert_eq!(broker.in_flight("jobs"), 1);
    }

    #[tokio::test]
    async fn test_undecodable_body_skips_handler() {
        let broker = Arc::new(MockBroker::new());
        broker.push("jobs", "{not json");
        let calls = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&calls);
        let handler = handler_fn(move |_ctx: MessageContext| {
            c.fetch_add(1, Ordering::SeqCst);
            async move { anyhow::Ok(()) }
        });
        let consumer = Consumer::new(
            queue(&broker, QueueConfig::new("jobs").unwrap()),
            Arc::new(handler),
        );

        let report = assert_ok!(consumer.consume_batch(10).await);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(matches!(report.outcomes[0].error, Some(ExecutionError::Decode(_))));
        assert_eq!(report.acked(), 0);
    }

    #[tokio::test]
    async fn test_fetch_failure_yields_zero() {
        let broker = Arc::new(MockBroker::new());
        broker.push("jobs", "{}");
        broker.fail_receive(true);
        let batch_errors = Arc::new(AtomicUsize::new(0));
        let b = Arc::clone(&batch_errors);
        let consumer = Consumer::new(queue(&broker, QueueConfig::new("jobs").unwrap()), ok_handler())
            .with_hooks(ConsumerHooks::new().resolver_exception(move |_, context| {
                assert!(matches!(context, ExceptionContext::Batch));
                b.fetch_add(1, Ordering::SeqCst);
            }));

        assert_eq!(assert_ok!(consumer.consume_messages().await), 0);
        assert_eq!(batch_errors.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_missing_queue_is_fatal() {
        let broker = Arc::new(MockBroker::new());
        broker.remove_queue("ghost");
        let consumer = Consumer::new(queue(&broker, QueueConfig::new("ghost").unwrap()), ok_handler());

        let err = consumer.consume_messages().await.unwrap_err();
        assert!(matches!(err, AppError::NonExistentQueue(_)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_thread_pool_is_bounded() {
        let broker = Arc::new(MockBroker::new());
        for i in 0..8 {
            broker.push("jobs", i.to_string());
        }
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let (r, p) = (Arc::clone(&running), Arc::clone(&peak));
        let handler = handler_fn(move |_ctx: MessageContext| {
            let (r, p) = (Arc::clone(&r), Arc::clone(&p));
            async move {
                let now = r.fetch_add(1, Ordering::SeqCst) + 1;
                p.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(30)).await;
                r.fetch_sub(1, Ordering::SeqCst);
                anyhow::Ok(())
            }
        });
        let consumer = Consumer::new(
            queue(&broker, QueueConfig::new("jobs").unwrap()),
            Arc::new(handler),
        )
        .with_parallel(ParallelConfig::new(ParallelMode::Threads, 3).unwrap());

        let report = assert_ok!(consumer.consume_batch(10).await);
        assert_eq!(report.fetched, 8);
        assert_eq!(report.acked(), 8);
        assert!(peak.load(Ordering::SeqCst) <= 3);
        assert!(peak.load(Ordering::SeqCst) >= 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_process_mode_runs_blocking_handlers() {
        let broker = Arc::new(MockBroker::new());
        for i in 0..4 {
            broker.push("jobs", i.to_string());
        }
        let handler = handler_fn(|_ctx: MessageContext| async move {
            std::thread::sleep(Duration::from_millis(10));
            anyhow::Ok(())
        });
        let consumer = Consumer::new(
            queue(&broker, QueueConfig::new("jobs").unwrap()),
            Arc::new(handler),
        )
        .with_parallel(ParallelConfig::new(ParallelMode::Processes, 2).unwrap());

        let report = assert_ok!(consumer.consume_batch(10).await);
        assert_eq!(report.acked(), 4);
        assert_eq!(broker.deleted("jobs"), 4);
    }
}
