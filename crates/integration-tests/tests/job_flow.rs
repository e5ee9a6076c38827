//! Jobs and delayed scheduling end to end

use quiver_core::application::{
    job_fn, Consumer, JobCall, JobDefinition, JobReceipt, Queue, Runtime, Scheduler,
};
use quiver_core::config::Settings;
use quiver_core::domain::{Arguments, DomainError, QueueConfig};
use quiver_core::port::time_provider::mocks::ManualClock;
use quiver_core::port::{handler_fn, BrokerClient, ExecutionError, MessageContext, TimeProvider};
use quiver_core::AppError;
use quiver_infra_memory::{BrokerMode, InMemoryBroker};
use serde_json::json;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_test::{assert_err, assert_ok};

fn clocked_broker(clock: &Arc<ManualClock>) -> Arc<InMemoryBroker> {
    Arc::new(
        InMemoryBroker::new(BrokerMode::Lenient)
            .with_time_provider(Arc::clone(clock) as Arc<dyn TimeProvider>),
    )
}

#[tokio::test]
async fn test_job_enqueue_and_work() {
    let broker = Arc::new(InMemoryBroker::new(BrokerMode::Lenient));
    let mut runtime = Runtime::new(
        Settings {
            queue_prefix: Some("prod".to_string()),
            ..Settings::default()
        },
        Arc::clone(&broker) as Arc<dyn BrokerClient>,
    );

    let calls = Arc::new(Mutex::new(Vec::new()));
    let recorder = Arc::clone(&calls);
    let handler = job_fn(move |call: JobCall| {
        let recorder = Arc::clone(&recorder);
        async move {
            let delivered = call.context.is_some();
            recorder
                .lock()
                .unwrap()
                .push((call.method, call.arguments, delivered));
            anyhow::Ok(())
        }
    });
    let queue = runtime.queue("mailer").unwrap();
    let mailer = runtime
        .register_job(JobDefinition::new("mailer", queue, Arc::new(handler)).unwrap())
        .unwrap();

    let receipt = assert_ok!(
        mailer
            .enqueue(
                Some("deliver"),
                Arguments::new().arg("user@example.com").kwarg("urgent", true),
            )
            .unwrap()
            .now()
            .await
    );
    assert!(matches!(receipt, JobReceipt::Enqueued(Some(_))));
    assert_eq!(broker.stored_messages("prod_mailer"), 1);

    let worker = runtime.worker(Some(&["mailer".to_string()][..])).unwrap();
    assert_eq!(assert_ok!(worker.perform().await), 1);

    let calls = calls.lock().unwrap();
    assert_eq!(calls.len(), 1);
    let (method, arguments, delivered) = &calls[0];
    assert_eq!(method.as_deref(), Some("deliver"));
    assert_eq!(arguments.get(0), Some(&json!("user@example.com")));
    assert_eq!(arguments.get_keyword("urgent"), Some(&json!(true)));
    assert!(*delivered);
    assert_eq!(broker.stored_messages("prod_mailer"), 0);
}

#[tokio::test]
async fn test_later_bounds_and_visibility() {
    let clock = Arc::new(ManualClock::new(0));
    let broker = clocked_broker(&clock);
    let queue = Arc::new(Queue::new(
        QueueConfig::new("reports").unwrap(),
        Arc::clone(&broker) as Arc<dyn BrokerClient>,
    ));
    let scheduler = Scheduler::new(Arc::clone(&queue));
    let payload = json!({ "report": 7 });

    let err = assert_err!(scheduler.later(&payload, 0).await);
    assert!(matches!(err, AppError::Domain(DomainError::InvalidDelay(0))));
    let err = assert_err!(scheduler.later(&payload, 961).await);
    assert!(matches!(err, AppError::Domain(DomainError::InvalidDelay(961))));
    assert_eq!(broker.stored_messages("reports"), 0);

    assert_ok!(scheduler.later(&payload, 1).await);
    assert_ok!(scheduler.later(&payload, 960).await);
    assert_eq!(broker.stored_messages("reports"), 2);

    // Delayed messages stay hidden until their delay elapses
    assert_eq!(assert_ok!(queue.count_messages().await), 0);
    clock.advance(1_000);
    assert_eq!(assert_ok!(queue.count_messages().await), 1);
    clock.advance(959_000);
    assert_eq!(assert_ok!(queue.count_messages().await), 2);
}

#[tokio::test(start_paused = true)]
async fn test_timed_out_message_is_not_acked() {
    let clock = Arc::new(ManualClock::new(0));
    let broker = clocked_broker(&clock);
    let queue = Arc::new(Queue::new(
        QueueConfig::new("slow").unwrap().with_visibility_timeout(2),
        Arc::clone(&broker) as Arc<dyn BrokerClient>,
    ));
    Scheduler::new(Arc::clone(&queue))
        .now(&json!("work"))
        .await
        .unwrap();

    let handler = handler_fn(|_ctx: MessageContext| async move {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        anyhow::Ok(())
    });
    let consumer = Consumer::new(Arc::clone(&queue), Arc::new(handler))
        .with_time_provider(Arc::clone(&clock) as Arc<dyn TimeProvider>);

    let report = assert_ok!(consumer.consume_batch(10).await);
    assert_eq!(report.fetched, 1);
    assert_eq!(report.acked(), 0);
    assert!(matches!(
        report.outcomes[0].error,
        Some(ExecutionError::Timeout { budget_ms: 2000 })
    ));
    assert_eq!(broker.stored_messages("slow"), 1);
}

#[tokio::test]
async fn test_inline_job_never_touches_broker() {
    let broker = Arc::new(InMemoryBroker::new(BrokerMode::Strict));
    let mut runtime = Runtime::new(
        Settings::default(),
        Arc::clone(&broker) as Arc<dyn BrokerClient>,
    );
    let runs = Arc::new(Mutex::new(0));
    let counter = Arc::clone(&runs);
    let handler = job_fn(move |call: JobCall| {
        let counter = Arc::clone(&counter);
        async move {
            assert!(call.context.is_none());
            *counter.lock().unwrap() += 1;
            anyhow::Ok(())
        }
    });
    let queue = runtime.queue("inline").unwrap();
    let job = runtime
        .register_job(
            JobDefinition::new("inline", queue, Arc::new(handler))
                .unwrap()
                .with_scheduling(false),
        )
        .unwrap();

    let receipt = assert_ok!(job.enqueue(None, Arguments::new()).unwrap().later(30).await);
    assert_eq!(receipt, JobReceipt::Executed);
    assert_eq!(*runs.lock().unwrap(), 1);
    assert!(broker.queue_names().is_empty());
    assert!(runtime.consumers().is_empty());
}
