// Application Layer - Producer, consumer and orchestration services

pub mod consumer;
pub mod dead_letter;
pub mod hooks;
pub mod job;
pub mod queue;
pub mod runtime;
pub mod scheduler;
pub mod worker;

// Re-exports
pub use consumer::{compute_deadline, Consumer, DeadlineBudget, ParallelConfig, ParallelMode};
pub use dead_letter::{DeadLetterQueue, RequeueAmount};
pub use hooks::{ConsumerHooks, ExceptionContext, SchedulerHooks};
pub use job::{job_fn, JobCall, JobDefinition, JobHandler, JobReceipt, PendingJob};
pub use queue::Queue;
pub use runtime::Runtime;
pub use scheduler::{PendingMessage, Scheduler};
pub use worker::{shutdown_channel, ShutdownSender, ShutdownToken, Worker, WorkerMode};
