//! Quiver Worker - Main Entry Point
//! Wires settings, broker and consumers, then runs worker loops until a signal arrives

mod cli;
mod logging;

use anyhow::Result;
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use cli::{Cli, USAGE_EXIT_CODE};
use quiver_core::application::{shutdown_channel, ParallelConfig, ParallelMode, Runtime};
use quiver_core::config::Settings;
use quiver_core::port::{handler_fn, BrokerClient, MessageContext};
use quiver_infra_memory::{BrokerMode, InMemoryBroker};
use quiver_infra_sqs::SqsBroker;

const VERSION: &str = env!("CARGO_PKG_VERSION");
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    if cli.help {
        println!("{}", Cli::usage());
        std::process::exit(USAGE_EXIT_CODE);
    }

    // 1. Initialize logging; the guard flushes the log file on exit
    let _log_guard = logging::init(logging::LogFormat::from_env(), cli.log_dir.as_deref())?;

    // 2. Load configuration
    let mut settings = Settings::from_env()?;
    if let Some(environment) = &cli.environment {
        settings.environment = Some(environment.clone());
    }
    info!(
        version = VERSION,
        environment = ?settings.environment,
        faker = settings.faker,
        "Quiver worker starting..."
    );

    // 3. Broker
    let broker: Arc<dyn BrokerClient> = if settings.faker {
        info!("Faker mode: using in-memory broker");
        Arc::new(InMemoryBroker::new(BrokerMode::Lenient))
    } else {
        Arc::new(SqsBroker::from_settings(&settings).await)
    };

    // 4. Runtime and consumers
    let parallel = match cli.parallel_mode() {
        ParallelMode::Sequential => ParallelConfig::sequential(),
        mode => ParallelConfig::new(mode, settings.parallel_amount)?,
    };
    let mut runtime = Runtime::new(settings, broker).with_parallel(parallel);

    let filter = cli.queue_filter();
    for name in filter.iter().flatten() {
        let queue = runtime.queue(name)?;
        let consumer = runtime.consumer(queue, Arc::new(handler_fn(log_message)));
        runtime.register_consumer(consumer)?;
    }

    // 5. Worker loops
    let (shutdown_tx, _) = shutdown_channel();
    let mut workers = JoinSet::new();
    for index in 0..cli.worker_count() {
        let worker = runtime
            .worker(filter.as_deref())?
            .with_mode(cli.worker_mode());
        let token = shutdown_tx.token();
        workers.spawn(async move {
            if let Err(e) = worker.run(token).await {
                error!(worker = index, error = %e, "Worker failed");
            }
        });
    }
    info!(workers = workers.len(), "System ready. Waiting for messages...");

    // 6. Wait for a signal, or for every loop to stop on its own
    tokio::select! {
        result = shutdown_signal() => {
            result?;
            info!("Shutdown signal received. Exiting gracefully...");
        }
        _ = drain(&mut workers) => {
            warn!("All workers stopped");
        }
    }

    // 7. Graceful shutdown
    shutdown_tx.shutdown();
    if tokio::time::timeout(SHUTDOWN_GRACE, drain(&mut workers)).await.is_err() {
        warn!("Workers did not stop in time, aborting");
        workers.abort_all();
    }

    info!("Shutdown complete.");
    Ok(())
}

async fn log_message(ctx: MessageContext) -> anyhow::Result<()> {
    info!(
        queue = %ctx.queue(),
        message_id = %ctx.message_id(),
        body = %ctx.body(),
        "Message received"
    );
    Ok(())
}

async fn drain(workers: &mut JoinSet<()>) {
    while let Some(joined) = workers.join_next().await {
        if let Err(e) = joined {
            error!(error = %e, "Worker task aborted");
        }
    }
}

#[cfg(unix)]
async fn shutdown_signal() -> std::io::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = signal(SignalKind::terminate())?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => result,
        _ = terminate.recv() => Ok(()),
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() -> std::io::Result<()> {
    tokio::signal::ctrl_c().await
}
