//! Tally scheduler process.
//!
//! Connects to the poll store, runs the lifecycle and statistics tasks, and
//! announces lifecycle transitions over Redis when it is configured.

use std::sync::Arc;
use std::time::Duration;

use tally_common::Config;
use tally_common::config::LoggingConfig;
use tally_core::{
    DbPollStore, LifecycleService, NoOpPollEventPublisher, PollEventPublisherService,
    PollStoreService, StatisticsAggregator,
};
use tally_queue::{PollJobExecutor, RedisPollEventPublisher, SchedulerConfig, run_scheduler};
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Waits for a shutdown signal (SIGINT or SIGTERM).
///
/// On Unix systems, this listens for both SIGINT (Ctrl+C) and SIGTERM.
/// On Windows, this only listens for Ctrl+C.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received SIGINT, initiating graceful shutdown...");
        },
        () = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown...");
        },
    }
}

fn init_tracing(logging: &LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "tally=info,sea_orm=warn,sqlx=warn".into());

    tracing_subscriber::registry()
        .with(filter)
        .with(logging.json.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!logging.json).then(|| tracing_subscriber::fmt::layer()))
        .init();
}

/// Redis publisher when configured and reachable, otherwise a no-op.
async fn event_publisher(
    config: &Config,
) -> (PollEventPublisherService, Option<Arc<RedisPollEventPublisher>>) {
    let noop: PollEventPublisherService = Arc::new(NoOpPollEventPublisher);
    let Some(redis) = &config.redis else {
        info!("Redis not configured, poll events will not be published");
        return (noop, None);
    };

    match RedisPollEventPublisher::new(&redis.url, &redis.channel_prefix).await {
        Ok(publisher) => {
            let publisher = Arc::new(publisher);
            let events: PollEventPublisherService = publisher.clone();
            (events, Some(publisher))
        }
        Err(e) => {
            warn!(error = %e, "Redis unavailable, poll events will not be published");
            (noop, None)
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    let config = Config::load()?;
    init_tracing(&config.logging);

    info!("Starting tally");

    let db = Arc::new(tally_db::init(&config).await?);
    info!("Connected to database");

    tally_db::migrate(&db).await?;
    info!("Migrations complete");

    let store: PollStoreService = Arc::new(DbPollStore::new(db.clone()));
    let store_timeout = Duration::from_secs(config.scheduler.store_timeout_secs);
    let (events, redis) = event_publisher(&config).await;

    let lifecycle = LifecycleService::new(store.clone(), events).with_store_timeout(store_timeout);
    let aggregator = StatisticsAggregator::new(store).with_store_timeout(store_timeout);
    let executor = Arc::new(PollJobExecutor::new(lifecycle, aggregator));

    let scheduler = run_scheduler(SchedulerConfig::from(&config.scheduler), executor);
    let state = scheduler.state();

    shutdown_signal().await;
    scheduler.shutdown();

    for status in state.statuses() {
        info!(
            task = status.job.name(),
            runs = status.runs,
            skipped = status.skipped,
            failures = status.failures,
            "Task summary"
        );
    }

    if let Some(redis) = redis {
        if let Err(e) = redis.shutdown().await {
            warn!(error = %e, "Failed to close Redis connection");
        }
    }

    info!("Shutdown complete");
    Ok(())
}
