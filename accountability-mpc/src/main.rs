mod checkin;
mod clock;
mod compatibility;
mod config;
mod events;
mod health;
mod models;
mod partnership;
mod preferences;
mod queue;
mod scheduler;
mod schema;

use std::sync::Arc;

use tokio::signal;
use tokio::sync::watch;
use tracing::info;

use accountability_shared::clients::db::{create_pool, DbPool};
use accountability_shared::clients::rabbitmq::RabbitMQClient;
use accountability_shared::clients::redis::RedisClient;
use accountability_shared::middleware::init_tracing;

use clock::SystemClock;
use config::AppConfig;
use events::Notifier;
use scheduler::Scheduler;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing("accountability-mpc");

    let config = Arc::new(AppConfig::load()?);
    info!(database_url_present = true, "configuration loaded");

    let db = create_pool(&config.database_url);
    let redis = RedisClient::connect(&config.redis_url).await?;

    let notifier = match RabbitMQClient::connect(&config.rabbitmq_url).await {
        Ok(client) => Notifier::Rabbit(client),
        Err(e) => {
            tracing::warn!(error = %e, "failed to connect to RabbitMQ; running with a no-op notifier");
            Notifier::Noop
        }
    };

    let clock = Arc::new(SystemClock);

    let scheduler = Arc::new(Scheduler::new(db, redis, notifier, config, clock));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handles = scheduler.spawn_all(shutdown_rx);

    info!("accountability-mpc scheduler running");
    wait_for_shutdown_signal().await;
    info!("shutdown signal received, draining scheduled jobs");

    scheduler::shutdown(shutdown_tx, handles).await;
    info!("accountability-mpc stopped");
    Ok(())
}

async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
