//! Coordination service entry point.
//!
//! Hosts the operator API and the two background loops every deployment
//! needs: the outbox publisher and the saga timeout detector. Durable
//! stores run on PostgreSQL when `DATABASE_URL` is set, otherwise
//! everything runs in-memory for local development.

use std::sync::Arc;
use std::time::Duration;

use api::routes::AppState;
use api::Config;
use bus::{InMemoryBus, MessageBus};
use dlq::{DeadLetterService, DlqStore, InMemoryDlqStore, PostgresDlqStore};
use outbox::{InMemoryOutboxStore, OutboxPublisher, PostgresOutboxStore};
use saga::{
    CompensationRegistry, Compensator, InMemorySagaStore, PostgresSagaStore, TimeoutDetector,
};
use tokio::signal;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install SIGINT handler");
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
        () = ctrl_c => {
            tracing::info!("received SIGINT, starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("received SIGTERM, starting graceful shutdown");
        }
    }
}

/// Periodically drops terminal dead letter entries past their TTL.
fn spawn_dlq_purge<D, B>(
    dlq: Arc<DeadLetterService<D, B>>,
    mut shutdown: watch::Receiver<bool>,
) where
    D: DlqStore + 'static,
    B: MessageBus + 'static,
{
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(60 * 60));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = dlq.purge_expired().await {
                        tracing::warn!(error = %e, "dead letter purge failed");
                    }
                }
                _ = shutdown.changed() => return,
            }
        }
    });
}

async fn serve(app: axum::Router, addr: &str) {
    tracing::info!(%addr, "starting coordination API server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("failed to bind address");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");
}

#[tokio::main]
async fn main() {
    // 1. Initialize tracing
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // 2. Install Prometheus metrics recorder
    let metrics_handle = metrics_exporter_prometheus::PrometheusBuilder::new()
        .install_recorder()
        .expect("failed to install Prometheus recorder");

    let config = Config::from_env();
    let bus = InMemoryBus::new();

    // Compensation mappings are supplied by the services that embed the
    // saga listener; the standalone coordinator starts with none.
    let registry = CompensationRegistry::builder().build();

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // 3. Wire stores, background loops, and the router
    if let Some(database_url) = config.database_url.clone() {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(10)
            .connect(&database_url)
            .await
            .expect("failed to connect to PostgreSQL");
        tracing::info!("durable stores running on PostgreSQL");

        let saga_store = PostgresSagaStore::new(pool.clone());
        saga_store
            .run_migrations()
            .await
            .expect("failed to run migrations");
        let outbox_store = PostgresOutboxStore::new(pool.clone());
        let dlq_store = PostgresDlqStore::new(pool);

        let publisher = OutboxPublisher::new(
            outbox_store.clone(),
            bus.clone(),
            config.outbox.clone(),
        );
        tokio::spawn(publisher.run(shutdown_rx.clone()));

        let compensator = Compensator::new(saga_store.clone(), outbox_store, registry);
        let detector = TimeoutDetector::new(saga_store.clone(), compensator, config.timeout.clone());
        tokio::spawn(detector.run(shutdown_rx.clone()));

        let dlq = Arc::new(DeadLetterService::new(dlq_store, bus, config.dlq.clone()));
        spawn_dlq_purge(dlq.clone(), shutdown_rx);
        let state = Arc::new(AppState { dlq, saga_store });
        serve(api::create_app(state, metrics_handle), &config.addr()).await;
    } else {
        tracing::info!("DATABASE_URL not set, stores running in-memory");

        let saga_store = InMemorySagaStore::new();
        let outbox_store = InMemoryOutboxStore::new();
        let dlq_store = InMemoryDlqStore::new();

        let publisher = OutboxPublisher::new(
            outbox_store.clone(),
            bus.clone(),
            config.outbox.clone(),
        );
        tokio::spawn(publisher.run(shutdown_rx.clone()));

        let compensator = Compensator::new(saga_store.clone(), outbox_store, registry);
        let detector = TimeoutDetector::new(saga_store.clone(), compensator, config.timeout.clone());
        tokio::spawn(detector.run(shutdown_rx.clone()));

        let dlq = Arc::new(DeadLetterService::new(dlq_store, bus, config.dlq.clone()));
        spawn_dlq_purge(dlq.clone(), shutdown_rx);
        let state = Arc::new(AppState { dlq, saga_store });
        serve(api::create_app(state, metrics_handle), &config.addr()).await;
    }

    // Stop the background loops once the server has drained.
    let _ = shutdown_tx.send(true);
    tracing::info!("server shut down gracefully");
}
