//! HTTP surface for operating the saga coordination layer: dead letter
//! inspection and replay, saga status lookup, health, and metrics.

pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use bus::MessageBus;
use dlq::DlqStore;
use metrics_exporter_prometheus::PrometheusHandle;
use saga::SagaStore;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub use config::Config;
pub use error::ApiError;
pub use routes::AppState;

/// Builds the application router with all routes and middleware.
pub fn create_app<D, B, S>(
    state: Arc<AppState<D, B, S>>,
    metrics_handle: PrometheusHandle,
) -> Router
where
    D: DlqStore + 'static,
    B: MessageBus + 'static,
    S: SagaStore + 'static,
{
    let metrics_routes = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route("/dlq", get(routes::dlq::list::<D, B, S>))
        .route("/dlq/count", get(routes::dlq::pending_count::<D, B, S>))
        .route(
            "/dlq/{id}",
            get(routes::dlq::get::<D, B, S>).delete(routes::dlq::discard::<D, B, S>),
        )
        .route("/dlq/{id}/replay", post(routes::dlq::replay::<D, B, S>))
        .route("/sagas/{id}", get(routes::sagas::get::<D, B, S>))
        .with_state(state)
        .merge(metrics_routes)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}
