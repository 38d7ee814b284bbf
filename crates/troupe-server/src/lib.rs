// Troupe Server - HTTP surface and observability
//
// Serves the agent, workflow, and observability endpoints over axum, with
// permissive CORS for local use and a metrics middleware wrapped around
// every route.

pub mod error;
pub mod metrics;
pub mod routes;
pub mod state;
pub mod telemetry;

pub use error::ApiError;
pub use metrics::MetricsCollector;
pub use state::AppState;
pub use telemetry::{init_telemetry, LogBuffer, LogEntry};

use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Assemble the full router over the shared state
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(routes::agents::router())
        .merge(routes::workflows::router())
        .merge(routes::orchestration::router())
        .merge(routes::tools::router())
        .merge(routes::observability::router())
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            metrics::track_requests,
        ))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind and serve until shutdown resolves
pub async fn serve(
    addr: std::net::SocketAddr,
    state: AppState,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> Result<(), std::io::Error> {
    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "troupe server listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
}
