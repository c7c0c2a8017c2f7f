//! HTTP surface for logsift.
//!
//! A thin axum layer over [`AnalysisService`]:
//! - `GET /health`: liveness plus ripgrep availability
//! - `GET /api/analyzers`: registered analyzers
//! - `POST /api/analyze`: start a scan, answered with an SSE stream
//! - `POST /api/tasks/{task_id}/cancel`: trip a task's cancellation token
//! - `GET /api/tasks/{task_id}`: task snapshot

mod handlers;

pub use handlers::*;

use axum::{
    routing::{get, post},
    Router,
};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::service::AnalysisService;
use crate::sse::StreamSettings;

/// Server state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<AnalysisService>,
    pub stream: StreamSettings,
}

impl AppState {
    pub fn new(service: Arc<AnalysisService>, stream: StreamSettings) -> Self {
        Self { service, stream }
    }
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/analyzers", get(list_analyzers))
        .route("/api/analyze", post(analyze))
        .route("/api/tasks/{task_id}", get(get_task))
        .route("/api/tasks/{task_id}/cancel", post(cancel_task))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Serve on an already bound listener until `shutdown` resolves.
pub async fn serve<F>(listener: TcpListener, state: AppState, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = listener.local_addr()?;
    info!(%addr, "logsift server listening");
    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(shutdown)
        .await
}

/// Bind `addr` and serve until `shutdown` resolves.
pub async fn start_server<F>(addr: SocketAddr, state: AppState, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let listener = TcpListener::bind(addr).await?;
    serve(listener, state, shutdown).await
}
