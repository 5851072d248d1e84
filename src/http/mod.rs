// src/http/mod.rs

//! HTTP façade (axum).
//!
//! Routes:
//! - `GET /`, `GET /ok`, `GET /healthz`: service info and liveness
//! - `GET /renderer/check`, `GET /renderer/version`: renderer diagnostics,
//!   also served as `/blender/check` and `/blender/version`
//! - `POST /avatar`, `GET /avatar`: synchronous render, returns image bytes
//! - `POST /jobs`, `GET /jobs/:id`, `GET /jobs/:id/artifact`,
//!   `DELETE /jobs/:id`: background render with polling

pub mod error;
pub mod handlers;

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use axum::Router;
use axum::routing::get;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::engine::RenderService;

pub use error::ApiError;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<RenderService>,
    /// Renderer program as configured, for the diagnostic endpoints.
    pub renderer_program: PathBuf,
}

impl AppState {
    pub fn new(service: Arc<RenderService>, renderer_program: impl Into<PathBuf>) -> Self {
        Self {
            service,
            renderer_program: renderer_program.into(),
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(handlers::root))
        .route("/ok", get(handlers::ok))
        .route("/healthz", get(handlers::healthz))
        .route("/renderer/check", get(handlers::renderer_check))
        .route("/renderer/version", get(handlers::renderer_version))
        .route("/blender/check", get(handlers::blender_check))
        .route("/blender/version", get(handlers::renderer_version))
        .route(
            "/avatar",
            get(handlers::avatar_get).post(handlers::avatar_post),
        )
        .route("/jobs", axum::routing::post(handlers::jobs_submit))
        .route(
            "/jobs/:id",
            get(handlers::job_status).delete(handlers::job_cancel),
        )
        .route("/jobs/:id/artifact", get(handlers::job_artifact))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve `router` on `listener` until `shutdown` resolves, then drain
/// in-flight requests.
pub async fn serve<F>(listener: TcpListener, router: Router, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, "HTTP server listening");
    }
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await
}
