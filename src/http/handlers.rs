// src/http/handlers.rs

use std::time::Duration;

use axum::Json;
use axum::body::Body;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::artifact::RenderArtifact;
use crate::codec::AvatarRequest;
use crate::engine::{JobId, JobStatus};
use crate::exec::{RendererVersion, locate, probe_version};

use super::AppState;
use super::error::ApiError;

pub const HEADER_JOB: &str = "x-avatar-job";
pub const HEADER_SEED: &str = "x-avatar-seed";
pub const HEADER_DIGEST: &str = "x-avatar-digest";

pub const VERSION_PROBE_TIMEOUT: Duration = Duration::from_secs(10);

pub async fn root(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "service": "tlr-avatar",
        "version": env!("CARGO_PKG_VERSION"),
        "renderers": state.service.stats(),
    }))
}

pub async fn ok() -> Json<Value> {
    Json(json!({ "ok": true }))
}

pub async fn healthz() -> &'static str {
    "ok"
}

pub async fn renderer_check(State(state): State<AppState>) -> Json<Value> {
    let found = located_path(&state);
    Json(json!({
        "has_renderer": !found.is_empty(),
        "renderer_path": found,
    }))
}

/// `renderer_check` under the older `/blender/check` keys.
pub async fn blender_check(State(state): State<AppState>) -> Json<Value> {
    let found = located_path(&state);
    Json(json!({
        "has_blender": !found.is_empty(),
        "blender_path": found,
    }))
}

fn located_path(state: &AppState) -> String {
    locate(&state.renderer_program)
        .map(|p| p.display().to_string())
        .unwrap_or_default()
}

pub async fn renderer_version(State(state): State<AppState>) -> Json<RendererVersion> {
    match locate(&state.renderer_program) {
        Some(path) => Json(probe_version(&path, VERSION_PROBE_TIMEOUT).await),
        None => Json(RendererVersion {
            ok: false,
            rc: None,
            stdout: String::new(),
            stderr: "renderer not found".to_string(),
        }),
    }
}

pub async fn avatar_post(
    State(state): State<AppState>,
    body: Result<Json<AvatarRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(request) = body?;
    render_now(&state, request).await
}

pub async fn avatar_get(
    State(state): State<AppState>,
    query: Result<Query<AvatarRequest>, QueryRejection>,
) -> Result<Response, ApiError> {
    let Query(request) = query?;
    render_now(&state, request).await
}

/// Render inside this request. If the client goes away the handler future
/// is dropped, which kills the renderer and frees its slot.
async fn render_now(state: &AppState, request: AvatarRequest) -> Result<Response, ApiError> {
    let cancel = CancellationToken::new();
    let (status, artifact) = state.service.render(&request, &cancel).await?;
    artifact_response(&status, artifact).await
}

pub async fn jobs_submit(
    State(state): State<AppState>,
    body: Result<Json<AvatarRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(request) = body?;
    let status = state.service.submit(&request)?;
    let location = format!("/jobs/{}", status.id);
    Ok((
        StatusCode::ACCEPTED,
        [(header::LOCATION, location)],
        Json(status),
    )
        .into_response())
}

pub async fn job_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let id = parse_job_id(&id)?;
    let snapshot = state
        .service
        .registry()
        .snapshot(id)
        .ok_or_else(ApiError::unknown_job)?;
    Ok(Json(snapshot).into_response())
}

pub async fn job_artifact(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let id = parse_job_id(&id)?;
    let registry = state.service.registry();
    let artifact = registry.take_artifact(id)?;
    let snapshot = registry.snapshot(id).ok_or_else(ApiError::unknown_job)?;
    artifact_response(&snapshot.status, artifact).await
}

pub async fn job_cancel(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let id = parse_job_id(&id)?;
    if !state.service.cancel(id) {
        return Err(ApiError::unknown_job());
    }
    let snapshot = state
        .service
        .registry()
        .snapshot(id)
        .ok_or_else(ApiError::unknown_job)?;
    Ok((StatusCode::ACCEPTED, Json(snapshot)).into_response())
}

fn parse_job_id(raw: &str) -> Result<JobId, ApiError> {
    raw.parse().map_err(|_| {
        debug!(id = raw, "malformed job id");
        ApiError::unknown_job()
    })
}

async fn artifact_response(status: &JobStatus, artifact: RenderArtifact) -> Result<Response, ApiError> {
    let content_type = artifact.content_type();
    let size = artifact.size();
    let digest = artifact.digest().to_string();
    let stream = artifact
        .into_stream()
        .await
        .map_err(|e| {
            warn!(job = %status.id, error = %e, "could not open artifact");
            ApiError::internal()
        })?;

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, content_type)
        .header(header::CONTENT_LENGTH, size)
        .header(HEADER_JOB, status.id.to_string())
        .header(HEADER_SEED, status.seed)
        .header(HEADER_DIGEST, digest)
        .body(Body::from_stream(stream))
        .map_err(|e| {
            warn!(job = %status.id, error = %e, "could not build artifact response");
            ApiError::internal()
        })
}
