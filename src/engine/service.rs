// src/engine/service.rs

//! The render pipeline: codec → gate → backend.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::artifact::RenderArtifact;
use crate::codec::{self, AvatarRequest};
use crate::config::ConfigFile;
use crate::errors::{ErrorKind, RenderError};
use crate::exec::RenderBackend;
use crate::types::OutputFormat;

use super::gate::{Admission, AdmittedToken, ConcurrencyGate, GateStats};
use super::job::{JobStatus, RenderJob};
use super::registry::JobRegistry;
use super::JobId;

/// Pipeline settings taken from `[render]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderSettings {
    pub timeout: Duration,
    pub formats: Vec<OutputFormat>,
    pub retention: Duration,
}

impl From<&ConfigFile> for RenderSettings {
    fn from(cfg: &ConfigFile) -> Self {
        Self {
            timeout: cfg.render.timeout(),
            formats: cfg.render.formats.clone(),
            retention: cfg.render.retention(),
        }
    }
}

/// Owns the gate, the backend, and the background job table.
///
/// Two entry points share one pipeline:
/// - [`RenderService::render`] runs a job inside the caller's future, so
///   dropping that future (client disconnect) stops the renderer.
/// - [`RenderService::submit`] runs a job on a background task and records
///   it in the [`JobRegistry`] for polling.
pub struct RenderService {
    settings: RenderSettings,
    gate: ConcurrencyGate,
    backend: Arc<dyn RenderBackend>,
    registry: JobRegistry,
}

impl RenderService {
    pub fn new(settings: RenderSettings, gate: ConcurrencyGate, backend: Arc<dyn RenderBackend>) -> Self {
        Self {
            settings,
            gate,
            backend,
            registry: JobRegistry::new(),
        }
    }

    pub fn settings(&self) -> &RenderSettings {
        &self.settings
    }

    pub fn gate(&self) -> &ConcurrencyGate {
        &self.gate
    }

    pub fn registry(&self) -> &JobRegistry {
        &self.registry
    }

    pub fn stats(&self) -> GateStats {
        self.gate.snapshot()
    }

    /// Validate `request` into a pending job. Nothing is spawned or written.
    pub fn prepare(&self, request: &AvatarRequest) -> Result<RenderJob, RenderError> {
        let payload = codec::encode(request, &self.settings.formats)?;
        Ok(RenderJob::new(payload))
    }

    /// Render synchronously, returning the final job status and artifact.
    pub async fn render(
        &self,
        request: &AvatarRequest,
        cancel: &CancellationToken,
    ) -> Result<(JobStatus, RenderArtifact), RenderError> {
        let mut job = self.prepare(request)?;
        let admission = self.gate.admit(job.id());
        let artifact = self.execute(&mut job, admission, cancel).await?;
        Ok((job.status().clone(), artifact))
    }

    /// Start a background render and return its initial status.
    ///
    /// Invalid requests and overload are reported here; nothing is
    /// registered for them.
    pub fn submit(self: &Arc<Self>, request: &AvatarRequest) -> Result<JobStatus, RenderError> {
        let mut job = self.prepare(request)?;
        let admission = match self.gate.admit(job.id()) {
            Admission::Rejected(overloaded) => {
                debug!(job = %job.id(), "background job rejected: renderer overloaded");
                return Err(overloaded.into());
            }
            admission => admission,
        };

        let cancel = CancellationToken::new();
        self.registry.insert(job.id(), job.observe(), cancel.clone());
        let status = job.status().clone();
        info!(job = %status.id, seed = status.seed, format = %status.format, "background job accepted");

        let service = Arc::clone(self);
        tokio::spawn(async move {
            let result = service.execute(&mut job, admission, &cancel).await;
            service.registry.complete(job.id(), result);
        });

        Ok(status)
    }

    /// Cancel a background job. Returns `false` for unknown jobs.
    pub fn cancel(&self, id: JobId) -> bool {
        let known = self.registry.cancel(id);
        if known {
            info!(job = %id, "cancellation requested");
        }
        known
    }

    async fn execute(
        &self,
        job: &mut RenderJob,
        admission: Admission,
        cancel: &CancellationToken,
    ) -> Result<RenderArtifact, RenderError> {
        let result = match acquire(admission, cancel).await {
            Ok(token) => {
                let result = self.backend.render(job, self.settings.timeout, cancel).await;
                drop(token);
                result
            }
            Err(err) => Err(err),
        };

        job.finish(&result);
        if let Err(err) = &result {
            log_failure(job.id(), err);
        }
        result
    }

    /// Periodically drop polling-mode artifacts past their retention.
    pub fn spawn_sweeper(self: &Arc<Self>, shutdown: CancellationToken) -> JoinHandle<()> {
        let service = Arc::clone(self);
        let retention = self.settings.retention;
        let period = (retention / 2).clamp(Duration::from_secs(1), Duration::from_secs(60));

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let expired = service.registry.evict_expired(Utc::now(), retention);
                        if !expired.is_empty() {
                            let count = expired.len();
                            // Dropping removes job directories.
                            if let Err(e) = tokio::task::spawn_blocking(move || drop(expired)).await {
                                warn!(error = %e, "removing expired artifacts failed");
                            }
                            debug!(expired = count, "dropped expired artifacts");
                        }
                    }
                    _ = shutdown.cancelled() => break,
                }
            }
        })
    }
}

/// Turn an admission into a held slot, waiting in the queue if needed.
///
/// A job cancelled while queued leaves the queue without ever running.
async fn acquire(admission: Admission, cancel: &CancellationToken) -> Result<AdmittedToken, RenderError> {
    match admission {
        Admission::Admitted(token) => Ok(token),
        Admission::Rejected(overloaded) => Err(overloaded.into()),
        Admission::Queued(ticket) => {
            tokio::select! {
                granted = ticket.wait() => granted,
                _ = cancel.cancelled() => Err(RenderError::Cancelled),
            }
        }
    }
}

fn log_failure(job: JobId, err: &RenderError) {
    match err.kind() {
        ErrorKind::InvalidParameter | ErrorKind::Overloaded | ErrorKind::Cancelled => {
            debug!(job = %job, kind = err.kind().as_str(), error = %err, "render did not run to completion");
        }
        kind => {
            warn!(
                job = %job,
                kind = kind.as_str(),
                error = %err,
                stderr = err.stderr_tail().unwrap_or(""),
                "render failed"
            );
        }
    }
}
