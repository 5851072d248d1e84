// src/exec/supervisor.rs

//! Render process supervision.

use std::path::{Path, PathBuf};
use std::process::ExitStatus;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::artifact::{self, JobDir, RenderArtifact};
use crate::engine::{JobState, RenderJob};
use crate::errors::RenderError;

use super::capture::{Capture, finish_text};
use super::process::ProcessHandle;
use super::renderer::RendererCommand;

/// How long to keep draining output after the renderer is gone.
pub const OUTPUT_GRACE: Duration = Duration::from_secs(2);

/// Runs one job's renderer process from spawn to validated artifact.
///
/// For every job it:
/// - allocates a private directory under `work_root` and writes the
///   parameter file,
/// - spawns the renderer in its own process group,
/// - drains stdout/stderr into bounded tails,
/// - races process exit against the deadline and the job's cancellation
///   token, killing the group when either wins,
/// - resolves the artifact on a clean exit.
///
/// Dropping the future returned by [`Supervisor::run`] kills the process
/// group and removes the job directory.
#[derive(Debug, Clone)]
pub struct Supervisor {
    renderer: RendererCommand,
    work_root: PathBuf,
    stderr_tail_bytes: usize,
}

enum Outcome {
    Exited(std::io::Result<ExitStatus>),
    DeadlineElapsed,
    Cancelled,
}

impl Supervisor {
    pub fn new(renderer: RendererCommand, work_root: impl Into<PathBuf>, stderr_tail_bytes: usize) -> Self {
        Self {
            renderer,
            work_root: work_root.into(),
            stderr_tail_bytes,
        }
    }

    pub fn renderer(&self) -> &RendererCommand {
        &self.renderer
    }

    pub fn work_root(&self) -> &Path {
        &self.work_root
    }

    pub async fn run(
        &self,
        job: &mut RenderJob,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<RenderArtifact, RenderError> {
        let id = job.id();

        let dir = JobDir::allocate(&self.work_root, id)
            .map_err(|e| RenderError::Internal(format!("allocating job directory: {e}")))?;
        tokio::fs::write(dir.params_path(), job.payload().params_json())
            .await
            .map_err(|e| RenderError::Internal(format!("writing parameter file: {e}")))?;

        if cancel.is_cancelled() {
            return Err(RenderError::Cancelled);
        }

        let mut cmd = self.renderer.command(job.payload(), &dir);
        let mut process = ProcessHandle::spawn(&mut cmd).map_err(|source| {
            warn!(job = %id, program = ?self.renderer.program(), error = %source, "failed to spawn renderer");
            RenderError::Spawn {
                program: self.renderer.program().to_path_buf(),
                source,
            }
        })?;
        job.transition(JobState::Running)
            .map_err(|e| RenderError::Internal(e.to_string()))?;
        info!(
            job = %id,
            pid = ?process.pid(),
            format = %job.payload().format(),
            seed = job.payload().seed(),
            "renderer started"
        );

        let limit = self.stderr_tail_bytes;
        let stdout = process
            .take_stdout()
            .map(|s| Capture::spawn(s, id, "stdout", limit));
        let stderr = process
            .take_stderr()
            .map(|s| Capture::spawn(s, id, "stderr", limit));

        let outcome = tokio::select! {
            status = process.wait() => Outcome::Exited(status),
            _ = tokio::time::sleep(timeout) => Outcome::DeadlineElapsed,
            _ = cancel.cancelled() => Outcome::Cancelled,
        };

        let status = match outcome {
            Outcome::Exited(Ok(status)) => status,
            Outcome::Exited(Err(e)) => {
                stop(&mut process).await;
                return Err(RenderError::Internal(format!("waiting for renderer: {e}")));
            }
            Outcome::DeadlineElapsed => {
                warn!(job = %id, pid = ?process.pid(), ?timeout, "renderer deadline elapsed; killing");
                stop(&mut process).await;
                let stderr_tail = finish_text(stderr, OUTPUT_GRACE).await;
                return Err(RenderError::TimedOut {
                    timeout,
                    stderr_tail,
                });
            }
            Outcome::Cancelled => {
                info!(job = %id, pid = ?process.pid(), "render cancelled; killing renderer");
                stop(&mut process).await;
                return Err(RenderError::Cancelled);
            }
        };

        let stderr_tail = finish_text(stderr, OUTPUT_GRACE).await;
        let stdout_tail = finish_text(stdout, OUTPUT_GRACE).await;
        debug!(job = %id, stdout = %stdout_tail, "renderer stdout tail");

        if !status.success() {
            warn!(
                job = %id,
                exit_code = ?status.code(),
                stderr = %stderr_tail,
                "renderer exited with failure"
            );
            return Err(RenderError::RenderFailure {
                exit_code: status.code(),
                stderr_tail,
            });
        }

        match artifact::resolve(dir, job.payload().format()).await {
            Ok(artifact) => {
                info!(
                    job = %id,
                    size = artifact.size(),
                    digest = %artifact.digest(),
                    "render succeeded"
                );
                Ok(artifact)
            }
            Err(e) => {
                warn!(
                    job = %id,
                    error = %e,
                    stderr = %stderr_tail,
                    "renderer exited 0 without a valid artifact"
                );
                Err(e.into())
            }
        }
    }
}

async fn stop(process: &mut ProcessHandle) {
    if let Err(e) = process.terminate().await {
        warn!(pid = ?process.pid(), error = %e, "failed to reap renderer after kill");
    }
}
