// src/exec/backend.rs

//! Pluggable render backend.
//!
//! The engine talks to a [`RenderBackend`] instead of the supervisor
//! directly, so tests can run the whole pipeline against an in-process fake
//! while production uses [`ProcessBackend`].

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::artifact::RenderArtifact;
use crate::engine::RenderJob;
use crate::errors::RenderError;

use super::supervisor::Supervisor;

pub type RenderFuture<'a> =
    Pin<Box<dyn Future<Output = Result<RenderArtifact, RenderError>> + Send + 'a>>;

/// Executes an admitted job.
///
/// Implementations move the job from `Pending` to `Running` once work has
/// actually started, and must give up promptly when `cancel` fires or
/// `timeout` elapses. The caller records the terminal state.
pub trait RenderBackend: Send + Sync {
    fn render<'a>(
        &'a self,
        job: &'a mut RenderJob,
        timeout: Duration,
        cancel: &'a CancellationToken,
    ) -> RenderFuture<'a>;
}

/// Production backend: one supervised renderer process per job.
#[derive(Debug, Clone)]
pub struct ProcessBackend {
    supervisor: Supervisor,
}

impl ProcessBackend {
    pub fn new(supervisor: Supervisor) -> Self {
        Self { supervisor }
    }

    pub fn supervisor(&self) -> &Supervisor {
        &self.supervisor
    }
}

impl RenderBackend for ProcessBackend {
    fn render<'a>(
        &'a self,
        job: &'a mut RenderJob,
        timeout: Duration,
        cancel: &'a CancellationToken,
    ) -> RenderFuture<'a> {
        Box::pin(self.supervisor.run(job, timeout, cancel))
    }
}
