//! In-process render backend for pipeline tests.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tlr_avatar::artifact::{self, JobDir};
use tlr_avatar::engine::{ConcurrencyGate, JobState, RenderJob, RenderService, RenderSettings};
use tlr_avatar::errors::RenderError;
use tlr_avatar::exec::{RenderBackend, RenderFuture};

use crate::fixtures::fixture_for;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FakeBehaviour {
    /// Produce a valid artifact.
    Succeed,
    /// Fail like a renderer killed with exit code 137.
    Fail,
    /// Never finish on its own.
    Hang,
}

/// Counters shared between a [`FakeBackend`] and the test.
#[derive(Debug, Default)]
pub struct FakeStats {
    running: AtomicUsize,
    max_running: AtomicUsize,
    started: AtomicUsize,
}

impl FakeStats {
    pub fn running(&self) -> usize {
        self.running.load(Ordering::SeqCst)
    }

    /// Highest number of renders observed at the same time.
    pub fn max_running(&self) -> usize {
        self.max_running.load(Ordering::SeqCst)
    }

    pub fn started(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }
}

struct RunningGuard<'a>(&'a FakeStats);

impl<'a> RunningGuard<'a> {
    fn enter(stats: &'a FakeStats) -> Self {
        stats.started.fetch_add(1, Ordering::SeqCst);
        let now = stats.running.fetch_add(1, Ordering::SeqCst) + 1;
        stats.max_running.fetch_max(now, Ordering::SeqCst);
        Self(stats)
    }
}

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.running.fetch_sub(1, Ordering::SeqCst);
    }
}

/// A backend that never spawns a process.
///
/// With [`FakeBackend::held`], every render blocks until the test calls
/// [`FakeBackend::release`], which makes concurrency observable.
pub struct FakeBackend {
    work_root: PathBuf,
    behaviour: FakeBehaviour,
    stats: Arc<FakeStats>,
    hold: Option<Arc<Semaphore>>,
}

impl FakeBackend {
    pub fn new(work_root: impl Into<PathBuf>, behaviour: FakeBehaviour) -> Self {
        Self {
            work_root: work_root.into(),
            behaviour,
            stats: Arc::new(FakeStats::default()),
            hold: None,
        }
    }

    pub fn held(mut self) -> Self {
        self.hold = Some(Arc::new(Semaphore::new(0)));
        self
    }

    pub fn stats(&self) -> Arc<FakeStats> {
        Arc::clone(&self.stats)
    }

    /// Handle for letting held renders finish.
    pub fn releaser(&self) -> Option<Arc<Semaphore>> {
        self.hold.clone()
    }

    async fn work(&self, job: &RenderJob) -> Result<artifact::RenderArtifact, RenderError> {
        if let Some(hold) = &self.hold {
            if let Ok(permit) = hold.acquire().await {
                permit.forget();
            }
        }
        match self.behaviour {
            FakeBehaviour::Succeed => {
                let format = job.payload().format();
                let dir = JobDir::allocate(&self.work_root, job.id())
                    .map_err(|e| RenderError::Internal(e.to_string()))?;
                std::fs::write(artifact::expected_path(&dir, format), fixture_for(format))
                    .map_err(|e| RenderError::Internal(e.to_string()))?;
                Ok(artifact::resolve(dir, format).await?)
            }
            FakeBehaviour::Fail => Err(RenderError::RenderFailure {
                exit_code: Some(137),
                stderr_tail: "fake renderer failed".to_string(),
            }),
            FakeBehaviour::Hang => std::future::pending().await,
        }
    }
}

/// Let `n` held renders proceed.
pub fn release(releaser: &Semaphore, n: usize) {
    releaser.add_permits(n);
}

impl RenderBackend for FakeBackend {
    fn render<'a>(
        &'a self,
        job: &'a mut RenderJob,
        timeout: Duration,
        cancel: &'a CancellationToken,
    ) -> RenderFuture<'a> {
        Box::pin(async move {
            let _guard = RunningGuard::enter(&self.stats);
            job.transition(JobState::Running)
                .map_err(|e| RenderError::Internal(e.to_string()))?;

            let job = &*job;
            tokio::select! {
                result = self.work(job) => result,
                _ = tokio::time::sleep(timeout) => Err(RenderError::TimedOut {
                    timeout,
                    stderr_tail: String::new(),
                }),
                _ = cancel.cancelled() => Err(RenderError::Cancelled),
            }
        })
    }
}

/// A service over `backend` with the given gate.
pub fn service_with(
    backend: Arc<dyn RenderBackend>,
    gate: ConcurrencyGate,
    settings: RenderSettings,
) -> Arc<RenderService> {
    Arc::new(RenderService::new(settings, gate, backend))
}
