// src/engine/registry.rs

//! Table of background jobs for the polling API.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::artifact::RenderArtifact;
use crate::errors::{ErrorSummary, RenderError};

use super::JobId;
use super::job::{JobState, JobStatus};

/// Expired entries stay as tombstones for this many retention periods so a
/// late fetch can tell "expired" from "never existed".
const TOMBSTONE_RETENTION_FACTOR: u32 = 6;

#[derive(Debug)]
struct JobEntry {
    status: watch::Receiver<JobStatus>,
    cancel: CancellationToken,
    outcome: Outcome,
}

#[derive(Debug)]
enum Outcome {
    InFlight,
    Ready(RenderArtifact),
    Delivered,
    Failed(ErrorSummary),
    Expired,
}

/// Point-in-time view of a background job.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobSnapshot {
    #[serde(flatten)]
    pub status: JobStatus,
    pub artifact_ready: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub digest: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorSummary>,
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ArtifactFetchError {
    #[error("unknown job")]
    UnknownJob,

    #[error("job is {0:?}; artifact not ready")]
    NotReady(JobState),

    #[error("artifact was already delivered")]
    AlreadyDelivered,

    #[error("artifact expired")]
    Expired,

    #[error("job failed: {}", .0.message)]
    Failed(ErrorSummary),
}

/// Jobs submitted through the polling API, keyed by id.
#[derive(Debug, Default)]
pub struct JobRegistry {
    entries: Mutex<HashMap<JobId, JobEntry>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<JobId, JobEntry>> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn insert(&self, id: JobId, status: watch::Receiver<JobStatus>, cancel: CancellationToken) {
        self.lock().insert(
            id,
            JobEntry {
                status,
                cancel,
                outcome: Outcome::InFlight,
            },
        );
    }

    /// Record the result of a finished job.
    pub fn complete(&self, id: JobId, result: Result<RenderArtifact, RenderError>) {
        let mut entries = self.lock();
        let Some(entry) = entries.get_mut(&id) else {
            debug!(job = %id, "finished job no longer registered; discarding result");
            return;
        };
        entry.outcome = match result {
            Ok(artifact) => Outcome::Ready(artifact),
            Err(err) => Outcome::Failed(err.summary()),
        };
    }

    pub fn snapshot(&self, id: JobId) -> Option<JobSnapshot> {
        let entries = self.lock();
        let entry = entries.get(&id)?;
        let status = entry.status.borrow().clone();
        let (artifact_ready, digest, error) = match &entry.outcome {
            Outcome::Ready(artifact) => (true, Some(artifact.digest().to_string()), None),
            Outcome::Failed(summary) => (false, None, Some(summary.clone())),
            Outcome::InFlight | Outcome::Delivered | Outcome::Expired => (false, None, None),
        };
        Some(JobSnapshot {
            status,
            artifact_ready,
            digest,
            error,
        })
    }

    /// Request cancellation. Returns `false` for unknown jobs.
    ///
    /// Cancelling a job that already finished has no effect.
    pub fn cancel(&self, id: JobId) -> bool {
        match self.lock().get(&id) {
            Some(entry) => {
                entry.cancel.cancel();
                true
            }
            None => false,
        }
    }

    /// Hand out the artifact of a succeeded job. Each artifact is delivered
    /// at most once.
    pub fn take_artifact(&self, id: JobId) -> Result<RenderArtifact, ArtifactFetchError> {
        let mut entries = self.lock();
        let entry = entries.get_mut(&id).ok_or(ArtifactFetchError::UnknownJob)?;
        match std::mem::replace(&mut entry.outcome, Outcome::Delivered) {
            Outcome::Ready(artifact) => Ok(artifact),
            Outcome::Delivered => Err(ArtifactFetchError::AlreadyDelivered),
            Outcome::InFlight => {
                entry.outcome = Outcome::InFlight;
                let state = entry.status.borrow().state;
                Err(ArtifactFetchError::NotReady(state))
            }
            Outcome::Expired => {
                entry.outcome = Outcome::Expired;
                Err(ArtifactFetchError::Expired)
            }
            Outcome::Failed(summary) => {
                let err = ArtifactFetchError::Failed(summary.clone());
                entry.outcome = Outcome::Failed(summary);
                Err(err)
            }
        }
    }

    /// Expire artifacts of jobs that finished at least `retention` ago and
    /// forget jobs long past that.
    ///
    /// The expired artifacts are handed back instead of dropped here:
    /// dropping one removes its job directory, which must not happen under
    /// the registry lock.
    pub fn evict_expired(&self, now: DateTime<Utc>, retention: Duration) -> Vec<RenderArtifact> {
        let retention = chrono::Duration::from_std(retention).unwrap_or(chrono::Duration::MAX);
        let forget_after = retention
            .checked_mul(TOMBSTONE_RETENTION_FACTOR as i32)
            .unwrap_or(chrono::Duration::MAX);

        let mut entries = self.lock();
        let mut expired = Vec::new();
        entries.retain(|id, entry| {
            let Some(finished_at) = entry.status.borrow().finished_at else {
                return true;
            };
            // A finished job whose result is not recorded yet stays.
            if matches!(entry.outcome, Outcome::InFlight) {
                return true;
            }
            let age = now - finished_at;
            if age < retention {
                return true;
            }
            if matches!(entry.outcome, Outcome::Ready(_)) {
                debug!(job = %id, "artifact retention elapsed; expiring artifact");
                if let Outcome::Ready(artifact) = std::mem::replace(&mut entry.outcome, Outcome::Expired) {
                    expired.push(artifact);
                }
            }
            if age >= forget_after {
                debug!(job = %id, "forgetting job");
                return false;
            }
            true
        });
        expired
    }
}
