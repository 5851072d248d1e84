// src/engine/job.rs

//! Per-job state machine.
//!
//! ```text
//! PENDING ──► RUNNING ──► SUCCEEDED | FAILED | TIMED_OUT | CANCELLED
//!    │
//!    └──► FAILED | CANCELLED      (setup failure / cancelled while queued)
//! ```

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::codec::SerializedPayload;
use crate::errors::RenderError;
use crate::types::OutputFormat;

use super::JobId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobState {
    /// Validated and waiting for a renderer slot.
    Pending,
    /// Renderer process spawned.
    Running,
    Succeeded,
    Failed,
    TimedOut,
    Cancelled,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        !matches!(self, JobState::Pending | JobState::Running)
    }

    pub fn can_transition_to(self, next: JobState) -> bool {
        use JobState::*;
        matches!(
            (self, next),
            (Pending, Running)
                | (Pending, Failed)
                | (Pending, Cancelled)
                | (Running, Succeeded)
                | (Running, Failed)
                | (Running, TimedOut)
                | (Running, Cancelled)
        )
    }

    /// Terminal state a job ends in when its render fails with `err`.
    pub fn for_error(err: &RenderError) -> JobState {
        match err {
            RenderError::TimedOut { .. } => JobState::TimedOut,
            RenderError::Cancelled => JobState::Cancelled,
            _ => JobState::Failed,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("illegal job transition {from:?} -> {to:?}")]
pub struct InvalidTransition {
    pub from: JobState,
    pub to: JobState,
}

/// Externally visible status of a job.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobStatus {
    pub id: JobId,
    pub state: JobState,
    pub seed: u64,
    pub format: OutputFormat,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

/// One render request's unit of execution.
///
/// Owns the serialized payload and the state machine. Optionally publishes
/// every status change to a `watch` channel so the polling API can observe
/// a job that is owned by a background task.
#[derive(Debug)]
pub struct RenderJob {
    status: JobStatus,
    payload: SerializedPayload,
    observer: Option<watch::Sender<JobStatus>>,
}

impl RenderJob {
    pub fn new(payload: SerializedPayload) -> Self {
        let status = JobStatus {
            id: JobId::new(),
            state: JobState::Pending,
            seed: payload.seed(),
            format: payload.format(),
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
        };
        Self {
            status,
            payload,
            observer: None,
        }
    }

    pub fn id(&self) -> JobId {
        self.status.id
    }

    pub fn state(&self) -> JobState {
        self.status.state
    }

    pub fn status(&self) -> &JobStatus {
        &self.status
    }

    pub fn payload(&self) -> &SerializedPayload {
        &self.payload
    }

    /// Start publishing status changes; returns the receiving side.
    pub fn observe(&mut self) -> watch::Receiver<JobStatus> {
        let (tx, rx) = watch::channel(self.status.clone());
        self.observer = Some(tx);
        rx
    }

    pub fn transition(&mut self, next: JobState) -> Result<(), InvalidTransition> {
        let from = self.status.state;
        if !from.can_transition_to(next) {
            return Err(InvalidTransition { from, to: next });
        }

        let now = Utc::now();
        self.status.state = next;
        if next == JobState::Running {
            self.status.started_at = Some(now);
        }
        if next.is_terminal() {
            self.status.finished_at = Some(now);
        }
        debug!(job = %self.status.id, ?from, to = ?next, "job state changed");

        if let Some(tx) = &self.observer {
            tx.send_replace(self.status.clone());
        }
        Ok(())
    }

    /// Move the job to the terminal state matching `result`.
    ///
    /// A job that is already terminal keeps its state.
    pub fn finish<T>(&mut self, result: &Result<T, RenderError>) {
        if self.state().is_terminal() {
            return;
        }
        let next = match result {
            Ok(_) => JobState::Succeeded,
            Err(err) => JobState::for_error(err),
        };
        if let Err(e) = self.transition(next) {
            warn!(job = %self.id(), error = %e, "could not record job outcome");
        }
    }
}
