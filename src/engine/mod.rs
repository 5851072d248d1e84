// src/engine/mod.rs

//! Render orchestration engine.
//!
//! This module ties together:
//! - the per-job state machine ([`job`])
//! - the concurrency gate bounding simultaneous renderer processes ([`gate`])
//! - the job table used by the polling API ([`registry`])
//! - the pipeline that runs codec → gate → backend ([`service`])

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier of a render job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(Uuid);

impl JobId {
    pub fn new() -> Self {
        JobId(Uuid::new_v4())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for JobId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(JobId)
    }
}

pub mod gate;
pub mod job;
pub mod registry;
pub mod service;

pub use gate::{Admission, AdmittedToken, ConcurrencyGate, GateStats, Overloaded, QueuedTicket};
pub use job::{JobState, JobStatus, RenderJob};
pub use registry::{ArtifactFetchError, JobRegistry, JobSnapshot};
pub use service::{RenderService, RenderSettings};
