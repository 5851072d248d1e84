// src/config/model.rs

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::types::{OutputFormat, OverloadPolicy};

/// Configuration as read from TOML, before validation.
///
/// ```toml
/// [server]
/// listen = "0.0.0.0:8000"
///
/// [renderer]
/// program = "blender"
/// script = "/app/render_avatar.py"
/// extra_args = []
///
/// [render]
/// timeout_ms = 120000
/// max_concurrent = 1
/// queue_depth = 8
/// overload_policy = "queue"
/// formats = ["png", "jpeg", "svg"]
/// retention_secs = 600
/// stderr_tail_bytes = 8192
/// ```
///
/// Every section and key is optional.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct RawConfigFile {
    #[serde(default)]
    pub server: RawServerSection,

    #[serde(default)]
    pub renderer: RendererSection,

    #[serde(default)]
    pub render: RenderSection,
}

/// `[server]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawServerSection {
    /// Socket address to bind, e.g. `"127.0.0.1:8000"`.
    #[serde(default = "default_listen")]
    pub listen: String,
}

fn default_listen() -> String {
    "0.0.0.0:8000".to_string()
}

impl Default for RawServerSection {
    fn default() -> Self {
        Self {
            listen: default_listen(),
        }
    }
}

/// `[renderer]` section.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RendererSection {
    /// Renderer executable. A bare name is looked up on `PATH` and in the
    /// usual Blender install locations.
    #[serde(default = "default_program")]
    pub program: String,

    /// Entry script passed with `--python`.
    #[serde(default = "default_script")]
    pub script: PathBuf,

    /// Extra renderer options inserted after `--background`
    /// (e.g. `["--factory-startup"]`).
    #[serde(default)]
    pub extra_args: Vec<String>,
}

fn default_program() -> String {
    "blender".to_string()
}

fn default_script() -> PathBuf {
    PathBuf::from("/app/render_avatar.py")
}

impl Default for RendererSection {
    fn default() -> Self {
        Self {
            program: default_program(),
            script: default_script(),
            extra_args: Vec::new(),
        }
    }
}

/// `[render]` section.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RenderSection {
    /// Hard wall-clock deadline per renderer process.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Renderer processes allowed at once.
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,

    /// Jobs allowed to wait for a slot under the `queue` policy.
    #[serde(default = "default_queue_depth")]
    pub queue_depth: usize,

    /// What happens when every slot is busy.
    #[serde(default)]
    pub overload_policy: OverloadPolicy,

    /// Output formats callers may request.
    #[serde(default = "default_formats")]
    pub formats: Vec<OutputFormat>,

    /// Parent directory of per-job working directories.
    #[serde(default = "default_work_root")]
    pub work_root: PathBuf,

    /// How long an unfetched polling-mode artifact is kept.
    #[serde(default = "default_retention_secs")]
    pub retention_secs: u64,

    /// Bytes of renderer stderr kept for diagnostics.
    #[serde(default = "default_stderr_tail_bytes")]
    pub stderr_tail_bytes: usize,
}

fn default_timeout_ms() -> u64 {
    120_000
}

fn default_max_concurrent() -> usize {
    1
}

fn default_queue_depth() -> usize {
    8
}

fn default_formats() -> Vec<OutputFormat> {
    OutputFormat::ALL.to_vec()
}

pub fn default_work_root() -> PathBuf {
    std::env::temp_dir().join("tlr-avatar")
}

fn default_retention_secs() -> u64 {
    600
}

fn default_stderr_tail_bytes() -> usize {
    8192
}

impl Default for RenderSection {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
            max_concurrent: default_max_concurrent(),
            queue_depth: default_queue_depth(),
            overload_policy: OverloadPolicy::default(),
            formats: default_formats(),
            work_root: default_work_root(),
            retention_secs: default_retention_secs(),
            stderr_tail_bytes: default_stderr_tail_bytes(),
        }
    }
}

impl RenderSection {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_secs)
    }
}

/// Validated configuration.
///
/// Only constructed through `TryFrom<RawConfigFile>` (see `validate.rs`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigFile {
    pub listen: SocketAddr,
    pub renderer: RendererSection,
    pub render: RenderSection,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(listen: SocketAddr, renderer: RendererSection, render: RenderSection) -> Self {
        Self {
            listen,
            renderer,
            render,
        }
    }
}
