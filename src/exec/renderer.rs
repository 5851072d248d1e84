// src/exec/renderer.rs

//! How to invoke the external renderer (Blender + entry script).

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use serde::Serialize;
use tokio::process::Command;
use tracing::debug;

use crate::artifact::JobDir;
use crate::codec::SerializedPayload;
use crate::config::model::RendererSection;

/// Install locations checked after `PATH`.
pub const FALLBACK_LOCATIONS: [&str; 3] = [
    "/usr/bin/blender",
    "/opt/blender/blender",
    "/usr/local/bin/blender",
];

/// Characters of renderer output returned by the version probe.
pub const VERSION_TAIL_CHARS: usize = 4000;

/// Fixed part of the renderer command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RendererCommand {
    program: PathBuf,
    script: PathBuf,
    extra_args: Vec<String>,
}

impl RendererCommand {
    pub fn new(program: impl Into<PathBuf>, script: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            script: script.into(),
            extra_args: Vec::new(),
        }
    }

    pub fn with_extra_args(mut self, extra_args: Vec<String>) -> Self {
        self.extra_args = extra_args;
        self
    }

    /// Build from config, resolving the program through [`locate`]. An
    /// unresolved program is kept as configured so the spawn error names it.
    pub fn from_config(section: &RendererSection) -> Self {
        let configured = PathBuf::from(&section.program);
        let program = locate(&configured).unwrap_or(configured);
        Self::new(program, &section.script).with_extra_args(section.extra_args.clone())
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    pub fn script(&self) -> &Path {
        &self.script
    }

    /// Arguments after the program name:
    ///
    /// `--background [extra] --python <script> -- --in <params> --out <dir> <payload args>`
    pub fn argv(&self, payload: &SerializedPayload, dir: &JobDir) -> Vec<OsString> {
        let mut argv: Vec<OsString> = Vec::with_capacity(8 + self.extra_args.len() + payload.args().len());
        argv.push("--background".into());
        argv.extend(self.extra_args.iter().map(OsString::from));
        argv.push("--python".into());
        argv.push(self.script.clone().into());
        argv.push("--".into());
        argv.push("--in".into());
        argv.push(dir.params_path().into());
        argv.push("--out".into());
        argv.push(dir.output_dir().into());
        argv.extend(payload.args().iter().map(OsString::from));
        argv
    }

    /// A ready-to-spawn command with piped output, running inside `dir`.
    pub fn command(&self, payload: &SerializedPayload, dir: &JobDir) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(self.argv(payload, dir))
            .current_dir(dir.path())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        cmd
    }
}

/// Find an executable for `program`.
///
/// A program containing a path separator is used as-is. A bare name is
/// searched on `PATH`, then in [`FALLBACK_LOCATIONS`].
pub fn locate(program: &Path) -> Option<PathBuf> {
    if program.components().count() > 1 || program.is_absolute() {
        return is_executable(program).then(|| program.to_path_buf());
    }

    let from_path = std::env::var_os("PATH")
        .into_iter()
        .flat_map(|paths| std::env::split_paths(&paths).collect::<Vec<_>>())
        .map(|dir| dir.join(program));
    let fallbacks = FALLBACK_LOCATIONS.iter().map(PathBuf::from);

    from_path.chain(fallbacks).find(|p| is_executable(p))
}

fn is_executable(path: &Path) -> bool {
    let Ok(meta) = std::fs::metadata(path) else {
        return false;
    };
    if !meta.is_file() {
        return false;
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        meta.permissions().mode() & 0o111 != 0
    }
    #[cfg(not(unix))]
    {
        true
    }
}

/// Outcome of `<renderer> -v`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RendererVersion {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rc: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl RendererVersion {
    fn failed(reason: impl Into<String>) -> Self {
        Self {
            ok: false,
            rc: None,
            stdout: String::new(),
            stderr: reason.into(),
        }
    }
}

/// Run `<program> -v` with a deadline and report its output tails.
pub async fn probe_version(program: &Path, timeout: Duration) -> RendererVersion {
    let mut cmd = Command::new(program);
    cmd.arg("-v")
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let output = match tokio::time::timeout(timeout, cmd.output()).await {
        Ok(Ok(output)) => output,
        Ok(Err(e)) => {
            debug!(program = ?program, error = %e, "renderer version probe failed to start");
            return RendererVersion::failed(e.to_string());
        }
        Err(_) => {
            return RendererVersion::failed(format!(
                "timed out after {}s",
                timeout.as_secs_f64()
            ));
        }
    };

    RendererVersion {
        ok: output.status.success(),
        rc: output.status.code(),
        stdout: tail_chars(&String::from_utf8_lossy(&output.stdout), VERSION_TAIL_CHARS),
        stderr: tail_chars(&String::from_utf8_lossy(&output.stderr), VERSION_TAIL_CHARS),
    }
}

/// The last `n` characters of `s`.
pub fn tail_chars(s: &str, n: usize) -> String {
    let count = s.chars().count();
    s.chars().skip(count.saturating_sub(n)).collect()
}
