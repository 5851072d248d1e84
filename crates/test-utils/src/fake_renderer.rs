//! A stand-in renderer executable.
//!
//! `FakeRenderer::install` writes a POSIX shell script that accepts the same
//! command line as Blender + the entry script
//! (`--background ... --python <script> -- --in <json> --out <dir> --format <fmt> ...`)
//! and behaves according to a [`Scenario`]. Every run records its pid,
//! arguments, and parameter file next to the script so tests can inspect
//! them.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tlr_avatar::exec::RendererCommand;
use tlr_avatar::types::OutputFormat;

use crate::fixtures::fixture_for;

pub const SCRIPT_NAME: &str = "fake-blender";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scenario {
    /// Write a valid artifact of the requested format and exit 0.
    Succeed,
    /// Exit 0 without writing anything.
    SucceedWithoutOutput,
    /// Exit 0 after writing an empty artifact.
    EmptyOutput,
    /// Exit 0 after writing text where an image should be.
    CorruptOutput,
    /// Print `stderr` and exit with `code`.
    Fail { code: i32, stderr: String },
    /// Sleep far longer than any test deadline.
    Hang,
    /// Start a background helper in the same process group, then hang.
    HangWithChild,
}

/// An installed fake renderer. Dropping it deletes the script and records.
pub struct FakeRenderer {
    dir: TempDir,
}

impl FakeRenderer {
    pub fn install(scenario: Scenario) -> io::Result<Self> {
        let dir = tempfile::tempdir()?;
        for format in OutputFormat::ALL {
            fs::write(
                dir.path().join(format!("fixture.{}", format.extension())),
                fixture_for(format),
            )?;
        }

        let script = render_script(dir.path(), &scenario);
        let path = dir.path().join(SCRIPT_NAME);
        fs::write(&path, script)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&path, fs::Permissions::from_mode(0o755))?;
        }

        Ok(Self { dir })
    }

    pub fn program(&self) -> PathBuf {
        self.dir.path().join(SCRIPT_NAME)
    }

    pub fn command(&self) -> RendererCommand {
        RendererCommand::new(self.program(), "/app/render_avatar.py")
    }

    /// Pid of the most recent run (the process group leader).
    pub fn recorded_pid(&self) -> Option<u32> {
        read_pid(&self.dir.path().join("pid"))
    }

    /// Pid of the background helper started by [`Scenario::HangWithChild`].
    pub fn child_pid(&self) -> Option<u32> {
        read_pid(&self.dir.path().join("child.pid"))
    }

    /// Arguments of the most recent run, one per element.
    pub fn last_args(&self) -> Option<Vec<String>> {
        let text = fs::read_to_string(self.dir.path().join("args")).ok()?;
        Some(text.lines().map(str::to_string).collect())
    }

    /// Parameter file of the most recent run.
    pub fn last_params(&self) -> Option<String> {
        fs::read_to_string(self.dir.path().join("params.json")).ok()
    }

    /// How many times the renderer was started.
    pub fn invocations(&self) -> usize {
        fs::read_to_string(self.dir.path().join("calls"))
            .map(|s| s.lines().count())
            .unwrap_or(0)
    }
}

fn read_pid(path: &Path) -> Option<u32> {
    fs::read_to_string(path).ok()?.trim().parse().ok()
}

/// Whether `pid` names a live (non-zombie) process.
pub fn process_alive(pid: u32) -> bool {
    let Ok(stat) = fs::read_to_string(format!("/proc/{pid}/stat")) else {
        return false;
    };
    // Format: `pid (comm) state ...`; comm may contain spaces.
    match stat.rsplit_once(')') {
        Some((_, rest)) => !matches!(rest.trim_start().chars().next(), Some('Z') | Some('X') | None),
        None => false,
    }
}

fn render_script(dir: &Path, scenario: &Scenario) -> String {
    let d = dir.display();
    let mut script = format!(
        r#"#!/bin/sh
echo $$ > '{d}/pid'
echo run >> '{d}/calls'
printf '%s\n' "$@" > '{d}/args'
echo "fake renderer starting" >&2
IN=""
OUT=""
FMT="png"
while [ $# -gt 0 ]; do
  case "$1" in
    --in) IN="$2"; shift 2 ;;
    --out) OUT="$2"; shift 2 ;;
    --format) FMT="$2"; shift 2 ;;
    *) shift ;;
  esac
done
if [ -z "$OUT" ]; then
  echo "fake-blender 4.2.0"
  exit 0
fi
[ -n "$IN" ] && cp "$IN" '{d}/params.json'
case "$FMT" in
  jpeg) EXT=jpg ;;
  *) EXT="$FMT" ;;
esac
"#
    );

    let body = match scenario {
        Scenario::Succeed => format!("cp '{d}/fixture.'\"$EXT\" \"$OUT/avatar.$EXT\"\nexit 0\n"),
        Scenario::SucceedWithoutOutput => "exit 0\n".to_string(),
        Scenario::EmptyOutput => ": > \"$OUT/avatar.$EXT\"\nexit 0\n".to_string(),
        Scenario::CorruptOutput => {
            "echo 'Traceback: not an image' > \"$OUT/avatar.$EXT\"\nexit 0\n".to_string()
        }
        Scenario::Fail { code, stderr } => {
            let escaped = stderr.replace('\'', "'\\''");
            format!("printf '%s\\n' '{escaped}' >&2\nexit {code}\n")
        }
        Scenario::Hang => "exec sleep 30\n".to_string(),
        Scenario::HangWithChild => {
            format!("sleep 30 &\necho $! > '{d}/child.pid'\nwait\n")
        }
    };
    script.push_str(&body);
    script
}
