// src/exec/process.rs

//! Ownership of one spawned renderer process.

use std::io;
use std::process::ExitStatus;

use tokio::process::{Child, ChildStderr, ChildStdout, Command};
use tracing::debug;

/// A spawned renderer and the process group it leads.
///
/// The child is started as the leader of a fresh process group so that any
/// helpers it forks can be killed together with it. If the handle is
/// dropped before the child was reaped, the whole group is killed.
#[derive(Debug)]
pub struct ProcessHandle {
    child: Child,
    pid: Option<u32>,
    reaped: bool,
}

impl ProcessHandle {
    pub fn spawn(cmd: &mut Command) -> io::Result<Self> {
        cmd.kill_on_drop(true);
        #[cfg(unix)]
        cmd.process_group(0);

        let child = cmd.spawn()?;
        let pid = child.id();
        debug!(?pid, "renderer process spawned");
        Ok(Self {
            child,
            pid,
            reaped: false,
        })
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub fn take_stdout(&mut self) -> Option<ChildStdout> {
        self.child.stdout.take()
    }

    pub fn take_stderr(&mut self) -> Option<ChildStderr> {
        self.child.stderr.take()
    }

    /// Wait for the leader to exit, then kill whatever is left of its group.
    pub async fn wait(&mut self) -> io::Result<ExitStatus> {
        let status = self.child.wait().await?;
        self.reaped = true;
        self.kill_group();
        Ok(status)
    }

    /// Kill the process group and reap the leader.
    pub async fn terminate(&mut self) -> io::Result<ExitStatus> {
        self.kill_group();
        if let Err(e) = self.child.start_kill() {
            debug!(pid = ?self.pid, error = %e, "start_kill on renderer failed");
        }
        self.wait().await
    }

    #[cfg(unix)]
    fn kill_group(&self) {
        use nix::sys::signal::{Signal, killpg};
        use nix::unistd::Pid;

        let Some(pgid) = self.pid.and_then(|pid| i32::try_from(pid).ok()) else {
            return;
        };
        // ESRCH once the group is gone is expected.
        if killpg(Pid::from_raw(pgid), Signal::SIGKILL).is_ok() {
            debug!(pgid, "killed renderer process group");
        }
    }

    #[cfg(not(unix))]
    fn kill_group(&self) {}
}

impl Drop for ProcessHandle {
    fn drop(&mut self) {
        if !self.reaped {
            debug!(pid = ?self.pid, "renderer handle dropped while running; killing");
            self.kill_group();
        }
    }
}
