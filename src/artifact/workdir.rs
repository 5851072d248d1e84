// src/artifact/workdir.rs

//! Per-job working directories.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use tempfile::TempDir;
use tracing::{debug, warn};

use crate::engine::JobId;

pub const JOB_DIR_PREFIX: &str = "job-";
pub const PARAMS_FILE: &str = "params.json";
pub const OUTPUT_DIR: &str = "out";

/// A job's private directory under the work root.
///
/// Layout:
///
/// ```text
/// <work_root>/job-<id>-XXXXXX/
///     params.json
///     out/avatar.<ext>
/// ```
///
/// The directory is removed when the `JobDir` is dropped.
#[derive(Debug)]
pub struct JobDir {
    dir: TempDir,
}

impl JobDir {
    pub fn allocate(work_root: &Path, job: JobId) -> io::Result<Self> {
        fs::create_dir_all(work_root)?;
        let dir = tempfile::Builder::new()
            .prefix(&format!("{JOB_DIR_PREFIX}{job}-"))
            .tempdir_in(work_root)?;
        fs::create_dir(dir.path().join(OUTPUT_DIR))?;
        debug!(job = %job, dir = ?dir.path(), "allocated job directory");
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn params_path(&self) -> PathBuf {
        self.dir.path().join(PARAMS_FILE)
    }

    pub fn output_dir(&self) -> PathBuf {
        self.dir.path().join(OUTPUT_DIR)
    }
}

/// Remove `job-*` directories under `work_root` last modified more than
/// `max_age` ago. Returns how many were removed.
///
/// Left-overs come from a previous process that was killed before its
/// job directories could be dropped.
pub fn sweep_stale(work_root: &Path, max_age: Duration) -> io::Result<usize> {
    let entries = match fs::read_dir(work_root) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e),
    };

    let now = SystemTime::now();
    let mut removed = 0;
    for entry in entries {
        let entry = entry?;
        let name = entry.file_name();
        if !name.to_string_lossy().starts_with(JOB_DIR_PREFIX) {
            continue;
        }
        let meta = entry.metadata()?;
        if !meta.is_dir() {
            continue;
        }
        let age = meta
            .modified()
            .ok()
            .and_then(|m| now.duration_since(m).ok())
            .unwrap_or_default();
        if age < max_age {
            continue;
        }
        match fs::remove_dir_all(entry.path()) {
            Ok(()) => {
                debug!(dir = ?entry.path(), ?age, "removed stale job directory");
                removed += 1;
            }
            Err(e) => warn!(dir = ?entry.path(), error = %e, "could not remove stale job directory"),
        }
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocate_creates_layout_and_drop_removes_it() {
        let root = tempfile::tempdir().unwrap();
        let job = JobId::new();
        let dir = JobDir::allocate(root.path(), job).unwrap();

        let path = dir.path().to_path_buf();
        assert!(dir.output_dir().is_dir());
        assert!(
            path.file_name()
                .unwrap()
                .to_string_lossy()
                .starts_with(&format!("job-{job}-"))
        );
        assert_eq!(dir.params_path(), path.join("params.json"));

        drop(dir);
        assert!(!path.exists());
    }

    #[test]
    fn allocate_creates_missing_work_root() {
        let root = tempfile::tempdir().unwrap();
        let nested = root.path().join("a/b");
        let dir = JobDir::allocate(&nested, JobId::new()).unwrap();
        assert!(dir.path().starts_with(&nested));
    }

    #[test]
    fn sweep_removes_only_job_directories() {
        let root = tempfile::tempdir().unwrap();
        fs::create_dir(root.path().join("job-old")).unwrap();
        fs::create_dir(root.path().join("keep-me")).unwrap();
        fs::write(root.path().join("job-file"), b"x").unwrap();

        let removed = sweep_stale(root.path(), Duration::ZERO).unwrap();
        assert_eq!(removed, 1);
        assert!(!root.path().join("job-old").exists());
        assert!(root.path().join("keep-me").exists());
        assert!(root.path().join("job-file").exists());
    }

    #[test]
    fn sweep_keeps_recent_directories() {
        let root = tempfile::tempdir().unwrap();
        fs::create_dir(root.path().join("job-new")).unwrap();
        let removed = sweep_stale(root.path(), Duration::from_secs(3600)).unwrap();
        assert_eq!(removed, 0);
    }

    #[test]
    fn sweep_of_missing_root_is_noop() {
        let root = tempfile::tempdir().unwrap();
        let removed = sweep_stale(&root.path().join("nope"), Duration::ZERO).unwrap();
        assert_eq!(removed, 0);
    }
}
