#![allow(dead_code)]

use std::path::Path;

pub use tlr_avatar_test_utils::*;

pub type TestResult = Result<(), Box<dyn std::error::Error>>;

/// Number of `job-*` directories currently under `work_root`.
pub fn job_dirs(work_root: &Path) -> usize {
    std::fs::read_dir(work_root)
        .map(|entries| {
            entries
                .filter_map(Result::ok)
                .filter(|e| e.file_name().to_string_lossy().starts_with("job-"))
                .count()
        })
        .unwrap_or(0)
}
