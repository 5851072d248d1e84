// src/artifact/mod.rs

//! Artifact resolution.
//!
//! After the renderer exits 0, [`resolve`] locates `<out>/avatar.<ext>` in
//! the job directory, checks that it is a complete file of the requested
//! format, and hashes it. The resulting [`RenderArtifact`] owns the job
//! directory, so the file stays on disk exactly as long as someone can still
//! read it.
//!
//! - [`workdir`] allocates and sweeps job directories.
//! - [`signature`] holds the per-format header/trailer checks.

pub mod signature;
pub mod workdir;

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::task::{Context, Poll};

use blake3::Hasher;
use bytes::Bytes;
use futures::Stream;
use tokio_util::io::ReaderStream;
use tracing::debug;

use crate::errors::ArtifactError;
use crate::types::OutputFormat;

pub use signature::Dimensions;
pub use workdir::JobDir;

/// File stem the entry script writes to.
pub const ARTIFACT_STEM: &str = "avatar";

/// Path the renderer is expected to write for `format`.
pub fn expected_path(dir: &JobDir, format: OutputFormat) -> PathBuf {
    dir.output_dir()
        .join(format!("{ARTIFACT_STEM}.{}", format.extension()))
}

/// A validated render output.
#[derive(Debug)]
pub struct RenderArtifact {
    dir: JobDir,
    path: PathBuf,
    format: OutputFormat,
    size: u64,
    dimensions: Option<Dimensions>,
    digest: String,
}

impl RenderArtifact {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn format(&self) -> OutputFormat {
        self.format
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn dimensions(&self) -> Option<Dimensions> {
        self.dimensions
    }

    /// Hex-encoded blake3 digest of the file contents.
    pub fn digest(&self) -> &str {
        &self.digest
    }

    pub fn content_type(&self) -> &'static str {
        self.format.content_type()
    }

    /// Open the file as a byte stream. The job directory is removed once
    /// the stream is dropped.
    pub async fn into_stream(self) -> io::Result<ArtifactStream> {
        let file = tokio::fs::File::open(&self.path).await?;
        Ok(ArtifactStream {
            inner: ReaderStream::new(file),
            _dir: self.dir,
        })
    }
}

/// Chunked reader over an artifact file that keeps its directory alive.
#[derive(Debug)]
pub struct ArtifactStream {
    inner: ReaderStream<tokio::fs::File>,
    _dir: JobDir,
}

impl Stream for ArtifactStream {
    type Item = io::Result<Bytes>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

/// Locate, check, and hash the artifact for `format` in `dir`.
///
/// On error the directory is dropped (and removed) with the error.
pub async fn resolve(dir: JobDir, format: OutputFormat) -> Result<RenderArtifact, ArtifactError> {
    let path = expected_path(&dir, format);

    let check_path = path.clone();
    let checked = tokio::task::spawn_blocking(move || check_file(&check_path, format))
        .await
        .map_err(|e| ArtifactError::Corrupt {
            path: path.clone(),
            reason: format!("inspection task failed: {e}"),
        })??;

    debug!(
        path = ?path,
        size = checked.size,
        digest = %checked.digest,
        "artifact resolved"
    );

    Ok(RenderArtifact {
        dir,
        path,
        format,
        size: checked.size,
        dimensions: checked.dimensions,
        digest: checked.digest,
    })
}

struct Checked {
    size: u64,
    dimensions: Option<Dimensions>,
    digest: String,
}

fn check_file(path: &Path, format: OutputFormat) -> Result<Checked, ArtifactError> {
    let corrupt = |reason: String| ArtifactError::Corrupt {
        path: path.to_path_buf(),
        reason,
    };

    let meta = match std::fs::metadata(path) {
        Ok(meta) => meta,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(ArtifactError::Missing {
                path: path.to_path_buf(),
            });
        }
        Err(e) => return Err(corrupt(format!("stat failed: {e}"))),
    };
    if !meta.is_file() {
        return Err(corrupt("not a regular file".to_string()));
    }
    let size = meta.len();
    if size == 0 {
        return Err(corrupt("empty file".to_string()));
    }

    let mut file = File::open(path).map_err(|e| corrupt(format!("open failed: {e}")))?;
    let (head, tail) = read_edges(&mut file, size).map_err(|e| corrupt(format!("read failed: {e}")))?;
    let dimensions = signature::inspect(format, &head, &tail, size).map_err(corrupt)?;

    let (digest, hashed) = hash_file(&mut file).map_err(|e| corrupt(format!("read failed: {e}")))?;
    if hashed != size {
        return Err(corrupt(format!(
            "file changed while hashing ({size} bytes expected, {hashed} read)"
        )));
    }

    Ok(Checked {
        size,
        dimensions,
        digest,
    })
}

fn read_edges(file: &mut File, size: u64) -> io::Result<(Vec<u8>, Vec<u8>)> {
    let edge = signature::EDGE_LEN as u64;

    let mut head = Vec::with_capacity(signature::EDGE_LEN);
    file.by_ref().take(edge).read_to_end(&mut head)?;

    file.seek(SeekFrom::Start(size.saturating_sub(edge)))?;
    let mut tail = Vec::with_capacity(signature::EDGE_LEN);
    file.by_ref().take(edge).read_to_end(&mut tail)?;

    Ok((head, tail))
}

fn hash_file(file: &mut File) -> io::Result<(String, u64)> {
    file.seek(SeekFrom::Start(0))?;
    let mut hasher = Hasher::new();
    let mut buf = [0u8; 8192];
    let mut total = 0u64;
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
        total += n as u64;
    }
    Ok((hasher.finalize().to_hex().to_string(), total))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::JobId;
    use futures::StreamExt;

    const SVG: &[u8] = b"<svg xmlns=\"http://www.w3.org/2000/svg\"></svg>\n";

    fn job_dir(root: &Path) -> JobDir {
        JobDir::allocate(root, JobId::new()).unwrap()
    }

    #[tokio::test]
    async fn missing_output_is_reported() {
        let root = tempfile::tempdir().unwrap();
        let err = resolve(job_dir(root.path()), OutputFormat::Png)
            .await
            .unwrap_err();
        assert!(matches!(err, ArtifactError::Missing { .. }), "{err:?}");
    }

    #[tokio::test]
    async fn empty_output_is_corrupt() {
        let root = tempfile::tempdir().unwrap();
        let dir = job_dir(root.path());
        std::fs::write(expected_path(&dir, OutputFormat::Svg), b"").unwrap();

        let err = resolve(dir, OutputFormat::Svg).await.unwrap_err();
        match err {
            ArtifactError::Corrupt { reason, .. } => assert_eq!(reason, "empty file"),
            other => panic!("expected Corrupt, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn wrong_format_is_corrupt() {
        let root = tempfile::tempdir().unwrap();
        let dir = job_dir(root.path());
        std::fs::write(expected_path(&dir, OutputFormat::Png), SVG).unwrap();

        let err = resolve(dir, OutputFormat::Png).await.unwrap_err();
        assert!(matches!(err, ArtifactError::Corrupt { .. }));
    }

    #[tokio::test]
    async fn valid_artifact_is_hashed_and_streamed() {
        let root = tempfile::tempdir().unwrap();
        let dir = job_dir(root.path());
        let dir_path = dir.path().to_path_buf();
        std::fs::write(expected_path(&dir, OutputFormat::Svg), SVG).unwrap();

        let artifact = resolve(dir, OutputFormat::Svg).await.unwrap();
        assert_eq!(artifact.size(), SVG.len() as u64);
        assert_eq!(artifact.digest(), blake3::hash(SVG).to_hex().as_str());
        assert_eq!(artifact.content_type(), "image/svg+xml");
        assert!(artifact.dimensions().is_none());

        let mut stream = artifact.into_stream().await.unwrap();
        let mut body = Vec::new();
        while let Some(chunk) = stream.next().await {
            body.extend_from_slice(&chunk.unwrap());
        }
        assert_eq!(body, SVG);
        assert!(dir_path.exists());

        drop(stream);
        assert!(!dir_path.exists());
    }

    #[tokio::test]
    async fn failed_resolution_removes_directory() {
        let root = tempfile::tempdir().unwrap();
        let dir = job_dir(root.path());
        let dir_path = dir.path().to_path_buf();

        let _ = resolve(dir, OutputFormat::Jpeg).await;
        assert!(!dir_path.exists());
    }
}
