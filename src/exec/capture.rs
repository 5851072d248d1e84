// src/exec/capture.rs

//! Bounded capture of renderer stdout/stderr.
//!
//! Pipes are drained continuously so a chatty renderer never blocks on a
//! full pipe; only the last `limit` bytes of each stream are kept.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use crate::engine::JobId;

/// The last `limit` bytes written to a stream.
#[derive(Debug, Clone)]
pub struct OutputTail {
    buf: VecDeque<u8>,
    limit: usize,
    total: u64,
}

impl OutputTail {
    pub fn new(limit: usize) -> Self {
        Self {
            buf: VecDeque::with_capacity(limit.min(64 * 1024)),
            limit,
            total: 0,
        }
    }

    pub fn push(&mut self, chunk: &[u8]) {
        self.total += chunk.len() as u64;
        if self.limit == 0 {
            return;
        }
        let chunk = &chunk[chunk.len().saturating_sub(self.limit)..];
        let overflow = (self.buf.len() + chunk.len()).saturating_sub(self.limit);
        self.buf.drain(..overflow);
        self.buf.extend(chunk);
    }

    /// Total bytes seen, including those no longer retained.
    pub fn total_bytes(&self) -> u64 {
        self.total
    }

    pub fn text(&self) -> String {
        let (a, b) = self.buf.as_slices();
        let mut bytes = Vec::with_capacity(a.len() + b.len());
        bytes.extend_from_slice(a);
        bytes.extend_from_slice(b);
        String::from_utf8_lossy(&bytes).into_owned()
    }
}

/// A running drain task and the tail it fills.
#[derive(Debug)]
pub struct Capture {
    tail: Arc<Mutex<OutputTail>>,
    task: JoinHandle<()>,
}

impl Capture {
    /// Start draining `reader` on a background task.
    pub fn spawn<R>(reader: R, job: JobId, stream: &'static str, limit: usize) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let tail = Arc::new(Mutex::new(OutputTail::new(limit)));
        let sink = Arc::clone(&tail);
        let task = tokio::spawn(async move {
            let mut reader = reader;
            let mut buf = [0u8; 4096];
            loop {
                match reader.read(&mut buf).await {
                    Ok(0) => break,
                    Ok(n) => {
                        trace!(job = %job, stream, "{}", String::from_utf8_lossy(&buf[..n]));
                        lock(&sink).push(&buf[..n]);
                    }
                    Err(e) => {
                        debug!(job = %job, stream, error = %e, "renderer output read failed");
                        break;
                    }
                }
            }
        });
        Self { tail, task }
    }

    /// Wait up to `grace` for the stream to reach EOF, then return what was
    /// captured.
    ///
    /// A grandchild that escaped the process group can hold the pipe open
    /// indefinitely; in that case the drain task is aborted.
    pub async fn finish(mut self, grace: Duration) -> OutputTail {
        if tokio::time::timeout(grace, &mut self.task).await.is_err() {
            debug!("renderer output still open after exit; abandoning capture");
            self.task.abort();
        }
        lock(&self.tail).clone()
    }
}

fn lock(tail: &Mutex<OutputTail>) -> std::sync::MutexGuard<'_, OutputTail> {
    tail.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Finish an optional capture, yielding an empty tail if there was none.
pub async fn finish_text(capture: Option<Capture>, grace: Duration) -> String {
    match capture {
        Some(c) => c.finish(grace).await.text(),
        None => String::new(),
    }
}
