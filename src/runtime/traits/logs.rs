// ABOUTME: Log operations trait for container engines.
// ABOUTME: Streams combined stdout/stderr output of a container.

use super::sealed::Sealed;
use crate::types::ContainerId;
use async_trait::async_trait;
use futures::Stream;
use std::pin::Pin;
use std::time::SystemTime;

/// Boxed stream of raw log chunks.
pub type LogChunks = Pin<Box<dyn Stream<Item = Result<LogLine, LogError>> + Send>>;

#[async_trait]
pub trait LogOps: Sealed + Send + Sync {
    /// Stream logs from a container.
    ///
    /// Items are chunks as the engine delivers them; a chunk may hold several
    /// lines or only part of one.
    async fn container_logs(
        &self,
        id: &ContainerId,
        opts: &LogOptions,
    ) -> Result<LogChunks, LogError>;
}

/// Options for log streaming.
#[derive(Debug, Clone, Default)]
pub struct LogOptions {
    pub stdout: bool,
    pub stderr: bool,
    /// Keep the stream open for new output (like `tail -f`).
    pub follow: bool,
    /// Number of lines to show from the end (`None` = everything).
    pub tail: Option<u64>,
    /// Drop output written before this instant. The engine works in whole seconds.
    pub since: Option<SystemTime>,
}

impl LogOptions {
    /// Whole history of both streams, then follow.
    pub fn follow_all() -> Self {
        Self {
            stdout: true,
            stderr: true,
            follow: true,
            tail: None,
            since: None,
        }
    }

    /// Only output written at or after `since`.
    pub fn since(mut self, since: SystemTime) -> Self {
        self.since = Some(since);
        self
    }

    /// The last `n` lines of both streams, without following.
    pub fn tail(n: u64) -> Self {
        Self {
            stdout: true,
            stderr: true,
            follow: false,
            tail: Some(n),
            since: None,
        }
    }
}

/// A chunk of container output, as raw bytes.
///
/// Frame boundaries are arbitrary, so a chunk may end inside a multi-byte
/// character. Decode only once whole lines are assembled.
#[derive(Debug, Clone)]
pub struct LogLine {
    pub data: Vec<u8>,
    pub stream: LogStream,
}

impl LogLine {
    pub fn stdout(data: impl Into<Vec<u8>>) -> Self {
        Self {
            data: data.into(),
            stream: LogStream::Stdout,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogStream {
    Stdout,
    Stderr,
}

#[derive(Debug, thiserror::Error)]
pub enum LogError {
    #[error("container not found: {0}")]
    ContainerNotFound(String),

    #[error("stream error: {0}")]
    StreamError(String),

    #[error("engine error: {0}")]
    Runtime(String),
}
