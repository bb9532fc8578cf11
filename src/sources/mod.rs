//! Log backends and the cancellation signal handed to live streams.
//!
//! Provides a unified `LogBackend` trait with implementations for:
//! - Docker containers (via the `docker` CLI)
//! - An in-memory demo data set

pub mod demo;
pub mod docker;

use thiserror::Error;
use tokio::sync::{mpsc, watch};

use crate::discovery::ContainerInfo;
use crate::entry::LogEntry;

/// Which container logs are requested for, and how many recent lines
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LogRequest {
    pub container_id: String,
    pub host: String,
    pub tail: usize,
}

impl LogRequest {
    pub fn new(container_id: impl Into<String>, host: impl Into<String>, tail: usize) -> Self {
        Self {
            container_id: container_id.into(),
            host: host.into(),
            tail,
        }
    }
}

/// Events emitted by a live stream
#[derive(Debug)]
pub enum LogEvent {
    Line(LogEntry),
    Error(SourceError),
    EndOfStream,
}

/// Failures reported by backends
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("log stream was cancelled")]
    Cancelled,
    #[error("invalid container id '{0}': cannot start with '-'")]
    InvalidContainer(String),
    #[error("container '{0}' not found")]
    NotFound(String),
    #[error("failed to run {program}: {source}. Is it installed and running?")]
    Spawn {
        program: &'static str,
        #[source]
        source: std::io::Error,
    },
    #[error("{program} exited with {status}")]
    Exited {
        program: &'static str,
        status: std::process::ExitStatus,
    },
    #[error("{program} failed: {message}")]
    Failed {
        program: &'static str,
        message: String,
    },
    #[error("error reading logs: {0}")]
    Io(#[from] std::io::Error),
}

impl SourceError {
    /// Cancellation is expected when a stream is stopped or replaced and is
    /// never shown to the user
    pub fn is_cancellation(&self) -> bool {
        matches!(self, SourceError::Cancelled)
    }
}

/// Reject ids that the docker CLI would read as an option
pub fn validate_container_id(id: &str) -> Result<(), SourceError> {
    if id.is_empty() || id.starts_with('-') {
        return Err(SourceError::InvalidContainer(id.to_string()));
    }
    Ok(())
}

/// Owner side of a cancellation signal. Cancelling is permanent.
#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

/// Observer side of a cancellation signal, cloned into producers
#[derive(Clone, Debug)]
pub struct CancelSignal {
    rx: watch::Receiver<bool>,
}

/// Create a fresh, not-yet-cancelled signal pair
pub fn cancellation() -> (CancelHandle, CancelSignal) {
    let (tx, rx) = watch::channel(false);
    (CancelHandle { tx }, CancelSignal { rx })
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }
}

impl Drop for CancelHandle {
    fn drop(&mut self) {
        // A stream whose owner is gone must not keep running
        self.cancel();
    }
}

impl CancelSignal {
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once the signal has been cancelled
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        // Err means the handle is gone, which also counts as cancelled
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }
}

/// Trait for log backends
#[async_trait::async_trait]
pub trait LogBackend: Send + Sync {
    /// One-shot fetch of up to `request.tail` most recent entries, oldest first
    async fn get_logs(&self, request: &LogRequest) -> Result<Vec<LogEntry>, SourceError>;

    /// Open a live stream. The stream starts with the last `request.tail`
    /// entries and runs until `cancel` fires or the producer fails.
    async fn stream_logs(&self, request: &LogRequest, cancel: CancelSignal) -> mpsc::Receiver<LogEvent>;

    /// Containers this backend can show logs for
    async fn list_containers(&self) -> anyhow::Result<Vec<ContainerInfo>>;

    /// Get the display name for this backend
    fn name(&self) -> String;
}
