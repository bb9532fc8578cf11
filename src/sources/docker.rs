use std::process::Stdio;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tracing::debug;

use super::{CancelSignal, LogBackend, LogEvent, LogRequest, SourceError, validate_container_id};
use crate::discovery::{ContainerInfo, discover_docker_containers};
use crate::entry::{LogEntry, StreamKind};

const PROGRAM: &str = "docker";

/// A backend that reads container logs with `docker logs`
pub struct DockerBackend {
    /// Daemon used for container discovery
    host: String,
    channel_buffer: usize,
}

impl DockerBackend {
    pub fn new(host: String, channel_buffer: usize) -> Self {
        Self {
            host,
            channel_buffer,
        }
    }
}

/// `docker [-H host] logs --timestamps --tail N [--follow] <id>`
fn logs_command(request: &LogRequest, follow: bool) -> Command {
    let mut cmd = Command::new(PROGRAM);
    if request.host != "local" {
        cmd.arg("-H").arg(&request.host);
    }
    cmd.arg("logs")
        .arg("--timestamps")
        .arg("--tail")
        .arg(request.tail.to_string());
    if follow {
        cmd.arg("--follow");
    }
    cmd.arg(&request.container_id)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    cmd
}

/// Merge both pipes into chronological order and keep the last `tail`
fn merge_snapshot(stdout: &str, stderr: &str, tail: usize) -> Vec<LogEntry> {
    let mut entries: Vec<LogEntry> = stdout
        .lines()
        .map(|line| LogEntry::parse(line, StreamKind::Stdout))
        .chain(stderr.lines().map(|line| LogEntry::parse(line, StreamKind::Stderr)))
        .filter(|entry| !entry.raw.trim().is_empty())
        .collect();
    // Stable, so lines sharing a timestamp keep pipe order
    entries.sort_by_key(|entry| entry.parsed_timestamp());
    let skip = entries.len().saturating_sub(tail);
    entries.split_off(skip)
}

fn classify_failure(container: &str, stderr: &str) -> SourceError {
    let message = stderr.trim();
    if message.contains("No such container") {
        SourceError::NotFound(container.to_string())
    } else {
        SourceError::Failed {
            program: PROGRAM,
            message: message.to_string(),
        }
    }
}

/// Forward lines of one pipe until it closes or the receiver goes away
async fn pipe_lines<R>(reader: R, stream: StreamKind, tx: mpsc::Sender<LogEvent>) -> Result<(), SourceError>
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        if tx.send(LogEvent::Line(LogEntry::parse(&line, stream))).await.is_err() {
            break;
        }
    }
    Ok(())
}

#[async_trait::async_trait]
impl LogBackend for DockerBackend {
    async fn get_logs(&self, request: &LogRequest) -> Result<Vec<LogEntry>, SourceError> {
        validate_container_id(&request.container_id)?;
        let output = logs_command(request, false)
            .output()
            .await
            .map_err(|source| SourceError::Spawn {
                program: PROGRAM,
                source,
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        if !output.status.success() {
            return Err(classify_failure(&request.container_id, &stderr));
        }
        Ok(merge_snapshot(&stdout, &stderr, request.tail))
    }

    async fn stream_logs(&self, request: &LogRequest, cancel: CancelSignal) -> mpsc::Receiver<LogEvent> {
        let (tx, rx) = mpsc::channel(self.channel_buffer);
        let request = request.clone();

        tokio::spawn(async move {
            if let Err(err) = validate_container_id(&request.container_id) {
                let _ = tx.send(LogEvent::Error(err)).await;
                return;
            }

            let mut child = match logs_command(&request, true).spawn() {
                Ok(child) => child,
                Err(source) => {
                    let _ = tx
                        .send(LogEvent::Error(SourceError::Spawn {
                            program: PROGRAM,
                            source,
                        }))
                        .await;
                    return;
                }
            };

            // Spawn task to read stderr
            let stderr_handle = child
                .stderr
                .take()
                .map(|stderr| tokio::spawn(pipe_lines(stderr, StreamKind::Stderr, tx.clone())));

            // Read stdout in this task
            let stdout = child.stdout.take();
            let stdout_tx = tx.clone();
            let read_stdout = async move {
                match stdout {
                    Some(stdout) => pipe_lines(stdout, StreamKind::Stdout, stdout_tx).await,
                    None => Ok(()),
                }
            };

            let read_result = tokio::select! {
                _ = cancel.cancelled() => {
                    debug!(container = %request.container_id, "killing docker logs");
                    let _ = child.kill().await;
                    if let Some(handle) = stderr_handle {
                        handle.abort();
                    }
                    return;
                }
                result = read_stdout => result,
            };

            // Wait for stderr task
            if let Some(handle) = stderr_handle {
                let _ = handle.await;
            }

            if let Err(err) = read_result {
                let _ = tx.send(LogEvent::Error(err)).await;
                let _ = child.kill().await;
                return;
            }

            match child.wait().await {
                Ok(status) if !status.success() => {
                    let _ = tx
                        .send(LogEvent::Error(SourceError::Exited {
                            program: PROGRAM,
                            status,
                        }))
                        .await;
                }
                Err(err) => {
                    let _ = tx.send(LogEvent::Error(SourceError::Io(err))).await;
                }
                _ => {
                    let _ = tx.send(LogEvent::EndOfStream).await;
                }
            }
        });

        rx
    }

    async fn list_containers(&self) -> anyhow::Result<Vec<ContainerInfo>> {
        let host = self.host.clone();
        tokio::task::spawn_blocking(move || discover_docker_containers(&host)).await?
    }

    fn name(&self) -> String {
        format!("docker:{}", self.host)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_logs_command_arguments() {
        let request = LogRequest::new("web", "tcp://10.0.0.5:2375", 50);
        let cmd = logs_command(&request, true);
        let args: Vec<String> = cmd
            .as_std()
            .get_args()
            .map(|a| a.to_string_lossy().to_string())
            .collect();
        assert_eq!(
            args,
            vec!["-H", "tcp://10.0.0.5:2375", "logs", "--timestamps", "--tail", "50", "--follow", "web"]
        );

        let local = logs_command(&LogRequest::new("web", "local", 10), false);
        assert_eq!(local.as_std().get_args().next().map(|a| a.to_os_string()), Some("logs".into()));
    }

    #[test]
    fn test_merge_snapshot_orders_by_timestamp_and_tails() {
        let stdout = "2024-03-01T10:00:01Z one\n2024-03-01T10:00:03Z three\n";
        let stderr = "2024-03-01T10:00:02Z two error\n\n2024-03-01T10:00:04Z four\n";
        let entries = merge_snapshot(stdout, stderr, 3);

        let messages: Vec<&str> = entries.iter().map(|e| e.message.as_str()).collect();
        assert_eq!(messages, vec!["two error", "three", "four"]);
        assert_eq!(entries[0].stream, StreamKind::Stderr);
        assert_eq!(entries[1].stream, StreamKind::Stdout);
    }

    #[test]
    fn test_classify_failure() {
        assert!(matches!(
            classify_failure("web", "Error response from daemon: No such container: web\n"),
            SourceError::NotFound(id) if id == "web"
        ));
        assert!(matches!(
            classify_failure("web", "permission denied"),
            SourceError::Failed { message, .. } if message == "permission denied"
        ));
    }

    #[tokio::test]
    async fn test_stream_rejects_option_like_id() {
        let backend = DockerBackend::new("local".to_string(), 8);
        let (_handle, signal) = super::super::cancellation();
        let mut rx = backend
            .stream_logs(&LogRequest::new("--help", "local", 10), signal)
            .await;
        assert!(matches!(rx.recv().await, Some(LogEvent::Error(SourceError::InvalidContainer(_)))));
    }
}
