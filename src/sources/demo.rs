//! In-memory containers with seeded history and a slow synthetic stream,
//! for trying the viewer without a Docker daemon.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Duration as ChronoDuration, SecondsFormat, Utc};
use rand::prelude::*;
use rand_pcg::Pcg64;
use serde_json::json;
use tokio::sync::mpsc;

use super::{CancelSignal, LogBackend, LogEvent, LogRequest, SourceError};
use crate::discovery::ContainerInfo;
use crate::entry::{LogEntry, LogLevel, StreamKind};

/// History kept per container
pub const HISTORY_LIMIT: usize = 1800;
const SEED_LINES: usize = 140;
const SEED_SPACING_SECS: i64 = 15;
const MIN_INTERVAL_MS: u64 = 700;
const MAX_INTERVAL_MS: u64 = 1350;
const LIVE_LEVELS: [LogLevel; 6] = [
    LogLevel::Info,
    LogLevel::Info,
    LogLevel::Info,
    LogLevel::Warn,
    LogLevel::Debug,
    LogLevel::Error,
];

struct DemoState {
    containers: Vec<ContainerInfo>,
    logs: HashMap<String, Vec<LogEntry>>,
}

pub struct DemoBackend {
    state: Arc<Mutex<DemoState>>,
    interval: Duration,
    seed: u64,
}

impl DemoBackend {
    pub fn new() -> Self {
        Self::with_containers(seed_containers(Utc::now()), Utc::now())
    }

    fn with_containers(containers: Vec<ContainerInfo>, now: DateTime<Utc>) -> Self {
        let logs = containers
            .iter()
            .enumerate()
            .map(|(idx, container)| (container.id.clone(), seed_history(container, idx, now)))
            .collect();
        Self {
            state: Arc::new(Mutex::new(DemoState { containers, logs })),
            interval: Duration::from_millis(MIN_INTERVAL_MS),
            seed: now.timestamp_micros() as u64,
        }
    }

    /// Shorten the base interval between live lines
    #[cfg(test)]
    fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    fn tail_of(&self, container_id: &str, tail: usize) -> Option<Vec<LogEntry>> {
        let state = self.state.lock().ok()?;
        let logs = state.logs.get(container_id)?;
        let skip = logs.len().saturating_sub(tail);
        Some(logs[skip..].to_vec())
    }
}

impl Default for DemoBackend {
    fn default() -> Self {
        Self::new()
    }
}

fn seed_containers(now: DateTime<Utc>) -> Vec<ContainerInfo> {
    let seeds: [(&str, &str, &str, &str, &str, i64); 5] = [
        ("logdeck-api-1", "ghcr.io/logdeck/api:0.14.2", "running", "Up 36 hours", "logdeck", 36),
        ("logdeck-ui-1", "ghcr.io/logdeck/ui:0.14.2", "running", "Up 32 hours", "logdeck", 32),
        ("postgres-main", "postgres:16-alpine", "running", "Up 4 days", "platform", 96),
        ("redis-cache", "redis:7-alpine", "running", "Up 4 days", "platform", 96),
        ("nightly-backup", "alpine:3.20", "exited", "Exited (1) 3 hours ago", "ops", 27),
    ];
    seeds.iter()
        .enumerate()
        .map(|(idx, (name, image, state, status, project, hours))| ContainerInfo {
            id: format!("c7f4f9b13c2111a5f47dba1a{:05}", idx + 1),
            names: vec![format!("/{}", name)],
            image: image.to_string(),
            state: state.to_string(),
            status: status.to_string(),
            created: Some(now - ChronoDuration::hours(*hours)),
            labels: BTreeMap::from([(
                "com.docker.compose.project".to_string(),
                project.to_string(),
            )]),
            host: "demo".to_string(),
        })
        .collect()
}

fn seed_history(container: &ContainerInfo, idx: usize, now: DateTime<Utc>) -> Vec<LogEntry> {
    let base = if container.is_running() {
        LogLevel::Info
    } else {
        LogLevel::Warn
    };
    let name = container.display_name();
    (0..SEED_LINES)
        .map(|i| {
            let at = now - ChronoDuration::seconds((SEED_LINES - i) as i64 * SEED_SPACING_SECS);
            let level = if i % 37 == 0 {
                LogLevel::Error
            } else if i % 11 == 0 {
                LogLevel::Warn
            } else {
                base
            };
            let message = if i % 19 == 0 {
                json!({
                    "traceId": format!("trace-{}-{}", idx, i),
                    "route": "/api/v1/containers",
                    "latencyMs": 12 + (i * 7) % 190,
                    "status": if level == LogLevel::Error { 500 } else { 200 },
                })
                .to_string()
            } else {
                format!("container={} level={} event={} host={}", name, level, i, container.host)
            };
            let stream = if i % 9 == 0 {
                StreamKind::Stderr
            } else {
                StreamKind::Stdout
            };
            demo_entry(at, level, message, stream)
        })
        .collect()
}

fn live_entry(name: &str, rng: &mut Pcg64, now: DateTime<Utc>) -> LogEntry {
    let level = LIVE_LEVELS.choose(rng).copied().unwrap_or(LogLevel::Info);
    let message = if rng.random_bool(0.22) {
        json!({
            "source": name,
            "level": level.as_str(),
            "latencyMs": rng.random_range(10..260),
            "queueDepth": rng.random_range(0..300),
        })
        .to_string()
    } else {
        format!(
            "{} {} heartbeat ok req={}",
            name,
            level.as_str().to_lowercase(),
            rng.random_range(0..20000)
        )
    };
    let stream = if rng.random_bool(0.14) {
        StreamKind::Stderr
    } else {
        StreamKind::Stdout
    };
    demo_entry(now, level, message, stream)
}

/// Delay before the next live line, scaled so the default interval gives
/// 700 to 1350 ms
fn next_delay(interval: Duration, rng: &mut Pcg64) -> Duration {
    let base = interval.as_millis() as u64;
    let max = base * MAX_INTERVAL_MS / MIN_INTERVAL_MS;
    Duration::from_millis(rng.random_range(base..=max))
}

fn push_bounded(logs: &mut Vec<LogEntry>, entry: LogEntry) {
    logs.push(entry);
    if logs.len() > HISTORY_LIMIT {
        let excess = logs.len() - HISTORY_LIMIT;
        logs.drain(..excess);
    }
}

fn demo_entry(at: DateTime<Utc>, level: LogLevel, message: String, stream: StreamKind) -> LogEntry {
    LogEntry {
        timestamp: Some(at.to_rfc3339_opts(SecondsFormat::Millis, true)),
        level: Some(level),
        raw: message.clone(),
        message,
        stream,
    }
}

#[async_trait::async_trait]
impl LogBackend for DemoBackend {
    async fn get_logs(&self, request: &LogRequest) -> Result<Vec<LogEntry>, SourceError> {
        Ok(self
            .tail_of(&request.container_id, request.tail)
            .unwrap_or_default())
    }

    async fn stream_logs(&self, request: &LogRequest, cancel: CancelSignal) -> mpsc::Receiver<LogEvent> {
        let (tx, rx) = mpsc::channel(request.tail.max(1) + 16);
        let state = Arc::clone(&self.state);
        let container_id = request.container_id.clone();
        let backlog = self.tail_of(&container_id, request.tail);
        let interval = self.interval;
        let mut rng = Pcg64::seed_from_u64(self.seed ^ container_id.len() as u64);

        tokio::spawn(async move {
            // Unknown containers end immediately, like a removed container
            let Some(backlog) = backlog else {
                let _ = tx.send(LogEvent::EndOfStream).await;
                return;
            };
            for entry in backlog {
                if tx.send(LogEvent::Line(entry)).await.is_err() {
                    return;
                }
            }

            loop {
                let delay = next_delay(interval, &mut rng);
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(delay) => {}
                }

                let entry = {
                    let Ok(mut state) = state.lock() else { break };
                    let Some(name) = state
                        .containers
                        .iter()
                        .find(|c| c.id == container_id)
                        .map(|c| c.display_name())
                    else {
                        break;
                    };
                    let entry = live_entry(&name, &mut rng, Utc::now());
                    let logs = state.logs.entry(container_id.clone()).or_default();
                    push_bounded(logs, entry.clone());
                    entry
                };

                if tx.send(LogEvent::Line(entry)).await.is_err() {
                    break;
                }
            }
        });

        rx
    }

    async fn list_containers(&self) -> anyhow::Result<Vec<ContainerInfo>> {
        let state = self
            .state
            .lock()
            .map_err(|_| anyhow::anyhow!("demo state poisoned"))?;
        Ok(state.containers.clone())
    }

    fn name(&self) -> String {
        "demo".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::cancellation;

    fn backend() -> DemoBackend {
        DemoBackend::new().with_interval(Duration::from_millis(1))
    }

    async fn first_id(backend: &DemoBackend) -> String {
        backend.list_containers().await.unwrap()[0].id.clone()
    }

    #[tokio::test]
    async fn test_snapshot_is_tail_of_history() {
        let backend = backend();
        let id = first_id(&backend).await;
        let logs = backend.get_logs(&LogRequest::new(&id, "demo", 25)).await.unwrap();
        assert_eq!(logs.len(), 25);
        assert!(logs.iter().all(|e| e.level.is_some() && e.timestamp.is_some()));

        let all = backend.get_logs(&LogRequest::new(&id, "demo", 10_000)).await.unwrap();
        assert_eq!(all.len(), SEED_LINES);
        assert_eq!(all[SEED_LINES - 25..], logs[..]);
    }

    #[tokio::test]
    async fn test_seed_contains_json_and_stderr_lines() {
        let backend = backend();
        let id = first_id(&backend).await;
        let logs = backend.get_logs(&LogRequest::new(&id, "demo", 10_000)).await.unwrap();
        assert!(logs[0].message.starts_with('{'));
        assert_eq!(logs[0].stream, StreamKind::Stderr);
        assert_eq!(logs[0].level, Some(LogLevel::Error));
        assert!(logs[1].message.starts_with("container=logdeck-api-1"));
    }

    #[tokio::test]
    async fn test_unknown_container_is_empty() {
        let backend = backend();
        let logs = backend.get_logs(&LogRequest::new("nope", "demo", 10)).await.unwrap();
        assert!(logs.is_empty());

        let (_handle, signal) = cancellation();
        let mut rx = backend.stream_logs(&LogRequest::new("nope", "demo", 10), signal).await;
        assert!(matches!(rx.recv().await, Some(LogEvent::EndOfStream)));
    }

    #[tokio::test]
    async fn test_stream_replays_tail_then_goes_live() {
        let backend = backend();
        let id = first_id(&backend).await;
        let (handle, signal) = cancellation();
        let mut rx = backend.stream_logs(&LogRequest::new(&id, "demo", 3), signal).await;

        for _ in 0..5 {
            assert!(matches!(rx.recv().await, Some(LogEvent::Line(_))));
        }
        let history = backend.get_logs(&LogRequest::new(&id, "demo", 10_000)).await.unwrap();
        assert!(history.len() >= SEED_LINES + 2);

        handle.cancel();
        // Drains whatever was in flight, then closes
        while rx.recv().await.is_some() {}
    }

    #[test]
    fn test_history_is_bounded() {
        let mut rng = Pcg64::seed_from_u64(7);
        let mut logs = Vec::new();
        for _ in 0..HISTORY_LIMIT + 5 {
            push_bounded(&mut logs, live_entry("web", &mut rng, Utc::now()));
        }
        let last = live_entry("web", &mut rng, Utc::now());
        push_bounded(&mut logs, last.clone());
        assert_eq!(logs.len(), HISTORY_LIMIT);
        assert_eq!(logs.last(), Some(&last));
    }

    #[test]
    fn test_live_entry_shape() {
        let mut rng = Pcg64::seed_from_u64(42);
        let entries: Vec<_> = (0..200).map(|_| live_entry("web", &mut rng, Utc::now())).collect();
        for entry in &entries {
            assert_eq!(entry.message, entry.raw);
            assert!(entry.message.starts_with('{') || entry.message.starts_with("web "));
            assert!(LIVE_LEVELS.contains(&entry.level.unwrap()));
        }
        assert!(entries.iter().any(|e| e.message.starts_with('{')));
        assert!(entries.iter().any(|e| e.stream == StreamKind::Stderr));
        assert!(entries.iter().any(|e| e.stream == StreamKind::Stdout));
    }

    #[test]
    fn test_delay_stays_in_range() {
        let mut rng = Pcg64::seed_from_u64(3);
        for _ in 0..100 {
            let delay = next_delay(Duration::from_millis(MIN_INTERVAL_MS), &mut rng);
            assert!(delay >= Duration::from_millis(MIN_INTERVAL_MS));
            assert!(delay <= Duration::from_millis(MAX_INTERVAL_MS));
        }
        let fast = next_delay(Duration::from_millis(1), &mut rng);
        assert!(fast <= Duration::from_millis(1));
    }
}
