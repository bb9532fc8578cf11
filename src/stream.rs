//! Raw log buffer lifecycle: snapshot fetches, the cancellable live stream
//! and pause buffering.
//!
//! All state lives on the UI task. Fetches and stream consumers run as
//! spawned tasks that report back through a channel; every report carries
//! the ticket of the request that produced it, and reports for superseded
//! tickets are dropped.

use std::ops::Range;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::entry::LogEntry;
use crate::sources::{
    CancelHandle, CancelSignal, LogBackend, LogEvent, LogRequest, SourceError, cancellation,
};

/// How long freshly appended rows stay highlighted
pub const HIGHLIGHT_DURATION: Duration = Duration::from_millis(260);
/// Delay before scrolling to the bottom after a snapshot or an append
pub const SCROLL_DEBOUNCE: Duration = Duration::from_millis(100);
/// Delay before scrolling to the bottom after a resume flush
pub const RESUME_SCROLL_DEBOUNCE: Duration = Duration::from_millis(40);

/// Entries of the open container in arrival order.
///
/// The generation changes whenever the contents are replaced wholesale, so
/// derived views can tell an append from a swap.
#[derive(Clone, Debug, Default)]
pub struct RawBuffer {
    generation: u64,
    entries: Vec<LogEntry>,
}

impl RawBuffer {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    pub fn get(&self, index: usize) -> Option<&LogEntry> {
        self.entries.get(index)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn replace(&mut self, entries: Vec<LogEntry>) {
        self.generation += 1;
        self.entries = entries;
    }

    /// Append in order and return the index range the entries landed in
    pub(crate) fn extend(&mut self, entries: impl IntoIterator<Item = LogEntry>) -> Range<usize> {
        let start = self.entries.len();
        self.entries.extend(entries);
        start..self.entries.len()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StreamState {
    Idle,
    /// A snapshot fetch is in flight
    Loading,
    Streaming,
    /// Streaming, but new entries go to the side buffer
    Paused,
}

/// Reports from spawned fetch and stream tasks
#[derive(Debug)]
pub enum ControllerEvent {
    Snapshot {
        ticket: u64,
        result: Result<Vec<LogEntry>, SourceError>,
    },
    Stream {
        ticket: u64,
        event: SessionEvent,
    },
}

#[derive(Debug)]
pub enum SessionEvent {
    Entry(LogEntry),
    Failed(SourceError),
    Ended,
}

/// What applying a `ControllerEvent` changed
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Update {
    /// Stale or silently ignored event
    None,
    /// The buffer was replaced by a snapshot
    Replaced,
    /// Entries were appended at this range
    Appended(Range<usize>),
    /// An entry was parked while paused; carries the buffered count
    Buffered(usize),
    /// Snapshot failed; the buffer is now empty
    FetchFailed(String),
    /// The stream failed; the buffer keeps what was received
    StreamFailed(String),
    /// The producer finished on its own
    StreamEnded,
}

struct Session {
    ticket: u64,
    cancel: CancelHandle,
    task: JoinHandle<()>,
}

/// Owns the raw buffer of one log view and the single live stream feeding it
pub struct LogStreamController {
    backend: Arc<dyn LogBackend>,
    events: mpsc::UnboundedSender<ControllerEvent>,
    request: Option<LogRequest>,
    state: StreamState,
    buffer: RawBuffer,
    paused: Vec<LogEntry>,
    awaiting_first: bool,
    highlight: Option<(Range<usize>, Instant)>,
    scroll_due: Option<Instant>,
    next_ticket: u64,
    snapshot_ticket: Option<u64>,
    session: Option<Session>,
    /// Consumer tasks that were cancelled but may not have exited yet
    retiring: Vec<JoinHandle<()>>,
}

impl LogStreamController {
    pub fn new(backend: Arc<dyn LogBackend>, events: mpsc::UnboundedSender<ControllerEvent>) -> Self {
        Self {
            backend,
            events,
            request: None,
            state: StreamState::Idle,
            buffer: RawBuffer::default(),
            paused: Vec::new(),
            awaiting_first: false,
            highlight: None,
            scroll_due: None,
            next_ticket: 0,
            snapshot_ticket: None,
            session: None,
            retiring: Vec::new(),
        }
    }

    pub fn backend(&self) -> &Arc<dyn LogBackend> {
        &self.backend
    }

    pub fn request(&self) -> Option<&LogRequest> {
        self.request.as_ref()
    }

    pub fn state(&self) -> StreamState {
        self.state
    }

    pub fn buffer(&self) -> &RawBuffer {
        &self.buffer
    }

    pub fn is_streaming(&self) -> bool {
        matches!(self.state, StreamState::Streaming | StreamState::Paused)
    }

    pub fn is_paused(&self) -> bool {
        self.state == StreamState::Paused
    }

    /// True while a snapshot is loading or a new stream has not delivered
    /// its first entry
    pub fn is_loading(&self) -> bool {
        self.state == StreamState::Loading || self.awaiting_first
    }

    pub fn buffered_count(&self) -> usize {
        self.paused.len()
    }

    /// Point the view at another container, host or tail size. Stops any
    /// stream and empties the buffer; the caller decides what to load next.
    pub fn open(&mut self, request: LogRequest) {
        info!(container = %request.container_id, host = %request.host, "opening log view");
        self.stop();
        self.snapshot_ticket = None;
        self.state = StreamState::Idle;
        self.buffer.replace(Vec::new());
        self.highlight = None;
        self.scroll_due = None;
        self.request = Some(request);
    }

    pub fn set_tail(&mut self, tail: usize) {
        if let Some(request) = &mut self.request {
            request.tail = tail.max(1);
        }
    }

    /// Start a one-shot fetch of the most recent lines. Supersedes any
    /// earlier fetch and stops a running stream.
    pub fn fetch_snapshot(&mut self) -> bool {
        let Some(request) = self.request.clone() else {
            return false;
        };
        self.stop();

        let ticket = self.take_ticket();
        self.snapshot_ticket = Some(ticket);
        self.state = StreamState::Loading;
        debug!(ticket, container = %request.container_id, tail = request.tail, "fetching snapshot");

        let backend = Arc::clone(&self.backend);
        let events = self.events.clone();
        tokio::spawn(async move {
            let result = backend.get_logs(&request).await;
            let _ = events.send(ControllerEvent::Snapshot { ticket, result });
        });
        true
    }

    /// Replace any running stream with a fresh one.
    ///
    /// The previous consumer is cancelled and awaited before the new one
    /// starts, so two sessions never feed the buffer at once.
    pub async fn start_stream(&mut self) -> bool {
        let Some(request) = self.request.clone() else {
            return false;
        };
        self.stop();
        for task in self.retiring.drain(..) {
            let _ = task.await;
        }

        self.snapshot_ticket = None;
        self.buffer.replace(Vec::new());
        self.highlight = None;
        self.state = StreamState::Streaming;
        self.awaiting_first = true;

        let ticket = self.take_ticket();
        let (cancel, signal) = cancellation();
        let task = tokio::spawn(consume(
            Arc::clone(&self.backend),
            request.clone(),
            ticket,
            signal,
            self.events.clone(),
        ));
        self.session = Some(Session { ticket, cancel, task });
        info!(ticket, container = %request.container_id, tail = request.tail, "stream started");
        true
    }

    /// Cancel the live stream, if any, and drop paused entries
    pub fn stop(&mut self) {
        if let Some(session) = self.session.take() {
            debug!(ticket = session.ticket, "cancelling stream");
            session.cancel.cancel();
            self.retiring.push(session.task);
        }
        self.retiring.retain(|task| !task.is_finished());
        self.paused.clear();
        self.awaiting_first = false;
        self.state = if self.snapshot_ticket.is_some() {
            StreamState::Loading
        } else {
            StreamState::Idle
        };
    }

    /// Tear the view down: stop streaming, wait for the consumer to exit and
    /// release the buffer
    pub async fn close(&mut self) {
        self.stop();
        self.snapshot_ticket = None;
        self.state = StreamState::Idle;
        for task in self.retiring.drain(..) {
            let _ = task.await;
        }
        self.buffer.replace(Vec::new());
        self.request = None;
    }

    pub fn pause(&mut self) -> bool {
        if self.state != StreamState::Streaming {
            return false;
        }
        self.state = StreamState::Paused;
        debug!("stream paused");
        true
    }

    /// Flush paused entries into the buffer as one append. Returns the range
    /// they landed in, if there were any.
    pub fn resume(&mut self) -> Option<Range<usize>> {
        if self.state != StreamState::Paused {
            return None;
        }
        self.state = StreamState::Streaming;
        let buffered = std::mem::take(&mut self.paused);
        debug!(count = buffered.len(), "stream resumed");
        if buffered.is_empty() {
            return None;
        }
        let range = self.buffer.extend(buffered);
        let now = Instant::now();
        self.highlight = Some((range.clone(), now + HIGHLIGHT_DURATION));
        self.scroll_due = Some(now + RESUME_SCROLL_DEBOUNCE);
        Some(range)
    }

    /// Apply a report from a spawned task
    pub fn handle(&mut self, event: ControllerEvent, now: Instant) -> Update {
        match event {
            ControllerEvent::Snapshot { ticket, result } => {
                if self.snapshot_ticket != Some(ticket) {
                    debug!(ticket, "dropping superseded snapshot");
                    return Update::None;
                }
                self.snapshot_ticket = None;
                if self.state == StreamState::Loading {
                    self.state = StreamState::Idle;
                }
                match result {
                    Ok(entries) => {
                        debug!(ticket, count = entries.len(), "snapshot loaded");
                        self.buffer.replace(entries);
                        self.scroll_due = Some(now + SCROLL_DEBOUNCE);
                        Update::Replaced
                    }
                    Err(err) => {
                        warn!(ticket, error = %err, "snapshot fetch failed");
                        self.buffer.replace(Vec::new());
                        Update::FetchFailed(err.to_string())
                    }
                }
            }
            ControllerEvent::Stream { ticket, event } => {
                if self.session.as_ref().map(|s| s.ticket) != Some(ticket) {
                    return Update::None;
                }
                match event {
                    SessionEvent::Entry(entry) => {
                        self.awaiting_first = false;
                        if self.state == StreamState::Paused {
                            self.paused.push(entry);
                            return Update::Buffered(self.paused.len());
                        }
                        let range = self.buffer.extend([entry]);
                        self.highlight = Some((range.clone(), now + HIGHLIGHT_DURATION));
                        self.scroll_due = Some(now + SCROLL_DEBOUNCE);
                        Update::Appended(range)
                    }
                    SessionEvent::Failed(err) if err.is_cancellation() => {
                        self.finish_session();
                        Update::None
                    }
                    SessionEvent::Failed(err) => {
                        warn!(ticket, error = %err, "stream failed");
                        self.finish_session();
                        Update::StreamFailed(err.to_string())
                    }
                    SessionEvent::Ended => {
                        info!(ticket, "stream ended");
                        self.finish_session();
                        Update::StreamEnded
                    }
                }
            }
        }
    }

    /// Rows appended recently enough to still be highlighted
    pub fn highlight(&self, now: Instant) -> Option<Range<usize>> {
        match &self.highlight {
            Some((range, until)) if now < *until => Some(range.clone()),
            _ => None,
        }
    }

    /// True once per scheduled scroll-to-bottom, after its debounce elapsed
    pub fn take_scroll_due(&mut self, now: Instant) -> bool {
        match self.scroll_due {
            Some(due) if now >= due => {
                self.scroll_due = None;
                true
            }
            _ => false,
        }
    }

    fn finish_session(&mut self) {
        if let Some(session) = self.session.take() {
            self.retiring.push(session.task);
        }
        self.paused.clear();
        self.awaiting_first = false;
        self.state = StreamState::Idle;
    }

    fn take_ticket(&mut self) -> u64 {
        self.next_ticket += 1;
        self.next_ticket
    }
}

/// Forward one live stream to the controller until it is cancelled or ends
async fn consume(
    backend: Arc<dyn LogBackend>,
    request: LogRequest,
    ticket: u64,
    cancel: CancelSignal,
    events: mpsc::UnboundedSender<ControllerEvent>,
) {
    let mut rx = backend.stream_logs(&request, cancel.clone()).await;
    loop {
        let received = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            received = rx.recv() => received,
        };
        if cancel.is_cancelled() {
            break;
        }
        let event = match received {
            Some(LogEvent::Line(entry)) => SessionEvent::Entry(entry),
            Some(LogEvent::Error(err)) => SessionEvent::Failed(err),
            Some(LogEvent::EndOfStream) | None => SessionEvent::Ended,
        };
        let last = !matches!(event, SessionEvent::Entry(_));
        if events.send(ControllerEvent::Stream { ticket, event }).is_err() || last {
            break;
        }
    }
    debug!(ticket, "stream consumer exited");
}
