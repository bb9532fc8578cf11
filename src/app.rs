//! Viewer state: one open container log view and the shell around it.

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use ratatui::layout::Rect;
use ratatui::style::{Color, Style};
use tokio::sync::mpsc;
use tracing::{info, warn};
use tui_textarea::TextArea;

use crate::config::Config;
use crate::discovery::ContainerInfo;
use crate::entry::{LogEntry, LogLevel};
use crate::export::{self, ExportFormat};
use crate::filter::{FilterCriteria, FilteredView, LogFilterEngine, Refresh};
use crate::json_format::JsonFormatCache;
use crate::pins::{PinRegistry, PinTarget, PinToggle};
use crate::search::SearchNavigator;
use crate::selection::{SelectionModel, Step};
use crate::sources::{LogBackend, LogRequest};
use crate::stream::{ControllerEvent, LogStreamController, RawBuffer, Update};
use crate::theme::Theme;
use crate::viewport::{Align, Viewport, estimated_row_height};

/// Quiet period before typed search text is applied
pub const SEARCH_DEBOUNCE: Duration = Duration::from_millis(150);
/// Lines moved per mouse wheel notch
pub const WHEEL_STEP: isize = 3;
/// Line counts offered by `+`/`-`
pub const TAIL_STEPS: [usize; 7] = [50, 100, 250, 500, 1000, 2500, 5000];

/// Writes text to the system clipboard
pub type ClipboardWriter = Box<dyn FnMut(&str) -> anyhow::Result<()>>;

/// Input mode for the application
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InputMode {
    Normal,
    /// Typing into the search box
    SearchEditing,
}

/// Which panel has focus
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FocusedPanel {
    LogView,
    Containers,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NoticeKind {
    Info,
    Success,
    Error,
}

/// One-line message shown in the status area until replaced
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Notice {
    pub kind: NoticeKind,
    pub text: String,
}

/// Everything the user can ask the log view to do
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Command {
    Quit,
    ToggleHelp,
    ToggleInfo,
    ToggleSidePanel,
    CycleFocus,
    FocusSearch,
    /// Move the single-line selection
    Move(Step),
    /// Grow the selection from the anchor
    Extend(Step),
    /// Click on the `row`th visible line of the log view
    Click { row: usize, extend: bool },
    ClearSelection,
    NextMatch,
    PreviousMatch,
    TogglePin,
    NextPin,
    PreviousPin,
    CopySelection,
    CopyLine,
    ToggleExclude,
    /// Toggle the nth level of the level bar
    ToggleLevel(usize),
    ClearLevels,
    PauseResume,
    ToggleStream,
    Refresh,
    /// Load more or fewer recent lines
    MoreLines,
    FewerLines,
    ToggleFollow,
    ToggleWrap,
    ToggleTimestamps,
    ToggleJson,
    Export(ExportFormat),
    ScrollBy(isize),
    PageUp,
    PageDown,
    Top,
    Bottom,
    ContainerUp,
    ContainerDown,
    OpenContainer,
}

/// Main application state
pub struct AppState<'a> {
    pub controller: LogStreamController,
    filter: LogFilterEngine,
    criteria: FilterCriteria,
    search: SearchNavigator,
    pub selection: SelectionModel,
    pub pins: PinRegistry,
    pub json_cache: JsonFormatCache,
    pub viewport: Viewport,
    /// Original indices of rows showing pretty-printed JSON
    expanded: BTreeSet<usize>,
    /// Levels seen in the current buffer
    levels_seen: BTreeSet<LogLevel>,
    levels_scanned: usize,
    synced_generation: u64,

    /// Containers reported by the backend
    pub containers: Vec<ContainerInfo>,
    /// Highlighted entry in the container panel
    pub container_cursor: usize,
    /// Container whose logs are shown
    pub current: Option<ContainerInfo>,
    host: String,
    tail: usize,
    export_dir: PathBuf,
    /// Open containers with a live stream instead of a snapshot
    pub stream_on_open: bool,

    pub mode: InputMode,
    pub focused_panel: FocusedPanel,
    pub search_textarea: TextArea<'a>,
    search_last_change: Option<Instant>,
    search_before_edit: String,
    /// Inner area of the log view from the last frame, for mouse hits
    pub log_area: Rect,

    pub show_side_panel: bool,
    pub show_help: bool,
    pub show_info: bool,
    pub wrap_text: bool,
    pub show_timestamps: bool,
    /// Keep the newest line in view as entries arrive
    pub follow: bool,
    pub should_quit: bool,
    pub notice: Option<Notice>,
    pub theme: Theme,
    clipboard: ClipboardWriter,
}

fn search_textarea<'a>(text: &str) -> TextArea<'a> {
    let mut textarea = TextArea::new(vec![text.to_string()]);
    textarea.set_cursor_line_style(Style::default());
    textarea.set_placeholder_text("type to search...");
    textarea.set_placeholder_style(Style::default().fg(Color::DarkGray));
    textarea.move_cursor(tui_textarea::CursorMove::End);
    textarea
}

impl<'a> AppState<'a> {
    pub fn new(
        config: &Config,
        backend: Arc<dyn LogBackend>,
        events: mpsc::UnboundedSender<ControllerEvent>,
    ) -> Self {
        let mut viewport = Viewport::default();
        viewport.set_row_height(estimated_row_height(config.wrap_text));

        Self {
            controller: LogStreamController::new(backend, events),
            filter: LogFilterEngine::default(),
            criteria: FilterCriteria::default(),
            search: SearchNavigator::default(),
            selection: SelectionModel::default(),
            pins: PinRegistry::default(),
            json_cache: JsonFormatCache::default(),
            viewport,
            expanded: BTreeSet::new(),
            levels_seen: BTreeSet::new(),
            levels_scanned: 0,
            synced_generation: 0,
            containers: Vec::new(),
            container_cursor: 0,
            current: None,
            host: config.host.clone(),
            tail: config.tail,
            export_dir: config.export_dir.clone(),
            stream_on_open: false,
            mode: InputMode::Normal,
            focused_panel: FocusedPanel::LogView,
            search_textarea: search_textarea(""),
            search_last_change: None,
            search_before_edit: String::new(),
            log_area: Rect::default(),
            show_side_panel: true,
            show_help: false,
            show_info: false,
            wrap_text: config.wrap_text,
            show_timestamps: config.show_timestamps,
            follow: config.follow,
            should_quit: false,
            notice: None,
            theme: Theme::by_name(&config.theme),
            clipboard: Box::new(export::copy_to_clipboard),
        }
    }

    #[cfg(test)]
    pub fn with_clipboard(mut self, clipboard: ClipboardWriter) -> Self {
        self.clipboard = clipboard;
        self
    }

    pub fn view(&self) -> &FilteredView {
        self.filter.view()
    }

    pub fn buffer(&self) -> &RawBuffer {
        self.controller.buffer()
    }

    pub fn criteria(&self) -> &FilterCriteria {
        &self.criteria
    }

    pub fn search(&self) -> &SearchNavigator {
        &self.search
    }

    /// Levels present in the buffer, in filter bar order
    pub fn available_levels(&self) -> Vec<LogLevel> {
        self.levels_seen.iter().copied().collect()
    }

    pub fn tail(&self) -> usize {
        self.tail
    }

    pub fn is_expanded(&self, original: usize) -> bool {
        self.expanded.contains(&original)
    }

    pub fn notify(&mut self, kind: NoticeKind, text: impl Into<String>) {
        let text = text.into();
        match kind {
            NoticeKind::Error => warn!(notice = %text),
            _ => info!(notice = %text),
        }
        self.notice = Some(Notice { kind, text });
    }

    /// Bring every derived view up to date with the buffer and criteria
    fn sync(&mut self) {
        let generation = self.controller.buffer().generation();
        if generation != self.synced_generation {
            self.synced_generation = generation;
            self.levels_seen.clear();
            self.levels_scanned = 0;
            if !self.pins.is_empty() {
                let dropped = self.pins.len();
                self.pins.clear();
                self.notify(NoticeKind::Info, format!("Logs reloaded, {} pin(s) cleared", dropped));
            }
        }

        let buffer = self.controller.buffer();
        for entry in &buffer.entries()[self.levels_scanned.min(buffer.len())..] {
            if let Some(level) = entry.level {
                self.levels_seen.insert(level);
            }
        }
        self.levels_scanned = buffer.len();

        if self.filter.refresh(buffer, &self.criteria) == Refresh::Rebuilt {
            self.selection.clear();
            self.expanded.clear();
        }
        self.search
            .refresh(buffer, self.filter.view(), &self.criteria.search);
        self.viewport.set_count(self.filter.view().len());
        self.measure_expanded();
    }

    fn measure_expanded(&mut self) {
        let row_height = self.viewport.row_height();
        let mut measured = BTreeMap::new();
        for &original in &self.expanded {
            let Some(filtered) = self.filter.view().filtered_index(original) else {
                continue;
            };
            let Some(entry) = self.controller.buffer().get(original) else {
                continue;
            };
            let pretty = self.json_cache.format(entry.display_text());
            if pretty.is_json {
                measured.insert(filtered, row_height + pretty.formatted.lines().count());
            }
        }
        self.viewport.set_measured(measured);
    }

    /// Apply a report from a fetch or stream task
    pub fn handle_controller_event(&mut self, event: ControllerEvent) {
        let update = self.controller.handle(event, Instant::now());
        self.sync();
        match update {
            Update::FetchFailed(message) => {
                self.notify(NoticeKind::Error, format!("Failed to load logs: {}", message));
            }
            Update::StreamFailed(message) => {
                self.notify(NoticeKind::Error, format!("Log stream failed: {}", message));
            }
            Update::StreamEnded => {
                self.notify(NoticeKind::Info, "Log stream ended");
            }
            Update::None | Update::Replaced | Update::Appended(_) | Update::Buffered(_) => {}
        }
    }

    /// Periodic housekeeping: search debounce and deferred scrolling
    pub fn tick(&mut self, now: Instant) {
        if let Some(changed) = self.search_last_change {
            if now.duration_since(changed) >= SEARCH_DEBOUNCE {
                self.search_last_change = None;
                self.apply_search_text();
            }
        }
        if self.controller.take_scroll_due(now) && self.follow {
            self.viewport.scroll_to_bottom();
        }
    }

    /// Fetch the container list from the backend
    pub async fn load_containers(&mut self) {
        match self.controller.backend().list_containers().await {
            Ok(containers) => {
                info!(count = containers.len(), "containers loaded");
                self.containers = containers;
                self.container_cursor = self.container_cursor.min(self.containers.len().saturating_sub(1));
            }
            Err(err) => {
                self.notify(NoticeKind::Error, format!("Failed to list containers: {:#}", err));
            }
        }
    }

    /// Resolve a name or id prefix against the known containers
    pub fn find_container(&self, query: &str) -> Option<ContainerInfo> {
        let query = query.trim_start_matches('/');
        self.containers
            .iter()
            .find(|c| c.id == query || c.display_name() == query || c.names.iter().any(|n| n.trim_start_matches('/') == query))
            .or_else(|| self.containers.iter().find(|c| c.id.starts_with(query)))
            .cloned()
    }

    /// Show the logs of `container`, replacing whatever was open
    pub async fn open_container(&mut self, container: ContainerInfo) {
        let host = if container.host.is_empty() {
            self.host.clone()
        } else {
            container.host.clone()
        };
        let request = LogRequest::new(container.id.clone(), host, self.tail);

        self.controller.close().await;
        self.controller.open(request);
        self.selection.clear();
        self.pins.clear();
        self.search = SearchNavigator::default();
        self.expanded.clear();
        self.viewport.scroll_to_top();
        if let Some(pos) = self.containers.iter().position(|c| c.id == container.id) {
            self.container_cursor = pos;
        }
        info!(container = %container.display_name(), "container opened");
        self.current = Some(container);

        if self.stream_on_open {
            self.controller.start_stream().await;
        } else {
            self.controller.fetch_snapshot();
        }
        self.sync();
    }

    /// Close the open view and wait for its stream to stop
    pub async fn close(&mut self) {
        self.controller.close().await;
        self.current = None;
        self.sync();
    }

    pub async fn dispatch(&mut self, command: Command) {
        match command {
            Command::Quit => self.should_quit = true,
            Command::ToggleHelp => self.show_help = !self.show_help,
            Command::ToggleInfo => self.show_info = !self.show_info,
            Command::ToggleSidePanel => {
                self.show_side_panel = !self.show_side_panel;
                if !self.show_side_panel {
                    self.focused_panel = FocusedPanel::LogView;
                }
            }
            Command::CycleFocus => {
                if self.show_side_panel {
                    self.focused_panel = match self.focused_panel {
                        FocusedPanel::LogView => FocusedPanel::Containers,
                        FocusedPanel::Containers => FocusedPanel::LogView,
                    };
                }
            }
            Command::FocusSearch => self.begin_search(),
            Command::Move(step) => {
                if let Some(target) = self.selection.step(step, self.view().len()) {
                    self.follow = false;
                    self.viewport.scroll_to_index(target, Align::Auto);
                }
            }
            Command::Extend(step) => {
                if let Some(target) = self.selection.extend(step, self.view().len()) {
                    self.follow = false;
                    self.viewport.scroll_to_index(target, Align::Auto);
                }
            }
            Command::Click { row, extend } => {
                if let Some(index) = self.viewport.row_at(row) {
                    self.selection.click(index, extend);
                }
            }
            Command::ClearSelection => self.selection.clear(),
            Command::NextMatch => {
                let target = self.search.next();
                self.scroll_to_match(target);
            }
            Command::PreviousMatch => {
                let target = self.search.previous();
                self.scroll_to_match(target);
            }
            Command::TogglePin => self.toggle_pin(),
            Command::NextPin => self.navigate_pins(1),
            Command::PreviousPin => self.navigate_pins(-1),
            Command::CopySelection => self.copy_selection(),
            Command::CopyLine => self.copy_line(),
            Command::ToggleExclude => {
                self.criteria.exclude_matches = !self.criteria.exclude_matches;
                self.sync();
                self.notify(
                    NoticeKind::Info,
                    if self.criteria.exclude_matches {
                        "Hiding lines that match the search"
                    } else {
                        "Showing lines that match the search"
                    },
                );
            }
            Command::ToggleLevel(slot) => {
                if let Some(level) = self.available_levels().get(slot).copied() {
                    self.criteria.toggle_level(level);
                    self.sync();
                }
            }
            Command::ClearLevels => {
                if !self.criteria.levels.is_empty() {
                    self.criteria.levels.clear();
                    self.sync();
                }
            }
            Command::PauseResume => self.pause_resume(),
            Command::ToggleStream => self.toggle_stream().await,
            Command::Refresh => self.refresh(),
            Command::MoreLines => self.change_tail(true),
            Command::FewerLines => self.change_tail(false),
            Command::ToggleFollow => {
                self.follow = !self.follow;
                if self.follow {
                    self.viewport.scroll_to_bottom();
                }
            }
            Command::ToggleWrap => {
                self.wrap_text = !self.wrap_text;
                self.viewport.set_row_height(estimated_row_height(self.wrap_text));
                self.measure_expanded();
            }
            Command::ToggleTimestamps => self.show_timestamps = !self.show_timestamps,
            Command::ToggleJson => self.toggle_json(),
            Command::Export(format) => self.export(format),
            Command::ScrollBy(lines) => self.scroll_by(lines),
            Command::PageUp => self.scroll_by(-(self.viewport.height().max(1) as isize)),
            Command::PageDown => self.scroll_by(self.viewport.height().max(1) as isize),
            Command::Top => {
                self.follow = false;
                self.viewport.scroll_to_top();
            }
            Command::Bottom => {
                self.follow = true;
                self.viewport.scroll_to_bottom();
            }
            Command::ContainerUp => {
                self.container_cursor = self.container_cursor.saturating_sub(1);
            }
            Command::ContainerDown => {
                if self.container_cursor + 1 < self.containers.len() {
                    self.container_cursor += 1;
                }
            }
            Command::OpenContainer => {
                if let Some(container) = self.containers.get(self.container_cursor).cloned() {
                    self.open_container(container).await;
                    self.focused_panel = FocusedPanel::LogView;
                }
            }
        }
    }

    fn scroll_by(&mut self, lines: isize) {
        self.viewport.scroll_by(lines);
        self.follow = self.viewport.is_at_bottom() && lines > 0;
    }

    fn scroll_to_match(&mut self, target: Option<usize>) {
        if let Some(target) = target {
            self.follow = false;
            self.viewport.scroll_to_index(target, Align::Center);
        }
    }

    fn toggle_pin(&mut self) {
        let selected = self.selection.valid_indices(self.view().len());
        match self.pins.toggle_selected(selected, self.filter.view()) {
            Some(PinToggle::Pinned(n)) => self.notify(NoticeKind::Success, format!("Pinned {} line(s)", n)),
            Some(PinToggle::Unpinned(n)) => {
                self.notify(NoticeKind::Success, format!("Unpinned {} line(s)", n))
            }
            None => self.notify(NoticeKind::Info, "Select lines to pin"),
        }
    }

    fn navigate_pins(&mut self, offset: isize) {
        match self.pins.navigate(offset, self.filter.view()) {
            Some(PinTarget::Visible(filtered)) => {
                self.selection.select_only(filtered);
                self.follow = false;
                self.viewport.scroll_to_index(filtered, Align::Center);
            }
            Some(PinTarget::Hidden(_)) => {
                self.notify(NoticeKind::Info, "Pinned line is hidden by current filters");
            }
            None => self.notify(NoticeKind::Info, "No pinned lines"),
        }
    }

    fn copy_selection(&mut self) {
        let indices = self.selection.valid_indices(self.view().len());
        if indices.is_empty() {
            self.selection.clear();
            self.notify(NoticeKind::Info, "No lines selected");
            return;
        }
        let text = indices
            .iter()
            .filter_map(|&i| self.view().entry(self.buffer(), i))
            .map(export::text_line)
            .collect::<Vec<_>>()
            .join("\n");
        match (self.clipboard)(&text) {
            Ok(()) => self.notify(NoticeKind::Success, format!("Copied {} line(s)", indices.len())),
            Err(err) => self.notify(NoticeKind::Error, format!("{:#}", err)),
        }
    }

    fn copy_line(&mut self) {
        let Some(text) = self
            .selection
            .anchor()
            .and_then(|i| self.view().entry(self.buffer(), i))
            .map(|entry| entry.display_text().to_string())
        else {
            self.notify(NoticeKind::Info, "No line selected");
            return;
        };
        match (self.clipboard)(&text) {
            Ok(()) => self.notify(NoticeKind::Success, "Log entry copied to clipboard"),
            Err(err) => self.notify(NoticeKind::Error, format!("{:#}", err)),
        }
    }

    fn pause_resume(&mut self) {
        if self.controller.is_paused() {
            let added = self.controller.resume().map(|range| range.len()).unwrap_or(0);
            self.sync();
            self.notify(NoticeKind::Info, format!("Resumed, {} buffered line(s) added", added));
        } else if self.controller.pause() {
            self.notify(NoticeKind::Info, "Paused, new lines are buffered");
        } else {
            self.notify(NoticeKind::Info, "Not streaming");
        }
    }

    async fn toggle_stream(&mut self) {
        if self.current.is_none() {
            self.notify(NoticeKind::Info, "Open a container first");
            return;
        }
        self.selection.clear();
        self.pins.clear();
        if self.controller.is_streaming() {
            self.controller.stop();
            self.controller.fetch_snapshot();
            self.notify(NoticeKind::Info, "Streaming stopped");
        } else if self.controller.start_stream().await {
            self.notify(NoticeKind::Info, "Streaming live logs");
        }
        self.sync();
    }

    fn refresh(&mut self) {
        if self.controller.is_streaming() {
            self.notify(NoticeKind::Info, "Refresh is disabled while streaming");
            return;
        }
        self.selection.clear();
        self.pins.clear();
        if !self.controller.fetch_snapshot() {
            self.notify(NoticeKind::Info, "Open a container first");
        }
    }

    fn change_tail(&mut self, grow: bool) {
        if self.controller.is_streaming() {
            self.notify(NoticeKind::Info, "Line count is fixed while streaming");
            return;
        }
        let next = if grow {
            TAIL_STEPS.iter().copied().find(|&n| n > self.tail)
        } else {
            TAIL_STEPS.iter().rev().copied().find(|&n| n < self.tail)
        };
        let Some(tail) = next else {
            return;
        };
        self.tail = tail;
        self.controller.set_tail(tail);
        if self.current.is_some() {
            self.selection.clear();
            self.pins.clear();
            self.controller.fetch_snapshot();
        }
        self.notify(NoticeKind::Info, format!("Loading the last {} lines", tail));
    }

    fn toggle_json(&mut self) {
        let Some(anchor) = self.selection.anchor() else {
            self.notify(NoticeKind::Info, "No line selected");
            return;
        };
        let Some(original) = self.view().original_index(anchor) else {
            return;
        };
        let Some(text) = self.buffer().get(original).map(|e| e.display_text().to_string()) else {
            return;
        };
        if !self.json_cache.is_json(&text) {
            self.notify(NoticeKind::Info, "Line is not JSON");
            return;
        }
        if !self.expanded.remove(&original) {
            self.expanded.insert(original);
        }
        self.measure_expanded();
        self.viewport.scroll_to_index(anchor, Align::Auto);
    }

    fn export(&mut self, format: ExportFormat) {
        let entries: Vec<&LogEntry> = self.filter.view().entries(self.controller.buffer()).collect();
        let count = entries.len();
        let name = self.current.as_ref().and_then(|c| c.names.first()).map(String::as_str);
        let result = export::write_export(&self.export_dir, name, &entries, format, Utc::now());
        match result {
            Ok(path) => self.notify(
                NoticeKind::Success,
                format!("Exported {} line(s) to {}", count, path.display()),
            ),
            Err(err) => self.notify(NoticeKind::Error, format!("{:#}", err)),
        }
    }

    /// Get the current search box text
    pub fn search_input(&self) -> String {
        self.search_textarea.lines().join("")
    }

    pub fn begin_search(&mut self) {
        self.mode = InputMode::SearchEditing;
        self.focused_panel = FocusedPanel::LogView;
        self.search_before_edit = self.criteria.search.clone();
    }

    /// Mark that the search box changed (for debounce)
    pub fn search_changed(&mut self) {
        self.search_last_change = Some(Instant::now());
    }

    /// Apply the search box right away and leave editing
    pub fn confirm_search(&mut self) {
        self.search_last_change = None;
        self.apply_search_text();
        self.mode = InputMode::Normal;
    }

    /// Leave editing and restore the search from before it started
    pub fn cancel_search(&mut self) {
        let previous = std::mem::take(&mut self.search_before_edit);
        self.set_search(&previous);
        self.mode = InputMode::Normal;
    }

    /// Replace the search text and apply it
    pub fn set_search(&mut self, text: &str) {
        self.search_textarea = search_textarea(text);
        self.search_last_change = None;
        self.apply_search_text();
    }

    fn apply_search_text(&mut self) {
        let text = self.search_input();
        if text == self.criteria.search {
            return;
        }
        self.criteria.search = text;
        self.sync();
        let target = self.search.current_target();
        self.scroll_to_match(target);
    }
}
