use std::collections::HashMap;
use std::ops::Range;
use std::time::Instant;

use ratatui::{
    Frame,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, List, ListItem, Paragraph, Scrollbar, ScrollbarOrientation, ScrollbarState},
};

use crate::app::{AppState, FocusedPanel, InputMode, NoticeKind};
use crate::entry::{LogEntry, StreamKind};
use crate::stream::StreamState;
use crate::viewport::VisibleRow;

const SIDE_PANEL_WIDTH: u16 = 28;
/// Width of the level badge, fits `WARNING` and `UNKNOWN`
const LEVEL_WIDTH: usize = 7;

/// Draw the entire UI
pub fn draw(frame: &mut Frame, state: &mut AppState) {
    // Main layout: optional side panel + main content
    let main_chunks = if state.show_side_panel {
        Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Length(SIDE_PANEL_WIDTH), Constraint::Min(20)])
            .split(frame.area())
    } else {
        Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Min(20)])
            .split(frame.area())
    };

    if state.show_side_panel {
        draw_containers_panel(frame, state, main_chunks[0]);
    }

    let content_area = if state.show_side_panel { main_chunks[1] } else { main_chunks[0] };

    let content_chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(1), // Header
            Constraint::Length(1), // Level filter bar
            Constraint::Min(3),    // Log view
            Constraint::Length(1), // Status bar
            Constraint::Length(1), // Search bar
        ])
        .split(content_area);

    draw_header(frame, state, content_chunks[0]);
    draw_level_bar(frame, state, content_chunks[1]);
    draw_log_view(frame, state, content_chunks[2]);
    draw_status_bar(frame, state, content_chunks[3]);
    draw_search_bar(frame, state, content_chunks[4]);

    if state.show_info {
        draw_info_overlay(frame, state);
    }
    if state.show_help {
        draw_help_overlay(frame, state);
    }
}

fn draw_containers_panel(frame: &mut Frame, state: &AppState, area: Rect) {
    let theme = &state.theme;
    let focused = state.focused_panel == FocusedPanel::Containers;
    let block = Block::default()
        .title(" Containers ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(if focused { theme.border_focused } else { theme.border_unfocused }));

    if state.containers.is_empty() {
        let msg = Paragraph::new("  (none)")
            .style(Style::default().fg(theme.empty_state))
            .block(block);
        frame.render_widget(msg, area);
        return;
    }

    let current_id = state.current.as_ref().map(|c| c.id.as_str());
    let items: Vec<ListItem> = state
        .containers
        .iter()
        .enumerate()
        .map(|(i, container)| {
            let prefix = if focused && i == state.container_cursor { "▶ " } else { "  " };
            let mut style = if Some(container.id.as_str()) == current_id {
                Style::default().fg(theme.container_current)
            } else if !container.is_running() {
                Style::default().fg(theme.container_stopped)
            } else {
                Style::default()
            };
            if focused && i == state.container_cursor {
                style = style.add_modifier(Modifier::BOLD);
            }
            ListItem::new(format!("{}{}", prefix, container.display_name())).style(style)
        })
        .collect();

    frame.render_widget(List::new(items).block(block), area);
}

/// Draw the header showing the open container
fn draw_header(frame: &mut Frame, state: &AppState, area: Rect) {
    let theme = &state.theme;
    let mut spans = vec![
        Span::styled(" logdeck ", Style::default().fg(theme.header_title).add_modifier(Modifier::BOLD)),
        Span::raw("| "),
    ];
    match &state.current {
        Some(container) => {
            spans.push(Span::styled(container.display_name().to_string(), Style::default().fg(theme.header_source)));
            if !container.image.is_empty() {
                spans.push(Span::raw(format!(" ({})", container.image)));
            }
        }
        None => spans.push(Span::raw("no container")),
    }
    spans.push(Span::raw(format!(" | {}", state.controller.backend().name())));

    let header = Paragraph::new(Line::from(spans)).style(Style::default().bg(theme.header_bg));
    frame.render_widget(header, area);
}

/// Draw the level toggles, numbered like their keys
fn draw_level_bar(frame: &mut Frame, state: &AppState, area: Rect) {
    let theme = &state.theme;
    let levels = state.available_levels();
    let mut spans = vec![Span::styled(" levels ", Style::default().fg(theme.filter_prefix))];
    if levels.is_empty() {
        spans.push(Span::styled("-", Style::default().fg(theme.empty_state)));
    }
    for (slot, level) in levels.iter().enumerate().take(9) {
        let active = state.criteria().levels.contains(level);
        let mut style = Style::default().fg(theme.level_color(Some(*level)));
        if active {
            style = style.add_modifier(Modifier::REVERSED | Modifier::BOLD);
        }
        spans.push(Span::styled(format!("{}", slot + 1), Style::default().fg(theme.status_help)));
        spans.push(Span::styled(format!(" {} ", level), style));
        spans.push(Span::raw(" "));
    }
    if !state.criteria().levels.is_empty() {
        spans.push(Span::styled("0 all", Style::default().fg(theme.filter_selected)));
    }
    frame.render_widget(Paragraph::new(Line::from(spans)), area);
}

/// Draw the visible window of the filtered view
fn draw_log_view(frame: &mut Frame, state: &mut AppState, area: Rect) {
    let focused = state.focused_panel == FocusedPanel::LogView;
    let border_color = if focused && state.show_side_panel {
        state.theme.border_focused
    } else {
        state.theme.border_unfocused
    };
    let block = Block::default()
        .borders(if state.show_side_panel { Borders::LEFT } else { Borders::NONE })
        .border_style(Style::default().fg(border_color));

    let inner = block.inner(area);
    frame.render_widget(block, area);

    state.log_area = inner;
    state.viewport.set_height(inner.height as usize);
    let height = inner.height as usize;
    if height == 0 {
        return;
    }

    let rows = state.viewport.window();

    // Pretty JSON for expanded rows in the window
    let mut pretty: HashMap<usize, String> = HashMap::new();
    for row in &rows {
        let Some(original) = state.view().original_index(row.index) else {
            continue;
        };
        if !state.is_expanded(original) {
            continue;
        }
        if let Some(text) = state.buffer().get(original).map(|e| e.display_text().to_string()) {
            let json = state.json_cache.format(&text);
            if json.is_json {
                pretty.insert(row.index, json.formatted);
            }
        }
    }

    let state = &*state;
    let appended = state.controller.highlight(Instant::now());
    let skip = rows
        .first()
        .map(|r| state.viewport.offset().saturating_sub(r.start))
        .unwrap_or(0);

    let mut lines: Vec<Line<'static>> = Vec::with_capacity(height + skip);
    for row in &rows {
        let mut row_lines = render_row(
            state,
            row,
            pretty.get(&row.index).map(String::as_str),
            appended.as_ref(),
            inner.width as usize,
        );
        row_lines.resize(row.height, Line::default());
        lines.extend(row_lines);
    }
    let lines: Vec<Line<'static>> = lines.into_iter().skip(skip).take(height).collect();
    frame.render_widget(Paragraph::new(lines), inner);

    let total_lines = state.viewport.total_height();
    if total_lines > height {
        let scrollbar = Scrollbar::new(ScrollbarOrientation::VerticalRight)
            .begin_symbol(Some("▲"))
            .end_symbol(Some("▼"));
        let mut scrollbar_state = ScrollbarState::new(state.viewport.max_offset() + 1)
            .position(state.viewport.offset());
        frame.render_stateful_widget(scrollbar, area, &mut scrollbar_state);
    }

    let empty_message = if state.current.is_none() {
        Some("Select a container (Tab, j/k, Enter)")
    } else if state.controller.is_loading() && state.buffer().is_empty() {
        Some("Loading logs...")
    } else if state.buffer().is_empty() && state.controller.is_streaming() {
        Some("Waiting for log lines...")
    } else if state.buffer().is_empty() {
        Some("No logs")
    } else if state.view().is_empty() {
        Some("No lines match the current filters")
    } else {
        None
    };
    if let Some(message) = empty_message {
        let msg = Paragraph::new(message).style(Style::default().fg(state.theme.empty_state));
        frame.render_widget(msg, inner);
    }
}

/// Lines for one row: the entry line (and its wrap continuation), then any
/// pretty-printed JSON
fn render_row(
    state: &AppState,
    row: &VisibleRow,
    pretty: Option<&str>,
    appended: Option<&Range<usize>>,
    width: usize,
) -> Vec<Line<'static>> {
    let theme = &state.theme;
    let Some(original) = state.view().original_index(row.index) else {
        return Vec::new();
    };
    let Some(entry) = state.buffer().get(original) else {
        return Vec::new();
    };

    let base = if state.selection.is_selected(row.index) {
        Style::default().bg(theme.selection_bg)
    } else if appended.is_some_and(|r| r.contains(&original)) {
        Style::default().bg(theme.appended_bg)
    } else {
        Style::default()
    };

    let mut prefix = Vec::new();
    let pin = if state.pins.is_pinned(original) { "●" } else { " " };
    prefix.push(Span::styled(pin, base.fg(theme.pin)));
    if state.show_timestamps {
        prefix.push(Span::styled(format!("{} ", short_timestamp(entry)), base.fg(theme.timestamp)));
    }
    prefix.push(Span::styled(
        format!("{:<width$}", entry.level_label(), width = LEVEL_WIDTH),
        base.fg(theme.level_color(entry.level)).add_modifier(Modifier::BOLD),
    ));
    let stream_mark = if entry.stream == StreamKind::Stderr { "!" } else { " " };
    prefix.push(Span::styled(stream_mark, base.fg(theme.stderr)));
    prefix.push(Span::styled(" ", base));
    let prefix_width: usize = prefix.iter().map(|s| s.width()).sum();
    let indent = " ".repeat(prefix_width);

    let needle = state.criteria().search.to_lowercase();
    let hit_bg = if state.search().current_target() == Some(row.index) {
        theme.current_match_bg
    } else {
        theme.highlight_match_bg
    };
    let hit = Style::default().bg(hit_bg).fg(theme.highlight_match_fg);

    let text_lines = if pretty.is_some() { 1 } else { state.viewport.row_height() };
    let chunks = split_chars(entry.display_text(), width.saturating_sub(prefix_width).max(1), text_lines);

    let mut lines = Vec::with_capacity(row.height);
    for (i, chunk) in chunks.into_iter().enumerate() {
        let mut spans = if i == 0 {
            prefix.clone()
        } else {
            vec![Span::styled(indent.clone(), base)]
        };
        spans.extend(highlight_spans(chunk, &needle, base, hit));
        lines.push(Line::from(spans).style(base));
    }
    if let Some(pretty) = pretty {
        for json_line in pretty.lines() {
            lines.push(
                Line::from(vec![
                    Span::styled(indent.clone(), base),
                    Span::styled(json_line.to_string(), base.fg(theme.json)),
                ])
                .style(base),
            );
        }
    }
    lines
}

/// Time of day for the timestamp column, or the raw string if it does not parse
pub fn short_timestamp(entry: &LogEntry) -> String {
    match (entry.parsed_timestamp(), &entry.timestamp) {
        (Some(ts), _) => ts.format("%H:%M:%S%.3f").to_string(),
        (None, Some(raw)) => raw.clone(),
        (None, None) => " ".repeat(12),
    }
}

/// Cut `text` into at most `max_lines` pieces of `width` characters
pub fn split_chars(text: &str, width: usize, max_lines: usize) -> Vec<&str> {
    let mut chunks = Vec::new();
    let mut rest = text;
    while !rest.is_empty() && chunks.len() < max_lines {
        let end = rest
            .char_indices()
            .nth(width)
            .map(|(i, _)| i)
            .unwrap_or(rest.len());
        chunks.push(&rest[..end]);
        rest = &rest[end..];
    }
    if chunks.is_empty() {
        chunks.push("");
    }
    chunks
}

/// Split `text` into spans, styling case-insensitive occurrences of
/// `needle_lower` with `hit`
pub fn highlight_spans(text: &str, needle_lower: &str, base: Style, hit: Style) -> Vec<Span<'static>> {
    let plain = || vec![Span::styled(text.to_string(), base)];
    if needle_lower.is_empty() {
        return plain();
    }
    let lower = text.to_lowercase();
    // Byte offsets only line up when lowercasing kept the length
    if lower.len() != text.len() {
        return plain();
    }

    let mut spans = Vec::new();
    let mut last = 0;
    for (start, found) in lower.match_indices(needle_lower) {
        let end = start + found.len();
        if !text.is_char_boundary(start) || !text.is_char_boundary(end) {
            return plain();
        }
        if start > last {
            spans.push(Span::styled(text[last..start].to_string(), base));
        }
        spans.push(Span::styled(text[start..end].to_string(), hit));
        last = end;
    }
    if last < text.len() {
        spans.push(Span::styled(text[last..].to_string(), base));
    }
    spans
}

/// Draw the status bar
fn draw_status_bar(frame: &mut Frame, state: &AppState, area: Rect) {
    let theme = &state.theme;
    let mode_str = match state.mode {
        InputMode::Normal => "NORMAL",
        InputMode::SearchEditing => "SEARCH",
    };
    let stream_str = match state.controller.state() {
        StreamState::Idle => "snapshot".to_string(),
        StreamState::Loading => "loading".to_string(),
        StreamState::Streaming => "live".to_string(),
        StreamState::Paused => format!("paused +{}", state.controller.buffered_count()),
    };

    let mut indicators = Vec::new();
    if state.follow {
        indicators.push("[F]");
    }
    if state.wrap_text {
        indicators.push("[W]");
    }
    if state.show_timestamps {
        indicators.push("[T]");
    }
    if state.criteria().exclude_matches {
        indicators.push("[X]");
    }
    let indicators_str = if indicators.is_empty() {
        String::new()
    } else {
        format!(" {}", indicators.join(" "))
    };

    let matches = state.search().matches();
    let match_str = if state.criteria().search.is_empty() || state.criteria().exclude_matches {
        String::new()
    } else if matches.is_empty() {
        " | no matches".to_string()
    } else {
        format!(" | match {}/{}", state.search().current_match_index() + 1, matches.len())
    };
    let pins_str = if state.pins.is_empty() {
        String::new()
    } else {
        let hidden = state.pins.len() - state.pins.visible_in(state.view()).len();
        if hidden > 0 {
            format!(" | pins {} ({} hidden)", state.pins.len(), hidden)
        } else {
            format!(" | pins {}", state.pins.len())
        }
    };
    let selected_str = if state.selection.is_empty() {
        String::new()
    } else {
        format!(" | sel {}", state.selection.len())
    };

    let mut spans = vec![
        Span::styled(
            format!(" {} ", mode_str),
            Style::default().bg(theme.status_mode_bg).fg(theme.status_mode_fg),
        ),
        Span::raw(format!(
            " {} | tail {} | {}/{} lines{}{}{}{} ",
            stream_str,
            state.tail(),
            state.view().len(),
            state.buffer().len(),
            match_str,
            pins_str,
            selected_str,
            indicators_str,
        )),
    ];
    match &state.notice {
        Some(notice) => {
            let color = match notice.kind {
                NoticeKind::Info => theme.notice_info,
                NoticeKind::Success => theme.notice_success,
                NoticeKind::Error => theme.notice_error,
            };
            spans.push(Span::styled(notice.text.clone(), Style::default().fg(color)));
        }
        None => spans.push(Span::styled(" ?:help  s:stream  space:pause ", Style::default().fg(theme.status_help))),
    }

    let paragraph = Paragraph::new(Line::from(spans)).style(Style::default().bg(theme.status_bg));
    frame.render_widget(paragraph, area);
}

/// Draw the search input bar
fn draw_search_bar(frame: &mut Frame, state: &AppState, area: Rect) {
    let theme = &state.theme;
    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Length(1), // "/" prefix
            Constraint::Min(1),    // textarea
        ])
        .split(area);

    frame.render_widget(
        Paragraph::new("/").style(Style::default().fg(theme.filter_prefix)),
        chunks[0],
    );
    match state.mode {
        InputMode::SearchEditing => frame.render_widget(&state.search_textarea, chunks[1]),
        InputMode::Normal => {
            let search = &state.criteria().search;
            let content = if search.is_empty() {
                Line::from(Span::styled("press / to search", Style::default().fg(theme.empty_state)))
            } else {
                let mode = if state.criteria().exclude_matches { "  (excluding)" } else { "" };
                Line::from(vec![
                    Span::styled(search.clone(), Style::default().fg(theme.filter_selected)),
                    Span::styled(mode, Style::default().fg(theme.status_help)),
                ])
            };
            frame.render_widget(Paragraph::new(content), chunks[1]);
        }
    }
}

fn centered_rect(area: Rect, width: u16, height: u16) -> Rect {
    let width = width.min(area.width.saturating_sub(4));
    let height = height.min(area.height.saturating_sub(4));
    let x = area.x + (area.width - width) / 2;
    let y = area.y + (area.height - height) / 2;
    Rect::new(x, y, width, height)
}

fn overlay_block<'a>(title: &'a str, state: &AppState) -> Block<'a> {
    Block::default()
        .title(title)
        .borders(Borders::ALL)
        .border_style(Style::default().fg(state.theme.help_border))
        .style(Style::default().bg(state.theme.help_bg))
}

/// Draw metadata of the open container
fn draw_info_overlay(frame: &mut Frame, state: &AppState) {
    let Some(container) = &state.current else {
        return;
    };
    let field = |name: &str, value: &str| {
        Line::from(vec![
            Span::styled(format!("{:<9}", name), Style::default().add_modifier(Modifier::BOLD)),
            Span::raw(value.to_string()),
        ])
    };

    let created = container
        .created
        .map(|c| c.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_default();
    let mut text = vec![
        field("Name", &container.display_name()),
        field("ID", &container.id),
        field("Image", &container.image),
        field("State", &container.state),
        field("Status", &container.status),
        field("Created", &created),
        field("Host", &container.host),
    ];
    if !container.labels.is_empty() {
        text.push(Line::from(""));
        text.push(Line::from(Span::styled("Labels", Style::default().add_modifier(Modifier::BOLD))));
        for (key, value) in &container.labels {
            text.push(Line::from(format!("  {}={}", key, value)));
        }
    }

    let area = centered_rect(frame.area(), 70, text.len() as u16 + 2);
    frame.render_widget(Clear, area);
    frame.render_widget(Paragraph::new(text).block(overlay_block(" Container ", state)), area);
}

/// Draw the help overlay
fn draw_help_overlay(frame: &mut Frame, state: &AppState) {
    let help_area = centered_rect(frame.area(), 56, 35);
    frame.render_widget(Clear, help_area);

    let help_text = vec![
        Line::from(Span::styled("Keyboard Shortcuts", Style::default().add_modifier(Modifier::BOLD))),
        Line::from(""),
        Line::from("Lines:"),
        Line::from("  j/k, ↑/↓     Move selected line"),
        Line::from("  J/K, ⇧↑/⇧↓   Extend selection"),
        Line::from("  click        Toggle line (shift: range)"),
        Line::from("  Esc          Clear selection"),
        Line::from("  g/G          Go to top/bottom"),
        Line::from("  PgUp/PgDn    Page up/down"),
        Line::from(""),
        Line::from("Search and filters:"),
        Line::from("  /            Search"),
        Line::from("  n/N          Next/previous match"),
        Line::from("  x            Hide matching lines"),
        Line::from("  1-9, 0       Toggle level, clear levels"),
        Line::from(""),
        Line::from("Pins and copy:"),
        Line::from("  m            Pin/unpin selection"),
        Line::from("  p/P          Next/previous pin"),
        Line::from("  y/Y          Copy selection/line"),
        Line::from("  e/E          Export view as JSON/text"),
        Line::from(""),
        Line::from("Stream and display:"),
        Line::from("  s            Start/stop live stream"),
        Line::from("  space        Pause/resume stream"),
        Line::from("  r            Reload snapshot"),
        Line::from("  +/-          Load more/fewer lines"),
        Line::from("  f/w/t        Follow, wrap, timestamps"),
        Line::from("  o, Enter     Expand JSON line"),
        Line::from("  i            Container info"),
        Line::from("  b, Tab       Side panel, cycle focus"),
        Line::from("  ?            Toggle this help"),
        Line::from("  q            Quit"),
    ];

    let paragraph = Paragraph::new(help_text).block(overlay_block(" Help ", state));
    frame.render_widget(paragraph, help_area);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::sources::demo::DemoBackend;
    use ratatui::{Terminal, backend::TestBackend, style::Color};
    use std::sync::Arc;
    use tokio::sync::mpsc;

    fn screen(terminal: &Terminal<TestBackend>) -> String {
        terminal
            .backend()
            .buffer()
            .content()
            .iter()
            .map(|cell| cell.symbol())
            .collect()
    }

    #[test]
    fn test_highlight_is_case_insensitive() {
        let base = Style::default();
        let hit = Style::default().bg(Color::Yellow);
        let spans = highlight_spans("Error: error", "error", base, hit);
        let parts: Vec<(&str, Style)> = spans.iter().map(|s| (s.content.as_ref(), s.style)).collect();
        assert_eq!(parts, vec![("Error", hit), (": ", base), ("error", hit)]);

        assert_eq!(highlight_spans("plain", "", base, hit).len(), 1);
        assert_eq!(highlight_spans("plain", "zzz", base, hit).len(), 1);
    }

    #[test]
    fn test_split_chars() {
        assert_eq!(split_chars("abcdefg", 3, 2), vec!["abc", "def"]);
        assert_eq!(split_chars("ab", 3, 2), vec!["ab"]);
        assert_eq!(split_chars("", 3, 2), vec![""]);
        assert_eq!(split_chars("ééé", 2, 1), vec!["éé"]);
    }

    #[tokio::test]
    async fn test_draw_demo_container() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut state = AppState::new(&Config::default(), Arc::new(DemoBackend::new()), tx);
        state.load_containers().await;
        let first = state.containers[0].clone();
        state.open_container(first).await;
        let event = rx.recv().await.unwrap();
        state.handle_controller_event(event);

        let mut terminal = Terminal::new(TestBackend::new(120, 30)).unwrap();
        terminal.draw(|frame| draw(frame, &mut state)).unwrap();

        assert_eq!(state.log_area.height, 30 - 4);
        assert_eq!(state.viewport.height(), 26);
        let text = screen(&terminal);
        assert!(text.contains("Containers"));
        assert!(text.contains("logdeck-api-1"));
        assert!(text.contains("snapshot"));
    }

    #[test]
    fn test_draw_without_container() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut state = AppState::new(&Config::default(), Arc::new(DemoBackend::new()), tx);
        state.show_help = true;
        let mut terminal = Terminal::new(TestBackend::new(100, 40)).unwrap();
        terminal.draw(|frame| draw(frame, &mut state)).unwrap();

        let text = screen(&terminal);
        assert!(text.contains("Select a container"));
        assert!(text.contains("Keyboard Shortcuts"));
    }
}
