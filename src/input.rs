use crossterm::event::{
    Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers, MouseButton, MouseEvent, MouseEventKind,
};
use tui_textarea::Input;

use crate::app::{AppState, Command, FocusedPanel, InputMode, WHEEL_STEP};
use crate::export::ExportFormat;
use crate::selection::Step;

/// Route a terminal event. Key releases and resizes produce nothing.
pub fn handle_event(state: &mut AppState, event: Event) -> Option<Command> {
    match event {
        Event::Key(key) if key.kind == KeyEventKind::Press => handle_key(state, key),
        Event::Mouse(mouse) => handle_mouse(state, mouse),
        _ => None,
    }
}

/// Translate a key event into a command, editing the search box in place
/// while it has focus
pub fn handle_key(state: &mut AppState, key: KeyEvent) -> Option<Command> {
    // Help overlay takes priority
    if state.show_help {
        if matches!(key.code, KeyCode::Esc | KeyCode::Char('q') | KeyCode::Char('?')) {
            return Some(Command::ToggleHelp);
        }
        return None;
    }
    if state.show_info && matches!(key.code, KeyCode::Esc | KeyCode::Char('i')) {
        return Some(Command::ToggleInfo);
    }

    match state.mode {
        InputMode::Normal => map_key(key, state.focused_panel),
        InputMode::SearchEditing => {
            handle_search_mode(state, key);
            None
        }
    }
}

fn handle_search_mode(state: &mut AppState, key: KeyEvent) {
    match key.code {
        KeyCode::Enter => state.confirm_search(),
        KeyCode::Esc => state.cancel_search(),
        _ => {
            // Forward all other keys to the textarea
            if state.search_textarea.input(Input::from(key)) {
                state.search_changed();
            }
        }
    }
}

/// Key bindings of normal mode. `focus` decides whether movement keys drive
/// the log selection or the container list.
pub fn map_key(key: KeyEvent, focus: FocusedPanel) -> Option<Command> {
    let shift = key.modifiers.contains(KeyModifiers::SHIFT);
    let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);

    let command = match key.code {
        KeyCode::Char('c') if ctrl => Command::Quit,
        KeyCode::Char('d') if ctrl => Command::PageDown,
        KeyCode::Char('u') if ctrl => Command::PageUp,
        KeyCode::Char('q') => Command::Quit,
        KeyCode::Char('?') => Command::ToggleHelp,
        KeyCode::Char('i') => Command::ToggleInfo,
        KeyCode::Char('b') => Command::ToggleSidePanel,
        KeyCode::Tab => Command::CycleFocus,

        KeyCode::Char('j') | KeyCode::Down if focus == FocusedPanel::Containers => Command::ContainerDown,
        KeyCode::Char('k') | KeyCode::Up if focus == FocusedPanel::Containers => Command::ContainerUp,
        KeyCode::Enter if focus == FocusedPanel::Containers => Command::OpenContainer,

        KeyCode::Char('J') => Command::Extend(Step::Down),
        KeyCode::Char('K') => Command::Extend(Step::Up),
        KeyCode::Down if shift => Command::Extend(Step::Down),
        KeyCode::Up if shift => Command::Extend(Step::Up),
        KeyCode::Char('j') | KeyCode::Down => Command::Move(Step::Down),
        KeyCode::Char('k') | KeyCode::Up => Command::Move(Step::Up),

        KeyCode::Char('/') => Command::FocusSearch,
        KeyCode::Char('n') => Command::NextMatch,
        KeyCode::Char('N') => Command::PreviousMatch,
        KeyCode::Char('p') => Command::NextPin,
        KeyCode::Char('P') => Command::PreviousPin,
        KeyCode::Char('m') => Command::TogglePin,
        KeyCode::Char('y') => Command::CopySelection,
        KeyCode::Char('Y') => Command::CopyLine,
        KeyCode::Char('x') => Command::ToggleExclude,
        KeyCode::Char('0') => Command::ClearLevels,
        KeyCode::Char(c @ '1'..='9') => Command::ToggleLevel(c as usize - '1' as usize),
        KeyCode::Char(' ') => Command::PauseResume,
        KeyCode::Char('s') => Command::ToggleStream,
        KeyCode::Char('r') => Command::Refresh,
        KeyCode::Char('+') | KeyCode::Char('=') => Command::MoreLines,
        KeyCode::Char('-') => Command::FewerLines,
        KeyCode::Char('f') => Command::ToggleFollow,
        KeyCode::Char('w') => Command::ToggleWrap,
        KeyCode::Char('t') => Command::ToggleTimestamps,
        KeyCode::Char('o') | KeyCode::Enter => Command::ToggleJson,
        KeyCode::Char('e') => Command::Export(ExportFormat::Json),
        KeyCode::Char('E') => Command::Export(ExportFormat::Text),
        KeyCode::Esc => Command::ClearSelection,
        KeyCode::Char('g') | KeyCode::Home => Command::Top,
        KeyCode::Char('G') | KeyCode::End => Command::Bottom,
        KeyCode::PageDown => Command::PageDown,
        KeyCode::PageUp => Command::PageUp,
        _ => return None,
    };
    Some(command)
}

/// Handle a mouse event over the log view
pub fn handle_mouse(state: &AppState, mouse: MouseEvent) -> Option<Command> {
    let area = state.log_area;
    let inside = mouse.column >= area.x
        && mouse.column < area.x + area.width
        && mouse.row >= area.y
        && mouse.row < area.y + area.height;
    if !inside {
        return None;
    }
    match mouse.kind {
        MouseEventKind::ScrollUp => Some(Command::ScrollBy(-WHEEL_STEP)),
        MouseEventKind::ScrollDown => Some(Command::ScrollBy(WHEEL_STEP)),
        MouseEventKind::Down(MouseButton::Left) => Some(Command::Click {
            row: (mouse.row - area.y) as usize,
            extend: mouse.modifiers.contains(KeyModifiers::SHIFT),
        }),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::sources::demo::DemoBackend;
    use ratatui::layout::Rect;
    use std::sync::Arc;
    use tokio::sync::mpsc;

    fn app() -> AppState<'static> {
        let (tx, _rx) = mpsc::unbounded_channel();
        AppState::new(&Config::default(), Arc::new(DemoBackend::new()), tx)
    }

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn shifted(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::SHIFT)
    }

    fn mouse(kind: MouseEventKind, column: u16, row: u16, modifiers: KeyModifiers) -> MouseEvent {
        MouseEvent {
            kind,
            column,
            row,
            modifiers,
        }
    }

    #[test]
    fn test_navigation_keys() {
        let log = FocusedPanel::LogView;
        assert_eq!(map_key(key(KeyCode::Char('j')), log), Some(Command::Move(Step::Down)));
        assert_eq!(map_key(key(KeyCode::Up), log), Some(Command::Move(Step::Up)));
        assert_eq!(map_key(shifted(KeyCode::Char('J')), log), Some(Command::Extend(Step::Down)));
        assert_eq!(map_key(shifted(KeyCode::Up), log), Some(Command::Extend(Step::Up)));
        assert_eq!(map_key(key(KeyCode::Char('n')), log), Some(Command::NextMatch));
        assert_eq!(map_key(shifted(KeyCode::Char('N')), log), Some(Command::PreviousMatch));
        assert_eq!(map_key(key(KeyCode::Char('p')), log), Some(Command::NextPin));
        assert_eq!(map_key(shifted(KeyCode::Char('P')), log), Some(Command::PreviousPin));
        assert_eq!(map_key(key(KeyCode::Char('/')), log), Some(Command::FocusSearch));
    }

    #[test]
    fn test_container_panel_takes_movement() {
        let panel = FocusedPanel::Containers;
        assert_eq!(map_key(key(KeyCode::Char('j')), panel), Some(Command::ContainerDown));
        assert_eq!(map_key(key(KeyCode::Up), panel), Some(Command::ContainerUp));
        assert_eq!(map_key(key(KeyCode::Enter), panel), Some(Command::OpenContainer));
        assert_eq!(map_key(key(KeyCode::Enter), FocusedPanel::LogView), Some(Command::ToggleJson));
    }

    #[test]
    fn test_level_slots_and_ctrl_c() {
        let log = FocusedPanel::LogView;
        assert_eq!(map_key(key(KeyCode::Char('1')), log), Some(Command::ToggleLevel(0)));
        assert_eq!(map_key(key(KeyCode::Char('9')), log), Some(Command::ToggleLevel(8)));
        assert_eq!(map_key(key(KeyCode::Char('0')), log), Some(Command::ClearLevels));
        assert_eq!(
            map_key(KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL), log),
            Some(Command::Quit)
        );
        assert_eq!(map_key(key(KeyCode::Char('z')), log), None);
    }

    #[test]
    fn test_help_overlay_swallows_keys() {
        let mut state = app();
        state.show_help = true;
        assert_eq!(handle_key(&mut state, key(KeyCode::Char('j'))), None);
        assert_eq!(handle_key(&mut state, key(KeyCode::Esc)), Some(Command::ToggleHelp));
    }

    #[test]
    fn test_search_mode_edits_textarea() {
        let mut state = app();
        state.begin_search();
        assert_eq!(handle_key(&mut state, key(KeyCode::Char('q'))), None);
        assert_eq!(handle_key(&mut state, key(KeyCode::Char('x'))), None);
        assert_eq!(state.search_input(), "qx");
        assert!(!state.should_quit);

        handle_key(&mut state, key(KeyCode::Enter));
        assert_eq!(state.mode, InputMode::Normal);
        assert_eq!(state.criteria().search, "qx");
    }

    #[test]
    fn test_only_key_presses_are_handled() {
        let mut state = app();
        let press = Event::Key(key(KeyCode::Char('q')));
        assert_eq!(handle_event(&mut state, press), Some(Command::Quit));

        let mut release = key(KeyCode::Char('q'));
        release.kind = KeyEventKind::Release;
        assert_eq!(handle_event(&mut state, Event::Key(release)), None);
        assert_eq!(handle_event(&mut state, Event::Resize(80, 24)), None);
    }

    #[test]
    fn test_mouse_inside_log_area_only() {
        let mut state = app();
        state.log_area = Rect::new(10, 2, 40, 20);

        let click = mouse(MouseEventKind::Down(MouseButton::Left), 12, 5, KeyModifiers::SHIFT);
        assert_eq!(handle_mouse(&state, click), Some(Command::Click { row: 3, extend: true }));

        let outside = mouse(MouseEventKind::Down(MouseButton::Left), 2, 5, KeyModifiers::NONE);
        assert_eq!(handle_mouse(&state, outside), None);

        let wheel = mouse(MouseEventKind::ScrollUp, 20, 10, KeyModifiers::NONE);
        assert_eq!(handle_mouse(&state, wheel), Some(Command::ScrollBy(-WHEEL_STEP)));
    }
}
