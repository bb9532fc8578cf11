use ratatui::style::Color;

use crate::entry::LogLevel;

/// All themeable colors in the application
#[derive(Clone, Debug)]
pub struct Theme {
    // Log levels
    pub level_fatal: Color,
    pub level_error: Color,
    pub level_warn: Color,
    pub level_info: Color,
    pub level_debug: Color,
    pub level_trace: Color,
    pub level_unknown: Color,

    // UI borders
    pub border_focused: Color,
    pub border_unfocused: Color,

    // Header
    pub header_title: Color,
    pub header_source: Color,
    pub header_bg: Color,

    // Status bar
    pub status_mode_bg: Color,
    pub status_mode_fg: Color,
    pub status_help: Color,
    pub status_bg: Color,

    // Rows
    pub highlight_match_bg: Color,
    pub highlight_match_fg: Color,
    pub current_match_bg: Color,
    pub selection_bg: Color,
    pub appended_bg: Color,
    pub pin: Color,
    pub stderr: Color,
    pub timestamp: Color,
    pub json: Color,

    // Level filter bar
    pub filter_selected: Color,
    pub filter_prefix: Color,

    // Container panel
    pub container_current: Color,
    pub container_stopped: Color,

    // Notices
    pub notice_info: Color,
    pub notice_success: Color,
    pub notice_error: Color,

    // Empty states
    pub empty_state: Color,

    // Overlays
    pub help_border: Color,
    pub help_bg: Color,
}

impl Default for Theme {
    fn default() -> Self {
        Self::default_theme()
    }
}

impl Theme {
    pub fn default_theme() -> Self {
        Self {
            level_fatal: Color::LightRed,
            level_error: Color::Red,
            level_warn: Color::Yellow,
            level_info: Color::Green,
            level_debug: Color::Blue,
            level_trace: Color::DarkGray,
            level_unknown: Color::Gray,

            border_focused: Color::Cyan,
            border_unfocused: Color::DarkGray,

            header_title: Color::Green,
            header_source: Color::Cyan,
            header_bg: Color::DarkGray,

            status_mode_bg: Color::Blue,
            status_mode_fg: Color::White,
            status_help: Color::DarkGray,
            status_bg: Color::Black,

            highlight_match_bg: Color::Yellow,
            highlight_match_fg: Color::Black,
            current_match_bg: Color::LightRed,
            selection_bg: Color::Rgb(40, 60, 90),
            appended_bg: Color::Rgb(30, 70, 40),
            pin: Color::Magenta,
            stderr: Color::LightRed,
            timestamp: Color::DarkGray,
            json: Color::Cyan,

            filter_selected: Color::Yellow,
            filter_prefix: Color::Yellow,

            container_current: Color::Green,
            container_stopped: Color::DarkGray,

            notice_info: Color::Cyan,
            notice_success: Color::Green,
            notice_error: Color::Red,

            empty_state: Color::DarkGray,

            help_border: Color::Cyan,
            help_bg: Color::Black,
        }
    }

    /// Dracula theme - popular dark theme
    pub fn dracula() -> Self {
        Self {
            level_fatal: Color::Rgb(255, 121, 198), // Pink
            level_error: Color::Rgb(255, 85, 85),   // Red
            level_warn: Color::Rgb(255, 184, 108),  // Orange
            level_info: Color::Rgb(80, 250, 123),   // Green
            level_debug: Color::Rgb(139, 233, 253), // Cyan
            level_trace: Color::Rgb(98, 114, 164),  // Comment gray
            level_unknown: Color::Rgb(248, 248, 242),

            border_focused: Color::Rgb(189, 147, 249), // Purple
            border_unfocused: Color::Rgb(68, 71, 90),  // Current line

            header_title: Color::Rgb(255, 121, 198),
            header_source: Color::Rgb(139, 233, 253),
            header_bg: Color::Rgb(40, 42, 54),

            status_mode_bg: Color::Rgb(189, 147, 249),
            status_mode_fg: Color::Rgb(40, 42, 54),
            status_bg: Color::Rgb(33, 34, 44),
            status_help: Color::Rgb(98, 114, 164),

            highlight_match_bg: Color::Rgb(241, 250, 140), // Yellow
            highlight_match_fg: Color::Rgb(40, 42, 54),
            current_match_bg: Color::Rgb(255, 184, 108),
            selection_bg: Color::Rgb(68, 71, 90),
            appended_bg: Color::Rgb(45, 70, 55),
            pin: Color::Rgb(255, 121, 198),
            stderr: Color::Rgb(255, 85, 85),
            timestamp: Color::Rgb(98, 114, 164),
            json: Color::Rgb(139, 233, 253),

            filter_selected: Color::Rgb(241, 250, 140),
            filter_prefix: Color::Rgb(255, 184, 108),

            container_current: Color::Rgb(80, 250, 123),
            container_stopped: Color::Rgb(98, 114, 164),

            notice_info: Color::Rgb(139, 233, 253),
            notice_success: Color::Rgb(80, 250, 123),
            notice_error: Color::Rgb(255, 85, 85),

            empty_state: Color::Rgb(98, 114, 164),

            help_border: Color::Rgb(189, 147, 249),
            help_bg: Color::Rgb(40, 42, 54),
        }
    }

    /// Monochrome theme - grayscale only
    pub fn monochrome() -> Self {
        Self {
            level_fatal: Color::Rgb(255, 255, 255),
            level_error: Color::Rgb(255, 255, 255),
            level_warn: Color::Rgb(200, 200, 200),
            level_info: Color::Rgb(170, 170, 170),
            level_debug: Color::Rgb(140, 140, 140),
            level_trace: Color::Rgb(100, 100, 100),
            level_unknown: Color::Rgb(120, 120, 120),

            border_focused: Color::Rgb(200, 200, 200),
            border_unfocused: Color::Rgb(80, 80, 80),

            header_title: Color::Rgb(255, 255, 255),
            header_source: Color::Rgb(180, 180, 180),
            header_bg: Color::Rgb(40, 40, 40),

            status_mode_bg: Color::Rgb(200, 200, 200),
            status_mode_fg: Color::Rgb(0, 0, 0),
            status_help: Color::Rgb(120, 120, 120),
            status_bg: Color::Rgb(20, 20, 20),

            highlight_match_bg: Color::Rgb(200, 200, 200),
            highlight_match_fg: Color::Rgb(0, 0, 0),
            current_match_bg: Color::Rgb(255, 255, 255),
            selection_bg: Color::Rgb(60, 60, 60),
            appended_bg: Color::Rgb(45, 45, 45),
            pin: Color::Rgb(255, 255, 255),
            stderr: Color::Rgb(220, 220, 220),
            timestamp: Color::Rgb(100, 100, 100),
            json: Color::Rgb(180, 180, 180),

            filter_selected: Color::Rgb(255, 255, 255),
            filter_prefix: Color::Rgb(160, 160, 160),

            container_current: Color::Rgb(255, 255, 255),
            container_stopped: Color::Rgb(100, 100, 100),

            notice_info: Color::Rgb(200, 200, 200),
            notice_success: Color::Rgb(230, 230, 230),
            notice_error: Color::Rgb(255, 255, 255),

            empty_state: Color::Rgb(100, 100, 100),

            help_border: Color::Rgb(200, 200, 200),
            help_bg: Color::Rgb(20, 20, 20),
        }
    }

    /// Get theme by name, falling back to the default
    pub fn by_name(name: &str) -> Self {
        match name.to_lowercase().as_str() {
            "monochrome" | "mono" => Self::monochrome(),
            "dracula" => Self::dracula(),
            _ => Self::default_theme(),
        }
    }

    pub fn level_color(&self, level: Option<LogLevel>) -> Color {
        match level {
            Some(LogLevel::Panic | LogLevel::Fatal) => self.level_fatal,
            Some(LogLevel::Error) => self.level_error,
            Some(LogLevel::Warn | LogLevel::Warning) => self.level_warn,
            Some(LogLevel::Info) => self.level_info,
            Some(LogLevel::Debug) => self.level_debug,
            Some(LogLevel::Trace) => self.level_trace,
            None => self.level_unknown,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_by_name() {
        assert_eq!(Theme::by_name("Dracula").level_error, Theme::dracula().level_error);
        assert_eq!(Theme::by_name("mono").pin, Theme::monochrome().pin);
        assert_eq!(Theme::by_name("nope").level_info, Color::Green);
    }

    #[test]
    fn test_level_colors() {
        let theme = Theme::default_theme();
        assert_eq!(theme.level_color(Some(LogLevel::Warning)), theme.level_warn);
        assert_eq!(theme.level_color(Some(LogLevel::Panic)), theme.level_fatal);
        assert_eq!(theme.level_color(None), theme.level_unknown);
    }
}
