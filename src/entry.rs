use std::fmt;
use std::sync::LazyLock;

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Severity attached to a log entry by the backend
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Warning,
    Error,
    Fatal,
    Panic,
}

impl LogLevel {
    /// Every level in the order the filter bar lists them
    pub const ALL: [LogLevel; 8] = [
        LogLevel::Trace,
        LogLevel::Debug,
        LogLevel::Info,
        LogLevel::Warn,
        LogLevel::Warning,
        LogLevel::Error,
        LogLevel::Fatal,
        LogLevel::Panic,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "TRACE",
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Warning => "WARNING",
            LogLevel::Error => "ERROR",
            LogLevel::Fatal => "FATAL",
            LogLevel::Panic => "PANIC",
        }
    }

    /// Detect the level of an already-cleaned message.
    ///
    /// Patterns are whole-word and case-insensitive, checked from the most
    /// severe level down so that "error while logging" counts as an error.
    pub fn detect(message: &str) -> Option<Self> {
        LEVEL_PATTERNS
            .iter()
            .find(|(_, re)| re.is_match(message))
            .map(|(level, _)| *level)
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Label used wherever an entry without a level is shown or exported
pub const UNKNOWN_LEVEL: &str = "UNKNOWN";

/// Which pipe of the container produced a line
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamKind {
    #[default]
    Stdout,
    Stderr,
}

/// A single parsed log line. Never mutated once it is in a buffer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    /// RFC 3339 timestamp in UTC, when one could be recognized
    pub timestamp: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<LogLevel>,
    pub message: String,
    pub raw: String,
    pub stream: StreamKind,
}

impl LogEntry {
    /// Parse a line as printed by `docker logs --timestamps`
    pub fn parse(raw: &str, stream: StreamKind) -> Self {
        let (timestamp, rest) = split_timestamp(raw);
        let message = clean_message(rest);
        let level = LogLevel::detect(&message);
        Self {
            timestamp,
            level,
            message,
            raw: raw.to_string(),
            stream,
        }
    }

    /// Text used for searching, copying and export: the message, or the raw
    /// line when the message is empty
    pub fn display_text(&self) -> &str {
        if self.message.is_empty() {
            &self.raw
        } else {
            &self.message
        }
    }

    pub fn level_label(&self) -> &'static str {
        self.level.map(|l| l.as_str()).unwrap_or(UNKNOWN_LEVEL)
    }

    /// Parsed timestamp, if the stored string is valid RFC 3339
    pub fn parsed_timestamp(&self) -> Option<DateTime<Utc>> {
        self.timestamp
            .as_deref()
            .and_then(|ts| DateTime::parse_from_rfc3339(ts).ok())
            .map(|dt| dt.with_timezone(&Utc))
    }
}

static LEVEL_PATTERNS: LazyLock<Vec<(LogLevel, Regex)>> = LazyLock::new(|| {
    [
        (LogLevel::Panic, r"(?i)\b(panic|emergency)\b"),
        (LogLevel::Fatal, r"(?i)\b(fatal|critical|crit)\b"),
        (LogLevel::Error, r"(?i)\b(error|err|fail|failed|exception)\b"),
        (LogLevel::Warn, r"(?i)\b(warn|warning|wrn)\b"),
        (LogLevel::Info, r"(?i)\b(info|inf|notice|log)\b"),
        (LogLevel::Debug, r"(?i)\b(debug|dbg)\b"),
        (LogLevel::Trace, r"(?i)\b(trace|trc)\b"),
    ]
    .into_iter()
    .filter_map(|(level, pattern)| Regex::new(pattern).ok().map(|re| (level, re)))
    .collect()
});

static ANSI_SGR: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"\x1b\[[0-9;]*m").ok());

/// Formats with an explicit offset
const OFFSET_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f%z",
    "%Y-%m-%dT%H:%M:%S%z",
    "%d/%b/%Y:%H:%M:%S %z",
    "%a %b %d %H:%M:%S %z %Y",
];

/// Formats without an offset, interpreted as UTC
const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%Y/%m/%d %H:%M:%S",
    "%a %b %e %H:%M:%S %Y",
];

/// Number of leading whitespace-separated tokens tried as a timestamp.
/// `Mon Jan  2 15:04:05 MST 2006` is the longest form.
const MAX_TIMESTAMP_TOKENS: usize = 6;

/// Split a leading timestamp off a line. Returns the normalized timestamp and
/// the rest of the line.
fn split_timestamp(line: &str) -> (Option<String>, &str) {
    let line = line.trim();
    if line.is_empty() {
        return (None, "");
    }

    // Prefer the longest candidate that parses
    let mut found = None;
    for end in token_ends(line, MAX_TIMESTAMP_TOKENS) {
        if let Some(ts) = parse_timestamp(&line[..end]) {
            found = Some((ts, end));
        }
    }

    match found {
        Some((ts, end)) => {
            let rest = line[end..]
                .trim()
                .trim_start_matches([')', ']', '}', '>', ' ', '\t']);
            (Some(ts.to_rfc3339_opts(SecondsFormat::AutoSi, true)), rest)
        }
        None => (None, line),
    }
}

/// Byte offsets where each of the first `max` tokens of `line` ends
fn token_ends(line: &str, max: usize) -> Vec<usize> {
    let mut ends = Vec::with_capacity(max);
    let mut in_token = false;
    for (i, c) in line.char_indices() {
        if c.is_whitespace() {
            if in_token {
                ends.push(i);
                in_token = false;
                if ends.len() == max {
                    return ends;
                }
            }
        } else {
            in_token = true;
        }
    }
    if in_token && ends.len() < max {
        ends.push(line.len());
    }
    ends
}

fn parse_timestamp(candidate: &str) -> Option<DateTime<Utc>> {
    let trimmed = candidate
        .trim()
        .trim_matches(['[', ']', '(', ')', '{', '}', '<', '>']);
    if trimmed.is_empty() {
        return None;
    }
    let normalized = normalize_fraction_separator(trimmed);

    if let Ok(dt) = DateTime::parse_from_rfc3339(&normalized) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in OFFSET_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(&normalized, format) {
            return Some(dt.with_timezone(&Utc));
        }
    }
    for format in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(&normalized, format) {
            return Some(naive.and_utc());
        }
    }
    without_zone_abbreviation(&normalized)
        .and_then(|rest| NaiveDateTime::parse_from_str(&rest, "%a %b %e %H:%M:%S %Y").ok())
        .map(|naive| naive.and_utc())
}

/// `Mon Jan  2 15:04:05 MST 2006` -> `Mon Jan 2 15:04:05 2006`. Zone
/// abbreviations carry no offset here and are read as UTC.
fn without_zone_abbreviation(value: &str) -> Option<String> {
    let mut tokens: Vec<&str> = value.split_whitespace().collect();
    if tokens.len() != 6 || !tokens[4].bytes().all(|b| b.is_ascii_uppercase()) {
        return None;
    }
    tokens.remove(4);
    Some(tokens.join(" "))
}

/// `12:00:00,123` -> `12:00:00.123`
fn normalize_fraction_separator(value: &str) -> String {
    if let Some((head, tail)) = value.split_once(',') {
        if !tail.is_empty() && tail.bytes().all(|b| b.is_ascii_digit()) {
            return format!("{}.{}", head, tail);
        }
    }
    value.to_string()
}

fn clean_message(message: &str) -> String {
    let stripped = match ANSI_SGR.as_ref() {
        Some(re) => re.replace_all(message, ""),
        None => message.into(),
    };
    stripped.trim().to_string()
}

#[cfg(test)]
pub(crate) fn entry(level: Option<LogLevel>, message: &str) -> LogEntry {
    LogEntry {
        timestamp: None,
        level,
        message: message.to_string(),
        raw: message.to_string(),
        stream: StreamKind::Stdout,
    }
}
