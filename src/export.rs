//! Writing the filtered view to disk and putting lines on the clipboard.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use chrono::{DateTime, Utc};

use crate::entry::LogEntry;

const FALLBACK_NAME: &str = "container";
const UNSAFE_CHARS: &[char] = &['/', '\\', ':', '*', '?', '"', '<', '>', '|'];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExportFormat {
    Json,
    Text,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Json => "json",
            ExportFormat::Text => "txt",
        }
    }
}

/// Container name made safe for a file name
pub fn sanitize_container_name(name: Option<&str>) -> String {
    let name = name
        .map(|n| n.strip_prefix('/').unwrap_or(n))
        .filter(|n| !n.is_empty())
        .unwrap_or(FALLBACK_NAME);
    name.replace(UNSAFE_CHARS, "-")
}

/// `<name>-logs-<YYYY-MM-DDTHH-MM-SS>.<ext>`
pub fn export_filename(name: Option<&str>, format: ExportFormat, now: DateTime<Utc>) -> String {
    format!(
        "{}-logs-{}.{}",
        sanitize_container_name(name),
        now.format("%Y-%m-%dT%H-%M-%S"),
        format.extension()
    )
}

/// `[<timestamp>] [<LEVEL>] <message>`
pub fn text_line(entry: &LogEntry) -> String {
    let timestamp = match (entry.parsed_timestamp(), &entry.timestamp) {
        (Some(ts), _) => ts.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string(),
        (None, Some(raw)) => raw.clone(),
        (None, None) => String::new(),
    };
    format!("[{}] [{}] {}", timestamp, entry.level_label(), entry.display_text())
}

pub fn render<'a>(entries: impl IntoIterator<Item = &'a LogEntry>, format: ExportFormat) -> Result<String> {
    match format {
        ExportFormat::Json => {
            let entries: Vec<&LogEntry> = entries.into_iter().collect();
            Ok(serde_json::to_string_pretty(&entries)?)
        }
        ExportFormat::Text => Ok(entries
            .into_iter()
            .map(text_line)
            .collect::<Vec<_>>()
            .join("\n")),
    }
}

/// Write `entries` into `dir` and return the path written. Fails without
/// touching the filesystem when there is nothing to export.
pub fn write_export(
    dir: &Path,
    container_name: Option<&str>,
    entries: &[&LogEntry],
    format: ExportFormat,
    now: DateTime<Utc>,
) -> Result<PathBuf> {
    if entries.is_empty() {
        bail!("No logs to export");
    }
    let content = render(entries.iter().copied(), format)?;
    fs::create_dir_all(dir).with_context(|| format!("cannot create {}", dir.display()))?;
    let path = dir.join(export_filename(container_name, format, now));
    fs::write(&path, content).with_context(|| format!("cannot write {}", path.display()))?;
    Ok(path)
}

pub fn copy_to_clipboard(text: &str) -> Result<()> {
    let mut clipboard = arboard::Clipboard::new().context("clipboard unavailable")?;
    clipboard
        .set_text(text.to_string())
        .context("failed to copy to clipboard")?;
    Ok(())
}
