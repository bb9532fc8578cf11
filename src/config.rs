use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use serde::Deserialize;

pub const DEFAULT_TAIL_LINES: usize = 100;
pub const DEFAULT_CHANNEL_BUFFER: usize = 1000;
pub const DEFAULT_HOST: &str = "local";

/// Command line for logdeck
#[derive(Debug, Default, Parser)]
#[command(name = "logdeck", version, about = "Keyboard-driven viewer for Docker container logs")]
pub struct Cli {
    /// Container name or id to open
    pub container: Option<String>,

    /// Docker host (`local` for the default daemon)
    #[arg(long)]
    pub host: Option<String>,

    /// Number of recent lines to load
    #[arg(long)]
    pub tail: Option<usize>,

    /// Use built-in demo containers instead of Docker
    #[arg(long)]
    pub demo: bool,

    /// Start streaming right away instead of loading a snapshot
    #[arg(long)]
    pub follow_stream: bool,

    /// Write diagnostics to this file
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    /// Color theme (default, dracula, monochrome)
    #[arg(long)]
    pub theme: Option<String>,
}

/// Configuration for logdeck
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Lines requested for snapshots and stream backfill
    pub tail: usize,
    pub host: String,
    /// Capacity of the channel between a backend and the stream consumer
    pub channel_buffer: usize,
    pub wrap_text: bool,
    pub show_timestamps: bool,
    pub follow: bool,
    pub export_dir: PathBuf,
    pub theme: String,
    pub log_file: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            tail: DEFAULT_TAIL_LINES,
            host: DEFAULT_HOST.to_string(),
            channel_buffer: DEFAULT_CHANNEL_BUFFER,
            wrap_text: false,
            show_timestamps: true,
            follow: true,
            export_dir: PathBuf::from("."),
            theme: "default".to_string(),
            log_file: None,
        }
    }
}

/// `<config_dir>/logdeck/config.toml`
pub fn config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("logdeck").join("config.toml"))
}

impl Config {
    /// Defaults, then the config file, then the environment, then `cli`.
    /// Problems in lower layers are returned as warnings, never as errors.
    pub fn load(cli: &Cli) -> (Self, Vec<String>) {
        let mut warnings = Vec::new();
        let mut config = match config_path().filter(|p| p.exists()) {
            Some(path) => Self::from_file(&path).unwrap_or_else(|err| {
                warnings.push(format!("{:#}; using defaults", err));
                Self::default()
            }),
            None => Self::default(),
        };
        warnings.extend(config.apply_env(|key| std::env::var(key).ok()));
        config.apply_cli(cli);
        (config, warnings)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content =
            fs::read_to_string(path).with_context(|| format!("cannot read {}", path.display()))?;
        let mut config: Config = toml::from_str(&content)
            .with_context(|| format!("invalid config file {}", path.display()))?;
        if config.tail == 0 {
            config.tail = DEFAULT_TAIL_LINES;
        }
        config.channel_buffer = config.channel_buffer.max(1);
        Ok(config)
    }

    /// Apply `LOGDECK_*` overrides read through `lookup`
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Vec<String> {
        let mut warnings = Vec::new();
        if let Some(tail) = lookup("LOGDECK_TAIL") {
            match tail.trim().parse::<usize>() {
                Ok(n) if n > 0 => self.tail = n,
                _ => warnings.push(format!("ignoring LOGDECK_TAIL={}: expected a positive number", tail)),
            }
        }
        if let Some(host) = lookup("LOGDECK_HOST").filter(|h| !h.trim().is_empty()) {
            self.host = host.trim().to_string();
        }
        if let Some(dir) = lookup("LOGDECK_EXPORT_DIR").filter(|d| !d.is_empty()) {
            self.export_dir = PathBuf::from(dir);
        }
        warnings
    }

    pub fn apply_cli(&mut self, cli: &Cli) {
        if let Some(host) = &cli.host {
            self.host = host.clone();
        }
        if let Some(tail) = cli.tail.filter(|&n| n > 0) {
            self.tail = tail;
        }
        if let Some(path) = &cli.log_file {
            self.log_file = Some(path.clone());
        }
        if let Some(theme) = &cli.theme {
            self.theme = theme.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.tail, 100);
        assert_eq!(config.host, "local");
        assert_eq!(config.channel_buffer, 1000);
        assert!(!config.wrap_text);
        assert!(config.show_timestamps);
        assert!(config.follow);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "tail = 500\nwrap_text = true\ntheme = \"dracula\"\n").unwrap();

        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.tail, 500);
        assert!(config.wrap_text);
        assert_eq!(config.theme, "dracula");
        assert_eq!(config.host, "local");
    }

    #[test]
    fn test_zero_tail_in_file_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "tail = 0\n").unwrap();
        assert_eq!(Config::from_file(&path).unwrap().tail, DEFAULT_TAIL_LINES);
    }

    #[test]
    fn test_broken_file_is_an_error_with_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "tail = \"lots\"").unwrap();
        let err = Config::from_file(&path).unwrap_err();
        assert!(format!("{:#}", err).contains("config.toml"));
    }

    #[test]
    fn test_env_overrides_and_rejects_bad_tail() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("LOGDECK_TAIL", "0"),
            ("LOGDECK_HOST", "ssh://ops@box"),
            ("LOGDECK_EXPORT_DIR", "/tmp/exports"),
        ]);
        let mut config = Config::default();
        let warnings = config.apply_env(|k| env.get(k).map(|v| v.to_string()));

        assert_eq!(config.tail, DEFAULT_TAIL_LINES);
        assert_eq!(warnings.len(), 1);
        assert_eq!(config.host, "ssh://ops@box");
        assert_eq!(config.export_dir, PathBuf::from("/tmp/exports"));

        let warnings = config.apply_env(|k| (k == "LOGDECK_TAIL").then(|| "250".to_string()));
        assert!(warnings.is_empty());
        assert_eq!(config.tail, 250);
    }

    #[test]
    fn test_cli_wins() {
        let cli = Cli::parse_from(["logdeck", "web", "--host", "tcp://h:2375", "--tail", "20", "--theme", "monochrome"]);
        assert_eq!(cli.container.as_deref(), Some("web"));
        assert!(!cli.demo);

        let mut config = Config::default();
        config.apply_env(|k| (k == "LOGDECK_TAIL").then(|| "300".to_string()));
        config.apply_cli(&cli);
        assert_eq!(config.tail, 20);
        assert_eq!(config.host, "tcp://h:2375");
        assert_eq!(config.theme, "monochrome");
    }

    #[test]
    fn test_cli_zero_tail_is_ignored() {
        let cli = Cli::parse_from(["logdeck", "--tail", "0", "--demo", "--follow-stream"]);
        assert!(cli.demo && cli.follow_stream);
        let mut config = Config::default();
        config.apply_cli(&cli);
        assert_eq!(config.tail, DEFAULT_TAIL_LINES);
    }
}
