use std::collections::BTreeMap;
use std::process::Command;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Deserialize;

/// Container metadata shown alongside its logs. Never modified by the viewer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContainerInfo {
    pub id: String,
    /// Names as reported by Docker, possibly with a leading `/`
    pub names: Vec<String>,
    pub image: String,
    pub state: String,
    pub status: String,
    pub created: Option<DateTime<Utc>>,
    pub labels: BTreeMap<String, String>,
    pub host: String,
}

impl ContainerInfo {
    /// First name without the leading `/`, or the short id
    pub fn display_name(&self) -> String {
        match self.names.first() {
            Some(name) => name.trim_start_matches('/').to_string(),
            None => self.id.chars().take(12).collect(),
        }
    }

    pub fn is_running(&self) -> bool {
        self.state.eq_ignore_ascii_case("running")
    }
}

/// One line of `docker ps --format '{{json .}}'`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct PsRow {
    #[serde(rename = "ID")]
    id: String,
    names: String,
    image: String,
    #[serde(default)]
    state: String,
    #[serde(default)]
    status: String,
    #[serde(default)]
    created_at: String,
    #[serde(default)]
    labels: String,
}

/// Discover Docker containers on `host` (`local` for the default daemon)
pub fn discover_docker_containers(host: &str) -> Result<Vec<ContainerInfo>> {
    let mut cmd = Command::new("docker");
    if host != "local" {
        cmd.arg("-H").arg(host);
    }
    let output = cmd
        .args(["ps", "--all", "--no-trunc", "--format", "{{json .}}"])
        .output()
        .context("failed to run docker ps. Is Docker installed and running?")?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        anyhow::bail!("docker ps failed: {}", stderr.trim());
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    parse_ps_output(&stdout, host)
}

fn parse_ps_output(stdout: &str, host: &str) -> Result<Vec<ContainerInfo>> {
    stdout
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| {
            let row: PsRow = serde_json::from_str(line)
                .with_context(|| format!("unexpected docker ps output: {}", line))?;
            Ok(ContainerInfo {
                id: row.id,
                names: row
                    .names
                    .split(',')
                    .filter(|n| !n.is_empty())
                    .map(|n| format!("/{}", n))
                    .collect(),
                image: row.image,
                state: row.state,
                status: row.status,
                created: parse_created_at(&row.created_at),
                labels: parse_labels(&row.labels),
                host: host.to_string(),
            })
        })
        .collect()
}

/// `2024-03-01 10:15:30 +0000 UTC`
fn parse_created_at(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    let value = value
        .rsplit_once(' ')
        .filter(|(_, zone)| zone.chars().all(|c| c.is_ascii_alphabetic()))
        .map(|(head, _)| head)
        .unwrap_or(value);
    DateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S %z")
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// `a=1,b=2`
fn parse_labels(value: &str) -> BTreeMap<String, String> {
    value
        .split(',')
        .filter_map(|pair| pair.split_once('='))
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}
