//! One-shot availability probe for the external conversion tool.

use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

use crate::config::ExternalToolConfig;

const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Result of probing the external tool, injected into [`super::MagickProcessor`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolStatus {
    pub available: bool,
    /// First line of the tool's version output
    pub version: Option<String>,
}

impl ToolStatus {
    pub fn unavailable() -> Self {
        Self::default()
    }

    pub fn available(version: impl Into<String>) -> Self {
        Self {
            available: true,
            version: Some(version.into()),
        }
    }

    /// Version for display, `(not found)` when missing.
    pub fn version_display(&self) -> &str {
        match (&self.version, self.available) {
            (Some(v), true) => v,
            _ => "(not found)",
        }
    }
}

pub struct ToolProbe;

impl ToolProbe {
    /// Run `<program> <version_arg>` once.
    ///
    /// Never fails: a missing program, a non-zero exit or a hung probe all
    /// mean the tool is unavailable.
    pub async fn probe(config: &ExternalToolConfig) -> ToolStatus {
        if !config.enabled {
            tracing::debug!("External tool disabled in config");
            return ToolStatus::unavailable();
        }

        let mut command = Command::new(&config.program);
        command
            .arg(&config.version_arg)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        let output = match tokio::time::timeout(PROBE_TIMEOUT, command.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                tracing::debug!("External tool {} not found: {e}", config.program);
                return ToolStatus::unavailable();
            }
            Err(_) => {
                tracing::warn!("External tool {} did not answer the version probe", config.program);
                return ToolStatus::unavailable();
            }
        };

        if !output.status.success() {
            tracing::debug!(
                "External tool {} exited with {} on version probe",
                config.program,
                output.status
            );
            return ToolStatus::unavailable();
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let version = parse_version_line(&stdout).unwrap_or_else(|| config.program.clone());
        tracing::debug!("External tool available: {version}");
        ToolStatus::available(version)
    }
}

/// First non-empty line of a `-version` banner, minus a `Version:` label.
pub fn parse_version_line(output: &str) -> Option<String> {
    output
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .map(|l| l.trim_start_matches("Version:").trim().to_string())
}
