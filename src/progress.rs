//! Update pass progress reporting.
//!
//! Reports observable progress during `gds update` and `gds watch` so
//! operators see which source is being checked, which file is downloading,
//! and how far normalization has come. Progress is emitted on **stderr** so
//! stdout remains parseable for scripts.

use std::io::Write;
use std::sync::Arc;

/// A single progress event for an update pass.
#[derive(Clone, Debug, PartialEq)]
pub enum SyncProgressEvent {
    /// Querying the upstream revision of a source.
    Checking { source: String },
    /// Bytes written so far for one file; `total` is the content length when known.
    Downloading {
        file: String,
        bytes: u64,
        total: Option<u64>,
    },
    /// Normalizing records: n processed out of total.
    Normalizing { source: String, n: u64, total: u64 },
}

/// Reports pass progress. Implementations write to stderr (human or JSON).
pub trait SyncProgressReporter: Send + Sync {
    fn report(&self, event: SyncProgressEvent);
}

/// Human-friendly progress on stderr: "update genshin  normalizing  1,234 / 5,000 records".
pub struct StderrProgress;

impl SyncProgressReporter for StderrProgress {
    fn report(&self, event: SyncProgressEvent) {
        let line = match &event {
            SyncProgressEvent::Checking { source } => {
                format!("update {}  checking revision...\n", source)
            }
            SyncProgressEvent::Downloading { file, bytes, total } => match total {
                Some(total) => format!(
                    "download {}  {} / {} bytes\n",
                    file,
                    format_number(*bytes),
                    format_number(*total)
                ),
                None => format!("download {}  {} bytes\n", file, format_number(*bytes)),
            },
            SyncProgressEvent::Normalizing { source, n, total } => format!(
                "update {}  normalizing  {} / {} records\n",
                source,
                format_number(*n),
                format_number(*total)
            ),
        };
        let mut stderr = std::io::stderr().lock();
        let _ = stderr.write_all(line.as_bytes());
        let _ = stderr.flush();
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl SyncProgressReporter for JsonProgress {
    fn report(&self, event: SyncProgressEvent) {
        let obj = match &event {
            SyncProgressEvent::Checking { source } => serde_json::json!({
                "event": "progress",
                "source": source,
                "phase": "checking"
            }),
            SyncProgressEvent::Downloading { file, bytes, total } => serde_json::json!({
                "event": "progress",
                "file": file,
                "phase": "downloading",
                "bytes": bytes,
                "total": total
            }),
            SyncProgressEvent::Normalizing { source, n, total } => serde_json::json!({
                "event": "progress",
                "source": source,
                "phase": "normalizing",
                "n": n,
                "total": total
            }),
        };
        if let Ok(line) = serde_json::to_string(&obj) {
            let mut stderr = std::io::stderr().lock();
            let _ = writeln!(stderr, "{}", line);
            let _ = stderr.flush();
        }
    }
}

/// No-op reporter when progress is disabled.
pub struct NoProgress;

impl SyncProgressReporter for NoProgress {
    fn report(&self, _event: SyncProgressEvent) {}
}

fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + (s.len() - 1) / 3);
    for (i, c) in s.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }
    result.chars().rev().collect()
}

/// Progress mode for the CLI: off, human (stderr), or JSON (stderr).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Default: human progress when stderr is a TTY, otherwise off.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    /// Build a reporter for this mode, shared by the fetcher and the updater.
    pub fn reporter(&self) -> Arc<dyn SyncProgressReporter> {
        match self {
            ProgressMode::Off => Arc::new(NoProgress),
            ProgressMode::Human => Arc::new(StderrProgress),
            ProgressMode::Json => Arc::new(JsonProgress),
        }
    }
}

impl std::str::FromStr for ProgressMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "off" => Ok(ProgressMode::Off),
            "human" => Ok(ProgressMode::Human),
            "json" => Ok(ProgressMode::Json),
            other => anyhow::bail!("Unknown progress mode '{}'. Must be off, human, or json.", other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_number_comma() {
        assert_eq!(format_number(0), "0");
        assert_eq!(format_number(999), "999");
        assert_eq!(format_number(1000), "1,000");
        assert_eq!(format_number(1_234_567), "1,234,567");
    }

    #[test]
    fn progress_mode_parses() {
        assert_eq!("json".parse::<ProgressMode>().unwrap(), ProgressMode::Json);
        assert_eq!("off".parse::<ProgressMode>().unwrap(), ProgressMode::Off);
        assert!("loud".parse::<ProgressMode>().is_err());
    }
}
