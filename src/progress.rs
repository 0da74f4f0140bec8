//! Upload and wait progress reporting.
//!
//! Reports observable progress during `ms upload`: bytes sent, then each
//! poll attempt while waiting for the metadata record. Progress is emitted
//! on **stderr** so stdout remains parseable for scripts.

use std::io::Write;
use std::sync::Arc;

use anyhow::{bail, Result};

use crate::poller::{Notification, Notifier, TracingNotifier};

/// A single progress event for an upload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UploadEvent {
    /// Bytes handed to object storage so far.
    Sending { file: String, loaded: u64, total: u64 },
    /// Waiting for the metadata record: attempt `attempt` of `max_attempts`.
    Waiting {
        file: String,
        attempt: u32,
        max_attempts: u32,
    },
}

/// Reports upload progress. Implementations write to stderr (human or JSON).
pub trait UploadProgressReporter: Send + Sync {
    fn report(&self, event: UploadEvent);
}

/// Human-friendly progress on stderr: "upload foods.csv  sending  1,024 / 2,048 bytes (50%)".
pub struct StderrProgress;

impl UploadProgressReporter for StderrProgress {
    fn report(&self, event: UploadEvent) {
        let line = match &event {
            UploadEvent::Sending { file, loaded, total } => {
                let pct = if *total == 0 {
                    100
                } else {
                    loaded.min(total) * 100 / total
                };
                format!(
                    "upload {}  sending  {} / {} bytes ({}%)\n",
                    file,
                    format_number(*loaded),
                    format_number(*total),
                    pct
                )
            }
            UploadEvent::Waiting {
                file,
                attempt,
                max_attempts,
            } => format!(
                "upload {}  waiting for metadata  attempt {} / {}\n",
                file, attempt, max_attempts
            ),
        };
        let _ = std::io::stderr().lock().write_all(line.as_bytes());
        let _ = std::io::stderr().lock().flush();
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl UploadProgressReporter for JsonProgress {
    fn report(&self, event: UploadEvent) {
        let obj = match &event {
            UploadEvent::Sending { file, loaded, total } => serde_json::json!({
                "event": "progress",
                "file": file,
                "phase": "sending",
                "loaded": loaded,
                "total": total
            }),
            UploadEvent::Waiting {
                file,
                attempt,
                max_attempts,
            } => serde_json::json!({
                "event": "progress",
                "file": file,
                "phase": "waiting",
                "attempt": attempt,
                "max_attempts": max_attempts
            }),
        };
        if let Ok(line) = serde_json::to_string(&obj) {
            let _ = writeln!(std::io::stderr().lock(), "{}", line);
            let _ = std::io::stderr().lock().flush();
        }
    }
}

/// No-op reporter when progress is disabled.
pub struct NoProgress;

impl UploadProgressReporter for NoProgress {
    fn report(&self, _event: UploadEvent) {}
}

/// Turns poll attempts into [`UploadEvent::Waiting`] lines and logs every
/// notification through [`TracingNotifier`].
pub struct ProgressNotifier {
    file: String,
    reporter: Arc<dyn UploadProgressReporter>,
}

impl ProgressNotifier {
    pub fn new(file: impl Into<String>, reporter: Arc<dyn UploadProgressReporter>) -> Self {
        Self {
            file: file.into(),
            reporter,
        }
    }
}

impl Notifier for ProgressNotifier {
    fn notify(&self, notification: Notification) {
        if let Notification::Polling {
            attempt,
            max_attempts,
            ..
        } = &notification
        {
            self.reporter.report(UploadEvent::Waiting {
                file: self.file.clone(),
                attempt: *attempt,
                max_attempts: *max_attempts,
            });
        }
        TracingNotifier.notify(notification);
    }
}

fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + (s.len() - 1) / 3);
    let chars: Vec<char> = s.chars().rev().collect();
    for (i, c) in chars.iter().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(*c);
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

    /// Parse the `--progress` flag. `auto` picks [`default_for_tty`](Self::default_for_tty).
    pub fn from_flag(flag: &str) -> Result<Self> {
        match flag {
            "auto" => Ok(Self::default_for_tty()),
            "human" => Ok(ProgressMode::Human),
            "json" => Ok(ProgressMode::Json),
            "off" => Ok(ProgressMode::Off),
            other => bail!(
                "Unknown progress mode: '{}'. Must be auto, human, json, or off.",
                other
            ),
        }
    }

    /// Build a reporter for this mode.
    pub fn reporter(&self) -> Box<dyn UploadProgressReporter> {
        match self {
            ProgressMode::Off => Box::new(NoProgress),
            ProgressMode::Human => Box::new(StderrProgress),
            ProgressMode::Json => Box::new(JsonProgress),
        }
    }
}
