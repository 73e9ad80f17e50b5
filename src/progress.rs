//! Progress reporting for `linkmeta process-all`.
//!
//! Progress is emitted on **stderr** so stdout remains parseable for
//! scripts: human lines by default on a TTY, or one JSON object per line.

use std::io::Write;

/// A single progress event for a corpus run.
#[derive(Clone, Debug)]
pub enum ProgressEvent {
    /// Listing documents. Total unknown.
    Scanning,
    /// `n` of `total` documents processed; `path` is the latest.
    Processing { n: u64, total: u64, path: String },
    /// The run finished.
    Done { documents: u64, updated: u64, errors: u64 },
}

/// Reports corpus-run progress.
pub trait ProgressReporter: Send + Sync {
    fn report(&self, event: ProgressEvent);
}

/// Human-friendly progress on stderr: "process  1,234 / 5,000 documents".
pub struct StderrProgress;

impl ProgressReporter for StderrProgress {
    fn report(&self, event: ProgressEvent) {
        let line = match &event {
            ProgressEvent::Scanning => "process  scanning vault...\n".to_string(),
            ProgressEvent::Processing { n, total, .. } => format!(
                "process  {} / {} documents\n",
                format_number(*n),
                format_number(*total)
            ),
            ProgressEvent::Done {
                documents,
                updated,
                errors,
            } => format!(
                "process  done: {} documents, {} fields updated, {} errors\n",
                format_number(*documents),
                format_number(*updated),
                format_number(*errors)
            ),
        };
        let _ = std::io::stderr().lock().write_all(line.as_bytes());
        let _ = std::io::stderr().lock().flush();
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl ProgressReporter for JsonProgress {
    fn report(&self, event: ProgressEvent) {
        let obj = match &event {
            ProgressEvent::Scanning => serde_json::json!({
                "event": "progress",
                "phase": "scanning"
            }),
            ProgressEvent::Processing { n, total, path } => serde_json::json!({
                "event": "progress",
                "phase": "processing",
                "n": n,
                "total": total,
                "path": path
            }),
            ProgressEvent::Done {
                documents,
                updated,
                errors,
            } => serde_json::json!({
                "event": "done",
                "documents": documents,
                "fields_updated": updated,
                "errors": errors
            }),
        };
        if let Ok(line) = serde_json::to_string(&obj) {
            let _ = writeln!(std::io::stderr().lock(), "{}", line);
            let _ = std::io::stderr().lock().flush();
        }
    }
}

pub struct NoProgress;

impl ProgressReporter for NoProgress {
    fn report(&self, _event: ProgressEvent) {}
}

pub fn format_number(n: u64) -> String {
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
#[derive(Clone, Copy, Debug, Eq, PartialEq, clap::ValueEnum)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Human progress when stderr is a TTY, otherwise off.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    pub fn reporter(&self) -> Box<dyn ProgressReporter> {
        match self {
            ProgressMode::Off => Box::new(NoProgress),
            ProgressMode::Human => Box::new(StderrProgress),
            ProgressMode::Json => Box::new(JsonProgress),
        }
    }
}
