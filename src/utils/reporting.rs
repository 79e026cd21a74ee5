use std::fmt;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use csv::Writer;
use log::error;
use serde::Serialize;

use crate::batch::runner::FileTask;
use crate::Result;

pub const CONVERSION_LOG: &str = "conversion_errors.log";
pub const SPLIT_LOG: &str = "cue_split_errors.log";

/// One failed file or track, as surfaced to the user at the end of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailureRecord {
    pub identifier: String,
    pub message: String,
}

impl FailureRecord {
    pub fn new(identifier: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for FailureRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.identifier, self.message)
    }
}

/// Destination for per-item failure diagnostics.
pub trait DiagnosticSink: Send + Sync {
    fn record(&self, identifier: &str, error: &dyn std::error::Error);
}

/// Appends `<identifier> - <message>` plus the error's full context to a log file.
///
/// The file is opened in append mode for every record and never truncated.
#[derive(Debug, Clone)]
pub struct FileSink {
    path: PathBuf,
}

impl FileSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl DiagnosticSink for FileSink {
    fn record(&self, identifier: &str, error: &dyn std::error::Error) {
        let mut entry = format!("{} - {}\n{:?}\n", identifier, error, error);
        let mut source = error.source();
        while let Some(cause) = source {
            entry.push_str(&format!("caused by: {}\n", cause));
            source = cause.source();
        }
        entry.push('\n');

        let written = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .and_then(|mut file| file.write_all(entry.as_bytes()));
        if let Err(e) = written {
            error!("Cannot append to {}: {}", self.path.display(), e);
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiagnosticRecord {
    pub identifier: String,
    pub message: String,
}

/// Keeps records in memory; clones share the same record list.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    records: Arc<Mutex<Vec<DiagnosticRecord>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<DiagnosticRecord> {
        self.records.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

impl DiagnosticSink for MemorySink {
    fn record(&self, identifier: &str, error: &dyn std::error::Error) {
        if let Ok(mut records) = self.records.lock() {
            records.push(DiagnosticRecord {
                identifier: identifier.to_string(),
                message: error.to_string(),
            });
        }
    }
}

#[derive(Debug, Serialize)]
struct TaskRow<'a> {
    input: String,
    output: String,
    outcome: &'a str,
    message: &'a str,
}

pub struct Reporter;

impl Reporter {
    pub fn new() -> Self {
        Self
    }

    /// One CSV row per file: input, output, outcome, message.
    pub fn generate_task_report(&self, tasks: &[FileTask], output_path: impl AsRef<Path>) -> Result<()> {
        let output_path_ref = output_path.as_ref();
        let mut writer = Writer::from_path(output_path_ref)?;

        for task in tasks {
            writer.serialize(TaskRow {
                input: task.input.display().to_string(),
                output: task
                    .output
                    .as_ref()
                    .map(|p| p.display().to_string())
                    .unwrap_or_default(),
                outcome: task.outcome.label(),
                message: task.outcome.message().unwrap_or(""),
            })?;
        }

        writer.flush()?;
        Ok(())
    }
}

impl Default for Reporter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::runner::TaskOutcome;
    use crate::ConvertError;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[test]
    fn file_sink_appends_identifier_message_and_context() {
        let dir = TempDir::new().unwrap();
        let sink = FileSink::new(dir.path().join(CONVERSION_LOG));
        let err = ConvertError::Decode {
            path: "a.flac".into(),
            reason: "bad header".into(),
        };

        sink.record("/music/a.flac", &err);
        sink.record("/music/b.flac", &err);

        let log = std::fs::read_to_string(sink.path()).unwrap();
        assert!(log.starts_with("/music/a.flac - Failed to decode a.flac: bad header\n"));
        assert!(log.contains("Decode {"));
        assert_eq!(log.matches(" - Failed to decode").count(), 2);
    }

    #[test]
    fn memory_sink_clones_share_records() {
        let sink = MemorySink::new();
        let handle = sink.clone();
        sink.record("Track 3", &ConvertError::CueStructural("boom".into()));

        assert_eq!(
            handle.records(),
            vec![DiagnosticRecord {
                identifier: "Track 3".into(),
                message: "boom".into(),
            }]
        );
    }

    #[test]
    fn task_report_has_one_row_per_task() {
        let dir = TempDir::new().unwrap();
        let report = dir.path().join("report.csv");
        let tasks = vec![
            FileTask {
                input: "in/a.flac".into(),
                output: Some("out/a.mp3".into()),
                outcome: TaskOutcome::Succeeded,
            },
            FileTask {
                input: "in/b.flac".into(),
                output: None,
                outcome: TaskOutcome::Failed("corrupt".into()),
            },
        ];

        Reporter::new().generate_task_report(&tasks, &report).unwrap();

        let text = std::fs::read_to_string(&report).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(
            lines,
            vec![
                "input,output,outcome,message",
                "in/a.flac,out/a.mp3,succeeded,",
                "in/b.flac,,failed,corrupt",
            ]
        );
    }
}
