//! Drives whole runs: discovery, resolution and transcoding for batch
//! conversion, or cue parsing and track export for splitting.
//!
//! Runs execute on one background worker per [`Engine`]. The caller observes
//! them only through a progress channel (integer percentages, non-decreasing)
//! and a completion channel carrying the [`BatchResult`].

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, unbounded, Receiver};
use log::{debug, info, warn};

use crate::audio::buffer::AudioBuffer;
use crate::audio::decoder::AudioDecoder;
use crate::batch::config::{RunConfig, SplitConfig};
use crate::batch::discovery::{canonical_root, discover};
use crate::batch::resolver::{is_up_to_date, resolve};
use crate::batch::transcode::TranscodeEngine;
use crate::cue::parser::{self, CueTrack};
use crate::cue::splitter::split_tracks;
use crate::utils::file_ops::ensure_directory;
use crate::utils::reporting::{DiagnosticSink, FailureRecord, FileSink, CONVERSION_LOG, SPLIT_LOG};
use crate::{ConvertError, Result};

/// Identifier for failures that abort a whole run
pub const GENERAL_ERROR: &str = "General error";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    Pending,
    /// Output already present and overwriting was not requested
    Skipped,
    Succeeded,
    Failed(String),
}

impl TaskOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            TaskOutcome::Pending => "pending",
            TaskOutcome::Skipped => "skipped",
            TaskOutcome::Succeeded => "succeeded",
            TaskOutcome::Failed(_) => "failed",
        }
    }

    pub fn message(&self) -> Option<&str> {
        match self {
            TaskOutcome::Failed(message) => Some(message),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileTask {
    pub input: PathBuf,
    /// Unset when the output path could not be resolved
    pub output: Option<PathBuf>,
    pub outcome: TaskOutcome,
}

impl FileTask {
    pub fn new(input: PathBuf) -> Self {
        Self {
            input,
            output: None,
            outcome: TaskOutcome::Pending,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchResult {
    /// Every discovered file, in processing order (empty for splits)
    pub tasks: Vec<FileTask>,
    pub failures: Vec<FailureRecord>,
}

impl BatchResult {
    pub fn general_failure(message: impl Into<String>) -> Self {
        Self {
            tasks: Vec::new(),
            failures: vec![FailureRecord::new(GENERAL_ERROR, message)],
        }
    }

    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn succeeded(&self) -> usize {
        self.count(|o| matches!(o, TaskOutcome::Succeeded))
    }

    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, TaskOutcome::Skipped))
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, TaskOutcome::Failed(_)))
    }

    fn count(&self, predicate: impl Fn(&TaskOutcome) -> bool) -> usize {
        self.tasks.iter().filter(|t| predicate(&t.outcome)).count()
    }
}

/// `floor(completed / total * 100)`; an empty run counts as complete.
pub fn progress_percent(completed: usize, total: usize) -> u8 {
    if total == 0 {
        return 100;
    }
    (completed.min(total) * 100 / total) as u8
}

/// Convert every matching file under the source root, one at a time.
///
/// Only an invalid configuration is returned as an error. Per-file problems
/// end up as failed tasks, are recorded in `sink`, and never stop the batch.
pub fn run_conversion(
    config: &RunConfig,
    sink: &dyn DiagnosticSink,
    progress: &mut dyn FnMut(u8),
) -> Result<BatchResult> {
    config.validate()?;

    let config = RunConfig {
        source_root: canonical_root(&config.source_root),
        ..config.clone()
    };
    let files = discover(&config.source_root, &config.extensions);
    let total = files.len();
    info!(
        "Converting {} files under {} to {}",
        total,
        config.source_root.display(),
        config.profile
    );

    let engine = TranscodeEngine::new(config.ffmpeg.clone());
    let mut result = BatchResult::default();

    for (index, input) in files.into_iter().enumerate() {
        let task = convert_one(&engine, &config, input, sink);
        if let TaskOutcome::Failed(message) = &task.outcome {
            result
                .failures
                .push(FailureRecord::new(task.input.display().to_string(), message.clone()));
        }
        result.tasks.push(task);
        progress(progress_percent(index + 1, total));
    }

    info!(
        "Conversion finished: {} succeeded, {} skipped, {} failed",
        result.succeeded(),
        result.skipped(),
        result.failed()
    );
    Ok(result)
}

fn convert_one(engine: &TranscodeEngine, config: &RunConfig, input: PathBuf, sink: &dyn DiagnosticSink) -> FileTask {
    let mut task = FileTask::new(input);

    match process_task(engine, config, &mut task) {
        Ok(outcome) => {
            info!("{}: {}", task.input.display(), outcome.label());
            task.outcome = outcome;
        }
        Err(e) => {
            let identifier = task.input.display().to_string();
            warn!("{} failed: {}", identifier, e);
            sink.record(&identifier, &e);
            task.outcome = TaskOutcome::Failed(e.to_string());
        }
    }

    task
}

fn process_task(engine: &TranscodeEngine, config: &RunConfig, task: &mut FileTask) -> Result<TaskOutcome> {
    let resolution = resolve(&task.input, config)?;
    task.output = Some(resolution.output.clone());

    if is_up_to_date(&resolution, config) {
        debug!("{} already exists", resolution.output.display());
        return Ok(TaskOutcome::Skipped);
    }

    engine.transcode(&task.input, &resolution, &config.profile)?;
    Ok(TaskOutcome::Succeeded)
}

/// Split one audio image into per-track FLAC files.
///
/// Missing inputs, an uncreatable output folder, an unparsable cue sheet or
/// undecodable audio abort the split with a single general failure.
pub fn run_split(config: &SplitConfig, sink: &dyn DiagnosticSink, progress: &mut dyn FnMut(u8)) -> BatchResult {
    let (tracks, audio) = match prepare_split(config) {
        Ok(prepared) => prepared,
        Err(e) => {
            warn!("Split aborted: {}", e);
            sink.record(GENERAL_ERROR, &e);
            return BatchResult::general_failure(e.to_string());
        }
    };

    info!(
        "Splitting {} into {} tracks under {}",
        config.audio_file.display(),
        tracks.len(),
        config.output_dir.display()
    );

    BatchResult {
        tasks: Vec::new(),
        failures: split_tracks(&tracks, &audio, &config.output_dir, sink, progress),
    }
}

fn prepare_split(config: &SplitConfig) -> Result<(Vec<CueTrack>, AudioBuffer)> {
    if !config.cue_file.is_file() {
        return Err(ConvertError::CueStructural(format!(
            "Cue file not found: {}",
            config.cue_file.display()
        )));
    }
    if !config.audio_file.is_file() {
        return Err(ConvertError::CueStructural(format!(
            "Audio file not found: {}",
            config.audio_file.display()
        )));
    }
    ensure_directory(&config.output_dir).map_err(|e| {
        ConvertError::CueStructural(format!(
            "Cannot create output folder {}: {}",
            config.output_dir.display(),
            e
        ))
    })?;

    let tracks = parser::parse_file(&config.cue_file)?;
    let audio = AudioDecoder::new(config.ffmpeg.clone()).decode(&config.audio_file)?;
    Ok((tracks, audio))
}

/// Starts runs on a background worker, at most one at a time.
pub struct Engine {
    active: Arc<AtomicBool>,
    conversion_log: Arc<dyn DiagnosticSink>,
    split_log: Arc<dyn DiagnosticSink>,
}

impl Engine {
    /// Diagnostics go to `conversion_errors.log` and `cue_split_errors.log` in `log_dir`.
    pub fn new(log_dir: impl AsRef<Path>) -> Self {
        let log_dir = log_dir.as_ref();
        Self::with_sinks(
            Arc::new(FileSink::new(log_dir.join(CONVERSION_LOG))),
            Arc::new(FileSink::new(log_dir.join(SPLIT_LOG))),
        )
    }

    pub fn with_sinks(conversion_log: Arc<dyn DiagnosticSink>, split_log: Arc<dyn DiagnosticSink>) -> Self {
        Self {
            active: Arc::new(AtomicBool::new(false)),
            conversion_log,
            split_log,
        }
    }

    pub fn is_running(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    pub fn start_conversion(&self, config: RunConfig) -> Result<RunHandle> {
        let run = self.acquire()?;
        let sink = Arc::clone(&self.conversion_log);

        spawn_worker("audioconv-convert", run, move |progress| {
            run_conversion(&config, sink.as_ref(), progress).unwrap_or_else(|e| {
                sink.record(GENERAL_ERROR, &e);
                BatchResult::general_failure(e.to_string())
            })
        })
    }

    pub fn start_split(&self, config: SplitConfig) -> Result<RunHandle> {
        let run = self.acquire()?;
        let sink = Arc::clone(&self.split_log);

        spawn_worker("audioconv-split", run, move |progress| {
            run_split(&config, sink.as_ref(), progress)
        })
    }

    fn acquire(&self) -> Result<ActiveRun> {
        self.active
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| ConvertError::RunInProgress)?;
        Ok(ActiveRun(Arc::clone(&self.active)))
    }
}

/// Clears the engine's busy flag when dropped.
struct ActiveRun(Arc<AtomicBool>);

impl Drop for ActiveRun {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

fn spawn_worker<F>(name: &str, run: ActiveRun, job: F) -> Result<RunHandle>
where
    F: FnOnce(&mut dyn FnMut(u8)) -> BatchResult + Send + 'static,
{
    let (progress_tx, progress_rx) = unbounded();
    let (completion_tx, completion_rx) = bounded(1);

    let worker = thread::Builder::new().name(name.to_string()).spawn(move || {
        let result = job(&mut |percent| {
            let _ = progress_tx.send(percent);
        });
        drop(progress_tx);
        // Free the engine before announcing completion so the caller can start the next run
        drop(run);
        let _ = completion_tx.send(result);
    })?;

    Ok(RunHandle {
        progress: progress_rx,
        completion: completion_rx,
        worker,
    })
}

/// The caller's side of a running job.
pub struct RunHandle {
    progress: Receiver<u8>,
    completion: Receiver<BatchResult>,
    worker: JoinHandle<()>,
}

impl RunHandle {
    /// Percentages sent after each file or track; disconnects when the run ends.
    pub fn progress(&self) -> &Receiver<u8> {
        &self.progress
    }

    pub fn completion(&self) -> &Receiver<BatchResult> {
        &self.completion
    }

    /// Block until the run finishes.
    pub fn wait(self) -> BatchResult {
        let result = self
            .completion
            .recv()
            .unwrap_or_else(|_| BatchResult::general_failure("worker stopped without reporting a result"));
        let _ = self.worker.join();
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::reporting::MemorySink;
    use pretty_assertions::assert_eq;

    #[test]
    fn percentages_are_floored() {
        assert_eq!(progress_percent(1, 3), 33);
        assert_eq!(progress_percent(2, 3), 66);
        assert_eq!(progress_percent(3, 3), 100);
        assert_eq!(progress_percent(0, 0), 100);
    }

    #[test]
    fn a_second_run_is_rejected_while_one_is_active() {
        let sink = Arc::new(MemorySink::new());
        let engine = Engine::with_sinks(sink.clone(), sink);

        let run = engine.acquire().unwrap();
        assert!(engine.is_running());
        assert!(matches!(engine.acquire(), Err(ConvertError::RunInProgress)));

        drop(run);
        assert!(!engine.is_running());
        assert!(engine.acquire().is_ok());
    }

    #[test]
    fn outcome_counters() {
        let result = BatchResult {
            tasks: vec![
                FileTask {
                    input: "a".into(),
                    output: None,
                    outcome: TaskOutcome::Succeeded,
                },
                FileTask {
                    input: "b".into(),
                    output: None,
                    outcome: TaskOutcome::Skipped,
                },
                FileTask {
                    input: "c".into(),
                    output: None,
                    outcome: TaskOutcome::Failed("x".into()),
                },
            ],
            failures: vec![FailureRecord::new("c", "x")],
        };
        assert_eq!((result.succeeded(), result.skipped(), result.failed()), (1, 1, 1));
        assert!(!result.is_success());
    }

    #[test]
    fn missing_split_inputs_abort_with_one_general_failure() {
        let dir = tempfile::TempDir::new().unwrap();
        let sink = MemorySink::new();
        let config = SplitConfig::new(dir.path().join("none.cue"), dir.path().join("none.flac"), dir.path());

        let result = run_split(&config, &sink, &mut |_| {});

        assert_eq!(result.failures.len(), 1);
        assert_eq!(result.failures[0].identifier, GENERAL_ERROR);
        assert!(result.failures[0].message.starts_with("Cue file not found"));
        assert_eq!(sink.records().len(), 1);
    }
}
