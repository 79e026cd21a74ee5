use std::path::PathBuf;

pub mod audio;
pub mod batch;
pub mod cli;
pub mod cue;
pub mod utils;

#[derive(Debug, thiserror::Error)]
pub enum ConvertError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Cannot read {}: {reason}", .path.display())]
    Discovery { path: PathBuf, reason: String },
    #[error("Cannot resolve output for {}: {reason}", .path.display())]
    Resolution { path: PathBuf, reason: String },
    #[error("Failed to decode {}: {reason}", .path.display())]
    Decode { path: PathBuf, reason: String },
    #[error("Failed to encode {}: {reason}", .path.display())]
    Encode { path: PathBuf, reason: String },
    #[error("Resampling failed: {0}")]
    Resample(String),
    #[error("Cue syntax error on line {line}: {reason}")]
    CueSyntax { line: usize, reason: String },
    #[error("{0}")]
    CueStructural(String),
    #[error("Cannot split track {number}: {reason}")]
    TrackBounds { number: u32, reason: String },
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("A run is already in progress")]
    RunInProgress,
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

pub type Result<T> = std::result::Result<T, ConvertError>;

// Re-exports for convenience
pub use audio::buffer::AudioBuffer;
pub use batch::config::{Bitrate, DestinationMode, RunConfig, SampleRate, SplitConfig, TargetProfile};
pub use batch::runner::{BatchResult, Engine, FileTask, RunHandle, TaskOutcome};
pub use cue::parser::CueTrack;
pub use utils::reporting::{DiagnosticSink, FailureRecord, FileSink, MemorySink};
