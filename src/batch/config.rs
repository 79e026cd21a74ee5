use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::audio::encoder::OutputFormat;
use crate::{ConvertError, Result};

/// Extensions the converter is offered for
pub const SUPPORTED_EXTENSIONS: [&str; 3] = [".m4a", ".flac", ".wv"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Bitrate {
    Kbps128,
    Kbps192,
    Kbps320,
}

impl Bitrate {
    pub fn kbps(&self) -> u32 {
        match self {
            Bitrate::Kbps128 => 128,
            Bitrate::Kbps192 => 192,
            Bitrate::Kbps320 => 320,
        }
    }

    pub fn lame_bitrate(&self) -> mp3lame_encoder::Bitrate {
        match self {
            Bitrate::Kbps128 => mp3lame_encoder::Bitrate::Kbps128,
            Bitrate::Kbps192 => mp3lame_encoder::Bitrate::Kbps192,
            Bitrate::Kbps320 => mp3lame_encoder::Bitrate::Kbps320,
        }
    }
}

impl FromStr for Bitrate {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "128k" => Ok(Bitrate::Kbps128),
            "192k" => Ok(Bitrate::Kbps192),
            "320k" => Ok(Bitrate::Kbps320),
            other => Err(format!("unsupported bitrate '{}' (expected 128k, 192k or 320k)", other)),
        }
    }
}

impl fmt::Display for Bitrate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}k", self.kbps())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SampleRate {
    Hz22050,
    Hz44100,
    Hz48000,
}

impl SampleRate {
    pub fn hz(&self) -> u32 {
        match self {
            SampleRate::Hz22050 => 22_050,
            SampleRate::Hz44100 => 44_100,
            SampleRate::Hz48000 => 48_000,
        }
    }
}

impl FromStr for SampleRate {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().parse::<u32>() {
            Ok(22_050) => Ok(SampleRate::Hz22050),
            Ok(44_100) => Ok(SampleRate::Hz44100),
            Ok(48_000) => Ok(SampleRate::Hz48000),
            _ => Err(format!("unsupported sample rate '{}' (expected 22050, 44100 or 48000)", s)),
        }
    }
}

impl fmt::Display for SampleRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.hz())
    }
}

/// What every converted file is turned into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetProfile {
    /// Stereo 16-bit MP3 at a chosen bitrate and sample rate
    Standard { bitrate: Bitrate, sample_rate: SampleRate },
    /// Fixed telephony-grade output: 8000 Hz mono 8-bit µ-law in WAV
    Special,
}

impl TargetProfile {
    pub const SPECIAL_SAMPLE_RATE: u32 = 8_000;

    pub fn sample_rate(&self) -> u32 {
        match self {
            TargetProfile::Standard { sample_rate, .. } => sample_rate.hz(),
            TargetProfile::Special => Self::SPECIAL_SAMPLE_RATE,
        }
    }

    pub fn channels(&self) -> usize {
        match self {
            TargetProfile::Standard { .. } => 2,
            TargetProfile::Special => 1,
        }
    }

    pub fn bits_per_sample(&self) -> u32 {
        match self {
            TargetProfile::Standard { .. } => 16,
            TargetProfile::Special => 8,
        }
    }

    /// Extension (without the dot) given to outputs in copy mode
    pub fn extension(&self) -> &'static str {
        match self {
            TargetProfile::Standard { .. } => "mp3",
            TargetProfile::Special => "wav",
        }
    }

    pub fn output_format(&self) -> OutputFormat {
        match self {
            TargetProfile::Standard { bitrate, .. } => OutputFormat::Mp3(*bitrate),
            TargetProfile::Special => OutputFormat::MulawWav,
        }
    }
}

impl fmt::Display for TargetProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetProfile::Standard { bitrate, sample_rate } => {
                write!(f, "MP3 {} @ {} Hz stereo", bitrate, sample_rate)
            }
            TargetProfile::Special => write!(f, "WAV µ-law 8000 Hz mono"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DestinationMode {
    /// Replace each source file with its converted version
    Overwrite,
    /// Mirror the source tree under this root
    CopyToFolder(PathBuf),
}

/// Parameters for one batch conversion run.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub source_root: PathBuf,
    pub destination: DestinationMode,
    /// Case-sensitive filename suffixes, e.g. `.flac`
    pub extensions: BTreeSet<String>,
    pub profile: TargetProfile,
    /// ffmpeg binary used for inputs symphonia cannot read
    pub ffmpeg: Option<PathBuf>,
}

impl RunConfig {
    pub fn new(source_root: impl Into<PathBuf>, destination: DestinationMode, profile: TargetProfile) -> Self {
        Self {
            source_root: source_root.into(),
            destination,
            extensions: SUPPORTED_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
            profile,
            ffmpeg: None,
        }
    }

    pub fn with_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extensions = extensions.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_ffmpeg(mut self, ffmpeg: Option<PathBuf>) -> Self {
        self.ffmpeg = ffmpeg;
        self
    }

    pub fn overwrite(&self) -> bool {
        matches!(self.destination, DestinationMode::Overwrite)
    }

    pub fn validate(&self) -> Result<()> {
        if self.extensions.is_empty() || self.extensions.iter().any(|e| e.is_empty()) {
            return Err(ConvertError::InvalidConfig("at least one file extension must be selected".into()));
        }
        if !self.source_root.is_dir() {
            return Err(ConvertError::InvalidConfig(format!(
                "source folder {} does not exist",
                self.source_root.display()
            )));
        }
        if let DestinationMode::CopyToFolder(root) = &self.destination {
            if root.as_os_str().is_empty() {
                return Err(ConvertError::InvalidConfig("a destination folder is required".into()));
            }
        }
        Ok(())
    }
}

/// Parameters for splitting one audio image by its cue sheet.
#[derive(Debug, Clone)]
pub struct SplitConfig {
    pub cue_file: PathBuf,
    pub audio_file: PathBuf,
    pub output_dir: PathBuf,
    pub ffmpeg: Option<PathBuf>,
}

impl SplitConfig {
    pub fn new(cue_file: impl Into<PathBuf>, audio_file: impl Into<PathBuf>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            cue_file: cue_file.into(),
            audio_file: audio_file.into(),
            output_dir: output_dir.into(),
            ffmpeg: None,
        }
    }

    pub fn with_ffmpeg(mut self, ffmpeg: Option<PathBuf>) -> Self {
        self.ffmpeg = ffmpeg;
        self
    }
}
