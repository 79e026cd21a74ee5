use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::batch::config::{
    Bitrate, DestinationMode, RunConfig, SampleRate, SplitConfig, TargetProfile, SUPPORTED_EXTENSIONS,
};

#[derive(Parser)]
#[command(name = "audioconv")]
#[command(version = "1.0")]
#[command(about = "Batch audio converter and cue sheet splitter", long_about = None)]
pub struct Cli {
    /// Folder that receives conversion_errors.log and cue_split_errors.log
    #[arg(long = "log-dir", global = true, default_value = ".")]
    pub log_dir: PathBuf,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Convert every matching file under a folder
    Convert {
        /// Folder to scan recursively
        #[arg(short = 'i', long = "input")]
        input: PathBuf,

        /// Mirror the source tree under this folder
        #[arg(short = 'd', long = "dest", required_unless_present = "overwrite")]
        dest: Option<PathBuf>,

        /// Replace each source file in place
        #[arg(long, conflicts_with = "dest")]
        overwrite: bool,

        /// File extensions to convert
        #[arg(
            short = 'e',
            long = "ext",
            value_delimiter = ',',
            value_parser = SUPPORTED_EXTENSIONS,
            default_values = SUPPORTED_EXTENSIONS
        )]
        extensions: Vec<String>,

        /// MP3 bitrate (128k, 192k or 320k)
        #[arg(short = 'b', long, default_value = "192k")]
        bitrate: Bitrate,

        /// Output sample rate (22050, 44100 or 48000)
        #[arg(short = 'r', long = "sample-rate", default_value = "44100")]
        sample_rate: SampleRate,

        /// Write 8000 Hz mono µ-law WAV instead of MP3
        #[arg(long = "special-profile")]
        special_profile: bool,

        #[command(flatten)]
        decoder: DecoderArgs,

        /// Write a per-file CSV report here
        #[arg(long)]
        report: Option<PathBuf>,
    },

    /// Split one audio image into FLAC tracks using its cue sheet
    Split {
        /// Cue sheet
        #[arg(short = 'c', long)]
        cue: PathBuf,

        /// Audio image the cue sheet describes
        #[arg(short = 'a', long)]
        audio: PathBuf,

        /// Folder for the track files
        #[arg(short = 'o', long)]
        output: PathBuf,

        #[command(flatten)]
        decoder: DecoderArgs,
    },
}

#[derive(clap::Args)]
pub struct DecoderArgs {
    /// ffmpeg binary used for files the built-in decoders cannot read
    #[arg(long, default_value = "ffmpeg")]
    pub ffmpeg: PathBuf,

    /// Never fall back to ffmpeg
    #[arg(long = "no-ffmpeg")]
    pub no_ffmpeg: bool,
}

impl DecoderArgs {
    pub fn ffmpeg_path(&self) -> Option<PathBuf> {
        (!self.no_ffmpeg).then(|| self.ffmpeg.clone())
    }
}

impl Commands {
    /// Build the run configuration for a `convert` invocation.
    pub fn run_config(&self) -> Option<RunConfig> {
        let Commands::Convert {
            input,
            dest,
            overwrite,
            extensions,
            bitrate,
            sample_rate,
            special_profile,
            decoder,
            ..
        } = self
        else {
            return None;
        };

        let destination = match dest {
            Some(dest) if !overwrite => DestinationMode::CopyToFolder(dest.clone()),
            _ => DestinationMode::Overwrite,
        };
        let profile = if *special_profile {
            TargetProfile::Special
        } else {
            TargetProfile::Standard {
                bitrate: *bitrate,
                sample_rate: *sample_rate,
            }
        };

        Some(
            RunConfig::new(input, destination, profile)
                .with_extensions(extensions.iter().cloned())
                .with_ffmpeg(decoder.ffmpeg_path()),
        )
    }

    /// Build the split configuration for a `split` invocation.
    pub fn split_config(&self) -> Option<SplitConfig> {
        match self {
            Commands::Split {
                cue,
                audio,
                output,
                decoder,
            } => Some(SplitConfig::new(cue, audio, output).with_ffmpeg(decoder.ffmpeg_path())),
            _ => None,
        }
    }
}
