use std::path::{Path, PathBuf};

use log::debug;

use crate::audio::buffer::AudioBuffer;
use crate::audio::decoder::AudioDecoder;
use crate::audio::encoder;
use crate::batch::config::TargetProfile;
use crate::batch::resolver::Resolution;
use crate::utils::file_ops::{ensure_directory, write_atomically};
use crate::{ConvertError, Result};

/// Decode, reshape and re-encode single files.
#[derive(Debug, Clone, Default)]
pub struct TranscodeEngine {
    decoder: AudioDecoder,
}

impl TranscodeEngine {
    pub fn new(ffmpeg: Option<PathBuf>) -> Self {
        Self {
            decoder: AudioDecoder::new(ffmpeg),
        }
    }

    /// Convert `input` to `profile` and write it to `resolution.output`.
    ///
    /// The input is decoded in full and the output encoded in memory before
    /// anything touches the destination, so converting a file onto itself is safe.
    pub fn transcode(&self, input: &Path, resolution: &Resolution, profile: &TargetProfile) -> Result<()> {
        let source = self.decoder.decode(input)?;
        debug!(
            "{}: {} Hz, {} ch -> {}",
            input.display(),
            source.sample_rate,
            source.channels,
            profile
        );

        let converted = apply_profile(source, profile)?;
        let bytes = encoder::encode(&converted, profile.output_format(), &resolution.output)?;

        if resolution.must_create_dirs {
            if let Some(dir) = resolution.output.parent() {
                ensure_directory(dir).map_err(|e| ConvertError::Resolution {
                    path: resolution.output.clone(),
                    reason: format!("cannot create {}: {}", dir.display(), e),
                })?;
            }
        }

        write_atomically(&resolution.output, &bytes)
    }
}

/// Resample, then remix, then tag the target bit depth (quantization happens in the encoder).
pub fn apply_profile(buffer: AudioBuffer, profile: &TargetProfile) -> Result<AudioBuffer> {
    let buffer = buffer
        .resample(profile.sample_rate())?
        .remix(profile.channels())
        .with_bits_per_sample(Some(profile.bits_per_sample()));
    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::encoder::OutputFormat;
    use crate::batch::config::{Bitrate, SampleRate};
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn write_flac(path: &Path, channels: usize, rate: u32, frames: usize) {
        let samples = (0..frames * channels).map(|i| ((i % 50) as f32 / 50.0) - 0.5).collect();
        let buffer = AudioBuffer::new(samples, rate, channels).with_bits_per_sample(Some(16));
        std::fs::write(path, encoder::encode(&buffer, OutputFormat::Flac, path).unwrap()).unwrap();
    }

    #[test]
    fn profile_reshapes_rate_and_layout() {
        let buffer = AudioBuffer::new(vec![0.1; 48000 * 2], 48000, 2);
        let shaped = apply_profile(buffer, &TargetProfile::Special).unwrap();
        assert_eq!(shaped.sample_rate, 8000);
        assert_eq!(shaped.channels, 1);
        assert_eq!(shaped.frames(), 8000);
        assert_eq!(shaped.bits_per_sample, Some(8));
    }

    #[test]
    fn special_profile_writes_mulaw_wav() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("in.flac");
        write_flac(&input, 2, 44100, 44100);

        let resolution = Resolution {
            output: dir.path().join("nested/out.wav"),
            must_create_dirs: true,
        };
        TranscodeEngine::default()
            .transcode(&input, &resolution, &TargetProfile::Special)
            .unwrap();

        let wav = std::fs::read(&resolution.output).unwrap();
        assert_eq!(&wav[8..12], b"WAVE");
        assert_eq!(u16::from_le_bytes([wav[20], wav[21]]), 7);
        assert_eq!(u16::from_le_bytes([wav[22], wav[23]]), 1);
        assert_eq!(u32::from_le_bytes([wav[24], wav[25], wav[26], wav[27]]), 8000);
        assert_eq!(u16::from_le_bytes([wav[34], wav[35]]), 8);
    }

    #[test]
    fn standard_profile_writes_stereo_mp3_at_the_chosen_rate() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("mono.flac");
        write_flac(&input, 1, 44100, 22050);

        let resolution = Resolution {
            output: dir.path().join("mono.mp3"),
            must_create_dirs: false,
        };
        let profile = TargetProfile::Standard {
            bitrate: Bitrate::Kbps128,
            sample_rate: SampleRate::Hz22050,
        };
        TranscodeEngine::default().transcode(&input, &resolution, &profile).unwrap();

        let decoded = AudioDecoder::default().decode(&resolution.output).unwrap();
        assert_eq!(decoded.sample_rate, 22050);
        assert_eq!(decoded.channels, 2);
    }

    #[test]
    fn failed_decode_leaves_existing_output_untouched() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("corrupt.flac");
        std::fs::write(&input, b"not audio at all").unwrap();

        let resolution = Resolution {
            output: input.clone(),
            must_create_dirs: false,
        };
        let err = TranscodeEngine::default()
            .transcode(&input, &resolution, &TargetProfile::Special)
            .unwrap_err();

        assert!(matches!(err, ConvertError::Decode { .. }));
        assert_eq!(std::fs::read(&input).unwrap(), b"not audio at all");
    }
}
