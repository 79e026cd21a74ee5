use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::Command;

use log::{debug, trace};
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use crate::audio::buffer::AudioBuffer;
use crate::{ConvertError, Result};

/// Decodes whole files into memory.
///
/// Containers symphonia can demux (M4A/AAC, FLAC, WAV, MP3) are decoded
/// in-process. Anything it cannot probe, WavPack in particular, is handed to
/// ffmpeg when a binary is configured.
#[derive(Debug, Clone, Default)]
pub struct AudioDecoder {
    ffmpeg: Option<PathBuf>,
}

impl AudioDecoder {
    pub fn new(ffmpeg: Option<PathBuf>) -> Self {
        Self { ffmpeg }
    }

    /// Decode `path` completely. The source file is closed before this returns.
    pub fn decode(&self, path: &Path) -> Result<AudioBuffer> {
        let file = File::open(path).map_err(|e| decode_error(path, format!("Failed to open file: {}", e)))?;
        let mss = MediaSourceStream::new(Box::new(file), Default::default());

        let mut hint = Hint::new();
        if let Some(extension) = path.extension().and_then(|e| e.to_str()) {
            hint.with_extension(extension);
        }

        let probed = symphonia::default::get_probe()
            .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default());

        match probed {
            Ok(probed) => decode_format(path, probed.format),
            Err(e) => match &self.ffmpeg {
                Some(ffmpeg) => {
                    debug!("symphonia cannot probe {} ({}), trying ffmpeg", path.display(), e);
                    decode_with_ffmpeg(ffmpeg, path)
                }
                None => Err(decode_error(path, format!("Unsupported or corrupt container: {}", e))),
            },
        }
    }
}

fn decode_error(path: &Path, reason: String) -> ConvertError {
    ConvertError::Decode {
        path: path.to_path_buf(),
        reason,
    }
}

fn decode_format(path: &Path, mut format: Box<dyn FormatReader>) -> Result<AudioBuffer> {
    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| decode_error(path, "No audio tracks found".to_string()))?;

    let track_id = track.id;
    let codec_params = track.codec_params.clone();

    let mut decoder = symphonia::default::get_codecs()
        .make(&codec_params, &DecoderOptions::default())
        .map_err(|e| decode_error(path, format!("Unsupported codec: {}", e)))?;

    let mut sample_rate = codec_params.sample_rate;
    let mut channels = codec_params.channels.map(|c| c.count());
    let mut samples: Vec<f32> = Vec::new();

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => return Err(decode_error(path, format!("Failed to read packet: {}", e))),
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(SymphoniaError::DecodeError(e)) => {
                trace!("Skipping corrupted frame in {}: {}", path.display(), e);
                continue;
            }
            Err(e) => return Err(decode_error(path, format!("Decode error: {}", e))),
        };

        let spec = *decoded.spec();
        sample_rate = Some(spec.rate);
        channels = Some(spec.channels.count());

        let mut sample_buf = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
        sample_buf.copy_interleaved_ref(decoded);
        samples.extend_from_slice(sample_buf.samples());
    }

    let (Some(sample_rate), Some(channels)) = (sample_rate, channels) else {
        return Err(decode_error(path, "Stream has no sample rate or channel layout".to_string()));
    };
    if samples.is_empty() {
        return Err(decode_error(path, "No audio frames could be decoded".to_string()));
    }

    let buffer = AudioBuffer::new(samples, sample_rate, channels)
        .with_bits_per_sample(codec_params.bits_per_sample);

    debug!(
        "Decoded {} ({} Hz, {} channels, {} ms)",
        path.display(),
        buffer.sample_rate,
        buffer.channels,
        buffer.duration_ms()
    );

    Ok(buffer)
}

/// Render `path` to a temporary float WAV with ffmpeg, then decode that.
fn decode_with_ffmpeg(ffmpeg: &Path, path: &Path) -> Result<AudioBuffer> {
    let staged = tempfile::Builder::new()
        .prefix("audioconv-")
        .suffix(".wav")
        .tempfile()?;

    let output = Command::new(ffmpeg)
        .arg("-v")
        .arg("error")
        .arg("-nostdin")
        .arg("-y")
        .arg("-i")
        .arg(path)
        .arg("-vn")
        .arg("-c:a")
        .arg("pcm_f32le")
        .arg("-f")
        .arg("wav")
        .arg(staged.path())
        .output()
        .map_err(|e| decode_error(path, format!("Failed to spawn ffmpeg: {}", e)))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(decode_error(
            path,
            format!(
                "ffmpeg exited with status {}: {}",
                output.status,
                stderr.lines().last().unwrap_or("Unknown error")
            ),
        ));
    }

    let file = File::open(staged.path())?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());
    let mut hint = Hint::new();
    hint.with_extension("wav");

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .map_err(|e| decode_error(path, format!("Cannot read ffmpeg output: {}", e)))?;

    decode_format(path, probed.format)
}
