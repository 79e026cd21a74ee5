use std::path::Path;

use flacenc::bitsink::ByteSink;
use flacenc::component::BitRepr;
use flacenc::error::Verify;
use flacenc::source::MemSource;
use log::warn;
use mp3lame_encoder::{max_required_buffer_size, Builder, FlushNoGap, InterleavedPcm, Quality};

use crate::audio::buffer::AudioBuffer;
use crate::batch::config::Bitrate;
use crate::{ConvertError, Result};

/// Interleaved samples handed to LAME per call (about half a second of stereo at 48 kHz).
const MP3_CHUNK_SAMPLES: usize = 1152 * 40;

/// Bytes LAME may emit when flushing its final frames
const MP3_FLUSH_RESERVE: usize = 7200;

/// MPEG-2 Layer III (16 to 24 kHz) tops out at 160 kbps
const MPEG2_MAX_KBPS: u32 = 160;

const WAVE_FORMAT_MULAW: u16 = 0x0007;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// MPEG-1/2 Layer III at a constant bitrate, stereo input expected
    Mp3(Bitrate),
    /// RIFF/WAVE carrying 8-bit G.711 µ-law
    MulawWav,
    /// Lossless FLAC at the buffer's native rate and layout
    Flac,
}

/// Encode the whole buffer into an in-memory file image.
///
/// `path` is the intended destination and only appears in error messages.
pub fn encode(buffer: &AudioBuffer, format: OutputFormat, path: &Path) -> Result<Vec<u8>> {
    if buffer.samples.is_empty() {
        return Err(encode_error(path, "No audio to encode".to_string()));
    }

    match format {
        OutputFormat::Mp3(bitrate) => encode_mp3(buffer, bitrate),
        OutputFormat::MulawWav => encode_mulaw_wav(buffer),
        OutputFormat::Flac => encode_flac(buffer),
    }
    .map_err(|reason| encode_error(path, reason))
}

fn encode_error(path: &Path, reason: String) -> ConvertError {
    ConvertError::Encode {
        path: path.to_path_buf(),
        reason,
    }
}

fn encode_mp3(buffer: &AudioBuffer, bitrate: Bitrate) -> std::result::Result<Vec<u8>, String> {
    if buffer.channels != 2 {
        return Err(format!("MP3 output expects stereo input, got {} channels", buffer.channels));
    }

    let effective = effective_mp3_kbps(bitrate, buffer.sample_rate);
    if effective != bitrate.kbps() {
        warn!(
            "{} is not available at {} Hz, LAME will encode at {}k",
            bitrate, buffer.sample_rate, effective
        );
    }

    let mut builder = Builder::new().ok_or("Failed to create LAME encoder builder")?;
    builder
        .set_num_channels(2)
        .map_err(|e| format!("Failed to set channel count: {:?}", e))?;
    builder
        .set_sample_rate(buffer.sample_rate)
        .map_err(|e| format!("Failed to set sample rate {}: {:?}", buffer.sample_rate, e))?;
    builder
        .set_brate(bitrate.lame_bitrate())
        .map_err(|e| format!("Failed to set bitrate {}: {:?}", bitrate, e))?;
    builder
        .set_quality(Quality::Best)
        .map_err(|e| format!("Failed to set encoding quality: {:?}", e))?;
    let mut lame = builder
        .build()
        .map_err(|e| format!("Failed to build LAME encoder: {:?}", e))?;

    let pcm = buffer.to_i16();
    let mut mp3: Vec<u8> = Vec::with_capacity(max_required_buffer_size(pcm.len() / 2));

    for chunk in pcm.chunks(MP3_CHUNK_SAMPLES) {
        mp3.reserve(max_required_buffer_size(chunk.len() / 2));
        let written = lame
            .encode(InterleavedPcm(chunk), mp3.spare_capacity_mut())
            .map_err(|e| format!("LAME encoding error: {:?}", e))?;
        // SAFETY: LAME initialised exactly `written` bytes of the spare capacity.
        unsafe {
            mp3.set_len(mp3.len() + written);
        }
    }

    mp3.reserve(MP3_FLUSH_RESERVE);
    let written = lame
        .flush::<FlushNoGap>(mp3.spare_capacity_mut())
        .map_err(|e| format!("LAME flush error: {:?}", e))?;
    // SAFETY: as above.
    unsafe {
        mp3.set_len(mp3.len() + written);
    }

    Ok(mp3)
}

/// Bitrate LAME actually uses for `bitrate` at `sample_rate`.
pub fn effective_mp3_kbps(bitrate: Bitrate, sample_rate: u32) -> u32 {
    if sample_rate < 32_000 {
        bitrate.kbps().min(MPEG2_MAX_KBPS)
    } else {
        bitrate.kbps()
    }
}

fn encode_mulaw_wav(buffer: &AudioBuffer) -> std::result::Result<Vec<u8>, String> {
    let data = buffer.to_mulaw();
    let pad = data.len() % 2;
    let channels = buffer.channels as u16;

    // RIFF size counts everything after the 8-byte RIFF header
    let riff_len = 4 + (8 + 18) + (8 + 4) + 8 + data.len() + pad;
    let riff_len = u32::try_from(riff_len).map_err(|_| "Audio too long for a WAV container".to_string())?;
    let frames = buffer.frames() as u32;

    let mut out = Vec::with_capacity(riff_len as usize + 8);
    out.extend_from_slice(b"RIFF");
    out.extend_from_slice(&riff_len.to_le_bytes());
    out.extend_from_slice(b"WAVE");

    out.extend_from_slice(b"fmt ");
    out.extend_from_slice(&18u32.to_le_bytes());
    out.extend_from_slice(&WAVE_FORMAT_MULAW.to_le_bytes());
    out.extend_from_slice(&channels.to_le_bytes());
    out.extend_from_slice(&buffer.sample_rate.to_le_bytes());
    out.extend_from_slice(&(buffer.sample_rate * channels as u32).to_le_bytes());
    out.extend_from_slice(&channels.to_le_bytes());
    out.extend_from_slice(&8u16.to_le_bytes());
    out.extend_from_slice(&0u16.to_le_bytes());

    // Non-PCM formats carry a fact chunk with the frame count
    out.extend_from_slice(b"fact");
    out.extend_from_slice(&4u32.to_le_bytes());
    out.extend_from_slice(&frames.to_le_bytes());

    out.extend_from_slice(b"data");
    out.extend_from_slice(&(data.len() as u32).to_le_bytes());
    out.extend_from_slice(&data);
    if pad == 1 {
        out.push(0);
    }

    Ok(out)
}

/// FLAC bit depth for a source depth: 8, 16 or 24.
pub fn flac_bits_per_sample(source_bits: Option<u32>) -> u32 {
    match source_bits {
        Some(bits) if bits <= 8 => 8,
        Some(bits) if bits <= 16 => 16,
        Some(_) => 24,
        None => 16,
    }
}

fn encode_flac(buffer: &AudioBuffer) -> std::result::Result<Vec<u8>, String> {
    let bits = flac_bits_per_sample(buffer.bits_per_sample);
    let samples = buffer.to_i32(bits);

    let config = flacenc::config::Encoder::default()
        .into_verified()
        .map_err(|(_, e)| format!("Invalid FLAC encoder configuration: {:?}", e))?;
    let source = MemSource::from_samples(
        &samples,
        buffer.channels,
        bits as usize,
        buffer.sample_rate as usize,
    );
    let stream = flacenc::encode_with_fixed_block_size(&config, source, config.block_size)
        .map_err(|e| format!("FLAC encoding error: {:?}", e))?;

    let mut sink = ByteSink::new();
    stream
        .write(&mut sink)
        .map_err(|_| "Failed to serialise FLAC stream".to_string())?;

    Ok(sink.as_slice().to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::decoder::AudioDecoder;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn sine(frames: usize, channels: usize, rate: u32) -> AudioBuffer {
        let samples = (0..frames)
            .flat_map(|i| {
                let s = (i as f32 * 440.0 * std::f32::consts::TAU / rate as f32).sin() * 0.5;
                std::iter::repeat(s).take(channels)
            })
            .collect();
        AudioBuffer::new(samples, rate, channels)
    }

    fn u16_at(bytes: &[u8], offset: usize) -> u16 {
        u16::from_le_bytes([bytes[offset], bytes[offset + 1]])
    }

    fn u32_at(bytes: &[u8], offset: usize) -> u32 {
        u32::from_le_bytes([bytes[offset], bytes[offset + 1], bytes[offset + 2], bytes[offset + 3]])
    }

    #[test]
    fn mulaw_wav_header_describes_the_payload() {
        let buffer = sine(801, 1, 8000);
        let wav = encode(&buffer, OutputFormat::MulawWav, Path::new("out.wav")).unwrap();

        assert_eq!(&wav[0..4], b"RIFF");
        assert_eq!(u32_at(&wav, 4) as usize, wav.len() - 8);
        assert_eq!(&wav[8..12], b"WAVE");
        assert_eq!(u16_at(&wav, 20), WAVE_FORMAT_MULAW);
        assert_eq!(u16_at(&wav, 22), 1);
        assert_eq!(u32_at(&wav, 24), 8000);
        assert_eq!(u16_at(&wav, 34), 8);
        assert_eq!(&wav[38..42], b"fact");
        assert_eq!(u32_at(&wav, 46), 801);
        assert_eq!(&wav[50..54], b"data");
        assert_eq!(u32_at(&wav, 54), 801);
        // odd payload is padded to an even chunk size
        assert_eq!(wav.len(), 58 + 802);
    }

    #[test]
    fn flac_output_decodes_back_to_the_same_shape() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("slice.flac");
        let buffer = sine(4410, 2, 44100).with_bits_per_sample(Some(16));

        let bytes = encode(&buffer, OutputFormat::Flac, &path).unwrap();
        assert_eq!(&bytes[0..4], b"fLaC");
        std::fs::write(&path, bytes).unwrap();

        let decoded = AudioDecoder::default().decode(&path).unwrap();
        assert_eq!(decoded.sample_rate, 44100);
        assert_eq!(decoded.channels, 2);
        assert_eq!(decoded.frames(), 4410);
    }

    #[test]
    fn mp3_output_is_decodable() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("song.mp3");
        let buffer = sine(22050, 2, 22050);

        let bytes = encode(&buffer, OutputFormat::Mp3(Bitrate::Kbps128), &path).unwrap();
        std::fs::write(&path, bytes).unwrap();

        let decoded = AudioDecoder::default().decode(&path).unwrap();
        assert_eq!(decoded.sample_rate, 22050);
        assert_eq!(decoded.channels, 2);
        assert!(decoded.frames() >= 22050);
    }

    #[test]
    fn low_sample_rates_cap_the_mp3_bitrate() {
        assert_eq!(effective_mp3_kbps(Bitrate::Kbps320, 22050), 160);
        assert_eq!(effective_mp3_kbps(Bitrate::Kbps128, 22050), 128);
        assert_eq!(effective_mp3_kbps(Bitrate::Kbps320, 44100), 320);
        assert_eq!(effective_mp3_kbps(Bitrate::Kbps320, 48000), 320);
    }

    #[test]
    fn mp3_rejects_mono_input() {
        let buffer = sine(100, 1, 44100);
        let err = encode(&buffer, OutputFormat::Mp3(Bitrate::Kbps192), Path::new("x.mp3")).unwrap_err();
        assert!(matches!(err, ConvertError::Encode { .. }));
    }

    #[test]
    fn empty_buffers_are_rejected() {
        let buffer = AudioBuffer::new(Vec::new(), 8000, 1);
        assert!(encode(&buffer, OutputFormat::Flac, Path::new("x.flac")).is_err());
    }

    #[test]
    fn flac_depth_follows_the_source() {
        assert_eq!(flac_bits_per_sample(None), 16);
        assert_eq!(flac_bits_per_sample(Some(8)), 8);
        assert_eq!(flac_bits_per_sample(Some(24)), 24);
        assert_eq!(flac_bits_per_sample(Some(32)), 24);
    }
}
