#![allow(dead_code)]

use std::path::Path;

use audioconv::audio::encoder::{self, OutputFormat};
use audioconv::AudioBuffer;

/// A short two-tone test signal.
pub fn tone(rate: u32, channels: usize, frames: usize) -> AudioBuffer {
    let samples = (0..frames)
        .flat_map(|frame| {
            let t = frame as f32 / rate as f32;
            let value = 0.3 * (2.0 * std::f32::consts::PI * 440.0 * t).sin();
            std::iter::repeat(value).take(channels)
        })
        .collect();
    AudioBuffer::new(samples, rate, channels).with_bits_per_sample(Some(16))
}

pub fn write_flac(path: &Path, rate: u32, channels: usize, frames: usize) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    let bytes = encoder::encode(&tone(rate, channels, frames), OutputFormat::Flac, path).unwrap();
    std::fs::write(path, bytes).unwrap();
}

pub fn write_wav(path: &Path, rate: u32, seconds: u32) {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec).unwrap();
    for i in 0..rate * seconds {
        let t = i as f32 / rate as f32;
        let sample = (0.3 * (2.0 * std::f32::consts::PI * 220.0 * t).sin() * i16::MAX as f32) as i16;
        writer.write_sample(sample).unwrap();
    }
    writer.finalize().unwrap();
}
