//! Decoded PCM held in memory, and the conversions applied to it before
//! encoding: resampling, channel remixing, and sample-format quantization.

use crate::{ConvertError, Result};
use log::debug;
use rubato::{FftFixedInOut, Resampler};

/// Frames handed to the resampler per call
const RESAMPLE_CHUNK: usize = 1024;

const MULAW_BIAS: i32 = 0x84;
const MULAW_CLIP: i32 = 32635;

/// Interleaved `f32` samples in the range [-1.0, 1.0]
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub channels: usize,
    /// Bit depth reported by the source codec, when it has one
    pub bits_per_sample: Option<u32>,
}

impl AudioBuffer {
    pub fn new(samples: Vec<f32>, sample_rate: u32, channels: usize) -> Self {
        Self {
            samples,
            sample_rate,
            channels,
            bits_per_sample: None,
        }
    }

    pub fn with_bits_per_sample(mut self, bits: Option<u32>) -> Self {
        self.bits_per_sample = bits;
        self
    }

    pub fn frames(&self) -> usize {
        if self.channels == 0 {
            0
        } else {
            self.samples.len() / self.channels
        }
    }

    pub fn duration_ms(&self) -> u64 {
        if self.sample_rate == 0 {
            return 0;
        }
        self.frames() as u64 * 1000 / self.sample_rate as u64
    }

    /// Frame index for a millisecond offset, clamped to the end of the buffer.
    pub fn frame_at_ms(&self, ms: u64) -> usize {
        let frame = ms.saturating_mul(self.sample_rate as u64) / 1000;
        frame.min(self.frames() as u64) as usize
    }

    /// Copy out `[start_ms, end_ms)`, or to the end of the buffer when `end_ms` is `None`.
    pub fn slice_ms(&self, start_ms: u64, end_ms: Option<u64>) -> AudioBuffer {
        let start = self.frame_at_ms(start_ms);
        let end = end_ms
            .map_or(self.frames(), |ms| self.frame_at_ms(ms))
            .max(start);

        AudioBuffer {
            samples: self.samples[start * self.channels..end * self.channels].to_vec(),
            sample_rate: self.sample_rate,
            channels: self.channels,
            bits_per_sample: self.bits_per_sample,
        }
    }

    /// Resample every channel to `target_rate` using an FFT resampler.
    pub fn resample(self, target_rate: u32) -> Result<AudioBuffer> {
        if self.sample_rate == target_rate || self.samples.is_empty() {
            return Ok(AudioBuffer {
                sample_rate: target_rate,
                ..self
            });
        }
        if self.sample_rate == 0 || target_rate == 0 || self.channels == 0 {
            return Err(ConvertError::Resample(format!(
                "cannot resample {} Hz to {} Hz",
                self.sample_rate, target_rate
            )));
        }

        let frames = self.frames();
        let mut resampler = FftFixedInOut::<f32>::new(
            self.sample_rate as usize,
            target_rate as usize,
            RESAMPLE_CHUNK,
            self.channels,
        )
        .map_err(|e| ConvertError::Resample(e.to_string()))?;

        let chunk_in = resampler.input_frames_next();
        let ratio = target_rate as f64 / self.sample_rate as f64;
        let expected = (frames as f64 * ratio).round() as usize;

        debug!(
            "Resampling {} frames from {} Hz to {} Hz",
            frames, self.sample_rate, target_rate
        );

        let planar = self.deinterleave();
        let delay = resampler.output_delay();
        let needed = expected + delay;
        let mut output: Vec<Vec<f32>> = vec![Vec::with_capacity(needed + chunk_in); self.channels];

        // Keep feeding (zero padding past the end) until the delayed tail has come out
        let mut pos = 0;
        while output.first().map_or(0, Vec::len) < needed {
            let start = pos.min(frames);
            let end = (pos + chunk_in).min(frames);
            let block: Vec<Vec<f32>> = planar
                .iter()
                .map(|channel| {
                    let mut chunk = channel[start..end].to_vec();
                    chunk.resize(chunk_in, 0.0);
                    chunk
                })
                .collect();

            let processed = resampler
                .process(&block, None)
                .map_err(|e| ConvertError::Resample(e.to_string()))?;
            for (dst, src) in output.iter_mut().zip(processed) {
                dst.extend(src);
            }
            pos += chunk_in;
        }

        for channel in &mut output {
            channel.drain(..delay.min(channel.len()));
            channel.resize(expected, 0.0);
        }

        Ok(AudioBuffer::interleave(&output, target_rate).with_bits_per_sample(self.bits_per_sample))
    }

    /// Fold or spread channels to reach `target_channels`.
    ///
    /// Downmixing averages every source channel into the output channel at
    /// `index % target_channels`; upmixing repeats source channels in order.
    pub fn remix(self, target_channels: usize) -> AudioBuffer {
        if self.channels == target_channels || self.channels == 0 || target_channels == 0 {
            return self;
        }

        let source = self.channels;
        let mut samples = Vec::with_capacity(self.frames() * target_channels);

        for frame in self.samples.chunks_exact(source) {
            if source > target_channels {
                for out in 0..target_channels {
                    let (sum, count) = frame
                        .iter()
                        .enumerate()
                        .filter(|(index, _)| index % target_channels == out)
                        .fold((0.0f32, 0usize), |(sum, count), (_, s)| (sum + s, count + 1));
                    samples.push(sum / count as f32);
                }
            } else {
                for out in 0..target_channels {
                    samples.push(frame[out % source]);
                }
            }
        }

        AudioBuffer {
            samples,
            sample_rate: self.sample_rate,
            channels: target_channels,
            bits_per_sample: self.bits_per_sample,
        }
    }

    pub fn to_i16(&self) -> Vec<i16> {
        self.to_i32(16).into_iter().map(|s| s as i16).collect()
    }

    /// Quantize to signed integers of `bits` width (8..=24), as FLAC expects.
    ///
    /// Scales by `2^(bits-1)`, the inverse of how integer PCM is decoded, so
    /// decoded integer samples come back unchanged.
    pub fn to_i32(&self, bits: u32) -> Vec<i32> {
        let full = (1i64 << (bits - 1)) as f64;
        self.samples
            .iter()
            .map(|&s| (s as f64 * full).round().clamp(-full, full - 1.0) as i32)
            .collect()
    }

    /// G.711 µ-law companded bytes, one per sample.
    pub fn to_mulaw(&self) -> Vec<u8> {
        self.to_i16().into_iter().map(linear_to_mulaw).collect()
    }

    fn deinterleave(&self) -> Vec<Vec<f32>> {
        let mut planar = vec![Vec::with_capacity(self.frames()); self.channels];
        for frame in self.samples.chunks_exact(self.channels) {
            for (channel, &sample) in planar.iter_mut().zip(frame) {
                channel.push(sample);
            }
        }
        planar
    }

    fn interleave(planar: &[Vec<f32>], sample_rate: u32) -> AudioBuffer {
        let channels = planar.len();
        let frames = planar.first().map_or(0, Vec::len);
        let mut samples = Vec::with_capacity(frames * channels);
        for i in 0..frames {
            for channel in planar {
                samples.push(channel[i]);
            }
        }
        AudioBuffer::new(samples, sample_rate, channels)
    }
}

/// Compand one 16-bit sample to 8-bit µ-law.
pub fn linear_to_mulaw(sample: i16) -> u8 {
    let mut magnitude = sample as i32;
    let sign = if magnitude < 0 {
        magnitude = -magnitude;
        0x80
    } else {
        0
    };

    magnitude = magnitude.min(MULAW_CLIP) + MULAW_BIAS;

    let mut exponent = 7;
    let mut mask = 0x4000;
    while exponent > 0 && magnitude & mask == 0 {
        exponent -= 1;
        mask >>= 1;
    }
    let mantissa = (magnitude >> (exponent + 3)) & 0x0F;

    !((sign | (exponent << 4) | mantissa) as u8)
}
