// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Audio frame sources. The audio capture API itself is external (§5:
//! "dedicated OS threads exist only where the audio capture API requires a
//! callback thread"); this module only fixes the interface the VAD loop
//! consumes and provides a file-backed source for demos and tests.

use std::path::Path;

use async_trait::async_trait;

/// 16 kHz mono float32 is the only sample format the VAD loop understands
/// (§4.11).
pub const SAMPLE_RATE: u32 = 16_000;

/// A source of fixed-size audio frames, sampled at [`SAMPLE_RATE`].
#[async_trait]
pub trait AudioFrameSource: Send {
    /// Returns the next frame, or `None` once the source is exhausted.
    async fn next_frame(&mut self) -> Option<Vec<f32>>;
}

/// Reads a 16-bit PCM WAV file (any sample rate/channel count; resampled to
/// mono 16 kHz on load) and yields fixed-size frames, useful for demos and
/// integration tests in place of a live microphone.
///
/// Grounded in `hound`'s WAV decode path, the same crate the reference pool
/// uses for offline audio fixtures.
pub struct WavFileSource {
    samples: Vec<f32>,
    cursor: usize,
    frame_len: usize,
}

impl WavFileSource {
    /// `frame_duration_ms` controls how many samples each `next_frame` call
    /// yields; the VAD loop treats every call as one "incoming audio frame"
    /// (§4.11).
    pub fn open(path: impl AsRef<Path>, frame_duration_ms: u32) -> anyhow::Result<Self> {
        let mut reader = hound::WavReader::open(path)?;
        let spec = reader.spec();
        let raw: Vec<f32> = match spec.sample_format {
            hound::SampleFormat::Int => {
                let max = (1i64 << (spec.bits_per_sample - 1)) as f32;
                reader.samples::<i32>().filter_map(Result::ok).map(|s| s as f32 / max).collect()
            }
            hound::SampleFormat::Float => {
                reader.samples::<f32>().filter_map(Result::ok).collect()
            }
        };

        let mono = downmix(&raw, spec.channels as usize);
        let samples = resample_nearest(&mono, spec.sample_rate, SAMPLE_RATE);
        let frame_len = ((SAMPLE_RATE as u64 * frame_duration_ms as u64) / 1000) as usize;

        Ok(Self { samples, cursor: 0, frame_len: frame_len.max(1) })
    }
}

#[async_trait]
impl AudioFrameSource for WavFileSource {
    async fn next_frame(&mut self) -> Option<Vec<f32>> {
        if self.cursor >= self.samples.len() {
            return None;
        }
        let end = (self.cursor + self.frame_len).min(self.samples.len());
        let frame = self.samples[self.cursor..end].to_vec();
        self.cursor = end;
        Some(frame)
    }
}

fn downmix(interleaved: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return interleaved.to_vec();
    }
    interleaved
        .chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
        .collect()
}

/// Nearest-neighbor resampling. Audio fidelity is not the concern here; the
/// VAD loop only needs frames at a consistent rate for its energy math.
fn resample_nearest(samples: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    if from_rate == to_rate || samples.is_empty() {
        return samples.to_vec();
    }
    let ratio = from_rate as f64 / to_rate as f64;
    let out_len = ((samples.len() as f64) / ratio).round() as usize;
    (0..out_len)
        .map(|i| {
            let src_idx = ((i as f64) * ratio).round() as usize;
            samples[src_idx.min(samples.len() - 1)]
        })
        .collect()
}
