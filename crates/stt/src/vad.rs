// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Voice-activity-detection state machine (§4.11): `Idle` → `Speaking` →
//! `Flushing` → `Idle`, driven one audio frame at a time.

use std::collections::VecDeque;
use std::time::Instant;

use termrelay_protocol::hallucination::is_hallucination;

use crate::audio::SAMPLE_RATE;
use crate::profile::Profile;
use crate::transcriber::Transcriber;

/// Output of feeding one frame through the state machine.
#[derive(Debug, Clone, PartialEq)]
pub enum Emission {
    /// A partial result produced mid-utterance (§4.11 "emitting
    /// `stt.transcription.interim`").
    Interim(String),
    /// The consolidated result for a completed utterance (§4.11 "Emit a
    /// single `stt.transcription` (final)").
    Final(String),
}

#[derive(Debug)]
enum State {
    Idle { ring: VecDeque<f32> },
    Speaking {
        utterance: Vec<f32>,
        silence_since: Option<Instant>,
        next_emit_at_samples: usize,
        last_emit_end_samples: usize,
        interim_texts: Vec<String>,
    },
}

/// Owns one utterance's worth of state; one instance per active stream.
pub struct Vad {
    profile: Profile,
    ring_capacity: usize,
    min_buffer_samples: usize,
    chunk_period_samples: usize,
    chunk_window_samples: usize,
    state: State,
}

impl Vad {
    pub fn new(profile: Profile) -> Self {
        let ring_capacity = samples_for(profile.vad_buffer_duration_s);
        let min_buffer_samples = samples_for(profile.streaming_min_buffer_s);
        let chunk_period_samples = samples_for(profile.streaming_chunk_duration_s);
        let chunk_window_samples =
            samples_for(profile.streaming_chunk_duration_s + profile.streaming_overlap_s);
        Self {
            profile,
            ring_capacity,
            min_buffer_samples,
            chunk_period_samples,
            chunk_window_samples,
            state: State::Idle { ring: VecDeque::with_capacity(ring_capacity) },
        }
    }

    /// `true` while the state machine is out of `Idle` (diagnostic/test use).
    pub fn is_speaking(&self) -> bool {
        matches!(self.state, State::Speaking { .. })
    }

    /// Feed one frame through the state machine, running any transcription
    /// the algorithm calls for on `transcriber` (§4.11 algorithm).
    pub async fn push_frame(
        &mut self,
        frame: &[f32],
        now: Instant,
        transcriber: &dyn Transcriber,
    ) -> Vec<Emission> {
        let energy = rms(frame);
        let threshold = self.profile.vad_energy_threshold;

        match &mut self.state {
            State::Idle { ring } => {
                if energy > threshold {
                    let mut utterance: Vec<f32> = ring.drain(..).collect();
                    utterance.extend_from_slice(frame);
                    self.state = State::Speaking {
                        utterance,
                        silence_since: None,
                        next_emit_at_samples: self.min_buffer_samples,
                        last_emit_end_samples: 0,
                        interim_texts: Vec::new(),
                    };
                    Vec::new()
                } else {
                    push_ring(ring, frame, self.ring_capacity);
                    Vec::new()
                }
            }
            State::Speaking { .. } => self.advance_speaking(frame, energy, threshold, now, transcriber).await,
        }
    }

    async fn advance_speaking(
        &mut self,
        frame: &[f32],
        energy: f32,
        threshold: f32,
        now: Instant,
        transcriber: &dyn Transcriber,
    ) -> Vec<Emission> {
        let should_flush = {
            let State::Speaking { utterance, silence_since, .. } = &mut self.state else {
                unreachable!("advance_speaking called outside Speaking state")
            };
            utterance.extend_from_slice(frame);

            if energy < threshold {
                let since = *silence_since.get_or_insert(now);
                now.duration_since(since) >= self.profile.silence_duration()
            } else {
                *silence_since = None;
                false
            }
        };

        let mut emissions = Vec::new();

        if !should_flush {
            if let Some(text) = self.maybe_emit_chunk(transcriber).await {
                emissions.push(Emission::Interim(text));
            }
            return emissions;
        }

        if let Some(text) = self.flush(transcriber).await {
            emissions.push(Emission::Final(text));
        }
        emissions
    }

    async fn maybe_emit_chunk(&mut self, transcriber: &dyn Transcriber) -> Option<String> {
        let (chunk, emit_len) = {
            let State::Speaking { utterance, next_emit_at_samples, .. } = &self.state else {
                return None;
            };
            if utterance.len() < self.min_buffer_samples || utterance.len() < *next_emit_at_samples {
                return None;
            }
            let window = self.chunk_window_samples.min(utterance.len());
            (utterance[utterance.len() - window..].to_vec(), utterance.len())
        };

        let text = transcriber.transcribe(&chunk).await.ok()?;
        let State::Speaking { next_emit_at_samples, last_emit_end_samples, interim_texts, .. } =
            &mut self.state
        else {
            return None;
        };
        *next_emit_at_samples += self.chunk_period_samples;
        *last_emit_end_samples = emit_len;

        if text.trim().is_empty() || is_hallucination(&text) {
            return None;
        }
        interim_texts.push(text.clone());
        Some(text)
    }

    /// Consolidate the utterance and return to `Idle` (§4.11 `Flushing`
    /// state).
    async fn flush(&mut self, transcriber: &dyn Transcriber) -> Option<String> {
        let State::Speaking { utterance, last_emit_end_samples, interim_texts, .. } = &self.state
        else {
            return None;
        };

        let trailing_samples = utterance.len().saturating_sub(*last_emit_end_samples);
        let trailing_s = trailing_samples as f64 / SAMPLE_RATE as f64;

        let consolidated = if interim_texts.is_empty() {
            None
        } else {
            Some(interim_texts.join(" "))
        };

        let final_text = if interim_texts.is_empty() || trailing_s > 0.5 {
            transcriber.transcribe(utterance).await.ok().or(consolidated)
        } else {
            consolidated
        };

        self.state = State::Idle { ring: VecDeque::with_capacity(self.ring_capacity) };

        let text = final_text?;
        let text = text.trim().to_owned();
        if text.is_empty() || is_hallucination(&text) {
            return None;
        }
        if word_count(&text) < self.profile.min_words_per_sentence {
            return None;
        }
        Some(text)
    }
}

fn push_ring(ring: &mut VecDeque<f32>, frame: &[f32], capacity: usize) {
    ring.extend(frame.iter().copied());
    while ring.len() > capacity {
        ring.pop_front();
    }
}

fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_sq: f32 = samples.iter().map(|s| s * s).sum();
    (sum_sq / samples.len() as f32).sqrt()
}

fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

fn samples_for(duration_s: f64) -> usize {
    (duration_s * SAMPLE_RATE as f64).round() as usize
}
