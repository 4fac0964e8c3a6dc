// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The speech-to-text model is an opaque external collaborator (§1): this
//! crate only specifies the contract a concrete model must satisfy.

use async_trait::async_trait;

/// Transcribes a window of 16 kHz mono float32 samples into text.
///
/// Implementations are expected to run CPU-bound inference off the calling
/// task (§5 "CPU-bound transcription runs off the main task via a worker
/// thread so the loop remains responsive").
#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe(&self, samples: &[f32]) -> anyhow::Result<String>;
}

/// Placeholder transcriber that never produces text, used when no real
/// model is wired in (mirrors `NullSimulationManager` in the backend
/// crate — a documented no-op standing in for an external collaborator).
pub struct NullTranscriber;

#[async_trait]
impl Transcriber for NullTranscriber {
    async fn transcribe(&self, _samples: &[f32]) -> anyhow::Result<String> {
        Ok(String::new())
    }
}

/// A transcriber that returns a fixed string regardless of input, used to
/// exercise the VAD loop in tests without a real model.
#[cfg(test)]
pub struct StubTranscriber {
    pub text: String,
}

#[cfg(test)]
#[async_trait]
impl Transcriber for StubTranscriber {
    async fn transcribe(&self, _samples: &[f32]) -> anyhow::Result<String> {
        Ok(self.text.clone())
    }
}
