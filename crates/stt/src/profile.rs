// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Named VAD/streaming parameter profiles (§4.11), selected at startup by a
//! single environment variable, ported from
//! `Backend/STT/performance_configs.py::STTConfigManager`.

use std::time::Duration;

/// Environment variable selecting the profile by name (§6 "Environment").
pub const PROFILE_ENV_VAR: &str = "TERMRELAY_STT_PROFILE";

/// A named bundle of VAD and streaming parameters (§4.11).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Profile {
    pub name: &'static str,
    pub model_size: &'static str,
    pub vad_energy_threshold: f32,
    pub vad_silence_duration_s: f64,
    pub vad_buffer_duration_s: f64,
    pub min_words_per_sentence: usize,
    pub streaming_chunk_duration_s: f64,
    pub streaming_overlap_s: f64,
    pub streaming_min_buffer_s: f64,
    pub heartbeat_interval_s: f64,
}

impl Profile {
    pub fn silence_duration(&self) -> Duration {
        Duration::from_secs_f64(self.vad_silence_duration_s)
    }

    pub fn buffer_duration(&self) -> Duration {
        Duration::from_secs_f64(self.vad_buffer_duration_s)
    }

    pub fn streaming_chunk_duration(&self) -> Duration {
        Duration::from_secs_f64(self.streaming_chunk_duration_s)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs_f64(self.heartbeat_interval_s)
    }
}

/// Streaming fields are shared across every profile in the original source
/// (`Backend/STT/transcribe.py::ConfigManager`, which hard-codes
/// `STREAMING_CHUNK_DURATION_S`/`STREAMING_OVERLAP_DURATION_S`/
/// `STREAMING_MIN_BUFFER_S` independently of the VAD profile) and by
/// `HEARTBEAT_INTERVAL_S`; only the VAD/model fields vary by profile.
const STREAMING_CHUNK_DURATION_S: f64 = 3.0;
const STREAMING_OVERLAP_S: f64 = 0.5;
const STREAMING_MIN_BUFFER_S: f64 = 2.0;
const HEARTBEAT_INTERVAL_S: f64 = 5.0;

macro_rules! profile {
    ($name:expr, $model:expr, $energy:expr, $silence:expr, $buffer:expr, $min_words:expr) => {
        Profile {
            name: $name,
            model_size: $model,
            vad_energy_threshold: $energy,
            vad_silence_duration_s: $silence,
            vad_buffer_duration_s: $buffer,
            min_words_per_sentence: $min_words,
            streaming_chunk_duration_s: STREAMING_CHUNK_DURATION_S,
            streaming_overlap_s: STREAMING_OVERLAP_S,
            streaming_min_buffer_s: STREAMING_MIN_BUFFER_S,
            heartbeat_interval_s: HEARTBEAT_INTERVAL_S,
        }
    };
}

/// The six named profiles (§4.11), values ported verbatim from
/// `performance_configs.py::STTConfigManager._initialize_configs`.
pub const PROFILES: &[Profile] = &[
    profile!("ultra_responsive", "tiny", 0.002, 0.6, 0.3, 1),
    profile!("balanced_fast", "base", 0.003, 0.8, 0.4, 1),
    profile!("optimized_default", "small", 0.003, 0.9, 0.4, 1),
    profile!("current_default", "medium", 0.004, 1.0, 0.5, 1),
    profile!("high_accuracy", "medium", 0.005, 1.2, 0.6, 2),
    profile!("streaming_optimized", "base", 0.0025, 0.7, 0.2, 1),
];

/// The profile used when the environment variable is unset or names an
/// unrecognized profile (§4.11: "falling back to `current_default`").
pub const DEFAULT_PROFILE_NAME: &str = "current_default";

pub fn by_name(name: &str) -> Option<Profile> {
    PROFILES.iter().find(|p| p.name == name).copied()
}

pub fn default_profile() -> Profile {
    #[allow(clippy::expect_used)]
    by_name(DEFAULT_PROFILE_NAME).expect("DEFAULT_PROFILE_NAME names a real profile")
}

/// Select a profile from the environment, falling back to
/// [`DEFAULT_PROFILE_NAME`] if the variable is unset or unrecognized.
pub fn from_env() -> Profile {
    match std::env::var(PROFILE_ENV_VAR) {
        Ok(name) => by_name(&name).unwrap_or_else(|| {
            tracing::warn!(profile = %name, "stt: unrecognized profile, falling back to default");
            default_profile()
        }),
        Err(_) => default_profile(),
    }
}
