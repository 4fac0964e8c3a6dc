// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! CLI/env configuration for the `termrelay-stt` binary, following the same
//! `clap::Parser` + `env` pattern as the backend's config.

use clap::Parser;

#[derive(Debug, Clone, Parser)]
#[command(name = "termrelay-stt", version, about = "Streaming speech-to-text client")]
pub struct SttConfig {
    /// Base HTTP(S) URL of the gateway; rewritten to ws(s):// and suffixed
    /// with `/ws/{client_id}` (§6 "WebSocket endpoint").
    #[arg(long, env = "TERMRELAY_GATEWAY_URL", default_value = "http://127.0.0.1:8765")]
    pub gateway_url: String,

    /// Client id this stream identifies as; any prefix other than
    /// `frontend_` marks it a service client (§6).
    #[arg(long, env = "TERMRELAY_STT_CLIENT_ID", default_value = "stt_stream")]
    pub client_id: String,

    /// Path to a WAV file used as the audio source in place of a live
    /// microphone (§5: audio capture is an external collaborator).
    #[arg(long, env = "TERMRELAY_STT_AUDIO_FILE")]
    pub audio_file: Option<String>,

    /// Milliseconds of audio per frame fed to the VAD loop.
    #[arg(long, env = "TERMRELAY_STT_FRAME_MS", default_value_t = 20)]
    pub frame_ms: u32,

    /// Optional role hint attached to transcription payloads
    /// (`payload.user_role`, §4.6 "role-aware" prompting).
    #[arg(long, env = "TERMRELAY_STT_USER_ROLE")]
    pub user_role: Option<String>,
}
