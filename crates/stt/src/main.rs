// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::error;

use termrelay_stt::audio::{AudioFrameSource, WavFileSource};
use termrelay_stt::config::SttConfig;
use termrelay_stt::profile;
use termrelay_stt::transcriber::NullTranscriber;

#[tokio::main]
async fn main() {
    let config = SttConfig::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let profile = profile::from_env();
    let shutdown = CancellationToken::new();

    let Some(audio_file) = config.audio_file.clone() else {
        error!("fatal: TERMRELAY_STT_AUDIO_FILE / --audio-file is required until a live capture source is wired in");
        std::process::exit(1);
    };

    let source: Box<dyn AudioFrameSource> = match WavFileSource::open(&audio_file, config.frame_ms) {
        Ok(source) => Box::new(source),
        Err(e) => {
            error!("fatal: failed to open audio file {audio_file}: {e:#}");
            std::process::exit(1);
        }
    };

    let transcriber = Arc::new(NullTranscriber);

    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            let _ = tokio::signal::ctrl_c().await;
            shutdown.cancel();
        });
    }

    if let Err(e) = termrelay_stt::run(config, source, transcriber, profile, shutdown).await {
        error!("fatal: {e:#}");
        std::process::exit(1);
    }
}
