// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The streaming transcription loop (C11, §4.11): a VAD state machine over
//! audio frames, driving a reconnecting WebSocket client to the gateway.

pub mod audio;
pub mod client;
pub mod config;
pub mod profile;
pub mod transcriber;
pub mod vad;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::info;

use termrelay_protocol::Envelope;

use audio::AudioFrameSource;
use config::SttConfig;
use profile::Profile;
use transcriber::Transcriber;
use vad::{Emission, Vad};

/// Origin stamped on every envelope this loop emits, matching the Python
/// reference's `stt_module` origin tag.
const ORIGIN: &str = "stt_module";

/// Drives one audio stream end to end: pulls frames from `source`, runs them
/// through the VAD state machine, emits transcription/heartbeat envelopes to
/// the gateway over a reconnecting WebSocket client, until `source` is
/// exhausted or `shutdown` fires.
pub async fn run(
    config: SttConfig,
    mut source: Box<dyn AudioFrameSource>,
    transcriber: Arc<dyn Transcriber>,
    profile: Profile,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let ws_url = client::build_ws_url(&config.gateway_url, &config.client_id);
    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel::<Envelope>();
    let connected = Arc::new(AtomicBool::new(false));

    let client_task = {
        let connected = Arc::clone(&connected);
        let shutdown = shutdown.clone();
        tokio::spawn(client::run(ws_url, outbound_rx, connected, shutdown))
    };

    send_init(&outbound_tx, &config);

    let mut vad = Vad::new(profile);
    let mut last_activity = Instant::now();
    let heartbeat_interval = profile.heartbeat_interval();

    loop {
        if shutdown.is_cancelled() {
            break;
        }

        let frame = tokio::select! {
            _ = shutdown.cancelled() => break,
            frame = source.next_frame() => frame,
        };

        let Some(frame) = frame else {
            info!(client_id = %config.client_id, "stt: audio source exhausted");
            break;
        };

        let now = Instant::now();
        let emissions = vad.push_frame(&frame, now, transcriber.as_ref()).await;

        for emission in emissions {
            last_activity = now;
            send_transcription(&outbound_tx, &config, emission);
        }

        if now.duration_since(last_activity) >= heartbeat_interval {
            last_activity = now;
            if connected.load(Ordering::Relaxed) {
                send_heartbeat(&outbound_tx, &config);
            }
        }
    }

    drop(outbound_tx);
    shutdown.cancel();
    let _ = client_task.await;
    Ok(())
}

fn send_init(tx: &mpsc::UnboundedSender<Envelope>, config: &SttConfig) {
    let envelope = Envelope::new("stt.init", serde_json::json!({}))
        .with_origin(ORIGIN)
        .with_client_id(config.client_id.clone());
    let _ = tx.send(envelope);
}

fn send_transcription(tx: &mpsc::UnboundedSender<Envelope>, config: &SttConfig, emission: Emission) {
    let (kind, text) = match emission {
        Emission::Interim(text) => ("stt.transcription.interim", text),
        Emission::Final(text) => ("stt.transcription", text),
    };
    let mut payload = serde_json::json!({ "text": text });
    if let Some(role) = &config.user_role {
        payload["user_role"] = serde_json::Value::String(role.clone());
    }
    let envelope =
        Envelope::new(kind, payload).with_origin(ORIGIN).with_client_id(config.client_id.clone());
    let _ = tx.send(envelope);
}

fn send_heartbeat(tx: &mpsc::UnboundedSender<Envelope>, config: &SttConfig) {
    let envelope = Envelope::new("stt.heartbeat", serde_json::json!({ "message": "keep-alive" }))
        .with_origin(ORIGIN)
        .with_client_id(config.client_id.clone());
    let _ = tx.send(envelope);
}
