// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Reconnecting WebSocket client to the gateway (§4.11 "Reconnection"):
//! exponential backoff, buffers outbound envelopes while disconnected and
//! flushes them first on reconnect.
//!
//! Grounded in the mux crate's upstream event feed, which reconnects on the
//! same backoff schedule.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

use termrelay_protocol::Envelope;

const INITIAL_BACKOFF: Duration = Duration::from_millis(100);
const MAX_BACKOFF: Duration = Duration::from_secs(5);

/// Maximum number of envelopes buffered while disconnected; oldest dropped
/// first if exceeded (bus queues elsewhere block, but this client has no
/// consumer to push back on while the socket is down).
const MAX_BUFFERED: usize = 1000;

/// Build the `/ws/{client_id}` URL the gateway exposes (§6 "WebSocket
/// endpoint").
pub fn build_ws_url(base_url: &str, client_id: &str) -> String {
    let ws_base = if let Some(rest) = base_url.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = base_url.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        base_url.to_owned()
    };
    let ws_base = ws_base.trim_end_matches('/');
    format!("{ws_base}/ws/{client_id}")
}

/// Runs the reconnect loop until `shutdown` is cancelled. Envelopes arriving
/// on `outbound_rx` while disconnected are buffered and sent, in order,
/// immediately after the next successful connect. `connected` is flipped
/// true while a live socket exists, so callers can skip liveness-only
/// messages (heartbeats) rather than buffer them (§4.11 "only while the
/// socket is connected; otherwise skip silently").
pub async fn run(
    ws_url: String,
    mut outbound_rx: mpsc::UnboundedReceiver<Envelope>,
    connected: Arc<AtomicBool>,
    shutdown: CancellationToken,
) {
    let mut backoff = INITIAL_BACKOFF;
    let mut buffered: VecDeque<Envelope> = VecDeque::new();

    loop {
        if shutdown.is_cancelled() {
            return;
        }

        match tokio_tungstenite::connect_async(&ws_url).await {
            Ok((stream, _)) => {
                backoff = INITIAL_BACKOFF;
                tracing::info!(url = %ws_url, "stt: connected to gateway");
                let (mut sink, mut read) = stream.split();

                while let Some(envelope) = buffered.pop_front() {
                    if send(&mut sink, &envelope).await.is_err() {
                        buffered.push_front(envelope);
                        break;
                    }
                }
                connected.store(true, Ordering::Relaxed);

                loop {
                    tokio::select! {
                        _ = shutdown.cancelled() => {
                            let _ = sink.send(Message::Close(None)).await;
                            return;
                        }
                        outbound = outbound_rx.recv() => {
                            match outbound {
                                Some(envelope) => {
                                    if send(&mut sink, &envelope).await.is_err() {
                                        push_buffered(&mut buffered, envelope);
                                        break;
                                    }
                                }
                                None => return,
                            }
                        }
                        inbound = read.next() => {
                            match inbound {
                                Some(Ok(Message::Close(_))) | None => break,
                                Some(Ok(_)) => {}
                                Some(Err(e)) => {
                                    tracing::debug!(err = %e, "stt: gateway socket read error");
                                    break;
                                }
                            }
                        }
                    }
                }
                connected.store(false, Ordering::Relaxed);
            }
            Err(e) => {
                tracing::debug!(url = %ws_url, err = %e, "stt: gateway connect failed");
            }
        }

        if shutdown.is_cancelled() {
            return;
        }

        // Drain anything that accumulated on the channel while disconnected
        // so the next connect flushes a complete backlog.
        while let Ok(envelope) = outbound_rx.try_recv() {
            push_buffered(&mut buffered, envelope);
        }

        tokio::select! {
            _ = shutdown.cancelled() => return,
            _ = tokio::time::sleep(backoff) => {}
        }
        backoff = (backoff * 2).min(MAX_BACKOFF);
    }
}

fn push_buffered(buffered: &mut VecDeque<Envelope>, envelope: Envelope) {
    buffered.push_back(envelope);
    while buffered.len() > MAX_BUFFERED {
        buffered.pop_front();
    }
}

async fn send<S>(sink: &mut S, envelope: &Envelope) -> Result<(), ()>
where
    S: futures_util::Sink<Message> + Unpin,
{
    let Ok(text) = serde_json::to_string(envelope) else {
        return Ok(()); // malformed envelope, drop rather than retry forever
    };
    sink.send(Message::Text(text.into())).await.map_err(|_| ())
}
