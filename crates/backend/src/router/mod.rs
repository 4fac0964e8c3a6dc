// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Router/dispatcher (C9, §4.9): two independent loops over `incoming` and
//! `outgoing`, demultiplexing by message `type` and invoking the relevant
//! collaborator.

use std::sync::Arc;

use serde_json::json;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use termrelay_protocol::{now_secs, Envelope, ErrorKind, ForwardingStep, GROUP_ALL_FRONTENDS};

use crate::bus::queue::Queue;
use crate::simulation::SimulationManager;
use crate::store::{SessionManager, SettingsStore};
use crate::workers::detector::Detector;

const ROUTER_NAME: &str = "MessageRouter";

/// Backoff applied after a handler error before the client-listener resumes
/// (§4.9 "Failure policy").
const ERROR_BACKOFF: std::time::Duration = std::time::Duration::from_millis(200);

pub struct Router {
    incoming: Arc<Queue>,
    outgoing: Arc<Queue>,
    websocket_out: Arc<Queue>,
    dead_letter: Arc<Queue>,
    detector: Arc<Detector>,
    settings: Arc<SettingsStore>,
    sessions: Mutex<SessionManager>,
    simulation: Arc<dyn SimulationManager>,
}

impl Router {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        incoming: Arc<Queue>,
        outgoing: Arc<Queue>,
        websocket_out: Arc<Queue>,
        dead_letter: Arc<Queue>,
        detector: Arc<Detector>,
        settings: Arc<SettingsStore>,
        simulation: Arc<dyn SimulationManager>,
    ) -> Self {
        Self {
            incoming,
            outgoing,
            websocket_out,
            dead_letter,
            detector,
            settings,
            sessions: Mutex::new(SessionManager::new()),
            simulation,
        }
    }

    /// Runs both listener loops concurrently until `shutdown` is cancelled
    /// (§4.9 "Two independent loops sharing the same object").
    pub async fn run(self: Arc<Self>, shutdown: CancellationToken) {
        let client = {
            let router = Arc::clone(&self);
            let shutdown = shutdown.clone();
            tokio::spawn(async move { router.client_listener(shutdown).await })
        };
        let service = {
            let router = Arc::clone(&self);
            let shutdown = shutdown.clone();
            tokio::spawn(async move { router.service_listener(shutdown).await })
        };
        let _ = tokio::join!(client, service);
    }

    // -- Client listener (from `incoming`) -----------------------------------

    async fn client_listener(&self, shutdown: CancellationToken) {
        info!("router: listening for client messages");
        loop {
            let envelope = tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("router: client listener stopped");
                    return;
                }
                envelope = self.incoming.dequeue() => envelope,
            };

            match self.process_client_message(&envelope).await {
                Ok(Some(reply)) => self.websocket_out.enqueue(reply).await,
                Ok(None) => {}
                Err(e) => {
                    error!(err = %e, id = %envelope.id, "router: client handler failed");
                    let reply = error_reply(&envelope, ErrorKind::InternalServerError, &e.to_string());
                    self.websocket_out.enqueue(reply).await;
                    tokio::time::sleep(ERROR_BACKOFF).await;
                }
            }
        }
    }

    async fn process_client_message(&self, envelope: &Envelope) -> anyhow::Result<Option<Envelope>> {
        let reply = match envelope.kind.as_str() {
            "stt.transcription" => {
                let detector = Arc::clone(&self.detector);
                let envelope = envelope.clone();
                tokio::spawn(async move { detector.process_transcription(&envelope).await });
                None
            }
            "manual.request" => {
                let term = envelope.payload.get("term").and_then(|v| v.as_str()).unwrap_or("").to_owned();
                let context = envelope.payload.get("context").and_then(|v| v.as_str()).unwrap_or("").to_owned();
                let client_id = envelope.client_id.clone();
                let original_message_id = envelope.id.clone();
                let detector = Arc::clone(&self.detector);
                tokio::spawn(async move {
                    detector.process_manual(&term, &context, client_id.as_deref(), &original_message_id).await
                });
                None
            }
            "simulation.start" => {
                if let Some(client_id) = envelope.client_id.as_deref() {
                    self.simulation.start(client_id).await?;
                    Some(ack_reply(envelope, "Simulation start command received."))
                } else {
                    Some(error_reply(envelope, ErrorKind::InvalidMessageFormat, "Missing client_id for simulation.start."))
                }
            }
            "simulation.stop" => {
                self.simulation.stop(envelope.client_id.as_deref()).await?;
                Some(ack_reply(envelope, "Simulation stop command received."))
            }
            "ping" => Some(pong_reply(envelope)),
            "stt.init" => {
                info!(client_id = ?envelope.client_id, "router: STT module connected");
                None
            }
            "session.start" => Some(self.handle_session_start(envelope).await),
            "session.join" => Some(self.handle_session_join(envelope).await),
            "settings.save" => {
                self.settings.update(&envelope.payload);
                self.settings.save_to_file().await?;
                Some(ack_reply(envelope, "Settings saved."))
            }
            other => {
                warn!(kind = other, id = %envelope.id, "router: unknown message type");
                Some(error_reply(envelope, ErrorKind::UnknownMessageType, &format!("Unknown message type: '{other}'")))
            }
        };
        Ok(reply)
    }

    async fn handle_session_start(&self, envelope: &Envelope) -> Envelope {
        let Some(client_id) = envelope.client_id.as_deref() else {
            return error_reply(envelope, ErrorKind::InternalServerError, "Missing client_id for session.start.");
        };
        let mut sessions = self.sessions.lock().await;
        match sessions.create_session(client_id) {
            Some(code) => Envelope::new("session.created", json!({ "code": code }))
                .with_origin(ROUTER_NAME)
                .with_destination(client_id)
                .with_client_id(client_id),
            None => error_reply(envelope, ErrorKind::InvalidInput, "A session is already active."),
        }
    }

    async fn handle_session_join(&self, envelope: &Envelope) -> Envelope {
        let code = envelope.payload.get("code").and_then(|v| v.as_str()).map(str::to_owned);
        let (Some(client_id), Some(code)) = (envelope.client_id.clone(), code) else {
            return error_reply(envelope, ErrorKind::InvalidInput, "Missing client_id or session code.");
        };
        let mut sessions = self.sessions.lock().await;
        if sessions.join_session(&client_id, &code) {
            Envelope::new("session.joined", json!({ "code": code }))
                .with_origin(ROUTER_NAME)
                .with_destination(client_id.clone())
                .with_client_id(client_id)
        } else {
            error_reply(envelope, ErrorKind::InvalidInput, "Session code is invalid or the session does not exist.")
        }
    }

    // -- Service listener (from `outgoing`) ----------------------------------

    async fn service_listener(&self, shutdown: CancellationToken) {
        info!("router: listening for service messages");
        loop {
            let envelope = tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("router: service listener stopped");
                    return;
                }
                envelope = self.outgoing.dequeue() => envelope,
            };
            self.route_service_message(envelope).await;
        }
    }

    async fn route_service_message(&self, mut envelope: Envelope) {
        match envelope.destination.as_deref() {
            Some("frontend") => {
                envelope.destination = Some(GROUP_ALL_FRONTENDS.to_owned());
                envelope.push_forwarding(ForwardingStep::new(ROUTER_NAME, Some("outgoing"), Some("websocket_out")));
                self.websocket_out.enqueue(envelope).await;
            }
            Some(_destination) => {
                envelope.push_forwarding(ForwardingStep::new(ROUTER_NAME, Some("outgoing"), Some("websocket_out")));
                self.websocket_out.enqueue(envelope).await;
            }
            None => {
                warn!(kind = %envelope.kind, id = %envelope.id, "router: service message has no destination, dropping");
                if let Some(client_id) = envelope.client_id.clone() {
                    let error = Envelope::new(
                        ErrorKind::RoutingError.as_message_type(),
                        json!({ "error": "undeliverable service message", "original_message_id": envelope.id }),
                    )
                    .with_origin(ROUTER_NAME)
                    .with_destination(client_id.clone())
                    .with_client_id(client_id);
                    self.websocket_out.enqueue(error).await;
                }
                envelope.push_forwarding(ForwardingStep::new(ROUTER_NAME, Some("outgoing"), Some("dead_letter")));
                self.dead_letter.enqueue(envelope).await;
            }
        }
    }
}

fn ack_reply(origin: &Envelope, message: &str) -> Envelope {
    let payload = json!({ "message": message, "original_message_id": origin.id });
    reply_to(origin, "system.acknowledgement", payload)
}

fn error_reply(origin: &Envelope, kind: ErrorKind, message: &str) -> Envelope {
    let payload = json!({ "error": message, "original_message_id": origin.id });
    reply_to(origin, kind.as_message_type(), payload)
}

fn pong_reply(origin: &Envelope) -> Envelope {
    reply_to(origin, "pong", json!({ "timestamp": now_secs() }))
}

/// Builds a reply envelope destined back to `origin`'s client, per §4.9
/// "All replies carry `destination=client_id` of the originator."
fn reply_to(origin: &Envelope, kind: &str, payload: serde_json::Value) -> Envelope {
    let mut envelope = Envelope::new(kind, payload).with_origin(ROUTER_NAME);
    if let Some(client_id) = origin.client_id.clone() {
        envelope = envelope.with_destination(client_id.clone()).with_client_id(client_id);
    }
    envelope
}
