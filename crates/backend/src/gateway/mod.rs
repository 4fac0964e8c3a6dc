// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! WebSocket gateway (C10, §4.10): multiplexes many client connections onto
//! the bus. One receiver+writer task per connection, one shared dispatcher
//! task draining `websocket_out`, broadcast group `all_frontends`.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Path, State, WebSocketUpgrade};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router as AxumRouter;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{mpsc, RwLock};
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use termrelay_protocol::{Envelope, ForwardingStep, ProcessingStep, GROUP_ALL_FRONTENDS};

use crate::bus::queue::Queue;

/// Prefix identifying a client as a member of the `all_frontends` broadcast
/// group (§6).
const FRONTEND_PREFIX: &str = "frontend_";

struct Connection {
    sender: mpsc::UnboundedSender<Message>,
    cancel: CancellationToken,
}

/// Shared gateway state: the connection registry plus the queues it
/// bridges.
pub struct Gateway {
    connections: RwLock<HashMap<String, Arc<Connection>>>,
    incoming: Arc<Queue>,
    websocket_out: Arc<Queue>,
    shutdown: CancellationToken,
}

impl Gateway {
    pub fn new(incoming: Arc<Queue>, websocket_out: Arc<Queue>, shutdown: CancellationToken) -> Arc<Self> {
        Arc::new(Self { connections: RwLock::new(HashMap::new()), incoming, websocket_out, shutdown })
    }

    pub fn router(self: &Arc<Self>) -> AxumRouter {
        AxumRouter::new()
            .route("/ws/{client_id}", get(ws_handler))
            .route("/healthz", get(healthz))
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive())
            .with_state(Arc::clone(self))
    }

    /// Number of currently registered connections (test/diagnostic use).
    pub async fn connection_count(&self) -> usize {
        self.connections.read().await.len()
    }

    /// Single shared dispatcher task: drains `websocket_out` and fans each
    /// envelope out to the right socket(s) (§4.10 "Dispatcher task").
    pub async fn run_dispatcher(self: Arc<Self>) {
        info!("gateway: dispatcher started");
        loop {
            let envelope = tokio::select! {
                _ = self.shutdown.cancelled() => {
                    info!("gateway: dispatcher stopped");
                    return;
                }
                envelope = self.websocket_out.dequeue() => envelope,
            };
            self.dispatch(envelope).await;
        }
    }

    async fn dispatch(&self, envelope: Envelope) {
        let Some(destination) = envelope.destination.clone() else {
            warn!(id = %envelope.id, "gateway: envelope has no destination, dropping");
            return;
        };

        let Ok(text) = serde_json::to_string(&envelope) else {
            warn!(id = %envelope.id, "gateway: failed to serialize envelope");
            return;
        };

        if destination == GROUP_ALL_FRONTENDS {
            let connections = self.connections.read().await;
            let targets: Vec<_> = connections
                .iter()
                .filter(|(client_id, _)| client_id.starts_with(FRONTEND_PREFIX))
                .map(|(client_id, conn)| (client_id.clone(), Arc::clone(conn)))
                .collect();
            drop(connections);
            for (client_id, conn) in targets {
                if conn.sender.send(Message::Text(text.clone().into())).is_err() {
                    warn!(client_id, "gateway: send to disconnected frontend failed");
                }
            }
            return;
        }

        let connections = self.connections.read().await;
        match connections.get(&destination) {
            Some(conn) => {
                if conn.sender.send(Message::Text(text.into())).is_err() {
                    warn!(client_id = %destination, "gateway: send to disconnected client failed");
                }
            }
            None => warn!(destination = %destination, "gateway: no connected client for destination"),
        }
    }

    /// Registers a new connection, replacing and closing any prior
    /// connection for the same `client_id` (§9 Open Question: "replace
    /// semantics").
    async fn register(self: &Arc<Self>, client_id: &str, sender: mpsc::UnboundedSender<Message>) -> Arc<Connection> {
        let connection = Arc::new(Connection { sender, cancel: CancellationToken::new() });
        let mut connections = self.connections.write().await;
        if let Some(previous) = connections.insert(client_id.to_owned(), Arc::clone(&connection)) {
            previous.cancel.cancel();
        }
        connection
    }

    /// Removes the registry entry for `client_id`, but only if it is still
    /// the same connection that is exiting (a later connection may have
    /// already replaced it).
    async fn deregister(&self, client_id: &str, connection: &Arc<Connection>) {
        let mut connections = self.connections.write().await;
        if let Some(current) = connections.get(client_id) {
            if Arc::ptr_eq(current, connection) {
                connections.remove(client_id);
            }
        }
    }

    /// Cancels the dispatcher, every per-connection task, and closes all
    /// sockets with code 1000 (§5 "Shutdown").
    pub async fn shutdown_all(&self) {
        self.shutdown.cancel();
        let connections = self.connections.write().await;
        for connection in connections.values() {
            connection.cancel.cancel();
        }
    }
}

async fn healthz() -> &'static str {
    "ok"
}

async fn ws_handler(
    State(gateway): State<Arc<Gateway>>,
    Path(client_id): Path<String>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_connection(gateway, client_id, socket))
}

/// Per-connection task: owns the socket, reads inbound frames and forwards
/// them to `incoming`, and writes outbound frames handed to it by the
/// dispatcher via an mpsc channel (§4.10 "Receiver task").
async fn handle_connection(gateway: Arc<Gateway>, client_id: String, socket: WebSocket) {
    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();
    let connection = gateway.register(&client_id, tx).await;
    info!(client_id, "gateway: connection registered");

    loop {
        tokio::select! {
            _ = connection.cancel.cancelled() => break,
            outbound = rx.recv() => {
                match outbound {
                    Some(message) => {
                        if sink.send(message).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }
            inbound = stream.next() => {
                match inbound {
                    Some(Ok(Message::Text(text))) => {
                        handle_inbound_text(&gateway, &client_id, &text).await;
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!(client_id, err = %e, "gateway: socket read error");
                        break;
                    }
                }
            }
        }
    }

    let _ = sink.send(Message::Close(None)).await;
    gateway.deregister(&client_id, &connection).await;
    info!(client_id, "gateway: connection cleaned up");
}

/// Parses one inbound text frame as an [`Envelope`], stamps ownership
/// fields, and enqueues it (§4.10 "Receiver task"). Parse/validation
/// failures are logged and dropped — no reply (§7 "Validation at ingress").
async fn handle_inbound_text(gateway: &Arc<Gateway>, client_id: &str, text: &str) {
    let mut envelope: Envelope = match serde_json::from_str(text) {
        Ok(envelope) => envelope,
        Err(e) => {
            warn!(client_id, err = %e, "gateway: dropping unparseable frame");
            return;
        }
    };
    envelope.client_id = Some(client_id.to_owned());
    envelope.origin = Some("websocket_client".to_owned());
    envelope.push_processing(ProcessingStep::new("Gateway", "received"));
    envelope.push_forwarding(ForwardingStep::new("Gateway", None, Some("incoming")));
    gateway.incoming.enqueue(envelope).await;
}
