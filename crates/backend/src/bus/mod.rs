// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The message bus: named in-memory queues (C2) plus the file-backed
//! detection/explanation queues (C3).

pub mod file_queue;
pub mod queue;
pub mod records;

use std::sync::Arc;

use queue::Queue;

/// The three named in-memory queues created at startup (§4.2).
pub struct Bus {
    /// Client-originated messages, consumed by the router's client-listener.
    pub incoming: Arc<Queue>,
    /// Service-originated messages, consumed by the router's service-listener.
    pub outgoing: Arc<Queue>,
    /// Router-to-gateway messages, consumed by the gateway dispatcher.
    pub websocket_out: Arc<Queue>,
    /// Envelopes the router could not route; additive diagnostic queue
    /// kept for operator visibility rather than silently dropped.
    pub dead_letter: Arc<Queue>,
}

impl Bus {
    pub fn new() -> Self {
        Self {
            incoming: Arc::new(Queue::bounded("incoming")),
            outgoing: Arc::new(Queue::bounded("outgoing")),
            websocket_out: Arc::new(Queue::bounded("websocket_out")),
            dead_letter: Arc::new(Queue::bounded("dead_letter")),
        }
    }
}

impl Default for Bus {
    fn default() -> Self {
        Self::new()
    }
}
