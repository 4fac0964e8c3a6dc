// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Bounded, named, async FIFO queue of envelopes (C2, §4.2).
//!
//! Producers block on `enqueue` when the queue is full; there is no
//! drop-on-full policy (§7: "Queue-full: producers block; there is no
//! drop."). Readers can take a non-destructive `snapshot` or `peek` at the
//! head without consuming it.

use std::collections::VecDeque;
use std::time::Duration;

use termrelay_protocol::Envelope;
use tokio::sync::{Mutex, Notify};

/// Default bound for queues created at startup (§4.2).
pub const DEFAULT_BOUND: usize = 100;

/// A bounded FIFO queue of envelopes, safe for multiple producers and
/// consumers.
pub struct Queue {
    name: String,
    capacity: usize,
    items: Mutex<VecDeque<Envelope>>,
    not_empty: Notify,
    not_full: Notify,
}

impl Queue {
    pub fn new(name: impl Into<String>, capacity: usize) -> Self {
        Self {
            name: name.into(),
            capacity,
            items: Mutex::new(VecDeque::new()),
            not_empty: Notify::new(),
            not_full: Notify::new(),
        }
    }

    pub fn bounded(name: impl Into<String>) -> Self {
        Self::new(name, DEFAULT_BOUND)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Blocks until there is room, then appends `item`.
    pub async fn enqueue(&self, item: Envelope) {
        loop {
            let notified = self.not_full.notified();
            {
                let mut guard = self.items.lock().await;
                if guard.len() < self.capacity {
                    guard.push_back(item);
                    self.not_empty.notify_one();
                    return;
                }
            }
            notified.await;
        }
    }

    /// Blocks until an item is available, then removes and returns it.
    pub async fn dequeue(&self) -> Envelope {
        loop {
            let notified = self.not_empty.notified();
            {
                let mut guard = self.items.lock().await;
                if let Some(item) = guard.pop_front() {
                    self.not_full.notify_one();
                    return item;
                }
            }
            notified.await;
        }
    }

    /// Current number of buffered envelopes.
    pub async fn qsize(&self) -> usize {
        self.items.lock().await.len()
    }

    /// Non-destructive copy of every buffered envelope, oldest first.
    pub async fn snapshot(&self) -> Vec<Envelope> {
        self.items.lock().await.iter().cloned().collect()
    }

    /// Non-destructive look at the head of the queue.
    pub async fn peek(&self) -> Option<Envelope> {
        self.items.lock().await.front().cloned()
    }

    /// Remove and return every envelope currently buffered. If `timeout` is
    /// given and the queue is empty, waits up to that long for at least one
    /// more envelope to arrive before giving up.
    pub async fn drain(&self, timeout: Option<Duration>) -> Vec<Envelope> {
        {
            let mut guard = self.items.lock().await;
            if !guard.is_empty() {
                self.not_full.notify_waiters();
                return guard.drain(..).collect();
            }
        }
        if let Some(timeout) = timeout {
            let notified = self.not_empty.notified();
            let _ = tokio::time::timeout(timeout, notified).await;
            let mut guard = self.items.lock().await;
            self.not_full.notify_waiters();
            return guard.drain(..).collect();
        }
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn env(kind: &str) -> Envelope {
        Envelope::new(kind, json!({}))
    }

    #[tokio::test]
    async fn fifo_order_preserved() -> anyhow::Result<()> {
        let q = Queue::bounded("incoming");
        q.enqueue(env("a")).await;
        q.enqueue(env("b")).await;
        let first = q.dequeue().await;
        let second = q.dequeue().await;
        assert_eq!(first.kind, "a");
        assert_eq!(second.kind, "b");
        Ok(())
    }

    #[tokio::test]
    async fn enqueue_blocks_when_full_then_unblocks() -> anyhow::Result<()> {
        let q = std::sync::Arc::new(Queue::new("small", 1));
        q.enqueue(env("first")).await;
        assert_eq!(q.qsize().await, 1);

        let q2 = std::sync::Arc::clone(&q);
        let handle = tokio::spawn(async move {
            q2.enqueue(env("second")).await;
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!handle.is_finished());

        let _ = q.dequeue().await;
        tokio::time::timeout(Duration::from_millis(200), handle).await??;
        assert_eq!(q.qsize().await, 1);
        Ok(())
    }

    #[tokio::test]
    async fn snapshot_is_non_destructive() -> anyhow::Result<()> {
        let q = Queue::bounded("outgoing");
        q.enqueue(env("x")).await;
        let snap = q.snapshot().await;
        assert_eq!(snap.len(), 1);
        assert_eq!(q.qsize().await, 1);
        Ok(())
    }

    #[tokio::test]
    async fn drain_empties_queue() -> anyhow::Result<()> {
        let q = Queue::bounded("websocket_out");
        q.enqueue(env("a")).await;
        q.enqueue(env("b")).await;
        let drained = q.drain(None).await;
        assert_eq!(drained.len(), 2);
        assert_eq!(q.qsize().await, 0);
        Ok(())
    }
}
