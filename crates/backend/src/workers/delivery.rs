// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Explanation delivery service (C8, §4.8): watches the explanations file
//! queue and pushes ready explanations onto the outgoing bus, at most once
//! per record id per process lifetime.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::sync::{Mutex, Notify};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use termrelay_protocol::{now_secs, Envelope, GROUP_ALL_FRONTENDS};

use crate::bus::file_queue::FileQueue;
use crate::bus::queue::Queue;
use crate::bus::records::{ExplanationRecord, ExplanationStatus};

/// Consumes the explanations file, alternating drain/wait phases (§4.8).
pub struct DeliveryService {
    explanations_file: Arc<FileQueue<ExplanationRecord>>,
    outgoing: Arc<Queue>,
    /// At-most-once delivery per record id for this process's lifetime
    /// (§8 property 4).
    delivered_ids: Mutex<HashSet<String>>,
    fallback_timeout: Duration,
}

impl DeliveryService {
    pub fn new(
        explanations_file: Arc<FileQueue<ExplanationRecord>>,
        outgoing: Arc<Queue>,
        fallback_timeout: Duration,
    ) -> Self {
        Self { explanations_file, outgoing, delivered_ids: Mutex::new(HashSet::new()), fallback_timeout }
    }

    /// Runs until `shutdown` is cancelled: drain phase then wait phase,
    /// blocking on `trigger` with `fallback_timeout` as a bound (§4.8, §9
    /// "event + timeout pattern").
    pub async fn run(&self, trigger: Arc<Notify>, shutdown: CancellationToken) {
        info!("delivery: service loop started");
        loop {
            self.drain_ready().await;
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("delivery: service loop stopped");
                    return;
                }
                _ = trigger.notified() => {}
                _ = tokio::time::sleep(self.fallback_timeout) => {}
            }
        }
    }

    /// Loads every `ready_for_delivery` record, enqueues one envelope per
    /// record not already delivered this process lifetime, then marks the
    /// whole batch `delivered` in a single write (§4.8 "Drain phase").
    async fn drain_ready(&self) {
        let ready = match self
            .explanations_file
            .load_where(|r| r.status == ExplanationStatus::ReadyForDelivery)
            .await
        {
            Ok(records) => records,
            Err(e) => {
                warn!(err = %e, "delivery: failed to load ready explanations");
                return;
            }
        };
        if ready.is_empty() {
            return;
        }

        let mut delivered_ids = self.delivered_ids.lock().await;
        let mut newly_delivered = Vec::new();
        for record in &ready {
            if delivered_ids.contains(&record.id) {
                continue;
            }
            self.deliver(record).await;
            delivered_ids.insert(record.id.clone());
            newly_delivered.push(record.id.clone());
        }
        drop(delivered_ids);

        if newly_delivered.is_empty() {
            return;
        }
        let now = now_secs();
        let result = self
            .explanations_file
            .update_many(&newly_delivered, |r| {
                r.status = ExplanationStatus::Delivered;
                r.delivered_at = Some(now);
            })
            .await;
        if let Err(e) = result {
            warn!(err = %e, "delivery: failed to mark batch delivered");
        }
    }

    /// Builds and enqueues one `explanation.new`/`explanation.retry`
    /// envelope, broadcast to `all_frontends` (§4.8, ported payload shape
    /// from `Backend/services/ExplanationDeliveryService.py::_deliver_explanation`).
    async fn deliver(&self, record: &ExplanationRecord) {
        let payload = json!({
            "explanation": {
                "id": record.id,
                "term": record.term,
                "content": record.explanation,
                "context": record.context,
                "timestamp": record.timestamp,
                "client_id": record.client_id,
                "user_session_id": record.user_session_id,
                "confidence": record.confidence,
                "original_detection_id": record.original_detection_id,
            }
        });
        let envelope = Envelope::new(record.message_type.as_message_type(), payload)
            .with_origin("explanation_delivery_service")
            .with_destination(GROUP_ALL_FRONTENDS);
        let envelope = match &record.client_id {
            Some(client_id) => envelope.with_client_id(client_id.clone()),
            None => envelope,
        };
        info!(term = %record.term, id = %record.id, "delivery: delivering explanation");
        self.outgoing.enqueue(envelope).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::records::ExplanationMessageType;
    use uuid::Uuid;

    fn ready_record(term: &str) -> ExplanationRecord {
        ExplanationRecord {
            id: Uuid::new_v4().to_string(),
            term: term.to_owned(),
            explanation: "A short explanation.".to_owned(),
            context: "context sentence".to_owned(),
            confidence: 0.2,
            timestamp: now_secs(),
            client_id: Some("frontend_a".to_owned()),
            user_session_id: None,
            original_detection_id: "det-1".to_owned(),
            status: ExplanationStatus::ReadyForDelivery,
            delivered_at: None,
            message_type: ExplanationMessageType::New,
        }
    }

    #[tokio::test]
    async fn drain_delivers_and_marks_delivered() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let explanations_file: Arc<FileQueue<ExplanationRecord>> =
            Arc::new(FileQueue::new(dir.path().join("explanations.json")));
        explanations_file.append(ready_record("backpropagation")).await?;
        let outgoing = Arc::new(Queue::bounded("outgoing"));
        let service = DeliveryService::new(Arc::clone(&explanations_file), Arc::clone(&outgoing), Duration::from_secs(5));

        service.drain_ready().await;

        let envelope = outgoing.dequeue().await;
        assert_eq!(envelope.kind, "explanation.new");
        assert_eq!(envelope.destination.as_deref(), Some(GROUP_ALL_FRONTENDS));

        let records = explanations_file.snapshot().await?;
        assert_eq!(records[0].status, ExplanationStatus::Delivered);
        assert!(records[0].delivered_at.is_some());
        Ok(())
    }

    #[tokio::test]
    async fn at_most_once_per_process_lifetime() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let explanations_file: Arc<FileQueue<ExplanationRecord>> =
            Arc::new(FileQueue::new(dir.path().join("explanations.json")));
        explanations_file.append(ready_record("quantization")).await?;
        let outgoing = Arc::new(Queue::bounded("outgoing"));
        let service = DeliveryService::new(Arc::clone(&explanations_file), Arc::clone(&outgoing), Duration::from_secs(5));

        service.drain_ready().await;
        let _ = outgoing.dequeue().await;

        // A second drain should find nothing new to deliver (file already
        // shows `delivered`, and the in-memory id set also guards it).
        service.drain_ready().await;
        assert_eq!(outgoing.qsize().await, 0);
        Ok(())
    }
}
