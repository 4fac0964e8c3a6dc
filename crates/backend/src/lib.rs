// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Composition root for the termrelay backend: wires the bus (C2/C3), the
//! settings and session stores (C4/C5), the two model workers (C6/C7), the
//! delivery service (C8), the router (C9), and the WebSocket gateway (C10)
//! into one running process.

pub mod bus;
pub mod config;
pub mod gateway;
pub mod llm;
pub mod router;
pub mod simulation;
pub mod store;
pub mod workers;

use std::sync::Arc;

use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::info;

use bus::Bus;
use config::BackendConfig;
use gateway::Gateway;
use llm::HttpLlmClient;
use router::Router;
use simulation::NullSimulationManager;
use store::SettingsStore;
use workers::delivery::DeliveryService;
use workers::detector::Detector;
use workers::explainer::Explainer;

/// Runs the backend until `shutdown` is cancelled (e.g. by ctrl-c) or the
/// gateway's listener fails to bind. Shuts down consumers before producers
/// (§5 "Shutdown"): the gateway stops accepting new frames first, then the
/// router, then the delivery service and explainer, then the detector's
/// in-flight tasks are allowed to drain naturally.
pub async fn run(config: BackendConfig) -> anyhow::Result<()> {
    let bus = Bus::new();

    let settings = Arc::new(SettingsStore::new(config.settings_file.clone()));
    if settings.load_from_file().await? {
        info!(path = %settings.file_path().display(), "backend: loaded settings from disk");
    }

    let detections_file = Arc::new(bus::file_queue::FileQueue::new(config.detections_file.clone()));
    let explanations_file = Arc::new(bus::file_queue::FileQueue::new(config.explanations_file.clone()));

    let detector_llm = Arc::new(HttpLlmClient::new(
        config.detector_llm_url.clone(),
        config.llm_model.clone(),
        config.llm_timeout(),
    ));
    let explainer_llm = Arc::new(HttpLlmClient::new(
        config.explainer_llm_url.clone(),
        config.llm_model.clone(),
        config.llm_timeout(),
    ));

    let explainer_trigger = Arc::new(Notify::new());
    let delivery_trigger = Arc::new(Notify::new());

    let detector = Arc::new(Detector::new(
        Arc::clone(&detections_file),
        Arc::clone(&bus.outgoing),
        Arc::clone(&settings),
        detector_llm,
        Arc::clone(&explainer_trigger),
    ));

    let explainer = Arc::new(Explainer::new(
        Arc::clone(&detections_file),
        Arc::clone(&explanations_file),
        Arc::clone(&settings),
        explainer_llm,
        Arc::clone(&delivery_trigger),
    ));

    let delivery = Arc::new(DeliveryService::new(
        Arc::clone(&explanations_file),
        Arc::clone(&bus.outgoing),
        config.delivery_poll_interval(),
    ));

    let router = Arc::new(Router::new(
        Arc::clone(&bus.incoming),
        Arc::clone(&bus.outgoing),
        Arc::clone(&bus.websocket_out),
        Arc::clone(&bus.dead_letter),
        Arc::clone(&detector),
        Arc::clone(&settings),
        Arc::new(NullSimulationManager),
    ));

    let shutdown = CancellationToken::new();
    let gateway = Gateway::new(Arc::clone(&bus.incoming), Arc::clone(&bus.websocket_out), shutdown.clone());

    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            let _ = tokio::signal::ctrl_c().await;
            info!("backend: received shutdown signal");
            shutdown.cancel();
        });
    }

    let dispatcher_task = tokio::spawn(Arc::clone(&gateway).run_dispatcher());
    let router_task = {
        let shutdown = shutdown.clone();
        tokio::spawn(Arc::clone(&router).run(shutdown))
    };
    let explainer_task = {
        let shutdown = shutdown.clone();
        let trigger = Arc::clone(&explainer_trigger);
        let explainer = Arc::clone(&explainer);
        tokio::spawn(async move { explainer.run(trigger, shutdown).await })
    };
    let delivery_task = {
        let shutdown = shutdown.clone();
        let trigger = Arc::clone(&delivery_trigger);
        let delivery = Arc::clone(&delivery);
        tokio::spawn(async move { delivery.run(trigger, shutdown).await })
    };

    let app = gateway.router();
    let listener = tokio::net::TcpListener::bind(config.addr()).await?;
    info!(addr = %config.addr(), "backend: listening");
    axum::serve(listener, app).with_graceful_shutdown(shutdown.cancelled_owned()).await?;

    gateway.shutdown_all().await;
    let _ = dispatcher_task.await;
    let _ = router_task.await;
    let _ = delivery_task.await;
    let _ = explainer_task.await;

    Ok(())
}
