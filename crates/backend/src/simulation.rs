// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Simulation manager collaborator referenced by the router's
//! `simulation.start`/`simulation.stop` handling (§4.9). The router only
//! calls it "if present"; a real simulation manager (queue-replay demo
//! tooling, ported from `Backend/core/simulator.py`) is an optional
//! composition-root detail, not part of the routing contract itself.

use async_trait::async_trait;

#[async_trait]
pub trait SimulationManager: Send + Sync {
    async fn start(&self, client_id: &str) -> anyhow::Result<()>;
    async fn stop(&self, client_id: Option<&str>) -> anyhow::Result<()>;
}

/// No-op simulation manager used when no real one is configured.
pub struct NullSimulationManager;

#[async_trait]
impl SimulationManager for NullSimulationManager {
    async fn start(&self, _client_id: &str) -> anyhow::Result<()> {
        Ok(())
    }

    async fn stop(&self, _client_id: Option<&str>) -> anyhow::Result<()> {
        Ok(())
    }
}
