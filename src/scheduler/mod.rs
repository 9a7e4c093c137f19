/* Copyright (C) 2025 Pedro Henrique / phkaiser13
* File: src/scheduler/mod.rs
*
* Global concurrency-limited worker pool: a single semaphore of
* `max_concurrent_agents` permits fronts a pool of workers that pull
* round-robin across per-cluster queues, create a workspace, run the
* sandboxed agent, validate the result and route it to the circuit
* breaker and sinks. Generalizes the `tokio::spawn` + `join_all`
* fan-out/fan-in shape the fleet's cluster manager uses for one task per
* cluster per stage to one task per accepted incident.
*
* SPDX-License-Identifier: Apache-2.0 */

mod worker;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use nightcrier_model::ClusterPermissions;
use nightcrier_agent::{AgentRunConfig, WorkspaceManager};
use nightcrier_sinks::{ChatSink, ObjectStoreSink};
use tokio::sync::{broadcast, Notify, Semaphore};

use crate::circuit_breaker::CircuitBreaker;
use crate::health::HealthState;
use crate::pipeline::ClusterQueue;
use crate::shutdown::Shutdown;

pub struct SchedulerContext {
    pub queues: Vec<Arc<ClusterQueue>>,
    pub notify: Arc<Notify>,
    pub semaphore: Arc<Semaphore>,
    pub workspace_manager: Arc<WorkspaceManager>,
    pub agent_run_config_template: AgentRunConfig,
    pub permissions: HashMap<String, ClusterPermissions>,
    pub cluster_triage_enabled: HashMap<String, bool>,
    pub cluster_kubeconfig: HashMap<String, PathBuf>,
    pub circuit_breaker: Arc<CircuitBreaker>,
    pub chat_sink: Arc<ChatSink>,
    pub object_store_sink: Arc<ObjectStoreSink>,
    pub notify_on_agent_failure: bool,
    pub upload_failed_investigations: bool,
    pub failure_reasons_display_count: usize,
    pub agents_active: Arc<AtomicI64>,
    /// Shared with the process-wide shutdown signal so an agent run
    /// started just before shutdown still observes it via `cancelled()`.
    pub shutdown: Shutdown,
    /// Updated on every circuit breaker transition so `/readyz` reflects
    /// the alerted state without polling the breaker's own lock.
    pub health: HealthState,
}

pub struct Scheduler {
    context: Arc<SchedulerContext>,
}

impl Scheduler {
    pub fn new(context: SchedulerContext) -> Self {
        Self {
            context: Arc::new(context),
        }
    }

    /// Spawns `max_concurrent_agents` worker tasks; each runs until
    /// `shutdown` fires, draining whatever it is mid-run on before
    /// exiting.
    pub fn spawn_workers(&self, worker_count: usize, shutdown: broadcast::Receiver<()>) {
        for worker_id in 0..worker_count {
            let context = self.context.clone();
            let shutdown_rx = shutdown.resubscribe();
            tokio::spawn(async move {
                worker::run_worker(worker_id, context, shutdown_rx).await;
            });
        }
    }

    pub fn agents_active(&self) -> i64 {
        self.context.agents_active.load(Ordering::SeqCst)
    }
}
