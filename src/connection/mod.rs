/* Copyright (C) 2025 Pedro Henrique / phkaiser13
* File: src/connection/mod.rs
*
* Owns one long-lived subscriber per enabled cluster and fans events into
* a single process-wide delivery channel of capacity `global_queue_size`,
* each tagged with the cluster name. Generalizes the concurrent
* per-cluster task shape the fleet's cluster manager uses for client
* construction to a long-running subscribe-and-reconnect loop per cluster.
*
* SPDX-License-Identifier: Apache-2.0 */

mod backoff;
mod state;
mod transport;

pub use backoff::Backoff;
pub use state::{ConnectionState, FailureClassification};
pub use transport::{FaultStreamClient, HttpFaultStreamClient, RawFaultRecord};

use std::sync::Arc;
use std::time::{Duration, Instant};

use nightcrier_model::FaultEvent;
use tokio::sync::{broadcast, mpsc, RwLock};
use tracing::{info, warn};

use crate::config::ClusterConfig;
use crate::health::HealthState;
use crate::metrics;

/// One entry per enabled cluster; exposes the current connection state
/// for readiness computation and metrics.
pub struct ClusterConnectionStatus {
    pub cluster_name: String,
    pub state: RwLock<ConnectionState>,
}

pub struct ConnectionManager {
    transport: Arc<dyn FaultStreamClient>,
    statuses: Vec<Arc<ClusterConnectionStatus>>,
}

impl ConnectionManager {
    pub fn new(transport: Arc<dyn FaultStreamClient>, clusters: &[ClusterConfig]) -> Self {
        let statuses = clusters
            .iter()
            .map(|c| {
                Arc::new(ClusterConnectionStatus {
                    cluster_name: c.name.clone(),
                    state: RwLock::new(ConnectionState::Disconnected),
                })
            })
            .collect();
        Self { transport, statuses }
    }

    /// Spawns one subscriber task per enabled cluster. Each tagged
    /// `FaultEvent` is sent into `global_tx`; if that channel is full the
    /// caller's overflow policy decides whether to drop or reject. Returns
    /// immediately; tasks run until `shutdown` fires.
    pub fn spawn_subscribers(
        &self,
        clusters: &[ClusterConfig],
        global_tx: mpsc::Sender<FaultEvent>,
        sse_read_timeout: Duration,
        initial_backoff: Duration,
        max_backoff: Duration,
        health: HealthState,
        shutdown: broadcast::Receiver<()>,
    ) {
        for (cluster, status) in clusters.iter().zip(self.statuses.iter()) {
            let cluster = cluster.clone();
            let status = status.clone();
            let transport = self.transport.clone();
            let tx = global_tx.clone();
            let health = health.clone();
            let mut shutdown_rx = shutdown.resubscribe();

            tokio::spawn(async move {
                let mut backoff = Backoff::new(initial_backoff, max_backoff);
                // Tracks whether *this* task currently counted itself as
                // active in `health`, so the shared counter is only ever
                // incremented/decremented in matched pairs.
                let mut counted_active = false;
                // When the subscriber entered `Active`, so the duration
                // histogram gets an observation every time it leaves.
                let mut active_since: Option<Instant> = None;

                loop {
                    {
                        let mut state = status.state.write().await;
                        *state = ConnectionState::Connecting;
                    }

                    let subscribe_result = tokio::select! {
                        biased;
                        _ = shutdown_rx.recv() => {
                            info!(cluster = %cluster.name, "shutdown signal received before subscribe");
                            break;
                        }
                        result = transport.subscribe(&cluster.mcp_endpoint, &cluster.subscribe_mode, sse_read_timeout) => result,
                    };

                    let mut rx = match subscribe_result {
                        Ok(rx) => {
                            backoff.reset();
                            {
                                let mut state = status.state.write().await;
                                *state = ConnectionState::Active;
                            }
                            metrics::CONNECTION_ACTIVE
                                .with_label_values(&[&cluster.name])
                                .set(1);
                            active_since = Some(Instant::now());
                            if !counted_active {
                                health.subscriber_became_active();
                                counted_active = true;
                            }
                            rx
                        }
                        Err((classification, e)) => {
                            warn!(cluster = %cluster.name, error = %e, classification = classification.as_str(), "failed to subscribe to fault stream");
                            metrics::SSE_CONNECTION_ERRORS_TOTAL
                                .with_label_values(&[&cluster.name, classification.as_str()])
                                .inc();
                            {
                                let mut state = status.state.write().await;
                                *state = ConnectionState::Disconnected;
                            }
                            let delay = backoff.next_delay();
                            metrics::SSE_RECONNECTIONS_TOTAL
                                .with_label_values(&[&cluster.name, classification.as_str()])
                                .inc();
                            tokio::select! {
                                biased;
                                _ = shutdown_rx.recv() => break,
                                _ = tokio::time::sleep(delay) => continue,
                            }
                        }
                    };

                    let mut disconnect_reason = FailureClassification::ServerClose;

                    loop {
                        tokio::select! {
                            biased;
                            _ = shutdown_rx.recv() => {
                                info!(cluster = %cluster.name, "shutdown signal received, closing subscriber");
                                if let Some(start) = active_since.take() {
                                    metrics::SSE_CONNECTION_DURATION_SECONDS.observe(start.elapsed().as_secs_f64());
                                }
                                if counted_active {
                                    health.subscriber_became_inactive();
                                }
                                return;
                            }
                            record = rx.recv() => {
                                match record {
                                    Some(Ok(raw)) => {
                                        metrics::EVENTS_RECEIVED_TOTAL.with_label_values(&[&cluster.name]).inc();
                                        let event = raw.into_fault_event(cluster.name.clone());
                                        if let Err(e) = tx.try_send(event) {
                                            warn!(cluster = %cluster.name, error = %e, "global channel full or closed, event discarded per overflow policy");
                                        }
                                    }
                                    Some(Err((FailureClassification::Decode, reason))) => {
                                        // Malformed record: a ProtocolError, not a
                                        // transport failure. Dropped in place, no
                                        // reconnect triggered, per the taxonomy split
                                        // between decode and the other classifications.
                                        warn!(cluster = %cluster.name, %reason, "malformed fault record, dropping and continuing");
                                        metrics::SSE_CONNECTION_ERRORS_TOTAL
                                            .with_label_values(&[&cluster.name, "decode"])
                                            .inc();
                                    }
                                    Some(Err((classification, reason))) => {
                                        warn!(cluster = %cluster.name, classification = classification.as_str(), %reason, "fault stream error");
                                        metrics::SSE_CONNECTION_ERRORS_TOTAL
                                            .with_label_values(&[&cluster.name, classification.as_str()])
                                            .inc();
                                        disconnect_reason = classification;
                                        break;
                                    }
                                    None => {
                                        warn!(cluster = %cluster.name, "fault stream channel closed");
                                        disconnect_reason = FailureClassification::ServerClose;
                                        break;
                                    }
                                }
                            }
                        }
                    }

                    {
                        let mut state = status.state.write().await;
                        *state = ConnectionState::Disconnected;
                    }
                    metrics::CONNECTION_ACTIVE.with_label_values(&[&cluster.name]).set(0);
                    if let Some(start) = active_since.take() {
                        metrics::SSE_CONNECTION_DURATION_SECONDS.observe(start.elapsed().as_secs_f64());
                    }
                    if counted_active {
                        health.subscriber_became_inactive();
                        counted_active = false;
                    }
                    let delay = backoff.next_delay();
                    metrics::SSE_RECONNECTIONS_TOTAL
                        .with_label_values(&[&cluster.name, disconnect_reason.as_str()])
                        .inc();
                    tokio::select! {
                        biased;
                        _ = shutdown_rx.recv() => break,
                        _ = tokio::time::sleep(delay) => continue,
                    }
                }

                if counted_active {
                    health.subscriber_became_inactive();
                }
            });
        }
    }
}
