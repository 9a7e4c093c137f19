/* Copyright (C) 2025 Pedro Henrique / phkaiser13
* File: src/metrics.rs
*
* The fixed, low-cardinality metric series the system exposes: cluster
* name, severity, status, reason, classification as labels — never event
* ids, timestamps, or resource names. One process-wide registry,
* constructed once in `main`.
*
* SPDX-License-Identifier: Apache-2.0 */

use lazy_static::lazy_static;
use prometheus::{
    Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, IntGaugeVec, Opts, Registry,
};

lazy_static! {
    pub static ref EVENTS_RECEIVED_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("nightcrier_events_received_total", "Fault events received from the fault stream"),
        &["cluster"]
    )
    .unwrap();
    pub static ref EVENTS_FILTERED_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("nightcrier_events_filtered_total", "Events dropped by the severity filter"),
        &["cluster", "severity"]
    )
    .unwrap();
    pub static ref EVENTS_QUEUED_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("nightcrier_events_queued_total", "Events admitted into a per-cluster queue"),
        &["cluster"]
    )
    .unwrap();
    pub static ref EVENTS_EXPIRED_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("nightcrier_events_expired_total", "Events evicted by the queue-aging sweep"),
        &["cluster"]
    )
    .unwrap();
    pub static ref EVENTS_DEQUEUED_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("nightcrier_events_dequeued_total", "Events pulled off a per-cluster queue by a worker"),
        &["cluster"]
    )
    .unwrap();
    pub static ref EVENTS_OVERFLOWED_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("nightcrier_events_overflowed_total", "Events discarded by the queue overflow policy"),
        &["cluster", "policy"]
    )
    .unwrap();
    pub static ref QUEUE_DEPTH: IntGaugeVec = IntGaugeVec::new(
        Opts::new("nightcrier_queue_depth", "Current depth of a per-cluster queue"),
        &["cluster"]
    )
    .unwrap();
    pub static ref AGENTS_SPAWNED_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("nightcrier_agents_spawned_total", "Agent processes spawned"),
        &["cluster"]
    )
    .unwrap();
    pub static ref AGENTS_COMPLETED_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("nightcrier_agents_completed_total", "Agent runs completed, by terminal status"),
        &["cluster", "status"]
    )
    .unwrap();
    pub static ref AGENTS_TIMEOUT_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("nightcrier_agents_timeout_total", "Agent runs that exceeded their deadline"),
        &["cluster"]
    )
    .unwrap();
    pub static ref AGENT_DURATION_SECONDS: Histogram = Histogram::with_opts(
        HistogramOpts::new("nightcrier_agent_duration_seconds", "Agent run wall-clock duration")
    )
    .unwrap();
    pub static ref AGENTS_ACTIVE: IntGauge =
        IntGauge::new("nightcrier_agents_active", "Agent runs currently in flight").unwrap();
    pub static ref CIRCUIT_BREAKER_STATE: IntGauge =
        IntGauge::new("nightcrier_circuit_breaker_state", "1 if the circuit breaker is alerted, else 0").unwrap();
    pub static ref CONNECTION_ACTIVE: IntGaugeVec = IntGaugeVec::new(
        Opts::new("nightcrier_connection_active", "1 if a cluster's subscriber is Active, else 0"),
        &["cluster"]
    )
    .unwrap();
    pub static ref SSE_RECONNECTIONS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("nightcrier_sse_reconnections_total", "Reconnection attempts by a cluster subscriber"),
        &["cluster", "reason"]
    )
    .unwrap();
    pub static ref SSE_CONNECTION_ERRORS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("nightcrier_sse_connection_errors_total", "Connection errors, classified"),
        &["cluster", "reason"]
    )
    .unwrap();
    pub static ref SSE_CONNECTION_DURATION_SECONDS: Histogram = Histogram::with_opts(HistogramOpts::new(
        "nightcrier_sse_connection_duration_seconds",
        "Duration a cluster subscriber stayed Active before disconnecting"
    ))
    .unwrap();
    pub static ref BUILD_INFO: IntGaugeVec = IntGaugeVec::new(
        Opts::new("nightcrier_build_info", "Always 1; labeled with build metadata"),
        &["version"]
    )
    .unwrap();
    pub static ref UP: IntGauge = IntGauge::new("nightcrier_up", "1 while the process is running").unwrap();
}

/// Builds the process-wide registry and registers every series above.
/// Called once from `main` after configuration is loaded.
pub fn create_and_register_metrics() -> Result<Registry, prometheus::Error> {
    let registry = Registry::new();
    registry.register(Box::new(EVENTS_RECEIVED_TOTAL.clone()))?;
    registry.register(Box::new(EVENTS_FILTERED_TOTAL.clone()))?;
    registry.register(Box::new(EVENTS_QUEUED_TOTAL.clone()))?;
    registry.register(Box::new(EVENTS_EXPIRED_TOTAL.clone()))?;
    registry.register(Box::new(EVENTS_DEQUEUED_TOTAL.clone()))?;
    registry.register(Box::new(EVENTS_OVERFLOWED_TOTAL.clone()))?;
    registry.register(Box::new(QUEUE_DEPTH.clone()))?;
    registry.register(Box::new(AGENTS_SPAWNED_TOTAL.clone()))?;
    registry.register(Box::new(AGENTS_COMPLETED_TOTAL.clone()))?;
    registry.register(Box::new(AGENTS_TIMEOUT_TOTAL.clone()))?;
    registry.register(Box::new(AGENT_DURATION_SECONDS.clone()))?;
    registry.register(Box::new(AGENTS_ACTIVE.clone()))?;
    registry.register(Box::new(CIRCUIT_BREAKER_STATE.clone()))?;
    registry.register(Box::new(CONNECTION_ACTIVE.clone()))?;
    registry.register(Box::new(SSE_RECONNECTIONS_TOTAL.clone()))?;
    registry.register(Box::new(SSE_CONNECTION_ERRORS_TOTAL.clone()))?;
    registry.register(Box::new(SSE_CONNECTION_DURATION_SECONDS.clone()))?;
    registry.register(Box::new(BUILD_INFO.clone()))?;
    registry.register(Box::new(UP.clone()))?;

    UP.set(1);
    BUILD_INFO.with_label_values(&[env!("CARGO_PKG_VERSION")]).set(1);

    Ok(registry)
}
