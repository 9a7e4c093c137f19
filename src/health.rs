/* Copyright (C) 2025 Pedro Henrique / phkaiser13
* File: src/health.rs
*
* Liveness, readiness and Prometheus text-format endpoints on a single
* port, served with `warp`. Liveness returns 200 while the process is not
* shutting down; readiness returns 200 iff at least one subscriber is
* Active and the circuit breaker is not alerted.
*
* SPDX-License-Identifier: Apache-2.0 */

use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;

use prometheus::{Encoder, Registry, TextEncoder};
use warp::Filter;

/// Shared readiness/liveness flags updated by the Connection Manager and
/// Circuit Breaker as the process runs. `active_subscriber_count` is a
/// signed counter rather than a boolean so one cluster disconnecting
/// doesn't clobber another cluster's still-Active state.
#[derive(Clone)]
pub struct HealthState {
    shutting_down: Arc<AtomicBool>,
    active_subscriber_count: Arc<AtomicI64>,
    circuit_breaker_alerted: Arc<AtomicBool>,
}

impl HealthState {
    pub fn new() -> Self {
        Self {
            shutting_down: Arc::new(AtomicBool::new(false)),
            active_subscriber_count: Arc::new(AtomicI64::new(0)),
            circuit_breaker_alerted: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn mark_shutting_down(&self) {
        self.shutting_down.store(true, Ordering::SeqCst);
    }

    pub fn subscriber_became_active(&self) {
        self.active_subscriber_count.fetch_add(1, Ordering::SeqCst);
    }

    pub fn subscriber_became_inactive(&self) {
        self.active_subscriber_count.fetch_sub(1, Ordering::SeqCst);
    }

    pub fn set_circuit_breaker_alerted(&self, alerted: bool) {
        self.circuit_breaker_alerted.store(alerted, Ordering::SeqCst);
    }

    fn is_live(&self) -> bool {
        !self.shutting_down.load(Ordering::SeqCst)
    }

    fn is_ready(&self) -> bool {
        self.active_subscriber_count.load(Ordering::SeqCst) > 0 && !self.circuit_breaker_alerted.load(Ordering::SeqCst)
    }
}

impl Default for HealthState {
    fn default() -> Self {
        Self::new()
    }
}

/// Runs liveness and readiness on `health_port` and the Prometheus
/// text-format exporter on its own `metrics_port`, per spec.md §6's
/// recommended two-port layout, and runs both concurrently until the
/// process exits.
pub async fn run_health_server(health_port: u16, metrics_port: u16, registry: Registry, health: HealthState) {
    let health_live = health.clone();
    let livez = warp::path("healthz").map(move || {
        if health_live.is_live() {
            warp::reply::with_status("ok", warp::http::StatusCode::OK)
        } else {
            warp::reply::with_status("shutting down", warp::http::StatusCode::SERVICE_UNAVAILABLE)
        }
    });

    let health_ready = health.clone();
    let readyz = warp::path("readyz").map(move || {
        if health_ready.is_ready() {
            warp::reply::with_status("ok", warp::http::StatusCode::OK)
        } else {
            warp::reply::with_status("not ready", warp::http::StatusCode::SERVICE_UNAVAILABLE)
        }
    });

    let metrics_route = warp::path("metrics").map(move || {
        let encoder = TextEncoder::new();
        let metric_families = registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer).unwrap_or_default();
        warp::reply::with_header(buffer, "Content-Type", encoder.format_type().to_string())
    });

    let health_routes = livez.or(readyz);
    tokio::join!(
        warp::serve(health_routes).run(([0, 0, 0, 0], health_port)),
        warp::serve(metrics_route).run(([0, 0, 0, 0], metrics_port)),
    );
}
