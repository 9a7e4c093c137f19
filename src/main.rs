/* Copyright (C) 2025 Pedro Henrique / phkaiser13
* File: src/main.rs
*
* Entry point. Loads configuration, initializes telemetry and metrics,
* runs the RBAC preflight probe against every cluster, then wires the
* Connection Manager, Event Pipeline and Scheduler together and drives
* them concurrently until a shutdown signal arrives. Mirrors the
* operator's `#[tokio::main]` + shared `Context` + `tokio::join!` shape,
* generalized from one controller per CRD to one subsystem per pipeline
* stage.
*
* SPDX-License-Identifier: Apache-2.0 */

mod circuit_breaker;
mod config;
mod connection;
mod health;
mod metrics;
mod permission;
mod pipeline;
mod scheduler;
mod shutdown;
mod telemetry;

use std::collections::HashMap;
use std::sync::atomic::AtomicI64;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use nightcrier_agent::{AgentRunConfig, WorkspaceManager};
use nightcrier_sinks::{ChatSink, ObjectStoreSink, S3ObjectStoreBackend, SlackChatBackend};
use tokio::sync::{mpsc, Notify, Semaphore};
use tracing::info;

use crate::circuit_breaker::CircuitBreaker;
use crate::config::Config;
use crate::connection::{ConnectionManager, HttpFaultStreamClient};
use crate::health::HealthState;
use crate::pipeline::EventPipeline;
use crate::scheduler::{Scheduler, SchedulerContext};
use crate::shutdown::Shutdown;

#[tokio::main]
async fn main() -> Result<()> {
    telemetry::init();

    let config = config::load().context("failed to load configuration")?;
    info!(clusters = config.clusters.len(), "configuration loaded");

    let registry = metrics::create_and_register_metrics().context("failed to register metrics")?;
    info!("metrics registry ready");

    let permissions = permission::validate_all(&config.clusters)
        .await
        .context("fatal permission validation failure at startup")?;
    let permissions: HashMap<String, nightcrier_model::ClusterPermissions> = config
        .clusters
        .iter()
        .zip(permissions.into_iter())
        .map(|(c, p)| (c.name.clone(), p))
        .collect();
    info!("RBAC preflight probe complete for every cluster");

    let shutdown = Shutdown::new();
    let health = HealthState::new();

    let transport = Arc::new(
        HttpFaultStreamClient::new(config.clusters.len()).context("failed to build fault-stream HTTP client")?,
    );
    let connection_manager = ConnectionManager::new(transport, &config.clusters);

    let (global_tx, global_rx) = mpsc::channel(config.global_queue_size);
    connection_manager.spawn_subscribers(
        &config.clusters,
        global_tx,
        Duration::from_secs(config.sse_read_timeout_seconds),
        Duration::from_secs(config.sse_reconnect_initial_backoff_seconds),
        Duration::from_secs(config.sse_reconnect_max_backoff_seconds),
        health.clone(),
        shutdown.subscribe(),
    );
    info!("connection manager subscribers spawned");

    let queue_notify = Arc::new(Notify::new());
    let pipeline = Arc::new(EventPipeline::new(
        config.severity_threshold,
        Duration::from_secs(config.dedup_window_seconds),
        &config.clusters,
        config.cluster_queue_size,
        config.queue_overflow_policy,
        queue_notify.clone(),
    ));

    let chat_sink = Arc::new(build_chat_sink(&config)?);
    let object_store_sink = Arc::new(build_object_store_sink(&config)?);

    let workspace_manager = Arc::new(WorkspaceManager::new(config.workspace_root.clone(), is_debug_build()));

    let agent_run_config_template = AgentRunConfig {
        agent_script_path: config.agent.agent_script_path.clone(),
        agent_cli: config.agent.agent_cli.clone(),
        agent_image: config.agent.agent_image.clone(),
        agent_model: config.agent.agent_model.clone(),
        agent_allowed_tools: config.agent.agent_allowed_tools.clone(),
        system_prompt_path: config.agent.system_prompt_path.clone(),
        api_key_secret: config.agent.api_key_secret.clone(),
        verbosity: config.agent.verbosity.clone(),
        kubeconfig_mount: config.workspace_root.clone(),
        agent_timeout: Duration::from_secs(config.agent_timeout_seconds),
        timeout_buffer: Duration::from_secs(config.tuning.timeout_buffer_seconds),
        wait_delay: Duration::from_secs(config.tuning.wait_delay_seconds),
        investigation_min_size_bytes: config.tuning.investigation_min_size_bytes,
    };

    let cluster_triage_enabled: HashMap<String, bool> =
        config.clusters.iter().map(|c| (c.name.clone(), c.triage_enabled)).collect();
    let cluster_kubeconfig: HashMap<String, std::path::PathBuf> = config
        .clusters
        .iter()
        .filter_map(|c| c.kubeconfig.clone().map(|k| (c.name.clone(), k)))
        .collect();

    let scheduler_context = SchedulerContext {
        queues: pipeline.queues().cloned().collect(),
        notify: queue_notify,
        semaphore: Arc::new(Semaphore::new(config.max_concurrent_agents)),
        workspace_manager,
        agent_run_config_template,
        permissions,
        cluster_triage_enabled,
        cluster_kubeconfig,
        circuit_breaker: Arc::new(CircuitBreaker::new(
            config.failure_threshold_for_alert,
            config.tuning.max_failure_reasons_tracked,
        )),
        chat_sink,
        object_store_sink,
        notify_on_agent_failure: config.notify_on_agent_failure,
        upload_failed_investigations: config.upload_failed_investigations,
        failure_reasons_display_count: config.tuning.failure_reasons_display_count,
        agents_active: Arc::new(AtomicI64::new(0)),
        shutdown: shutdown.clone(),
        health: health.clone(),
    };
    let scheduler = Scheduler::new(scheduler_context);
    scheduler.spawn_workers(config.max_concurrent_agents, shutdown.subscribe());
    info!(workers = config.max_concurrent_agents, "scheduler workers spawned");

    let pipeline_ingest = pipeline.clone();
    let ingest_shutdown = shutdown.subscribe();
    let pipeline_dedup = pipeline.clone();
    let dedup_shutdown = shutdown.subscribe();
    let pipeline_aging = pipeline.clone();
    let aging_shutdown = shutdown.subscribe();
    let queue_max_age = Duration::from_secs(config.tuning.queue_max_age_seconds);

    tokio::spawn(async move {
        pipeline_ingest.run_ingest_loop(global_rx, ingest_shutdown).await;
    });
    tokio::spawn(async move {
        pipeline_dedup.run_dedup_sweep(dedup_shutdown).await;
    });
    tokio::spawn(async move {
        pipeline_aging.run_aging_sweep(queue_max_age, aging_shutdown).await;
    });

    let health_server = health.clone();
    let health_port = config.tuning.health_port;
    let metrics_port = config.tuning.metrics_port;
    tokio::spawn(async move {
        health::run_health_server(health_port, metrics_port, registry, health_server).await;
    });

    shutdown.wait_for_signal().await;
    health.mark_shutting_down();
    info!(
        timeout_seconds = config.shutdown_timeout_seconds,
        "shutdown signal received, draining in-flight work"
    );

    let drained = tokio::time::timeout(
        Duration::from_secs(config.shutdown_timeout_seconds),
        wait_until_idle(scheduler),
    )
    .await;

    if drained.is_err() {
        tracing::warn!("shutdown timeout elapsed with agents still in flight");
        std::process::exit(1);
    }

    info!("shutdown drain complete, exiting");
    Ok(())
}

async fn wait_until_idle(scheduler: Scheduler) {
    loop {
        if scheduler.agents_active() == 0 {
            return;
        }
        tokio::time::sleep(Duration::from_millis(200)).await;
    }
}

fn build_chat_sink(config: &Config) -> Result<ChatSink> {
    match std::env::var("NIGHTCRIER_SLACK_WEBHOOK_URL") {
        Ok(url) if !url.is_empty() => {
            let backend = SlackChatBackend::new(url, Duration::from_secs(config.tuning.slack_timeout_seconds))
                .context("failed to build Slack chat backend")?;
            Ok(ChatSink::enabled(backend))
        }
        _ => Ok(ChatSink::disabled()),
    }
}

fn build_object_store_sink(_config: &Config) -> Result<ObjectStoreSink> {
    match (
        std::env::var("NIGHTCRIER_OBJECT_STORE_ENDPOINT"),
        std::env::var("NIGHTCRIER_OBJECT_STORE_PREFIX"),
    ) {
        (Ok(endpoint), Ok(prefix)) if !endpoint.is_empty() => {
            let backend = S3ObjectStoreBackend::new(endpoint, prefix).context("failed to build object store backend")?;
            Ok(ObjectStoreSink::enabled(backend))
        }
        _ => Ok(ObjectStoreSink::disabled()),
    }
}

fn is_debug_build() -> bool {
    cfg!(debug_assertions)
}
