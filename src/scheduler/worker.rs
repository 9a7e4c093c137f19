/* Copyright (C) 2025 Pedro Henrique / phkaiser13
* File: src/scheduler/worker.rs
*
* One worker's lifecycle: acquire a global permit, pull the next event
* round-robin across per-cluster queues, create its workspace, run the
* sandboxed agent, validate the result, then route it to the circuit
* breaker and sinks. A cluster with `triage.enabled = false` never reaches
* the agent run — its events are pulled and discarded here, matching the
* invariant that it never instantiates an `AgentRunResult`.
*
* SPDX-License-Identifier: Apache-2.0 */

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use nightcrier_model::{AgentRunStatus, FaultEvent, Incident, IncidentSummary};
use tokio::sync::broadcast;
use tracing::{info, warn};
use uuid::Uuid;

use super::SchedulerContext;
use crate::circuit_breaker::BreakerEvent;
use crate::metrics;

pub async fn run_worker(worker_id: usize, context: Arc<SchedulerContext>, mut shutdown: broadcast::Receiver<()>) {
    let queue_count = context.queues.len();
    if queue_count == 0 {
        return;
    }
    let mut cursor = worker_id % queue_count;

    loop {
        let event = loop {
            if let Some(found) = dequeue_round_robin(&context, &mut cursor).await {
                break Some(found);
            }
            tokio::select! {
                biased;
                _ = shutdown.recv() => break None,
                _ = context.notify.notified() => continue,
                _ = tokio::time::sleep(Duration::from_millis(200)) => continue,
            }
        };

        let Some(event) = event else { return };

        let permit = tokio::select! {
            biased;
            _ = shutdown.recv() => return,
            permit = context.semaphore.clone().acquire_owned() => permit,
        };
        let Ok(permit) = permit else { return };

        metrics::EVENTS_DEQUEUED_TOTAL.with_label_values(&[&event.cluster_name]).inc();
        context.agents_active.fetch_add(1, Ordering::SeqCst);
        metrics::AGENTS_ACTIVE.inc();

        process_event(&context, event).await;

        context.agents_active.fetch_sub(1, Ordering::SeqCst);
        metrics::AGENTS_ACTIVE.dec();
        drop(permit);
    }
}

async fn dequeue_round_robin(context: &SchedulerContext, cursor: &mut usize) -> Option<FaultEvent> {
    let queue_count = context.queues.len();
    for offset in 0..queue_count {
        let idx = (*cursor + offset) % queue_count;
        if let Some(event) = context.queues[idx].dequeue().await {
            *cursor = (idx + 1) % queue_count;
            return Some(event);
        }
    }
    None
}

async fn process_event(context: &Arc<SchedulerContext>, event: FaultEvent) {
    let cluster_name = event.cluster_name.clone();

    let triage_enabled = context.cluster_triage_enabled.get(&cluster_name).copied().unwrap_or(false);
    if !triage_enabled {
        info!(cluster = %cluster_name, "triage disabled for cluster, discarding event without creating an incident");
        return;
    }

    let Some(permissions) = context.permissions.get(&cluster_name).cloned() else {
        warn!(cluster = %cluster_name, "no cached ClusterPermissions for cluster, discarding event");
        return;
    };

    let Some(kubeconfig_mount) = context.cluster_kubeconfig.get(&cluster_name).cloned() else {
        warn!(cluster = %cluster_name, "no kubeconfig on file for an enabled-triage cluster, discarding event");
        return;
    };

    let incident_id = Uuid::new_v4();
    let workspace = match context
        .workspace_manager
        .create(incident_id, &event, &permissions)
        .await
    {
        Ok(ws) => ws,
        Err(err) => {
            warn!(cluster = %cluster_name, %err, "failed to create incident workspace, discarding event");
            return;
        }
    };

    let incident = Incident {
        id: incident_id,
        event: event.clone(),
        permissions: permissions.clone(),
        workspace_path: workspace.root().to_path_buf(),
    };

    let mut run_config = context.agent_run_config_template.clone();
    run_config.kubeconfig_mount = kubeconfig_mount;

    let runner = nightcrier_agent::AgentRunner::new(run_config);

    metrics::AGENTS_SPAWNED_TOTAL.with_label_values(&[&cluster_name]).inc();

    let result = runner
        .run(incident_id, &event, &permissions, &workspace, context.shutdown.cancelled())
        .await;

    let result = match result {
        Ok(r) => r,
        Err(err) => {
            warn!(incident = %incident_id, %err, "agent runner failed to execute");
            return;
        }
    };

    metrics::AGENTS_COMPLETED_TOTAL
        .with_label_values(&[&cluster_name, result.status.as_str()])
        .inc();
    let duration = (result.ended_at - result.started_at).to_std().unwrap_or_default();
    metrics::AGENT_DURATION_SECONDS.observe(duration.as_secs_f64());
    if result.status == AgentRunStatus::Timeout {
        metrics::AGENTS_TIMEOUT_TOTAL.with_label_values(&[&cluster_name]).inc();
    }

    handle_result(context, &incident, result).await;
}

async fn handle_result(context: &Arc<SchedulerContext>, incident: &Incident, result: nightcrier_model::AgentRunResult) {
    match result.status {
        AgentRunStatus::Success => {
            if let Some(event) = context.circuit_breaker.record_success().await {
                emit_breaker_event(context, event).await;
            }
            notify_and_upload(context, incident, &result).await;
        }
        AgentRunStatus::AgentFailed => {
            let reason = result.failure_reason.clone().unwrap_or_else(|| "unknown".to_string());
            if let Some(event) = context
                .circuit_breaker
                .record_failure(reason, context.failure_reasons_display_count)
                .await
            {
                emit_breaker_event(context, event).await;
            }
            if context.notify_on_agent_failure {
                notify_and_upload(context, incident, &result).await;
            }
        }
        AgentRunStatus::Timeout | AgentRunStatus::Cancelled => {
            // Neither feeds the circuit breaker nor the notification
            // sinks; the local artifact (if any) is still left on disk by
            // the workspace regardless.
        }
    }
}

async fn notify_and_upload(context: &Arc<SchedulerContext>, incident: &Incident, result: &nightcrier_model::AgentRunResult) {
    let should_upload = result.status == AgentRunStatus::Success || context.upload_failed_investigations;

    let artifact_urls = if should_upload {
        if let Some(artifact) = &result.artifact_path {
            let uploaded = context.object_store_sink.upload(incident, &[artifact.as_path()]).await;
            uploaded.into_iter().map(|a| a.url).collect()
        } else {
            Vec::new()
        }
    } else {
        Vec::new()
    };

    let summary = IncidentSummary {
        incident_id: incident.id,
        cluster_name: incident.event.cluster_name.clone(),
        fault_type: incident.event.fault_type.clone(),
        severity: incident.event.severity,
        status: result.status,
        artifact_urls,
    };
    context.chat_sink.notify_incident(summary).await;
}

async fn emit_breaker_event(context: &Arc<SchedulerContext>, event: BreakerEvent) {
    match event {
        BreakerEvent::Degraded {
            failure_count,
            first_failure_at,
            reasons,
        } => {
            metrics::CIRCUIT_BREAKER_STATE.set(1);
            context.health.set_circuit_breaker_alerted(true);
            context.chat_sink.notify_degraded(failure_count, first_failure_at, &reasons).await;
        }
        BreakerEvent::Recovered { outage, total_failures } => {
            metrics::CIRCUIT_BREAKER_STATE.set(0);
            context.health.set_circuit_breaker_alerted(false);
            context.chat_sink.notify_recovered(outage, total_failures).await;
        }
    }
}
