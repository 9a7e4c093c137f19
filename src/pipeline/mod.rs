/* Copyright (C) 2025 Pedro Henrique / phkaiser13
* File: src/pipeline/mod.rs
*
* Wires the severity filter, deduper and per-cluster bounded queues
* together: consumes tagged `FaultEvent`s off the global channel, applies
* filter → dedup → enqueue, and runs the periodic dedup/aging sweeps.
*
* SPDX-License-Identifier: Apache-2.0 */

mod dedup;
mod filter;
mod queue;

pub use dedup::Deduper;
pub use filter::SeverityFilter;
pub use queue::{ClusterQueue, EnqueueOutcome};

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use nightcrier_model::{FaultEvent, QueueOverflowPolicy};
use tokio::sync::{broadcast, mpsc, Notify};
use tracing::warn;

use crate::config::ClusterConfig;
use crate::metrics;

pub struct EventPipeline {
    filter: SeverityFilter,
    deduper: Arc<Deduper>,
    queues: HashMap<String, Arc<ClusterQueue>>,
    /// Woken on every successful enqueue so idle scheduler workers don't
    /// have to busy-poll empty queues.
    notify: Arc<Notify>,
}

impl EventPipeline {
    pub fn new(
        severity_threshold: nightcrier_model::Severity,
        dedup_window: Duration,
        clusters: &[ClusterConfig],
        cluster_queue_size: usize,
        overflow_policy: QueueOverflowPolicy,
        notify: Arc<Notify>,
    ) -> Self {
        let queues = clusters
            .iter()
            .map(|c| {
                (
                    c.name.clone(),
                    Arc::new(ClusterQueue::new(c.name.clone(), cluster_queue_size, overflow_policy)),
                )
            })
            .collect();

        Self {
            filter: SeverityFilter::new(severity_threshold),
            deduper: Arc::new(Deduper::new(dedup_window)),
            queues,
            notify,
        }
    }

    pub fn queue(&self, cluster_name: &str) -> Option<Arc<ClusterQueue>> {
        self.queues.get(cluster_name).cloned()
    }

    pub fn queues(&self) -> impl Iterator<Item = &Arc<ClusterQueue>> {
        self.queues.values()
    }

    /// Drains `global_rx` until shutdown, applying filter then dedup then
    /// per-cluster enqueue to every event.
    pub async fn run_ingest_loop(&self, mut global_rx: mpsc::Receiver<FaultEvent>, mut shutdown: broadcast::Receiver<()>) {
        loop {
            let event = tokio::select! {
                biased;
                _ = shutdown.recv() => return,
                event = global_rx.recv() => match event {
                    Some(e) => e,
                    None => return,
                },
            };

            if !self.filter.admits(&event) {
                metrics::EVENTS_FILTERED_TOTAL
                    .with_label_values(&[&event.cluster_name, event.severity.as_str()])
                    .inc();
                continue;
            }

            if !self.deduper.admit(event.dedup_key()).await {
                continue;
            }

            let Some(queue) = self.queues.get(&event.cluster_name) else {
                warn!(cluster = %event.cluster_name, "event for unknown cluster, dropping");
                continue;
            };

            match queue.enqueue(event.clone()).await {
                EnqueueOutcome::Enqueued => {
                    metrics::EVENTS_QUEUED_TOTAL.with_label_values(&[&event.cluster_name]).inc();
                    self.notify.notify_waiters();
                }
                EnqueueOutcome::DroppedNewest => {
                    warn!(cluster = %event.cluster_name, "cluster queue full, dropping newest event");
                    metrics::EVENTS_OVERFLOWED_TOTAL
                        .with_label_values(&[&event.cluster_name, "drop"])
                        .inc();
                }
                EnqueueOutcome::Rejected => {
                    warn!(cluster = %event.cluster_name, "cluster queue full, rejecting event under reject policy");
                    metrics::EVENTS_OVERFLOWED_TOTAL
                        .with_label_values(&[&event.cluster_name, "reject"])
                        .inc();
                }
            }

            metrics::QUEUE_DEPTH
                .with_label_values(&[&event.cluster_name])
                .set(queue.depth().await as i64);
        }
    }

    /// Periodic dedup-map eviction sweep; runs at least every second.
    pub async fn run_dedup_sweep(&self, mut shutdown: broadcast::Receiver<()>) {
        let mut interval = tokio::time::interval(Duration::from_secs(1));
        loop {
            tokio::select! {
                biased;
                _ = shutdown.recv() => return,
                _ = interval.tick() => {
                    self.deduper.sweep().await;
                }
            }
        }
    }

    /// Periodic queue-aging sweep; evicts events older than `max_age` so
    /// stale investigations are never scheduled.
    pub async fn run_aging_sweep(&self, max_age: Duration, mut shutdown: broadcast::Receiver<()>) {
        let mut interval = tokio::time::interval(Duration::from_secs(10));
        loop {
            tokio::select! {
                biased;
                _ = shutdown.recv() => return,
                _ = interval.tick() => {
                    for queue in self.queues.values() {
                        let evicted = queue.sweep_aged(max_age).await;
                        if evicted > 0 {
                            metrics::EVENTS_EXPIRED_TOTAL
                                .with_label_values(&[queue.cluster_name()])
                                .inc_by(evicted as u64);
                        }
                    }
                }
            }
        }
    }
}
