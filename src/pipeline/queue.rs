/* Copyright (C) 2025 Pedro Henrique / phkaiser13
* File: src/pipeline/queue.rs
*
* Bounded per-cluster queues with an overflow policy and an aging sweep.
* `drop`: on a full queue the newest event is silently dropped, existing
* events keep their place. `reject`: the event is discarded upstream and
* nothing already queued is touched. Both policies apply symmetrically to
* the global channel between subscribers and these queues.
*
* SPDX-License-Identifier: Apache-2.0 */

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use nightcrier_model::{FaultEvent, QueueOverflowPolicy};
use tokio::sync::Mutex;

pub enum EnqueueOutcome {
    Enqueued,
    DroppedNewest,
    Rejected,
}

struct Entry {
    event: FaultEvent,
    enqueued_at: Instant,
}

pub struct ClusterQueue {
    cluster_name: String,
    capacity: usize,
    policy: QueueOverflowPolicy,
    entries: Mutex<VecDeque<Entry>>,
}

impl ClusterQueue {
    pub fn new(cluster_name: impl Into<String>, capacity: usize, policy: QueueOverflowPolicy) -> Self {
        Self {
            cluster_name: cluster_name.into(),
            capacity,
            policy,
            entries: Mutex::new(VecDeque::with_capacity(capacity)),
        }
    }

    pub fn cluster_name(&self) -> &str {
        &self.cluster_name
    }

    pub async fn enqueue(&self, event: FaultEvent) -> EnqueueOutcome {
        let mut entries = self.entries.lock().await;
        if entries.len() >= self.capacity {
            return match self.policy {
                QueueOverflowPolicy::Drop => EnqueueOutcome::DroppedNewest,
                QueueOverflowPolicy::Reject => EnqueueOutcome::Rejected,
            };
        }
        entries.push_back(Entry {
            event,
            enqueued_at: Instant::now(),
        });
        EnqueueOutcome::Enqueued
    }

    pub async fn dequeue(&self) -> Option<FaultEvent> {
        let mut entries = self.entries.lock().await;
        entries.pop_front().map(|e| e.event)
    }

    pub async fn depth(&self) -> usize {
        self.entries.lock().await.len()
    }

    /// Removes events older than `max_age`, returning how many were
    /// evicted, so stale investigations are never scheduled.
    pub async fn sweep_aged(&self, max_age: Duration) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        let before = entries.len();
        entries.retain(|e| now.duration_since(e.enqueued_at) < max_age);
        before - entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn event(name: &str) -> FaultEvent {
        FaultEvent {
            cluster_name: "c1".into(),
            fault_type: "CrashLoopBackOff".into(),
            namespace: "default".into(),
            resource_kind: "Pod".into(),
            resource_name: name.into(),
            severity: nightcrier_model::Severity::Error,
            timestamp: chrono::Utc::now(),
            context: BTreeMap::new(),
        }
    }

    #[tokio::test]
    async fn drop_policy_keeps_existing_and_drops_newest() {
        let q = ClusterQueue::new("c1", 1, QueueOverflowPolicy::Drop);
        assert!(matches!(q.enqueue(event("a")).await, EnqueueOutcome::Enqueued));
        assert!(matches!(q.enqueue(event("b")).await, EnqueueOutcome::DroppedNewest));
        let remaining = q.dequeue().await.unwrap();
        assert_eq!(remaining.resource_name, "a");
    }

    #[tokio::test]
    async fn reject_policy_leaves_queue_untouched() {
        let q = ClusterQueue::new("c1", 1, QueueOverflowPolicy::Reject);
        assert!(matches!(q.enqueue(event("a")).await, EnqueueOutcome::Enqueued));
        assert!(matches!(q.enqueue(event("b")).await, EnqueueOutcome::Rejected));
        assert_eq!(q.depth().await, 1);
    }

    #[tokio::test]
    async fn sweep_aged_evicts_stale_entries() {
        let q = ClusterQueue::new("c1", 10, QueueOverflowPolicy::Drop);
        q.enqueue(event("a")).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        let evicted = q.sweep_aged(Duration::from_millis(10)).await;
        assert_eq!(evicted, 1);
        assert_eq!(q.depth().await, 0);
    }

    #[tokio::test]
    async fn queue_bound_never_exceeds_capacity() {
        let q = ClusterQueue::new("c1", 2, QueueOverflowPolicy::Drop);
        for i in 0..5 {
            q.enqueue(event(&i.to_string())).await;
        }
        assert!(q.depth().await <= 2);
    }
}
