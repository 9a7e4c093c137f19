/* Copyright (C) 2025 Pedro Henrique / phkaiser13
* File: src/pipeline/dedup.rs
*
* Time-windowed deduplication: an in-memory map from DedupKey to
* first-seen timestamp with TTL = `dedup_window_seconds`. Guarded by a
* single lock, mirroring the shared-cache-behind-one-lock shape used for
* the fleet's autoheal rule cache.
*
* SPDX-License-Identifier: Apache-2.0 */

use std::collections::HashMap;
use std::time::{Duration, Instant};

use nightcrier_model::DedupKey;
use tokio::sync::Mutex;

pub struct Deduper {
    window: Duration,
    seen: Mutex<HashMap<DedupKey, Instant>>,
}

impl Deduper {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            seen: Mutex::new(HashMap::new()),
        }
    }

    /// Returns `true` if `key` is admitted (absent, or outside the
    /// window); restamps the key's first-seen time either way an arrival
    /// is admitted. Returns `false` if the key is within the window,
    /// meaning the event must be dropped.
    pub async fn admit(&self, key: DedupKey) -> bool {
        let now = Instant::now();
        let mut seen = self.seen.lock().await;
        match seen.get(&key) {
            Some(first_seen) if now.duration_since(*first_seen) < self.window => false,
            _ => {
                seen.insert(key, now);
                true
            }
        }
    }

    /// Evicts all keys older than the dedup window. Intended to run on a
    /// periodic sweep (every ≥1s) so the map doesn't grow unbounded.
    pub async fn sweep(&self) -> usize {
        let now = Instant::now();
        let mut seen = self.seen.lock().await;
        let before = seen.len();
        seen.retain(|_, first_seen| now.duration_since(*first_seen) < self.window);
        before - seen.len()
    }

    pub async fn len(&self) -> usize {
        self.seen.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(n: &str) -> DedupKey {
        DedupKey {
            cluster_name: "c1".into(),
            fault_type: "CrashLoopBackOff".into(),
            namespace: "default".into(),
            resource_kind: "Pod".into(),
            resource_name: n.into(),
        }
    }

    #[tokio::test]
    async fn second_arrival_within_window_is_dropped() {
        let deduper = Deduper::new(Duration::from_secs(300));
        assert!(deduper.admit(key("p")).await);
        assert!(!deduper.admit(key("p")).await);
    }

    #[tokio::test]
    async fn arrival_outside_window_is_admitted_again() {
        let deduper = Deduper::new(Duration::from_millis(10));
        assert!(deduper.admit(key("p")).await);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(deduper.admit(key("p")).await);
    }

    #[tokio::test]
    async fn sweep_evicts_expired_keys() {
        let deduper = Deduper::new(Duration::from_millis(10));
        deduper.admit(key("p")).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        let evicted = deduper.sweep().await;
        assert_eq!(evicted, 1);
        assert_eq!(deduper.len().await, 0);
    }
}
