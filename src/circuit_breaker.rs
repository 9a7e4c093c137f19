/* Copyright (C) 2025 Pedro Henrique / phkaiser13
* File: src/circuit_breaker.rs
*
* Process-wide circuit breaker: a counter of consecutive `agent_failed`
* outcomes since the last `success`, the first-failure timestamp, a
* bounded ring of recent failure reasons, an `alerted` flag, and a single
* mutex guarding all of it together — mirroring the single-lock shared
* state the fleet's autoheal rule cache uses, here for read-and-increment
* rather than read-mostly access.
*
* SPDX-License-Identifier: Apache-2.0 */

use std::collections::VecDeque;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

struct State {
    consecutive_failures: u64,
    first_failure_at: Option<DateTime<Utc>>,
    recent_reasons: VecDeque<String>,
    alerted: bool,
}

pub struct CircuitBreaker {
    failure_threshold_for_alert: u64,
    max_failure_reasons_tracked: usize,
    state: Mutex<State>,
}

/// Emitted by `record_failure`/`record_success` when a chat notification
/// should be sent; `None` means no notification is due this call.
pub enum BreakerEvent {
    Degraded {
        failure_count: u64,
        first_failure_at: DateTime<Utc>,
        reasons: Vec<String>,
    },
    Recovered {
        outage: Duration,
        total_failures: u64,
    },
}

impl CircuitBreaker {
    pub fn new(failure_threshold_for_alert: u64, max_failure_reasons_tracked: usize) -> Self {
        Self {
            failure_threshold_for_alert,
            max_failure_reasons_tracked,
            state: Mutex::new(State {
                consecutive_failures: 0,
                first_failure_at: None,
                recent_reasons: VecDeque::new(),
                alerted: false,
            }),
        }
    }

    pub async fn is_alerted(&self) -> bool {
        self.state.lock().await.alerted
    }

    /// Increments the consecutive-failure counter. If not already
    /// `alerted` and the counter has reached the threshold, returns one
    /// aggregated `Degraded` event and sets `alerted` so later failures in
    /// the same outage produce no further notification.
    pub async fn record_failure(&self, reason: String, failure_reasons_display_count: usize) -> Option<BreakerEvent> {
        let mut state = self.state.lock().await;
        state.consecutive_failures += 1;
        if state.first_failure_at.is_none() {
            state.first_failure_at = Some(Utc::now());
        }
        state.recent_reasons.push_back(reason);
        while state.recent_reasons.len() > self.max_failure_reasons_tracked {
            state.recent_reasons.pop_front();
        }

        if !state.alerted && state.consecutive_failures >= self.failure_threshold_for_alert {
            state.alerted = true;
            let reasons = state
                .recent_reasons
                .iter()
                .rev()
                .take(failure_reasons_display_count)
                .cloned()
                .collect::<Vec<_>>()
                .into_iter()
                .rev()
                .collect();
            return Some(BreakerEvent::Degraded {
                failure_count: state.consecutive_failures,
                first_failure_at: state.first_failure_at.unwrap(),
                reasons,
            });
        }
        None
    }

    /// Resets the breaker to its healthy state. If it was `alerted`,
    /// returns one `Recovered` event; otherwise returns `None` so a
    /// routine run of successes never produces chatter.
    pub async fn record_success(&self) -> Option<BreakerEvent> {
        let mut state = self.state.lock().await;
        let was_alerted = state.alerted;
        let total_failures = state.consecutive_failures;
        let first_failure_at = state.first_failure_at.take();

        state.consecutive_failures = 0;
        state.alerted = false;
        state.recent_reasons.clear();

        if was_alerted {
            let outage = first_failure_at
                .map(|t| (Utc::now() - t).to_std().unwrap_or_default())
                .unwrap_or_default();
            Some(BreakerEvent::Recovered { outage, total_failures })
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn emits_exactly_one_degraded_notification_past_threshold() {
        let breaker = CircuitBreaker::new(3, 10);
        assert!(breaker.record_failure("r1".into(), 3).await.is_none());
        assert!(breaker.record_failure("r2".into(), 3).await.is_none());
        assert!(matches!(
            breaker.record_failure("r3".into(), 3).await,
            Some(BreakerEvent::Degraded { .. })
        ));
        // Further failures past the threshold produce no additional alert.
        assert!(breaker.record_failure("r4".into(), 3).await.is_none());
        assert!(breaker.record_failure("r5".into(), 3).await.is_none());
    }

    #[tokio::test]
    async fn success_after_alert_emits_recovered_and_resets() {
        let breaker = CircuitBreaker::new(1, 10);
        breaker.record_failure("r1".into(), 3).await;
        assert!(breaker.is_alerted().await);
        let event = breaker.record_success().await;
        assert!(matches!(event, Some(BreakerEvent::Recovered { .. })));
        assert!(!breaker.is_alerted().await);
    }

    #[tokio::test]
    async fn success_without_prior_alert_emits_nothing() {
        let breaker = CircuitBreaker::new(3, 10);
        breaker.record_failure("r1".into(), 3).await;
        assert!(breaker.record_success().await.is_none());
    }
}
