/* Copyright (C) 2025 Pedro Henrique / phkaiser13
* File: src/connection/backoff.rs
*
* Exponential backoff with multiplicative factor 2 and ±10% jitter,
* starting at `initial` and capped at `max`. A successful subscribe resets
* it via `reset()`.
*
* SPDX-License-Identifier: Apache-2.0 */

use std::time::Duration;

use rand::Rng;

#[derive(Debug, Clone)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    current: Duration,
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max,
            current: initial,
        }
    }

    /// Returns the delay to wait before the next attempt, then doubles
    /// the underlying value (capped at `max`) for the attempt after that.
    pub fn next_delay(&mut self) -> Duration {
        let jittered = apply_jitter(self.current);
        self.current = std::cmp::min(self.current.saturating_mul(2), self.max);
        jittered
    }

    pub fn reset(&mut self) {
        self.current = self.initial;
    }
}

fn apply_jitter(base: Duration) -> Duration {
    let mut rng = rand::thread_rng();
    let factor = rng.gen_range(0.9..=1.1);
    Duration::from_secs_f64(base.as_secs_f64() * factor)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_delay_is_within_jitter_of_initial() {
        let mut b = Backoff::new(Duration::from_secs(1), Duration::from_secs(30));
        let d = b.next_delay();
        assert!(d.as_secs_f64() >= 0.9 && d.as_secs_f64() <= 1.1);
    }

    #[test]
    fn delay_doubles_and_caps_at_max() {
        let mut b = Backoff::new(Duration::from_secs(1), Duration::from_secs(3));
        b.next_delay(); // ~1s, current -> 2s
        let second = b.next_delay(); // ~2s, current -> min(4,3) = 3s
        assert!(second.as_secs_f64() <= 2.2);
        let third = b.next_delay(); // ~3s (capped)
        assert!(third.as_secs_f64() <= 3.3);
    }

    #[test]
    fn reset_returns_to_initial() {
        let mut b = Backoff::new(Duration::from_secs(1), Duration::from_secs(30));
        b.next_delay();
        b.next_delay();
        b.reset();
        let d = b.next_delay();
        assert!(d.as_secs_f64() <= 1.1);
    }
}
