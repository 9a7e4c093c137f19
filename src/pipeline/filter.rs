/* Copyright (C) 2025 Pedro Henrique / phkaiser13
* File: src/pipeline/filter.rs
*
* Severity filter: drops events with severity strictly less than the
* configured threshold. A pure ordinal comparison against the fixed
* DEBUG..CRITICAL ladder.
*
* SPDX-License-Identifier: Apache-2.0 */

use nightcrier_model::{FaultEvent, Severity};

pub struct SeverityFilter {
    threshold: Severity,
}

impl SeverityFilter {
    pub fn new(threshold: Severity) -> Self {
        Self { threshold }
    }

    pub fn admits(&self, event: &FaultEvent) -> bool {
        event.severity >= self.threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn event_with_severity(severity: Severity) -> FaultEvent {
        FaultEvent {
            cluster_name: "c1".into(),
            fault_type: "CrashLoopBackOff".into(),
            namespace: "default".into(),
            resource_kind: "Pod".into(),
            resource_name: "p".into(),
            severity,
            timestamp: chrono::Utc::now(),
            context: BTreeMap::new(),
        }
    }

    #[test]
    fn drops_strictly_below_threshold() {
        let filter = SeverityFilter::new(Severity::Error);
        assert!(!filter.admits(&event_with_severity(Severity::Info)));
    }

    #[test]
    fn admits_at_or_above_threshold() {
        let filter = SeverityFilter::new(Severity::Error);
        assert!(filter.admits(&event_with_severity(Severity::Error)));
        assert!(filter.admits(&event_with_severity(Severity::Critical)));
    }
}
