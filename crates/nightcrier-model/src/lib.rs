/* Copyright (C) 2025 Pedro Henrique / phkaiser13
* File: crates/nightcrier-model/src/lib.rs
*
* Shared data model for Nightcrier: cluster descriptors, permission
* snapshots, fault events, dedup keys, incidents and agent run results, plus
* the error taxonomy every other crate in the workspace reports through.
*
* SPDX-License-Identifier: Apache-2.0 */

use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub mod error;
pub use error::NightcrierError;

/// Ordered fault severity ladder. `Ord`/`PartialOrd` give the ordinal
/// comparison the severity filter relies on (DEBUG < INFO < WARNING <
/// ERROR < CRITICAL).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Debug,
    Info,
    Warning,
    Error,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Debug => "DEBUG",
            Severity::Info => "INFO",
            Severity::Warning => "WARNING",
            Severity::Error => "ERROR",
            Severity::Critical => "CRITICAL",
        }
    }
}

impl std::str::FromStr for Severity {
    type Err = NightcrierError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "DEBUG" => Ok(Severity::Debug),
            "INFO" => Ok(Severity::Info),
            "WARNING" | "WARN" => Ok(Severity::Warning),
            "ERROR" => Ok(Severity::Error),
            "CRITICAL" => Ok(Severity::Critical),
            other => Err(NightcrierError::Config(format!(
                "invalid severity threshold '{other}': expected one of DEBUG, INFO, WARNING, ERROR, CRITICAL"
            ))),
        }
    }
}

/// A cluster's identity and connection configuration, created once at
/// startup from configuration and immutable for the process lifetime. The
/// name is the primary key used everywhere downstream: metrics labels,
/// dedup keys, workspace paths.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterDescriptor {
    pub name: String,
    pub mcp_endpoint: String,
    pub subscribe_mode: String,
    /// Reserved for future auth; never inferred or defaulted.
    pub api_token: Option<String>,
    pub triage_enabled: bool,
    /// Required when `triage_enabled` is true. Never inferred from
    /// `~/.kube/config` or any environment-derived default.
    pub kubeconfig: Option<PathBuf>,
    #[serde(default)]
    pub allow_secrets_access: bool,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

/// The overflow policy applied to a full per-cluster or global queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueOverflowPolicy {
    Drop,
    Reject,
}

/// Result of the preflight RBAC probe for one cluster. Computed once at
/// startup, cached in memory, and serialized verbatim into every incident
/// workspace created for that cluster.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterPermissions {
    pub cluster_name: String,
    pub validated_at: DateTime<Utc>,
    pub can_get_pods: bool,
    pub can_get_pod_logs: bool,
    pub can_get_events: bool,
    pub can_get_deployments: bool,
    pub can_get_services: bool,
    pub can_get_nodes: bool,
    /// `false` and unattempted whenever the owning cluster's
    /// `allow_secrets_access` is false — the probe never even queries it.
    pub can_get_secrets: bool,
    pub can_get_configmaps: bool,
    pub warnings: Vec<String>,
}

impl ClusterPermissions {
    /// `get_pods ∧ get_logs ∧ get_events`.
    pub fn minimum_met(&self) -> bool {
        self.can_get_pods && self.can_get_pod_logs && self.can_get_events
    }
}

/// `(cluster_name, fault_type, namespace, resource_kind, resource_name)`,
/// used as the key in the time-windowed dedup map.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DedupKey {
    pub cluster_name: String,
    pub fault_type: String,
    pub namespace: String,
    pub resource_kind: String,
    pub resource_name: String,
}

/// An opaque structured record produced by the fault stream. Immutable
/// once constructed; `cluster_name` is filled in by the Connection Manager,
/// never by the upstream stream itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FaultEvent {
    pub cluster_name: String,
    pub fault_type: String,
    pub namespace: String,
    pub resource_kind: String,
    pub resource_name: String,
    pub severity: Severity,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub context: BTreeMap<String, serde_json::Value>,
}

impl FaultEvent {
    pub fn dedup_key(&self) -> DedupKey {
        DedupKey {
            cluster_name: self.cluster_name.clone(),
            fault_type: self.fault_type.clone(),
            namespace: self.namespace.clone(),
            resource_kind: self.resource_kind.clone(),
            resource_name: self.resource_name.clone(),
        }
    }
}

/// A unit of investigation created for one admitted `FaultEvent`. Created
/// when the Scheduler accepts an event for execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Incident {
    pub id: Uuid,
    pub event: FaultEvent,
    pub permissions: ClusterPermissions,
    pub workspace_path: PathBuf,
}

impl Incident {
    pub fn new(event: FaultEvent, permissions: ClusterPermissions, workspace_path: PathBuf) -> Self {
        Self {
            id: Uuid::new_v4(),
            event,
            permissions,
            workspace_path,
        }
    }
}

/// Outcome of one agent run. `agent_failed` is distinct from an ordinary
/// `failed`: the runner exited 0 but produced no usable artifact, or
/// exited non-zero against an empty workspace. The distinction is kept in
/// metric labels even though the sink boundary collapses it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentRunStatus {
    Success,
    AgentFailed,
    Timeout,
    Cancelled,
}

impl AgentRunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentRunStatus::Success => "success",
            AgentRunStatus::AgentFailed => "agent_failed",
            AgentRunStatus::Timeout => "timeout",
            AgentRunStatus::Cancelled => "cancelled",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentRunResult {
    pub incident_id: Uuid,
    pub exit_code: Option<i32>,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub artifact_path: Option<PathBuf>,
    pub artifact_size_bytes: Option<u64>,
    pub status: AgentRunStatus,
    /// Populated only for `AgentFailed`: classifies nonzero exit, missing
    /// artifact, or undersized artifact.
    pub failure_reason: Option<String>,
}

/// A chat-ready summary of a completed incident, the payload `ChatSink`
/// implementations consume.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncidentSummary {
    pub incident_id: Uuid,
    pub cluster_name: String,
    pub fault_type: String,
    pub severity: Severity,
    pub status: AgentRunStatus,
    pub artifact_urls: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_ordinal_ladder() {
        assert!(Severity::Debug < Severity::Info);
        assert!(Severity::Info < Severity::Warning);
        assert!(Severity::Warning < Severity::Error);
        assert!(Severity::Error < Severity::Critical);
    }

    #[test]
    fn severity_from_str_accepts_warn_alias() {
        assert_eq!("WARN".parse::<Severity>().unwrap(), Severity::Warning);
        assert_eq!("error".parse::<Severity>().unwrap(), Severity::Error);
    }

    #[test]
    fn severity_from_str_rejects_unknown() {
        assert!("NOTICE".parse::<Severity>().is_err());
    }

    #[test]
    fn dedup_key_ignores_severity_and_timestamp() {
        let base = FaultEvent {
            cluster_name: "c1".into(),
            fault_type: "CrashLoopBackOff".into(),
            namespace: "default".into(),
            resource_kind: "Pod".into(),
            resource_name: "p".into(),
            severity: Severity::Error,
            timestamp: Utc::now(),
            context: BTreeMap::new(),
        };
        let mut later = base.clone();
        later.severity = Severity::Critical;
        later.timestamp = base.timestamp + chrono::Duration::seconds(5);
        assert_eq!(base.dedup_key(), later.dedup_key());
    }

    #[test]
    fn minimum_met_requires_pods_logs_and_events() {
        let mut perms = ClusterPermissions {
            cluster_name: "c1".into(),
            validated_at: Utc::now(),
            can_get_pods: true,
            can_get_pod_logs: true,
            can_get_events: false,
            can_get_deployments: false,
            can_get_services: false,
            can_get_nodes: false,
            can_get_secrets: false,
            can_get_configmaps: false,
            warnings: vec![],
        };
        assert!(!perms.minimum_met());
        perms.can_get_events = true;
        assert!(perms.minimum_met());
    }
}
