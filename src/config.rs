/* Copyright (C) 2025 Pedro Henrique / phkaiser13
* File: src/config.rs
*
* Configuration loading. Required options have no in-code fallback: their
* absence is a fatal startup error naming the field, its env var, and an
* example file, matching the `ClusterManager` convention of never guessing
* at a kubeconfig path. Flag binding and environment-layered precedence are
* an external collaborator's concern; this loader only reads one YAML file
* named by `NIGHTCRIER_CONFIG` (default `config.yaml`) and validates it.
*
* SPDX-License-Identifier: Apache-2.0 */

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use nightcrier_model::QueueOverflowPolicy;
use serde::Deserialize;

const EXAMPLE_CONFIG_FILE: &str = "config.example.yaml";

#[derive(Debug, Deserialize)]
pub struct RawClusterConfig {
    pub name: String,
    pub mcp_endpoint: String,
    #[serde(default = "default_subscribe_mode")]
    pub subscribe_mode: String,
    pub api_token: Option<String>,
    #[serde(default)]
    pub triage_enabled: bool,
    pub kubeconfig: Option<PathBuf>,
    #[serde(default)]
    pub allow_secrets_access: bool,
    #[serde(default)]
    pub labels: std::collections::BTreeMap<String, String>,
}

fn default_subscribe_mode() -> String {
    "faults".to_string()
}

#[derive(Debug, Deserialize)]
pub struct RawAgentConfig {
    pub agent_script_path: PathBuf,
    pub agent_cli: String,
    pub agent_image: String,
    pub agent_model: String,
    pub agent_allowed_tools: String,
    pub system_prompt_path: PathBuf,
    pub api_key_secret: Option<String>,
    #[serde(default = "default_verbosity")]
    pub verbosity: String,
}

fn default_verbosity() -> String {
    "info".to_string()
}

#[derive(Debug, Deserialize, Default)]
pub struct RawTuningConfig {
    pub slack_timeout_seconds: Option<u64>,
    pub investigation_min_size_bytes: Option<u64>,
    pub max_failure_reasons_tracked: Option<usize>,
    pub failure_reasons_display_count: Option<usize>,
    pub timeout_buffer_seconds: Option<u64>,
    pub wait_delay_seconds: Option<u64>,
    pub queue_max_age_seconds: Option<u64>,
    pub health_port: Option<u16>,
    pub metrics_port: Option<u16>,
}

#[derive(Debug, Deserialize)]
pub struct RawConfig {
    pub clusters: Vec<RawClusterConfig>,
    pub workspace_root: PathBuf,
    pub agent: RawAgentConfig,
    pub severity_threshold: String,
    pub max_concurrent_agents: Option<usize>,
    pub global_queue_size: Option<usize>,
    pub cluster_queue_size: Option<usize>,
    pub dedup_window_seconds: Option<u64>,
    pub queue_overflow_policy: Option<String>,
    pub shutdown_timeout_seconds: Option<u64>,
    pub sse_reconnect_initial_backoff_seconds: Option<u64>,
    pub sse_reconnect_max_backoff_seconds: Option<u64>,
    pub sse_read_timeout_seconds: Option<u64>,
    pub failure_threshold_for_alert: Option<u64>,
    pub notify_on_agent_failure: Option<bool>,
    pub upload_failed_investigations: Option<bool>,
    pub agent_timeout_seconds: Option<u64>,
    #[serde(default)]
    pub tuning: RawTuningConfig,
}

#[derive(Debug, Clone)]
pub struct TuningConfig {
    pub slack_timeout_seconds: u64,
    pub investigation_min_size_bytes: u64,
    pub max_failure_reasons_tracked: usize,
    pub failure_reasons_display_count: usize,
    pub timeout_buffer_seconds: u64,
    pub wait_delay_seconds: u64,
    pub queue_max_age_seconds: u64,
    pub health_port: u16,
    pub metrics_port: u16,
}

impl Default for TuningConfig {
    fn default() -> Self {
        Self {
            slack_timeout_seconds: 5,
            investigation_min_size_bytes: 100,
            max_failure_reasons_tracked: 10,
            failure_reasons_display_count: 3,
            timeout_buffer_seconds: 30,
            wait_delay_seconds: 30,
            queue_max_age_seconds: 600,
            health_port: 8080,
            metrics_port: 9090,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ClusterConfig {
    pub name: String,
    pub mcp_endpoint: String,
    pub subscribe_mode: String,
    pub api_token: Option<String>,
    pub triage_enabled: bool,
    pub kubeconfig: Option<PathBuf>,
    pub allow_secrets_access: bool,
    pub labels: std::collections::BTreeMap<String, String>,
}

#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub agent_script_path: PathBuf,
    pub agent_cli: String,
    pub agent_image: String,
    pub agent_model: String,
    pub agent_allowed_tools: String,
    pub system_prompt_path: PathBuf,
    pub api_key_secret: Option<String>,
    pub verbosity: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub clusters: Vec<ClusterConfig>,
    pub workspace_root: PathBuf,
    pub agent: AgentConfig,
    pub severity_threshold: nightcrier_model::Severity,
    pub max_concurrent_agents: usize,
    pub global_queue_size: usize,
    pub cluster_queue_size: usize,
    pub dedup_window_seconds: u64,
    pub queue_overflow_policy: QueueOverflowPolicy,
    pub shutdown_timeout_seconds: u64,
    pub sse_reconnect_initial_backoff_seconds: u64,
    pub sse_reconnect_max_backoff_seconds: u64,
    pub sse_read_timeout_seconds: u64,
    pub failure_threshold_for_alert: u64,
    pub notify_on_agent_failure: bool,
    pub upload_failed_investigations: bool,
    pub agent_timeout_seconds: u64,
    pub tuning: TuningConfig,
}

/// Reads and validates the config file named by `NIGHTCRIER_CONFIG`
/// (default `config.yaml`). Every field in §9's "Configuration
/// completeness" list is required; its absence names the field, the env
/// var an operator could set instead, and `config.example.yaml`.
pub fn load() -> Result<Config> {
    let path = std::env::var("NIGHTCRIER_CONFIG").unwrap_or_else(|_| "config.yaml".to_string());
    let contents = std::fs::read_to_string(&path)
        .with_context(|| format!("failed to read configuration file '{path}' (see {EXAMPLE_CONFIG_FILE})"))?;
    let raw: RawConfig = serde_yaml::from_str(&contents)
        .with_context(|| format!("failed to parse configuration file '{path}'"))?;
    validate(raw)
}

fn required_field_error(field: &str, env_var: &str) -> anyhow::Error {
    anyhow::anyhow!(
        "missing required configuration field '{field}' (set it in config.yaml, or via env var '{env_var}'); see {EXAMPLE_CONFIG_FILE} for an example"
    )
}

fn validate(raw: RawConfig) -> Result<Config> {
    let mut seen_names = std::collections::HashSet::new();
    let mut clusters = Vec::with_capacity(raw.clusters.len());
    for c in raw.clusters {
        if !seen_names.insert(c.name.clone()) {
            bail!("duplicate cluster name '{}' in configuration", c.name);
        }
        if c.triage_enabled && c.kubeconfig.is_none() {
            bail!(
                "cluster '{}' has triage.enabled=true but no kubeconfig set; kubeconfig is never inferred",
                c.name
            );
        }
        clusters.push(ClusterConfig {
            name: c.name,
            mcp_endpoint: c.mcp_endpoint,
            subscribe_mode: c.subscribe_mode,
            api_token: c.api_token,
            triage_enabled: c.triage_enabled,
            kubeconfig: c.kubeconfig,
            allow_secrets_access: c.allow_secrets_access,
            labels: c.labels,
        });
    }
    if clusters.is_empty() {
        bail!("configuration must declare at least one cluster");
    }

    let severity_threshold = raw
        .severity_threshold
        .parse()
        .map_err(|e: nightcrier_model::NightcrierError| anyhow::anyhow!(e.to_string()))?;

    let queue_overflow_policy = match raw
        .queue_overflow_policy
        .as_deref()
        .ok_or_else(|| required_field_error("queue_overflow_policy", "NIGHTCRIER_QUEUE_OVERFLOW_POLICY"))?
    {
        "drop" => QueueOverflowPolicy::Drop,
        "reject" => QueueOverflowPolicy::Reject,
        other => bail!("invalid queue_overflow_policy '{other}': expected 'drop' or 'reject'"),
    };

    Ok(Config {
        clusters,
        workspace_root: raw.workspace_root,
        agent: AgentConfig {
            agent_script_path: raw.agent.agent_script_path,
            agent_cli: raw.agent.agent_cli,
            agent_image: raw.agent.agent_image,
            agent_model: raw.agent.agent_model,
            agent_allowed_tools: raw.agent.agent_allowed_tools,
            system_prompt_path: raw.agent.system_prompt_path,
            api_key_secret: raw.agent.api_key_secret,
            verbosity: raw.agent.verbosity,
        },
        severity_threshold,
        max_concurrent_agents: raw
            .max_concurrent_agents
            .ok_or_else(|| required_field_error("max_concurrent_agents", "NIGHTCRIER_MAX_CONCURRENT_AGENTS"))?,
        global_queue_size: raw
            .global_queue_size
            .ok_or_else(|| required_field_error("global_queue_size", "NIGHTCRIER_GLOBAL_QUEUE_SIZE"))?,
        cluster_queue_size: raw
            .cluster_queue_size
            .ok_or_else(|| required_field_error("cluster_queue_size", "NIGHTCRIER_CLUSTER_QUEUE_SIZE"))?,
        dedup_window_seconds: raw
            .dedup_window_seconds
            .ok_or_else(|| required_field_error("dedup_window_seconds", "NIGHTCRIER_DEDUP_WINDOW_SECONDS"))?,
        queue_overflow_policy,
        shutdown_timeout_seconds: raw
            .shutdown_timeout_seconds
            .ok_or_else(|| required_field_error("shutdown_timeout_seconds", "NIGHTCRIER_SHUTDOWN_TIMEOUT_SECONDS"))?,
        sse_reconnect_initial_backoff_seconds: raw.sse_reconnect_initial_backoff_seconds.ok_or_else(|| {
            required_field_error(
                "sse_reconnect_initial_backoff_seconds",
                "NIGHTCRIER_SSE_RECONNECT_INITIAL_BACKOFF_SECONDS",
            )
        })?,
        sse_reconnect_max_backoff_seconds: raw.sse_reconnect_max_backoff_seconds.ok_or_else(|| {
            required_field_error(
                "sse_reconnect_max_backoff_seconds",
                "NIGHTCRIER_SSE_RECONNECT_MAX_BACKOFF_SECONDS",
            )
        })?,
        sse_read_timeout_seconds: raw
            .sse_read_timeout_seconds
            .ok_or_else(|| required_field_error("sse_read_timeout_seconds", "NIGHTCRIER_SSE_READ_TIMEOUT_SECONDS"))?,
        failure_threshold_for_alert: raw.failure_threshold_for_alert.ok_or_else(|| {
            required_field_error("failure_threshold_for_alert", "NIGHTCRIER_FAILURE_THRESHOLD_FOR_ALERT")
        })?,
        notify_on_agent_failure: raw.notify_on_agent_failure.unwrap_or(false),
        upload_failed_investigations: raw.upload_failed_investigations.unwrap_or(false),
        agent_timeout_seconds: raw
            .agent_timeout_seconds
            .ok_or_else(|| required_field_error("agent_timeout_seconds", "NIGHTCRIER_AGENT_TIMEOUT_SECONDS"))?,
        tuning: TuningConfig {
            slack_timeout_seconds: raw.tuning.slack_timeout_seconds.unwrap_or(5),
            investigation_min_size_bytes: raw.tuning.investigation_min_size_bytes.unwrap_or(100),
            max_failure_reasons_tracked: raw.tuning.max_failure_reasons_tracked.unwrap_or(10),
            failure_reasons_display_count: raw.tuning.failure_reasons_display_count.unwrap_or(3),
            timeout_buffer_seconds: raw.tuning.timeout_buffer_seconds.unwrap_or(30),
            wait_delay_seconds: raw.tuning.wait_delay_seconds.unwrap_or(30),
            queue_max_age_seconds: raw.tuning.queue_max_age_seconds.unwrap_or(600),
            health_port: raw.tuning.health_port.unwrap_or(8080),
            metrics_port: raw.tuning.metrics_port.unwrap_or(9090),
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_raw() -> RawConfig {
        RawConfig {
            clusters: vec![RawClusterConfig {
                name: "c1".into(),
                mcp_endpoint: "https://mcp.c1.example/faults".into(),
                subscribe_mode: "faults".into(),
                api_token: None,
                triage_enabled: true,
                kubeconfig: Some(PathBuf::from("/etc/nightcrier/kubeconfigs/c1")),
                allow_secrets_access: false,
                labels: Default::default(),
            }],
            workspace_root: PathBuf::from("/var/lib/nightcrier"),
            agent: RawAgentConfig {
                agent_script_path: PathBuf::from("/usr/local/bin/run-agent.sh"),
                agent_cli: "claude".into(),
                agent_image: "nightcrier/agent:latest".into(),
                agent_model: "claude-3".into(),
                agent_allowed_tools: "kubectl".into(),
                system_prompt_path: PathBuf::from("/etc/nightcrier/prompt.md"),
                api_key_secret: None,
                verbosity: "info".into(),
            },
            severity_threshold: "ERROR".into(),
            max_concurrent_agents: Some(2),
            global_queue_size: Some(100),
            cluster_queue_size: Some(20),
            dedup_window_seconds: Some(300),
            queue_overflow_policy: Some("drop".into()),
            shutdown_timeout_seconds: Some(30),
            sse_reconnect_initial_backoff_seconds: Some(1),
            sse_reconnect_max_backoff_seconds: Some(30),
            sse_read_timeout_seconds: Some(60),
            failure_threshold_for_alert: Some(3),
            notify_on_agent_failure: Some(false),
            upload_failed_investigations: Some(false),
            agent_timeout_seconds: Some(600),
            tuning: RawTuningConfig::default(),
        }
    }

    #[test]
    fn rejects_triage_enabled_without_kubeconfig() {
        let mut raw = minimal_raw();
        raw.clusters[0].kubeconfig = None;
        let err = validate(raw).unwrap_err();
        assert!(err.to_string().contains("kubeconfig"));
    }

    #[test]
    fn rejects_duplicate_cluster_names() {
        let mut raw = minimal_raw();
        let dup = RawClusterConfig {
            name: "c1".into(),
            mcp_endpoint: "https://mcp.c1.example/faults".into(),
            subscribe_mode: "faults".into(),
            api_token: None,
            triage_enabled: false,
            kubeconfig: None,
            allow_secrets_access: false,
            labels: Default::default(),
        };
        raw.clusters.push(dup);
        let err = validate(raw).unwrap_err();
        assert!(err.to_string().contains("duplicate"));
    }

    #[test]
    fn rejects_invalid_severity_threshold() {
        let mut raw = minimal_raw();
        raw.severity_threshold = "LUDICROUS".into();
        assert!(validate(raw).is_err());
    }

    #[test]
    fn accepts_minimal_valid_config() {
        assert!(validate(minimal_raw()).is_ok());
    }
}
