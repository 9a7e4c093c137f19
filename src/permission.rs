/* Copyright (C) 2025 Pedro Henrique / phkaiser13
* File: src/permission.rs
*
* Preflight RBAC probe: for each cluster with triage enabled, issues one
* `SelfSubjectAccessReview` per capability in the matrix against its
* kubeconfig before admitting its subscriber to the scheduler path.
* A cluster whose kubeconfig is missing or whose probe errors entirely is
* fatal at startup; a cluster that merely fails `minimum_met` is logged
* and still runs with degraded triage.
*
* SPDX-License-Identifier: Apache-2.0 */

use anyhow::{bail, Context, Result};
use futures::future::join_all;
use k8s_openapi::api::authorization::v1::{
    ResourceAttributes, SelfSubjectAccessReview, SelfSubjectAccessReviewSpec,
};
use kube::api::PostParams;
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Api, Client, Config};
use nightcrier_model::ClusterPermissions;
use tracing::warn;

use crate::config::ClusterConfig;

/// One `(resource, subresource, verb)` capability in the probe matrix.
struct Capability {
    label: &'static str,
    resource: &'static str,
    subresource: &'static str,
    verb: &'static str,
}

const BASE_CAPABILITIES: &[Capability] = &[
    Capability { label: "pods", resource: "pods", subresource: "", verb: "get" },
    Capability { label: "pod_logs", resource: "pods", subresource: "log", verb: "get" },
    Capability { label: "events", resource: "events", subresource: "", verb: "get" },
    Capability { label: "deployments", resource: "deployments", subresource: "", verb: "get" },
    Capability { label: "services", resource: "services", subresource: "", verb: "get" },
    Capability { label: "nodes", resource: "nodes", subresource: "", verb: "get" },
];

const SECRET_CAPABILITIES: &[Capability] = &[
    Capability { label: "secrets", resource: "secrets", subresource: "", verb: "get" },
    Capability { label: "configmaps", resource: "configmaps", subresource: "", verb: "get" },
];

/// Builds a per-cluster client from its kubeconfig and runs every
/// applicable capability check concurrently, exactly the way the fleet's
/// cluster manager builds one client per cluster from a kubeconfig path
/// and awaits everything with `join_all`.
pub async fn validate_cluster(cluster: &ClusterConfig) -> Result<ClusterPermissions> {
    if !cluster.triage_enabled {
        return Ok(disabled_permissions(cluster));
    }

    let kubeconfig_path = cluster
        .kubeconfig
        .as_ref()
        .context("triage enabled cluster has no kubeconfig; this should have been rejected at config load time")?;

    let kubeconfig = Kubeconfig::read_from(kubeconfig_path)
        .with_context(|| format!("failed to read kubeconfig for cluster '{}' at {:?}", cluster.name, kubeconfig_path))?;
    let client_config = Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
        .await
        .with_context(|| format!("failed to build client config for cluster '{}'", cluster.name))?;
    let client = Client::try_from(client_config)
        .with_context(|| format!("failed to build Kubernetes client for cluster '{}'", cluster.name))?;

    let mut capabilities: Vec<&Capability> = BASE_CAPABILITIES.iter().collect();
    if cluster.allow_secrets_access {
        capabilities.extend(SECRET_CAPABILITIES.iter());
    }

    let api: Api<SelfSubjectAccessReview> = Api::all(client);
    let probes = capabilities.iter().map(|cap| probe_one(&api, cap));
    let results: Vec<Result<(String, bool)>> = join_all(probes).await;

    let mut allowed = std::collections::HashMap::new();
    for result in results {
        let (label, ok) = result.with_context(|| format!("permission probe failed for cluster '{}'", cluster.name))?;
        allowed.insert(label, ok);
    }

    let mut warnings = Vec::new();
    if !cluster.allow_secrets_access {
        warnings.push(
            "allow_secrets_access is false: secrets/configmaps capabilities were not probed and default to false; \
             enable it to allow Helm-release debugging"
                .to_string(),
        );
    }

    let permissions = ClusterPermissions {
        cluster_name: cluster.name.clone(),
        validated_at: chrono::Utc::now(),
        can_get_pods: allowed.get("pods").copied().unwrap_or(false),
        can_get_pod_logs: allowed.get("pod_logs").copied().unwrap_or(false),
        can_get_events: allowed.get("events").copied().unwrap_or(false),
        can_get_deployments: allowed.get("deployments").copied().unwrap_or(false),
        can_get_services: allowed.get("services").copied().unwrap_or(false),
        can_get_nodes: allowed.get("nodes").copied().unwrap_or(false),
        can_get_secrets: allowed.get("secrets").copied().unwrap_or(false),
        can_get_configmaps: allowed.get("configmaps").copied().unwrap_or(false),
        warnings,
    };

    if !permissions.minimum_met() {
        warn!(
            cluster = %cluster.name,
            "minimum_met permissions not satisfied (get pods ∧ get logs ∧ get events); triage will be degraded, not suppressed"
        );
    }

    Ok(permissions)
}

fn disabled_permissions(cluster: &ClusterConfig) -> ClusterPermissions {
    ClusterPermissions {
        cluster_name: cluster.name.clone(),
        validated_at: chrono::Utc::now(),
        can_get_pods: false,
        can_get_pod_logs: false,
        can_get_events: false,
        can_get_deployments: false,
        can_get_services: false,
        can_get_nodes: false,
        can_get_secrets: false,
        can_get_configmaps: false,
        warnings: vec!["triage disabled for this cluster; permission probe skipped".to_string()],
    }
}

async fn probe_one(api: &Api<SelfSubjectAccessReview>, cap: &Capability) -> Result<(String, bool)> {
    let review = SelfSubjectAccessReview {
        spec: SelfSubjectAccessReviewSpec {
            resource_attributes: Some(ResourceAttributes {
                group: Some(String::new()),
                resource: Some(cap.resource.to_string()),
                subresource: if cap.subresource.is_empty() {
                    None
                } else {
                    Some(cap.subresource.to_string())
                },
                verb: Some(cap.verb.to_string()),
                ..Default::default()
            }),
            non_resource_attributes: None,
        },
        ..Default::default()
    };

    let result = api
        .create(&PostParams::default(), &review)
        .await
        .with_context(|| format!("SelfSubjectAccessReview failed for capability '{}'", cap.label))?;

    let allowed = result.status.map(|s| s.allowed).unwrap_or(false);
    Ok((cap.label.to_string(), allowed))
}

/// Validates every enabled cluster concurrently; any cluster whose probe
/// fails entirely aborts the whole startup sequence, per the fatal-at-
/// startup policy.
pub async fn validate_all(clusters: &[ClusterConfig]) -> Result<Vec<ClusterPermissions>> {
    let futures = clusters.iter().map(validate_cluster);
    let results = join_all(futures).await;

    let mut permissions = Vec::with_capacity(results.len());
    for (cluster, result) in clusters.iter().zip(results.into_iter()) {
        match result {
            Ok(p) => permissions.push(p),
            Err(e) => bail!("fatal: permission validation failed for cluster '{}': {e:?}", cluster.name),
        }
    }
    Ok(permissions)
}
