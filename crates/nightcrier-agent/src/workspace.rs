/* Copyright (C) 2025 Pedro Henrique / phkaiser13
* File: crates/nightcrier-agent/src/workspace.rs
*
* Creates and guards the isolated per-incident directory every agent run
* is confined to. Every path handed back to a caller is joined against the
* incident root and verified to still live under it before use — the same
* discipline the cluster-fleet code applies to untrusted namespace strings,
* here applied to untrusted filesystem paths.
*
* SPDX-License-Identifier: Apache-2.0 */

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use nightcrier_model::{ClusterPermissions, FaultEvent};
use uuid::Uuid;

/// A single incident's on-disk footprint, rooted at
/// `<workspace_root>/<incident-uuid>/`.
#[derive(Debug, Clone)]
pub struct Workspace {
    root: PathBuf,
    debug: bool,
}

impl Workspace {
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn output_dir(&self) -> PathBuf {
        self.root.join("output")
    }

    pub fn logs_dir(&self) -> Option<PathBuf> {
        self.debug.then(|| self.root.join("logs"))
    }

    pub fn investigation_path(&self) -> PathBuf {
        self.output_dir().join("investigation.md")
    }

    pub fn incident_json_path(&self) -> PathBuf {
        self.root.join("incident.json")
    }

    pub fn cluster_permissions_path(&self) -> PathBuf {
        self.root.join("incident_cluster_permissions.json")
    }

    /// Joins `relative` onto this workspace's root and refuses any result
    /// that would escape it (`..` traversal, absolute overrides, symlink
    /// games resolved via `canonicalize`).
    pub fn join_and_verify(&self, relative: impl AsRef<Path>) -> Result<PathBuf> {
        let candidate = self.root.join(relative.as_ref());
        let canonical_root = self
            .root
            .canonicalize()
            .with_context(|| format!("failed to canonicalize workspace root {:?}", self.root))?;
        // The candidate file may not exist yet (e.g. before first write), so
        // canonicalize its parent instead and re-append the file name.
        let parent = candidate
            .parent()
            .context("path has no parent component")?;
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory {parent:?}"))?;
        let canonical_parent = parent
            .canonicalize()
            .with_context(|| format!("failed to canonicalize {parent:?}"))?;
        if !canonical_parent.starts_with(&canonical_root) {
            bail!(
                "refusing path {:?}: resolves outside workspace root {:?}",
                candidate,
                canonical_root
            );
        }
        let file_name = candidate
            .file_name()
            .context("path has no file name component")?;
        Ok(canonical_parent.join(file_name))
    }
}

/// Creates workspaces under a single configured root and enforces that
/// every incident gets its own owner-only directory.
pub struct WorkspaceManager {
    workspace_root: PathBuf,
    debug: bool,
}

impl WorkspaceManager {
    pub fn new(workspace_root: impl Into<PathBuf>, debug: bool) -> Self {
        Self {
            workspace_root: workspace_root.into(),
            debug,
        }
    }

    /// Creates `<workspace_root>/<incident_id>/` with mode 0700, plus
    /// `output/` and, when DEBUG, `logs/`, then serializes `event` and
    /// `permissions` into it.
    pub async fn create(
        &self,
        incident_id: Uuid,
        event: &FaultEvent,
        permissions: &ClusterPermissions,
    ) -> Result<Workspace> {
        let root = self.workspace_root.join(incident_id.to_string());
        tokio::fs::create_dir_all(&root)
            .await
            .with_context(|| format!("failed to create incident workspace {root:?}"))?;
        set_owner_only(&root)
            .with_context(|| format!("failed to set owner-only mode on {root:?}"))?;

        let ws = Workspace {
            root: root.clone(),
            debug: self.debug,
        };

        tokio::fs::create_dir_all(ws.output_dir())
            .await
            .context("failed to create output/ directory")?;
        if let Some(logs_dir) = ws.logs_dir() {
            tokio::fs::create_dir_all(&logs_dir)
                .await
                .context("failed to create logs/ directory")?;
        }

        let incident_json = serde_json::to_vec_pretty(event).context("failed to serialize incident.json")?;
        tokio::fs::write(ws.incident_json_path(), incident_json)
            .await
            .context("failed to write incident.json")?;

        let permissions_json = serde_json::to_vec_pretty(permissions)
            .context("failed to serialize incident_cluster_permissions.json")?;
        tokio::fs::write(ws.cluster_permissions_path(), permissions_json)
            .await
            .context("failed to write incident_cluster_permissions.json")?;

        Ok(ws)
    }
}

#[cfg(unix)]
fn set_owner_only(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o700))?;
    Ok(())
}

#[cfg(not(unix))]
fn set_owner_only(_path: &Path) -> Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn sample_event() -> FaultEvent {
        FaultEvent {
            cluster_name: "c1".into(),
            fault_type: "CrashLoopBackOff".into(),
            namespace: "default".into(),
            resource_kind: "Pod".into(),
            resource_name: "p".into(),
            severity: nightcrier_model::Severity::Error,
            timestamp: chrono::Utc::now(),
            context: BTreeMap::new(),
        }
    }

    fn sample_permissions() -> ClusterPermissions {
        ClusterPermissions {
            cluster_name: "c1".into(),
            validated_at: chrono::Utc::now(),
            can_get_pods: true,
            can_get_pod_logs: true,
            can_get_events: true,
            can_get_deployments: true,
            can_get_services: true,
            can_get_nodes: true,
            can_get_secrets: false,
            can_get_configmaps: false,
            warnings: vec![],
        }
    }

    #[tokio::test]
    async fn create_populates_incident_json_and_output_dir() {
        let tmp = tempdir();
        let mgr = WorkspaceManager::new(&tmp, false);
        let id = Uuid::new_v4();
        let ws = mgr.create(id, &sample_event(), &sample_permissions()).await.unwrap();
        assert!(ws.incident_json_path().exists());
        assert!(ws.output_dir().exists());
        assert!(ws.logs_dir().is_none());
        std::fs::remove_dir_all(&tmp).ok();
    }

    #[tokio::test]
    async fn join_and_verify_rejects_escape() {
        let tmp = tempdir();
        let mgr = WorkspaceManager::new(&tmp, false);
        let id = Uuid::new_v4();
        let ws = mgr.create(id, &sample_event(), &sample_permissions()).await.unwrap();
        let escape = ws.join_and_verify("../../../etc/passwd");
        assert!(escape.is_err());
        std::fs::remove_dir_all(&tmp).ok();
    }

    fn tempdir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("nightcrier-test-{}", Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }
}
