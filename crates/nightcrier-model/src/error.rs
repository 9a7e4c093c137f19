/* Copyright (C) 2025 Pedro Henrique / phkaiser13
* File: crates/nightcrier-model/src/error.rs
*
* The error taxonomy from the system design: one variant per failure class
* so call sites can match on kind without string-sniffing. ConfigError and
* PermissionError are fatal at startup; everything else is recovered at
* the boundary where it arises.
*
* SPDX-License-Identifier: Apache-2.0 */

use thiserror::Error;

#[derive(Debug, Error)]
pub enum NightcrierError {
    /// Missing required field, duplicate cluster name, triage-enabled
    /// without kubeconfig, invalid severity threshold or policy name.
    #[error("configuration error: {0}")]
    Config(String),

    /// Preflight probe could not run at all (missing kubeconfig, probe
    /// command failure) for the named cluster.
    #[error("permission probe failed for cluster '{cluster}': {reason}")]
    Permission { cluster: String, reason: String },

    /// Subscribe dial/TLS/read errors. Recoverable via backoff.
    #[error("transport error on cluster '{cluster}' ({classification}): {reason}")]
    Transport {
        cluster: String,
        classification: &'static str,
        reason: String,
    },

    /// Malformed event record. The caller logs with context and drops the
    /// record; the subscriber continues.
    #[error("protocol error on cluster '{cluster}': {reason}")]
    Protocol { cluster: String, reason: String },

    /// Queue full under the `reject` overflow policy.
    #[error("schedule error: queue full for cluster '{cluster}'")]
    Schedule { cluster: String },

    /// Child exited non-zero, missing/undersized artifact, or timed out.
    #[error("agent error for incident {incident_id}: {reason}")]
    Agent {
        incident_id: uuid::Uuid,
        reason: String,
    },

    /// Chat or object-store call failed. Logged; never alters incident
    /// status.
    #[error("sink error ({sink}): {reason}")]
    Sink { sink: &'static str, reason: String },
}
