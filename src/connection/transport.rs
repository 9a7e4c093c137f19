/* Copyright (C) 2025 Pedro Henrique / phkaiser13
* File: src/connection/transport.rs
*
* The fault-stream client capability the scheduler requires and nothing
* else: `{subscribe(endpoint) -> stream<FaultEvent>, close()}`. The wire
* protocol is implementation-opaque (MCP-style); here it is newline-
* delimited JSON over a long-lived HTTP response body, decoded through one
* shared `reqwest::Client` per process so no subscriber owns its own
* connection pool.
*
* SPDX-License-Identifier: Apache-2.0 */

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::StreamExt;
use nightcrier_model::FaultEvent;
use tokio::sync::mpsc;
use tokio::time::timeout;

use super::state::FailureClassification;

/// The minimal capability the Connection Manager needs from a transport;
/// a fake implementation backing it in tests shares this trait with the
/// real HTTP client. The subscribe error carries the same classification
/// taxonomy as a mid-stream error so the caller never has to guess at it.
#[async_trait]
pub trait FaultStreamClient: Send + Sync {
    async fn subscribe(
        &self,
        endpoint: &str,
        mode: &str,
        read_timeout: Duration,
    ) -> std::result::Result<mpsc::Receiver<Result<RawFaultRecord, (FailureClassification, String)>>, (FailureClassification, anyhow::Error)>;
}

/// A single decoded record from the wire, still missing the cluster name
/// the Connection Manager is responsible for stamping on.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct RawFaultRecord {
    pub fault_type: String,
    pub namespace: String,
    pub resource_kind: String,
    pub resource_name: String,
    pub severity: nightcrier_model::Severity,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    #[serde(default)]
    pub context: std::collections::BTreeMap<String, serde_json::Value>,
}

impl RawFaultRecord {
    pub fn into_fault_event(self, cluster_name: String) -> FaultEvent {
        FaultEvent {
            cluster_name,
            fault_type: self.fault_type,
            namespace: self.namespace,
            resource_kind: self.resource_kind,
            resource_name: self.resource_name,
            severity: self.severity,
            timestamp: self.timestamp,
            context: self.context,
        }
    }
}

/// HTTP long-lived streaming client shared by every cluster subscriber.
/// Built once in `main` with a pool sized for `min(200, 2×N_clusters)`
/// idle connections and HTTP/2 preferred.
pub struct HttpFaultStreamClient {
    client: reqwest::Client,
}

impl HttpFaultStreamClient {
    pub fn new(n_clusters: usize) -> Result<Self> {
        let pool_size = std::cmp::min(200, 2 * n_clusters.max(1));
        let client = reqwest::Client::builder()
            .pool_max_idle_per_host(pool_size)
            .http2_prior_knowledge()
            .build()
            .context("failed to build shared fault-stream HTTP client")?;
        Ok(Self { client })
    }
}

#[async_trait]
impl FaultStreamClient for HttpFaultStreamClient {
    async fn subscribe(
        &self,
        endpoint: &str,
        mode: &str,
        read_timeout: Duration,
    ) -> std::result::Result<mpsc::Receiver<Result<RawFaultRecord, (FailureClassification, String)>>, (FailureClassification, anyhow::Error)> {
        let response = self
            .client
            .get(endpoint)
            .query(&[("mode", mode)])
            .send()
            .await
            .map_err(|e| {
                let classification = classify_dial_error(&e);
                (classification, anyhow::Error::new(e).context("failed to dial fault-stream endpoint"))
            })?;

        let (tx, rx) = mpsc::channel(1);
        let mut byte_stream = response.bytes_stream();

        tokio::spawn(async move {
            let mut buf = String::new();
            loop {
                let next = timeout(read_timeout, byte_stream.next()).await;
                let chunk = match next {
                    Ok(Some(Ok(bytes))) => bytes,
                    Ok(Some(Err(e))) => {
                        let _ = tx.send(Err((FailureClassification::Read, e.to_string()))).await;
                        return;
                    }
                    Ok(None) => {
                        let _ = tx
                            .send(Err((FailureClassification::ServerClose, "stream ended".to_string())))
                            .await;
                        return;
                    }
                    Err(_) => {
                        let _ = tx
                            .send(Err((FailureClassification::Read, "read timeout".to_string())))
                            .await;
                        return;
                    }
                };

                buf.push_str(&String::from_utf8_lossy(&chunk));
                while let Some(pos) = buf.find('\n') {
                    let line = buf[..pos].trim().to_string();
                    buf.drain(..=pos);
                    if line.is_empty() {
                        continue;
                    }
                    let parsed = serde_json::from_str::<RawFaultRecord>(&line)
                        .map_err(|e| (FailureClassification::Decode, e.to_string()));
                    if tx.send(parsed).await.is_err() {
                        return;
                    }
                }
            }
        });

        Ok(rx)
    }
}

fn classify_dial_error(e: &reqwest::Error) -> FailureClassification {
    if e.is_timeout() {
        FailureClassification::Read
    } else {
        FailureClassification::Dial
    }
}
