/* Copyright (C) 2025 Pedro Henrique / phkaiser13
* File: crates/nightcrier-sinks/src/object_store.rs
*
* Object store sink: a single `upload` operation invoked only for success
* statuses (plus failed, when the policy toggle allows it). Failure to
* upload is logged and surfaced in metrics but never retried at this
* layer.
*
* SPDX-License-Identifier: Apache-2.0 */

use std::path::Path;

use async_trait::async_trait;
use nightcrier_model::Incident;
use tracing::{error, info};

#[derive(Debug, Clone)]
pub struct UploadedArtifact {
    pub file_name: String,
    pub url: String,
}

#[async_trait]
trait ObjectStoreBackend: Send + Sync {
    async fn upload(&self, incident: &Incident, artifacts: &[&Path]) -> anyhow::Result<Vec<UploadedArtifact>>;
}

/// Minimal S3-compatible backend, grounded on the bucket/prefix/client
/// shape used by the fleet's cloud-facing HTTP clients: one `reqwest`
/// client, one base endpoint, PUT per artifact.
pub struct S3ObjectStoreBackend {
    client: reqwest::Client,
    bucket_endpoint: String,
    prefix: String,
}

impl S3ObjectStoreBackend {
    pub fn new(bucket_endpoint: impl Into<String>, prefix: impl Into<String>) -> anyhow::Result<Self> {
        Ok(Self {
            client: reqwest::Client::builder().build()?,
            bucket_endpoint: bucket_endpoint.into(),
            prefix: prefix.into(),
        })
    }
}

#[async_trait]
impl ObjectStoreBackend for S3ObjectStoreBackend {
    async fn upload(&self, incident: &Incident, artifacts: &[&Path]) -> anyhow::Result<Vec<UploadedArtifact>> {
        let mut uploaded = Vec::with_capacity(artifacts.len());
        for path in artifacts {
            let file_name = path
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or("artifact")
                .to_string();
            let key = format!("{}/{}/{}", self.prefix, incident.id, file_name);
            let url = format!("{}/{}", self.bucket_endpoint, key);
            let body = tokio::fs::read(path).await?;
            self.client.put(&url).body(body).send().await?.error_for_status()?;
            uploaded.push(UploadedArtifact { file_name, url });
        }
        Ok(uploaded)
    }
}

/// Polymorphic over `{enabled(backend), disabled}`; `disabled` returns an
/// empty URL list without making any network call.
pub enum ObjectStoreSink {
    Enabled(Box<dyn ObjectStoreBackend>),
    Disabled,
}

impl ObjectStoreSink {
    pub fn enabled(backend: S3ObjectStoreBackend) -> Self {
        ObjectStoreSink::Enabled(Box::new(backend))
    }

    pub fn disabled() -> Self {
        ObjectStoreSink::Disabled
    }

    pub async fn upload(&self, incident: &Incident, artifacts: &[&Path]) -> Vec<UploadedArtifact> {
        match self {
            ObjectStoreSink::Enabled(backend) => match backend.upload(incident, artifacts).await {
                Ok(urls) => {
                    info!(incident = %incident.id, count = urls.len(), "object store upload succeeded");
                    urls
                }
                Err(err) => {
                    error!(incident = %incident.id, %err, "object store upload failed");
                    Vec::new()
                }
            },
            ObjectStoreSink::Disabled => Vec::new(),
        }
    }
}
