/* Copyright (C) 2025 Pedro Henrique / phkaiser13
* File: crates/nightcrier-sinks/src/chat.rs
*
* Chat sink: a single `notify` operation over an incoming webhook. Failures
* to notify are logged but never alter an incident's status, matching the
* sink-error propagation policy.
*
* SPDX-License-Identifier: Apache-2.0 */

use std::time::Duration;

use async_trait::async_trait;
use nightcrier_model::IncidentSummary;
use serde::Serialize;
use tracing::{error, info};

#[async_trait]
trait ChatBackend: Send + Sync {
    async fn notify(&self, summary: &ChatMessage) -> anyhow::Result<()>;
}

/// Either a human-readable incident summary or one of the circuit
/// breaker's aggregated degraded/recovered notices.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum ChatMessage {
    Incident(IncidentSummary),
    Text(String),
}

/// Webhook-backed chat notifier, grounded on the single-operation
/// `send_slack_message` shape: build a `reqwest::Client`, POST the
/// payload, and surface non-2xx via `error_for_status`.
pub struct SlackChatBackend {
    client: reqwest::Client,
    webhook_url: String,
}

impl SlackChatBackend {
    pub fn new(webhook_url: impl Into<String>, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            webhook_url: webhook_url.into(),
        })
    }
}

#[async_trait]
impl ChatBackend for SlackChatBackend {
    async fn notify(&self, summary: &ChatMessage) -> anyhow::Result<()> {
        self.client
            .post(&self.webhook_url)
            .json(summary)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

/// Polymorphic over `{enabled(backend), disabled}`; `disabled` is a
/// zero-cost no-op so the scheduler never branches at call sites.
pub enum ChatSink {
    Enabled(Box<dyn ChatBackend>),
    Disabled,
}

impl ChatSink {
    pub fn enabled(backend: SlackChatBackend) -> Self {
        ChatSink::Enabled(Box::new(backend))
    }

    pub fn disabled() -> Self {
        ChatSink::Disabled
    }

    pub async fn notify_incident(&self, summary: IncidentSummary) {
        self.send(ChatMessage::Incident(summary)).await;
    }

    pub async fn notify_degraded(&self, failure_count: u64, first_failure_at: chrono::DateTime<chrono::Utc>, reasons: &[String]) {
        let text = format!(
            "system degraded: {failure_count} consecutive agent failures since {first_failure_at}. recent reasons: {}",
            reasons.join("; ")
        );
        self.send(ChatMessage::Text(text)).await;
    }

    pub async fn notify_recovered(&self, outage: Duration, total_failures: u64) {
        let text = format!(
            "system recovered after {:.0}s outage, {total_failures} total failures",
            outage.as_secs_f64()
        );
        self.send(ChatMessage::Text(text)).await;
    }

    async fn send(&self, message: ChatMessage) {
        match self {
            ChatSink::Enabled(backend) => {
                if let Err(err) = backend.notify(&message).await {
                    error!(%err, "chat sink notify failed");
                } else {
                    info!("chat sink notify succeeded");
                }
            }
            ChatSink::Disabled => {}
        }
    }
}
