/* Copyright (C) 2025 Pedro Henrique / phkaiser13
* File: src/connection/state.rs
*
* Per-cluster connection state machine:
* `Disconnected → Connecting → Connected → Subscribing → Active → (Disconnected|Failed)`.
* Classification of the error that caused a non-shutdown exit never alters
* retry behaviour; it exists only for the `sse_connection_errors_total`
* label.
*
* SPDX-License-Identifier: Apache-2.0 */

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Subscribing,
    Active,
    Failed,
}

/// Observability-only classification of why a subscriber left `Active`.
/// Never changes the reconnection algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClassification {
    Dial,
    Tls,
    Read,
    Decode,
    ServerClose,
}

impl FailureClassification {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureClassification::Dial => "dial",
            FailureClassification::Tls => "tls",
            FailureClassification::Read => "read",
            FailureClassification::Decode => "decode",
            FailureClassification::ServerClose => "server_close",
        }
    }
}
