/* Copyright (C) 2025 Pedro Henrique / phkaiser13
* File: crates/nightcrier-sinks/src/lib.rs
*
* The two external collaborators the scheduler talks to on incident
* completion: a chat sink (incoming webhook) and an object store (cloud
* blob upload). Both are sum types over `{enabled(backend), disabled}`
* rather than interface hierarchies, following the swappable-provider
* shape the secret-sync module uses for its backends.
*
* SPDX-License-Identifier: Apache-2.0 */

mod chat;
mod object_store;

pub use chat::{ChatSink, SlackChatBackend};
pub use object_store::{ObjectStoreSink, S3ObjectStoreBackend, UploadedArtifact};
