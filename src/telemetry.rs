/* Copyright (C) 2025 Pedro Henrique / phkaiser13
* File: src/telemetry.rs
*
* Structured logging init: `EnvFilter` driven by `RUST_LOG` (default
* "info"), a registry with a single fmt layer.
*
* SPDX-License-Identifier: Apache-2.0 */

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init()
        .expect("failed to install tracing subscriber");
}
