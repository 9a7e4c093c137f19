/* Copyright (C) 2025 Pedro Henrique / phkaiser13
* File: src/shutdown.rs
*
* A single process-wide shutdown signal that cascades to every component.
* Generalizes the `tokio::select!` race between a long-running task and a
* completion signal the fleet's autoheal controller uses for one task to
* an N-way broadcast: every subscriber, sweep, and worker holds its own
* receiver and reacts independently. `flag` backs the cases (the agent
* runner's cancellation future in particular) that need to observe
* "shutdown already happened" repeatedly rather than just once.
*
* SPDX-License-Identifier: Apache-2.0 */

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::broadcast;
use tracing::info;

#[derive(Clone)]
pub struct Shutdown {
    tx: broadcast::Sender<()>,
    flag: Arc<AtomicBool>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(1);
        Self {
            tx,
            flag: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.tx.subscribe()
    }

    pub fn is_shutting_down(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// A future that resolves once shutdown has fired and stays resolved
    /// forever after — safe to await repeatedly from independent call
    /// sites (e.g. a fresh agent run started just before shutdown).
    pub async fn cancelled(&self) {
        while !self.flag.load(Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }

    fn fire(&self) {
        self.flag.store(true, Ordering::SeqCst);
        let _ = self.tx.send(());
    }

    /// Waits for SIGINT or SIGTERM, then fires the shutdown signal.
    pub async fn wait_for_signal(&self) {
        let mut sigterm = signal(SignalKind::terminate()).expect("failed to register SIGTERM handler");
        let mut sigint = signal(SignalKind::interrupt()).expect("failed to register SIGINT handler");

        tokio::select! {
            _ = sigterm.recv() => info!("received SIGTERM"),
            _ = sigint.recv() => info!("received SIGINT"),
        }

        self.fire();
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}
