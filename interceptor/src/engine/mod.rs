/*
 * Copyright 2023 ByteDance and/or its affiliates.
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 * You may obtain a copy of the License at
 *
 *     http://www.apache.org/licenses/LICENSE-2.0
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the License for the specific language governing permissions and
 * limitations under the License.
 */

//! Top-level engine: owns the live configuration snapshot, the exchange
//! table and event publisher, and the accept loop that hands each connection
//! off to its own task.

pub mod connection;
pub mod tunnel;

use std::sync::Arc;

use anyhow::Context;
use arc_swap::ArcSwap;
use log::{info, warn};
use tokio::net::TcpListener;
use tokio::sync::broadcast;

use crate::config::command::ConfigCommand;
use crate::config::persist::{ConfigStore, NullConfigStore};
use crate::config::Configuration;
use crate::exchange::{EventPublisher, ExchangeTable, ProxyEvent, DEFAULT_EVENT_CHANNEL_CAPACITY};

pub struct Engine {
    config: ArcSwap<Configuration>,
    /// Serializes command applications; reads of `config` stay lock-free via
    /// `ArcSwap::load`, satisfying the single-writer/many-reader discipline.
    command_lock: std::sync::Mutex<()>,
    store: Box<dyn ConfigStore>,
    exchanges: ExchangeTable,
    events: EventPublisher,
}

enum AcceptOutcome {
    Shutdown,
    Restart,
}

impl Engine {
    pub fn new(initial: Configuration) -> (Arc<Self>, broadcast::Receiver<ProxyEvent>) {
        Engine::with_store(initial, Box::new(NullConfigStore))
    }

    /// Like [`Engine::new`], but every successful `apply_command` is flushed
    /// through `store` so edits survive a restart.
    pub fn with_store(initial: Configuration, store: Box<dyn ConfigStore>) -> (Arc<Self>, broadcast::Receiver<ProxyEvent>) {
        let (events, receiver) = EventPublisher::new(DEFAULT_EVENT_CHANNEL_CAPACITY);
        let engine = Arc::new(Engine {
            config: ArcSwap::from_pointee(initial),
            command_lock: std::sync::Mutex::new(()),
            store,
            exchanges: ExchangeTable::default(),
            events,
        });
        (engine, receiver)
    }

    pub fn config(&self) -> Arc<Configuration> {
        self.config.load_full()
    }

    pub fn exchanges(&self) -> &ExchangeTable {
        &self.exchanges
    }

    pub fn events(&self) -> &EventPublisher {
        &self.events
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ProxyEvent> {
        self.events.subscribe()
    }

    /// Applies a configuration edit and reports whether the listener needs
    /// restarting (only a changed `listen_port` requires it).
    pub fn apply_command(&self, command: ConfigCommand) -> anyhow::Result<bool> {
        let _guard = self.command_lock.lock().expect("config command mutex poisoned");
        let mut next = (*self.config.load_full()).clone();
        let restart = command.apply(&mut next)?;
        self.store.save(&next).context("failed to persist configuration after command")?;
        self.config.store(Arc::new(next));
        Ok(restart)
    }

    /// Runs the accept loop until `shutdown` fires, rebinding whenever a
    /// command changes the listen port. In-flight exchanges are never
    /// cancelled by a restart; only new accepts move to the new port.
    pub async fn run(self: Arc<Self>, mut shutdown: broadcast::Receiver<()>) -> anyhow::Result<()> {
        loop {
            let port = self.config().listen_port;
            let listener = TcpListener::bind(("0.0.0.0", port))
                .await
                .with_context(|| format!("failed to bind listener on port {port}"))?;
            info!("listening on 0.0.0.0:{port}");
            match self.accept_until_restart_or_shutdown(&listener, port, &mut shutdown).await {
                AcceptOutcome::Shutdown => return Ok(()),
                AcceptOutcome::Restart => continue,
            }
        }
    }

    async fn accept_until_restart_or_shutdown(
        self: &Arc<Self>,
        listener: &TcpListener,
        bound_port: u16,
        shutdown: &mut broadcast::Receiver<()>,
    ) -> AcceptOutcome {
        loop {
            tokio::select! {
                _ = shutdown.recv() => return AcceptOutcome::Shutdown,
                accepted = listener.accept() => {
                    match accepted {
                        Ok((stream, addr)) => {
                            let engine = Arc::clone(self);
                            tokio::spawn(async move {
                                connection::handle_connection(engine, stream, addr).await;
                            });
                        }
                        Err(e) => warn!("accept failed: {e}"),
                    }
                }
            }
            if self.config().listen_port != bound_port {
                return AcceptOutcome::Restart;
            }
        }
    }
}
