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

use anyhow::Context;
use interceptor::config::persist::{ConfigStore, JsonFileConfigStore, NullConfigStore};
use interceptor::config::Configuration;
use interceptor::engine::Engine;
use interceptor::opts::{self, ProcArgs};
use log::{debug, info};
use tokio::sync::broadcast;

fn main() -> anyhow::Result<()> {
    let args = opts::parse_clap();
    interceptor::logging::init();

    let config = load_config(&args)?;
    if args.test_config {
        info!("configuration OK");
        return Ok(());
    }

    let store: Box<dyn ConfigStore> = match &args.state_file {
        Some(path) => Box::new(JsonFileConfigStore::new(path.clone())),
        None => Box::new(NullConfigStore),
    };

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to build tokio runtime")?;
    runtime.block_on(run(config, store))
}

fn load_config(args: &ProcArgs) -> anyhow::Result<Configuration> {
    if let Some(path) = &args.state_file {
        let store = JsonFileConfigStore::new(path.clone());
        if let Some(config) = store.load().context("failed to load persisted configuration")? {
            return Ok(config);
        }
    }

    match &args.config_file {
        Some(path) => {
            let text = std::fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
            let docs = yaml_rust::YamlLoader::load_from_str(&text).context("failed to parse configuration yaml")?;
            let doc = docs.first().ok_or_else(|| anyhow::anyhow!("configuration file has no yaml documents"))?;
            Configuration::parse(doc)
        }
        None => Ok(Configuration::default()),
    }
}

async fn run(config: Configuration, store: Box<dyn ConfigStore>) -> anyhow::Result<()> {
    let (engine, mut events) = Engine::with_store(config, store);
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            interceptor::logging::log_event(&event);
        }
    });

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    tokio::spawn(async move {
        wait_for_shutdown_signal().await;
        debug!("received shutdown signal");
        let _ = shutdown_tx.send(());
    });

    engine.run(shutdown_rx).await
}

#[cfg(unix)]
async fn wait_for_shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = terminate.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
