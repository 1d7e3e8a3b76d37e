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

//! Load/save collaborator for the configuration object. The engine only
//! ever sees this trait; whatever actually backs it (a file, a UI-owned
//! store, nothing at all) is an external concern.

use std::fs;
use std::path::PathBuf;

use anyhow::Context;

use super::Configuration;

pub trait ConfigStore: Send + Sync {
    fn load(&self) -> anyhow::Result<Option<Configuration>>;
    fn save(&self, config: &Configuration) -> anyhow::Result<()>;
}

/// Used when no persistence collaborator is wired in: every load returns
/// nothing and every save is discarded.
pub struct NullConfigStore;

impl ConfigStore for NullConfigStore {
    fn load(&self) -> anyhow::Result<Option<Configuration>> {
        Ok(None)
    }

    fn save(&self, _config: &Configuration) -> anyhow::Result<()> {
        Ok(())
    }
}

/// A small JSON-file-backed store, useful for running the engine standalone
/// without a UI collaborator providing its own persistence.
pub struct JsonFileConfigStore {
    path: PathBuf,
}

impl JsonFileConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        JsonFileConfigStore { path: path.into() }
    }
}

impl ConfigStore for JsonFileConfigStore {
    fn load(&self) -> anyhow::Result<Option<Configuration>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let data = fs::read_to_string(&self.path)
            .with_context(|| format!("failed to read config file {}", self.path.display()))?;
        let config = serde_json::from_str(&data)
            .with_context(|| format!("failed to parse config file {}", self.path.display()))?;
        Ok(Some(config))
    }

    fn save(&self, config: &Configuration) -> anyhow::Result<()> {
        let data = serde_json::to_string_pretty(config).context("failed to serialize configuration")?;
        fs::write(&self.path, data)
            .with_context(|| format!("failed to write config file {}", self.path.display()))?;
        Ok(())
    }
}
