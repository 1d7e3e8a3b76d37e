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

//! Typed mutations applied to a [`Configuration`] on the engine's single
//! control channel, so edits from the UI never race with a snapshot read
//! taken by an in-flight exchange.

use anyhow::anyhow;

use super::{Configuration, ExternalProxyConfig, HostFilterConfig, RequestRewriteRule};

#[derive(Debug, Clone)]
pub enum ConfigCommand {
    SetListenPort(u16),
    SetSystemProxyEnabled(bool),
    SetExternalProxy(ExternalProxyConfig),
    SetHostFilter(HostFilterConfig),
    SetRewritesEnabled(bool),
    UpsertRule { index: Option<usize>, rule: RequestRewriteRule },
    RemoveRule(usize),
}

impl ConfigCommand {
    /// Applies the command in place, returning `true` if the listener needs
    /// to be restarted (only a changed listen port requires this).
    pub fn apply(self, config: &mut Configuration) -> anyhow::Result<bool> {
        match self {
            ConfigCommand::SetListenPort(port) => {
                if port == 0 {
                    return Err(anyhow!("listen_port must be nonzero"));
                }
                let changed = config.listen_port != port;
                config.listen_port = port;
                return Ok(changed);
            }
            ConfigCommand::SetSystemProxyEnabled(enabled) => config.system_proxy_enabled = enabled,
            ConfigCommand::SetExternalProxy(ext) => config.external_proxy = ext,
            ConfigCommand::SetHostFilter(filter) => config.host_filter = filter,
            ConfigCommand::SetRewritesEnabled(enabled) => config.rewrites.enabled = enabled,
            ConfigCommand::UpsertRule { index, rule } => match index {
                Some(i) if i < config.rewrites.rules.len() => config.rewrites.rules[i] = rule,
                Some(i) => return Err(anyhow!("rewrite rule index {i} out of range")),
                None => config.rewrites.rules.push(rule),
            },
            ConfigCommand::RemoveRule(i) => {
                if i >= config.rewrites.rules.len() {
                    return Err(anyhow!("rewrite rule index {i} out of range"));
                }
                config.rewrites.rules.remove(i);
            }
        }
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_listen_port_reports_whether_a_restart_is_needed() {
        let mut config = Configuration::default();
        assert!(!ConfigCommand::SetListenPort(config.listen_port).apply(&mut config).unwrap());
        assert!(ConfigCommand::SetListenPort(config.listen_port + 1).apply(&mut config).unwrap());
    }

    #[test]
    fn upsert_rule_appends_when_index_is_none() {
        let mut config = Configuration::default();
        ConfigCommand::UpsertRule {
            index: None,
            rule: RequestRewriteRule::new("/api/*".to_string()),
        }
        .apply(&mut config)
        .unwrap();
        assert_eq!(config.rewrites.rules.len(), 1);
    }

    #[test]
    fn remove_rule_out_of_range_errors() {
        let mut config = Configuration::default();
        assert!(ConfigCommand::RemoveRule(0).apply(&mut config).is_err());
    }
}
