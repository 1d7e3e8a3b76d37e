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

//! Process-wide configuration: listen port, system-proxy toggle, external
//! (upstream) proxy, host allow/deny filter and rewrite rules.
//!
//! Parsed from a single YAML mapping at startup; mutated afterwards only
//! through [`command::ConfigCommand`]s so that snapshot reads never see a
//! torn update.

pub mod command;
pub mod glob;
pub mod persist;
pub mod rewrite;

use anyhow::{anyhow, Context};
use serde::{Deserialize, Serialize};
use yaml_rust::Yaml;

pub use rewrite::{RequestRewriteRule, RequestRewrites};

pub const DEFAULT_LISTEN_PORT: u16 = 9999;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FilterMode {
    Allow,
    Deny,
}

impl Default for FilterMode {
    fn default() -> Self {
        FilterMode::Deny
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostFilterConfig {
    pub mode: FilterMode,
    pub list: Vec<String>,
}

impl HostFilterConfig {
    pub fn is_allowed(&self, host: &str) -> bool {
        let matched = self.list.iter().any(|pattern| glob::path_glob_matches(pattern, host));
        match self.mode {
            FilterMode::Allow => matched,
            FilterMode::Deny => !matched,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalProxyConfig {
    pub enabled: bool,
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub bypass: Vec<String>,
}

impl ExternalProxyConfig {
    pub fn bypasses(&self, host: &str) -> bool {
        self.bypass.iter().any(|pattern| glob::path_glob_matches(pattern, host))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Configuration {
    pub listen_port: u16,
    pub system_proxy_enabled: bool,
    pub external_proxy: ExternalProxyConfig,
    pub host_filter: HostFilterConfig,
    pub rewrites: RequestRewrites,
}

impl Default for Configuration {
    fn default() -> Self {
        Configuration {
            listen_port: DEFAULT_LISTEN_PORT,
            system_proxy_enabled: false,
            external_proxy: ExternalProxyConfig::default(),
            host_filter: HostFilterConfig::default(),
            rewrites: RequestRewrites::default(),
        }
    }
}

impl Configuration {
    pub fn parse(doc: &Yaml) -> anyhow::Result<Self> {
        let map = doc.as_hash().ok_or_else(|| anyhow!("root yaml document must be a mapping"))?;
        let mut config = Configuration::default();
        for (k, v) in map {
            let key = k.as_str().ok_or_else(|| anyhow!("config keys must be strings"))?;
            config
                .set(key, v)
                .with_context(|| format!("failed to parse config key \"{key}\""))?;
        }
        config.check()?;
        Ok(config)
    }

    fn set(&mut self, k: &str, v: &Yaml) -> anyhow::Result<()> {
        match k {
            "listen_port" => {
                self.listen_port = yaml_u16(v).context("invalid listen_port")?;
                Ok(())
            }
            "enable_system_proxy" => {
                self.system_proxy_enabled = yaml_bool(v).context("invalid enable_system_proxy")?;
                Ok(())
            }
            "external_proxy" => {
                self.external_proxy = parse_external_proxy(v)?;
                Ok(())
            }
            "host_filter" => {
                self.host_filter = parse_host_filter(v)?;
                Ok(())
            }
            "rewrite_rules" | "rewrites" => {
                self.rewrites = parse_rewrites(v)?;
                Ok(())
            }
            _ => Err(anyhow!("invalid config key \"{k}\"")),
        }
    }

    fn check(&self) -> anyhow::Result<()> {
        if self.listen_port == 0 {
            return Err(anyhow!("listen_port must be nonzero"));
        }
        if self.external_proxy.enabled && self.external_proxy.host.is_empty() {
            return Err(anyhow!("external_proxy.host is required when external_proxy is enabled"));
        }
        if self.external_proxy.enabled && self.external_proxy.port == 0 {
            return Err(anyhow!("external_proxy.port must be nonzero when external_proxy is enabled"));
        }
        for rule in &self.rewrites.rules {
            if rule.path_glob.is_empty() {
                return Err(anyhow!("rewrite rule path_glob must not be empty"));
            }
        }
        Ok(())
    }
}

fn yaml_u16(v: &Yaml) -> anyhow::Result<u16> {
    v.as_i64()
        .and_then(|n| u16::try_from(n).ok())
        .ok_or_else(|| anyhow!("expected an integer in 0..=65535"))
}

fn yaml_bool(v: &Yaml) -> anyhow::Result<bool> {
    v.as_bool().ok_or_else(|| anyhow!("expected a boolean"))
}

fn yaml_string(v: &Yaml) -> anyhow::Result<String> {
    v.as_str().map(str::to_string).ok_or_else(|| anyhow!("expected a string"))
}

fn yaml_string_list(v: &Yaml) -> anyhow::Result<Vec<String>> {
    let items = v.as_vec().ok_or_else(|| anyhow!("expected a list of strings"))?;
    items.iter().map(yaml_string).collect()
}

fn parse_external_proxy(v: &Yaml) -> anyhow::Result<ExternalProxyConfig> {
    let map = v.as_hash().ok_or_else(|| anyhow!("external_proxy must be a mapping"))?;
    let mut cfg = ExternalProxyConfig::default();
    for (k, v) in map {
        let key = k.as_str().ok_or_else(|| anyhow!("external_proxy keys must be strings"))?;
        match key {
            "enabled" => cfg.enabled = yaml_bool(v).context("invalid external_proxy.enabled")?,
            "host" => cfg.host = yaml_string(v).context("invalid external_proxy.host")?,
            "port" => cfg.port = yaml_u16(v).context("invalid external_proxy.port")?,
            "username" => cfg.username = Some(yaml_string(v).context("invalid external_proxy.username")?),
            "password" => cfg.password = Some(yaml_string(v).context("invalid external_proxy.password")?),
            "bypass" => cfg.bypass = yaml_string_list(v).context("invalid external_proxy.bypass")?,
            _ => return Err(anyhow!("invalid external_proxy key \"{key}\"")),
        }
    }
    Ok(cfg)
}

fn parse_host_filter(v: &Yaml) -> anyhow::Result<HostFilterConfig> {
    let map = v.as_hash().ok_or_else(|| anyhow!("host_filter must be a mapping"))?;
    let mut cfg = HostFilterConfig::default();
    for (k, v) in map {
        let key = k.as_str().ok_or_else(|| anyhow!("host_filter keys must be strings"))?;
        match key {
            "mode" => {
                cfg.mode = match yaml_string(v).context("invalid host_filter.mode")?.as_str() {
                    "allow" => FilterMode::Allow,
                    "deny" => FilterMode::Deny,
                    other => return Err(anyhow!("invalid host_filter.mode \"{other}\", expected allow|deny")),
                }
            }
            "list" => cfg.list = yaml_string_list(v).context("invalid host_filter.list")?,
            _ => return Err(anyhow!("invalid host_filter key \"{key}\"")),
        }
    }
    Ok(cfg)
}

fn parse_rewrites(v: &Yaml) -> anyhow::Result<RequestRewrites> {
    let map = v.as_hash().ok_or_else(|| anyhow!("rewrites must be a mapping"))?;
    let mut rewrites = RequestRewrites::default();
    for (k, v) in map {
        let key = k.as_str().ok_or_else(|| anyhow!("rewrites keys must be strings"))?;
        match key {
            "enabled" => rewrites.enabled = yaml_bool(v).context("invalid rewrites.enabled")?,
            "rules" => {
                let items = v.as_vec().ok_or_else(|| anyhow!("rewrites.rules must be a list"))?;
                for item in items {
                    rewrites.rules.push(parse_rewrite_rule(item)?);
                }
            }
            _ => return Err(anyhow!("invalid rewrites key \"{key}\"")),
        }
    }
    Ok(rewrites)
}

fn parse_rewrite_rule(v: &Yaml) -> anyhow::Result<RequestRewriteRule> {
    let map = v.as_hash().ok_or_else(|| anyhow!("rewrite rule must be a mapping"))?;
    let mut enabled = true;
    let mut domain = None;
    let mut path_glob = None;
    let mut request_body = None;
    let mut response_body = None;
    for (k, v) in map {
        let key = k.as_str().ok_or_else(|| anyhow!("rewrite rule keys must be strings"))?;
        match key {
            "enabled" => enabled = yaml_bool(v).context("invalid rule.enabled")?,
            "domain" => domain = Some(yaml_string(v).context("invalid rule.domain")?),
            "path" | "path_glob" => path_glob = Some(yaml_string(v).context("invalid rule.path")?),
            "request_body" => request_body = Some(yaml_string(v).context("invalid rule.request_body")?),
            "response_body" => response_body = Some(yaml_string(v).context("invalid rule.response_body")?),
            _ => return Err(anyhow!("invalid rewrite rule key \"{key}\"")),
        }
    }
    let path_glob = path_glob.ok_or_else(|| anyhow!("rewrite rule requires a \"path\""))?;
    if path_glob.is_empty() {
        return Err(anyhow!("rewrite rule \"path\" must not be empty"));
    }
    Ok(RequestRewriteRule {
        enabled,
        domain,
        path_glob,
        request_body,
        response_body,
    })
}
