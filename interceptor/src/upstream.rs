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

//! Resolves where an exchange's outbound connection actually goes: either
//! straight to the target host, or through a configured external proxy.

use std::time::Duration;

use base64::Engine;
use interceptor_http::HostAndPort;
use tokio::net::TcpStream;
use tokio::time::timeout;

use crate::config::Configuration;
use crate::error::ExchangeError;

pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// The socket address actually dialed for a given target, after applying
/// the external-proxy/bypass decision.
pub struct Route {
    pub host: String,
    pub port: u16,
    /// Set when the connection goes through an external proxy and the
    /// request must therefore be emitted in absolute-form with this header.
    pub proxy_authorization: Option<String>,
    /// True when `host`/`port` name the external proxy rather than the
    /// request's real destination.
    pub via_external_proxy: bool,
}

pub fn resolve_route(config: &Configuration, target: &HostAndPort) -> Route {
    let ext = &config.external_proxy;
    if ext.enabled && !ext.bypasses(&target.host) {
        Route {
            host: ext.host.clone(),
            port: ext.port,
            proxy_authorization: basic_auth_header(ext.username.as_deref(), ext.password.as_deref()),
            via_external_proxy: true,
        }
    } else {
        Route {
            host: target.host.clone(),
            port: target.port,
            proxy_authorization: None,
            via_external_proxy: false,
        }
    }
}

fn basic_auth_header(username: Option<&str>, password: Option<&str>) -> Option<String> {
    let username = username?;
    let password = password.unwrap_or_default();
    let token = base64::engine::general_purpose::STANDARD.encode(format!("{username}:{password}"));
    Some(format!("Basic {token}"))
}

pub async fn connect(route: &Route) -> Result<TcpStream, ExchangeError> {
    let addr = format!("{}:{}", route.host, route.port);
    match timeout(DEFAULT_CONNECT_TIMEOUT, TcpStream::connect(&addr)).await {
        Ok(Ok(stream)) => Ok(stream),
        Ok(Err(e)) => Err(ExchangeError::UpstreamConnect(e)),
        Err(_) => Err(ExchangeError::UpstreamTimeout),
    }
}
