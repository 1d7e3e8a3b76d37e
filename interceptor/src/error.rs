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

//! Error kinds surfaced at the exchange boundary, each mapped to the
//! synthesized client-facing status code the engine replies with.

use interceptor_http::ParserError;

#[derive(Debug, thiserror::Error)]
pub enum ExchangeError {
    #[error("malformed request or response: {0}")]
    Parse(#[from] ParserError),
    /// Covers both a failed dial and any I/O failure reading from the
    /// upstream socket once connected; the client-facing outcome is the
    /// same either way, a 502.
    #[error("upstream connection failed: {0}")]
    UpstreamConnect(#[source] std::io::Error),
    #[error("upstream connect or read timed out")]
    UpstreamTimeout,
    #[error("tunneling I/O failure: {0}")]
    Tunnel(#[source] std::io::Error),
    #[error("client I/O failure: {0}")]
    ClientIo(#[source] std::io::Error),
    #[error("invalid configuration: {0}")]
    Config(#[source] anyhow::Error),
}

impl ExchangeError {
    /// `kind` tag published alongside partial requests on the event channel.
    pub fn kind(&self) -> &'static str {
        match self {
            ExchangeError::Parse(_) => "ParseError",
            ExchangeError::UpstreamConnect(_) => "UpstreamConnectError",
            ExchangeError::UpstreamTimeout => "UpstreamTimeoutError",
            ExchangeError::Tunnel(_) => "TunnelError",
            ExchangeError::ClientIo(_) => "ClientIoError",
            ExchangeError::Config(_) => "ConfigError",
        }
    }

    /// Status code for the synthesized error response, or `None` when the
    /// failure must instead abort the connection outright (tunnel I/O).
    pub fn synthesized_status(&self) -> Option<(u16, &'static str)> {
        match self {
            ExchangeError::Parse(_) => Some((400, "Bad Request")),
            ExchangeError::UpstreamConnect(_) => Some((502, "Bad Gateway")),
            ExchangeError::UpstreamTimeout => Some((504, "Gateway Timeout")),
            ExchangeError::Tunnel(_) | ExchangeError::ClientIo(_) | ExchangeError::Config(_) => None,
        }
    }
}
