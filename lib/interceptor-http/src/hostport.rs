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

//! Resolution of CONNECT targets and absolute/origin-form request URIs into
//! a concrete upstream host, port and TLS flag.

use crate::error::HostPortError;
use crate::headers::HttpHeaders;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostAndPort {
    pub host: String,
    pub port: u16,
    pub tls: bool,
}

impl HostAndPort {
    pub fn new(host: String, port: u16, tls: bool) -> Self {
        HostAndPort { host, port, tls }
    }
}

/// Splits `host:port` or a bracketed `[ipv6]:port`, with an optional default
/// port used when the authority carries none and `scheme_tls` pins the TLS
/// flag (absolute-form URIs know their scheme; CONNECT never does).
fn split_authority(authority: &str, default_port: Option<u16>) -> Result<(String, u16), HostPortError> {
    if let Some(rest) = authority.strip_prefix('[') {
        let end = rest.find(']').ok_or(HostPortError::UnterminatedIpv6)?;
        let host = &rest[..end];
        if host.is_empty() {
            return Err(HostPortError::EmptyHost);
        }
        let after = &rest[end + 1..];
        let port = match after.strip_prefix(':') {
            Some(p) if !p.is_empty() => p.parse::<u16>().map_err(|_| HostPortError::InvalidPort)?,
            Some(_) => return Err(HostPortError::InvalidPort),
            None => default_port.ok_or(HostPortError::MissingPort)?,
        };
        return Ok((host.to_string(), port));
    }

    match authority.rsplit_once(':') {
        Some((host, port)) if !host.is_empty() => {
            let port = port.parse::<u16>().map_err(|_| HostPortError::InvalidPort)?;
            Ok((host.to_string(), port))
        }
        Some((host, _)) if host.is_empty() => Err(HostPortError::EmptyHost),
        _ => {
            if authority.is_empty() {
                Err(HostPortError::EmptyHost)
            } else {
                Ok((authority.to_string(), default_port.ok_or(HostPortError::MissingPort)?))
            }
        }
    }
}

/// Resolves a CONNECT target of the form `host:port`. TLS is implied by
/// port 443 (CONNECT never carries a scheme of its own).
pub fn resolve_connect_target(authority: &str) -> Result<HostAndPort, HostPortError> {
    let (host, port) = split_authority(authority, None)?;
    let tls = port == 443;
    Ok(HostAndPort::new(host, port, tls))
}

/// Resolves a request-target seen in a (non-CONNECT) request line: either
/// absolute-form (`http://host:port/path`), or origin-form (`/path`), in
/// which case the `Host` header supplies the authority.
pub fn resolve_request_target(target: &str, headers: &HttpHeaders) -> Result<HostAndPort, HostPortError> {
    if let Some(rest) = target.strip_prefix("https://") {
        let authority = rest.split('/').next().unwrap_or(rest);
        let (host, port) = split_authority(authority, Some(443))?;
        return Ok(HostAndPort::new(host, port, true));
    }
    if let Some(rest) = target.strip_prefix("http://") {
        let authority = rest.split('/').next().unwrap_or(rest);
        let (host, port) = split_authority(authority, Some(80))?;
        let tls = port == 443;
        return Ok(HostAndPort::new(host, port, tls));
    }

    if target.starts_with('/') {
        let host_header = headers.get_first("host").ok_or(HostPortError::NoHostHeader)?;
        let (host, port) = split_authority(host_header, Some(80))?;
        let tls = port == 443;
        return Ok(HostAndPort::new(host, port, tls));
    }

    Err(HostPortError::UnsupportedTarget)
}
