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

use bytes::Bytes;

/// Failure while scanning or parsing the wire bytes of an HTTP/1.x message.
///
/// The snapshot carries the bytes that were being parsed when the failure was
/// detected, so callers can log or surface the offending fragment without
/// re-reading the connection buffer.
#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct ParserError {
    pub message: &'static str,
    pub snapshot: Bytes,
}

impl ParserError {
    pub fn new(message: &'static str, snapshot: impl Into<Bytes>) -> Self {
        ParserError {
            message,
            snapshot: snapshot.into(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum HostPortError {
    #[error("empty host")]
    EmptyHost,
    #[error("invalid port number")]
    InvalidPort,
    #[error("missing port")]
    MissingPort,
    #[error("unterminated IPv6 literal")]
    UnterminatedIpv6,
    #[error("request target is origin-form but no Host header was sent")]
    NoHostHeader,
    #[error("unsupported request-target form")]
    UnsupportedTarget,
}
