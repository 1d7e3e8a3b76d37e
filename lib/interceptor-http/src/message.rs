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

//! Request/response value types produced by the codec.

use bytes::Bytes;
use http::{Method, Version};

use crate::error::ParserError;
use crate::headers::HttpHeaders;
use crate::hostport::HostAndPort;

/// Methods the engine is willing to parse and forward.
pub const ALLOWED_METHODS: &[&str] = &[
    "GET", "POST", "PUT", "PATCH", "DELETE", "OPTIONS", "HEAD", "TRACE", "CONNECT", "PROPFIND",
];

/// Index into whatever table owns a request/response pair. Kept here as a
/// bare newtype so this crate never needs to know about the table itself;
/// the engine is the one place the cyclic reference actually gets resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ExchangeId(pub u64);

/// Fields common to both request and response heads.
#[derive(Debug, Clone)]
pub struct MessageHead {
    pub version: Version,
    pub headers: HttpHeaders,
    pub body: Option<Bytes>,
    /// Declared Content-Length at decode time; -1 means the header was absent.
    pub content_length: i64,
    pub remote_address: Option<String>,
}

impl MessageHead {
    pub fn new(version: Version) -> Self {
        MessageHead {
            version,
            headers: HttpHeaders::new(),
            body: None,
            content_length: -1,
            remote_address: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub head: MessageHead,
    pub method: Method,
    /// Request-target exactly as it appeared on the wire (origin-form,
    /// absolute-form, or authority-form for CONNECT).
    pub target: String,
    pub host_port: Option<HostAndPort>,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub linked_response: Option<ExchangeId>,
}

impl HttpRequest {
    pub fn new(method_token: &[u8], target: &[u8], version: Version) -> Result<Self, ParserError> {
        let method_str = std::str::from_utf8(method_token)
            .map_err(|_| ParserError::new("parseLine error", Bytes::copy_from_slice(method_token)))?;
        if !ALLOWED_METHODS.contains(&method_str) {
            return Err(ParserError::new(
                "unsupported request method",
                Bytes::copy_from_slice(method_token),
            ));
        }
        let method = Method::from_bytes(method_token)
            .map_err(|_| ParserError::new("parseLine error", Bytes::copy_from_slice(method_token)))?;
        let target = String::from_utf8_lossy(target).into_owned();
        Ok(HttpRequest {
            head: MessageHead::new(version),
            method,
            target,
            host_port: None,
            timestamp: chrono::Utc::now(),
            linked_response: None,
        })
    }

    pub fn is_connect(&self) -> bool {
        self.method == Method::CONNECT
    }
}

#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub head: MessageHead,
    pub status: u16,
    pub reason_phrase: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub linked_request: Option<ExchangeId>,
}

impl HttpResponse {
    pub fn new(status: u16, reason_phrase: String, version: Version) -> Self {
        HttpResponse {
            head: MessageHead::new(version),
            status,
            reason_phrase,
            timestamp: chrono::Utc::now(),
            linked_request: None,
        }
    }

    pub fn is_successful(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Bodyless per RFC 7230 §3.3.3, independent of any framing header.
    pub fn has_no_body_by_status(&self) -> bool {
        matches!(self.status, 204 | 304) || (100..200).contains(&self.status)
    }
}

/// Either half of a decoded exchange, as returned by the codec.
#[derive(Debug, Clone)]
pub enum HttpMessage {
    Request(HttpRequest),
    Response(HttpResponse),
}

impl HttpMessage {
    pub fn head(&self) -> &MessageHead {
        match self {
            HttpMessage::Request(r) => &r.head,
            HttpMessage::Response(r) => &r.head,
        }
    }

    pub fn head_mut(&mut self) -> &mut MessageHead {
        match self {
            HttpMessage::Request(r) => &mut r.head,
            HttpMessage::Response(r) => &mut r.head,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_method_outside_the_allowed_set() {
        let err = HttpRequest::new(b"FOO", b"/", Version::HTTP_11).unwrap_err();
        assert_eq!(err.message, "unsupported request method");
    }

    #[test]
    fn accepts_every_enumerated_method() {
        for m in ALLOWED_METHODS {
            assert!(HttpRequest::new(m.as_bytes(), b"/", Version::HTTP_11).is_ok());
        }
    }

    #[test]
    fn response_success_range_is_200_to_299() {
        let ok = HttpResponse::new(204, "No Content".to_string(), Version::HTTP_11);
        assert!(ok.is_successful());
        let err = HttpResponse::new(404, "Not Found".to_string(), Version::HTTP_11);
        assert!(!err.is_successful());
    }
}
