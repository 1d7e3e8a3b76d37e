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

//! JSON serialization of captured exchanges for export to external tooling.
//!
//! Bodies are encoded byte-for-byte as Latin-1 (each byte becomes the code
//! unit of the same value) rather than base64, so the JSON stays readable
//! for text bodies while still round-tripping binary ones exactly.

use std::io::Read;

use indexmap::IndexMap;
use interceptor_http::{HttpHeaders, HttpRequest, HttpResponse};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
pub struct JsonStatus {
    pub code: u16,
    #[serde(rename = "reasonPhrase")]
    pub reason_phrase: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct JsonHttpRequest {
    _class: String,
    pub uri: String,
    pub method: String,
    pub headers: IndexMap<String, Vec<String>>,
    pub body: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct JsonHttpResponse {
    _class: String,
    #[serde(rename = "protocolVersion")]
    pub protocol_version: String,
    pub status: JsonStatus,
    pub headers: IndexMap<String, Vec<String>>,
    pub body: Option<String>,
}

fn latin1_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| b as char).collect()
}

fn latin1_decode(s: &str) -> Vec<u8> {
    s.chars().map(|c| c as u32 as u8).collect()
}

/// `gzip` bodies are already decoded by the codec before they ever reach
/// export. `br` is never re-encoded on emit, only decoded here for
/// display; if decoding fails the raw bytes are shown instead.
fn display_body(headers: &HttpHeaders, body: &[u8]) -> String {
    if headers.content_encoding().map(|v| v.eq_ignore_ascii_case("br")) == Some(true) {
        let mut decoder = brotli::Decompressor::new(body, 4096);
        let mut decoded = Vec::new();
        if decoder.read_to_end(&mut decoded).is_ok() {
            return latin1_encode(&decoded);
        }
    }
    latin1_encode(body)
}

fn headers_to_map(headers: &interceptor_http::HttpHeaders) -> IndexMap<String, Vec<String>> {
    let mut map = IndexMap::new();
    headers.for_each(|name, value| {
        map.entry(name.to_string()).or_insert_with(Vec::new).push(value.to_string());
    });
    map
}

impl JsonHttpRequest {
    pub fn from_request(request: &HttpRequest) -> Self {
        JsonHttpRequest {
            _class: "HttpRequest".to_string(),
            uri: request.target.clone(),
            method: request.method.as_str().to_string(),
            headers: headers_to_map(&request.head.headers),
            body: request.head.body.as_deref().map(|b| display_body(&request.head.headers, b)),
        }
    }

    pub fn body_bytes(&self) -> Option<Vec<u8>> {
        self.body.as_deref().map(latin1_decode)
    }
}

impl JsonHttpResponse {
    pub fn from_response(response: &HttpResponse) -> Self {
        JsonHttpResponse {
            _class: "HttpResponse".to_string(),
            protocol_version: interceptor_http::version_str(response.head.version).to_string(),
            status: JsonStatus {
                code: response.status,
                reason_phrase: response.reason_phrase.clone(),
            },
            headers: headers_to_map(&response.head.headers),
            body: response.head.body.as_deref().map(|b| display_body(&response.head.headers, b)),
        }
    }

    pub fn body_bytes(&self) -> Option<Vec<u8>> {
        self.body.as_deref().map(latin1_decode)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;
    use http::Version;

    #[test]
    fn latin1_round_trips_arbitrary_bytes() {
        let bytes: Vec<u8> = (0..=255).collect();
        let encoded = latin1_encode(&bytes);
        assert_eq!(latin1_decode(&encoded), bytes);
    }

    #[test]
    fn request_serializes_with_expected_class_and_headers() {
        let mut request = HttpRequest::new(b"GET", b"/hello", Version::HTTP_11).unwrap();
        request.head.headers.append("host", "Host", "example.com").unwrap();
        let json = JsonHttpRequest::from_request(&request);
        let value = serde_json::to_value(&json).unwrap();
        assert_eq!(value["_class"], "HttpRequest");
        assert_eq!(value["uri"], "/hello");
        assert_eq!(value["headers"]["Host"][0], "example.com");
    }

    #[test]
    fn response_serializes_status_as_nested_object() {
        let response = HttpResponse::new(404, "Not Found".to_string(), Version::HTTP_11);
        let json = JsonHttpResponse::from_response(&response);
        let value = serde_json::to_value(&json).unwrap();
        assert_eq!(value["status"]["code"], 404);
        assert_eq!(value["status"]["reasonPhrase"], "Not Found");
        assert_eq!(value["protocolVersion"], "HTTP/1.1");
    }

    #[test]
    fn brotli_encoded_response_body_is_decoded_for_display() {
        let mut response = HttpResponse::new(200, "OK".to_string(), Version::HTTP_11);
        response.head.headers.append("content-encoding", "Content-Encoding", "br").unwrap();
        let mut compressed = Vec::new();
        brotli::CompressorWriter::new(&mut compressed, 4096, 5, 20)
            .write_all(b"hello world")
            .unwrap();
        response.head.body = Some(compressed.into());
        let json = JsonHttpResponse::from_response(&response);
        assert_eq!(json.body_bytes().unwrap(), b"hello world");
    }
}
