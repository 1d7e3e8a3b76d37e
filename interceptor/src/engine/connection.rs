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

//! Per-connection state machine: `Accepting -> Classifying -> (Tunneling |
//! HttpExchange) -> Closed`. Strictly sequential within a connection (no
//! pipelining reordering): one request is fully answered before the next is
//! read.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use http::{Method, Version};
use interceptor_http::{
    encode_request, encode_response, resolve_connect_target, resolve_request_target, HttpRequest, HttpResponse,
    ParserError, RequestDecoder, ResponseDecoder,
};
use log::warn;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;

use super::tunnel;
use super::Engine;
use crate::error::ExchangeError;
use crate::exchange::{ExchangeRecord, ProxyEvent};
use crate::task::ExchangeTiming;
use crate::upstream;

const CLIENT_IDLE_TIMEOUT: Duration = Duration::from_secs(30);
const UPSTREAM_READ_IDLE_TIMEOUT: Duration = Duration::from_secs(60);
const READ_CHUNK: usize = 8192;

pub async fn handle_connection(engine: Arc<Engine>, mut client: TcpStream, remote_addr: SocketAddr) {
    let remote_address = remote_addr.ip().to_string();
    let mut buf = BytesMut::with_capacity(READ_CHUNK);
    let mut decoder = RequestDecoder::new();

    loop {
        let request = match read_request(&mut client, &mut buf, &mut decoder).await {
            Ok(Some(request)) => request,
            Ok(None) => return,
            Err(err) => {
                handle_exchange_failure(&engine, &mut client, None, &remote_address, err).await;
                return;
            }
        };

        if request.is_connect() {
            handle_connect(&engine, client, request, &remote_address).await;
            return;
        }

        match handle_http_exchange(&engine, &mut client, request, &remote_address).await {
            Ok(true) => continue,
            Ok(false) | Err(()) => return,
        }
    }
}

async fn read_request(
    stream: &mut TcpStream,
    buf: &mut BytesMut,
    decoder: &mut RequestDecoder,
) -> Result<Option<HttpRequest>, ExchangeError> {
    let mut chunk = [0u8; READ_CHUNK];
    loop {
        if let Some(request) = decoder.decode(buf)? {
            if decoder.take_truncated() {
                warn!("request body truncated at the length cap");
            }
            return Ok(Some(request));
        }
        if decoder.is_idle() {
            // Between messages: a close or idle timeout here is a clean
            // disconnect, not a failure.
            match timeout(CLIENT_IDLE_TIMEOUT, stream.read(&mut chunk)).await {
                Ok(Ok(0)) | Err(_) => return Ok(None),
                Ok(Ok(n)) => buf.extend_from_slice(&chunk[..n]),
                Ok(Err(e)) => return Err(ExchangeError::ClientIo(e)),
            }
        } else {
            match stream.read(&mut chunk).await {
                Ok(0) => {
                    return Err(ExchangeError::Parse(ParserError::new(
                        "connection closed mid-request",
                        Bytes::new(),
                    )))
                }
                Ok(n) => buf.extend_from_slice(&chunk[..n]),
                Err(e) => return Err(ExchangeError::ClientIo(e)),
            }
        }
    }
}

async fn read_response(
    stream: &mut TcpStream,
    buf: &mut BytesMut,
    decoder: &mut ResponseDecoder,
    method: &Method,
) -> Result<HttpResponse, ExchangeError> {
    let mut chunk = [0u8; READ_CHUNK];
    loop {
        if let Some(response) = decoder.decode(buf, method)? {
            if decoder.take_truncated() {
                warn!("response body truncated at the length cap");
            }
            return Ok(response);
        }
        match timeout(UPSTREAM_READ_IDLE_TIMEOUT, stream.read(&mut chunk)).await {
            Ok(Ok(0)) => {
                if let Some(response) = decoder.notify_eof()? {
                    return Ok(response);
                }
                return Err(ExchangeError::Parse(ParserError::new(
                    "upstream closed before a complete response",
                    Bytes::new(),
                )));
            }
            Ok(Ok(n)) => buf.extend_from_slice(&chunk[..n]),
            Ok(Err(e)) => return Err(ExchangeError::UpstreamConnect(e)),
            Err(_) => return Err(ExchangeError::UpstreamTimeout),
        }
    }
}

async fn handle_connect(engine: &Arc<Engine>, mut client: TcpStream, request: HttpRequest, remote_address: &str) {
    let target = match resolve_connect_target(&request.target) {
        Ok(t) => t,
        Err(e) => {
            warn!("invalid CONNECT target \"{}\": {e}", request.target);
            send_synthetic_response(&mut client, 400, "Bad Request", request.head.version).await;
            return;
        }
    };

    let config = engine.config();
    if !config.host_filter.is_allowed(&target.host) {
        send_synthetic_response(&mut client, 403, "Forbidden", request.head.version).await;
        return;
    }

    let route = upstream::resolve_route(&config, &target);
    let upstream_conn = match upstream::connect(&route).await {
        Ok(stream) => stream,
        Err(err) => {
            if let Some((status, reason)) = err.synthesized_status() {
                send_synthetic_response(&mut client, status, reason, request.head.version).await;
            }
            engine.events().publish(ProxyEvent::Failed {
                request: Some(request),
                remote_address: remote_address.to_string(),
                kind: err.kind(),
                message: err.to_string(),
            });
            return;
        }
    };

    if client.write_all(b"HTTP/1.1 200 Connection Established\r\n\r\n").await.is_err() {
        return;
    }

    tunnel::pump(client, upstream_conn).await;
}

/// Runs one full HttpExchange cycle (spec steps 1-9) and reports whether the
/// client socket should stay open for another request.
async fn handle_http_exchange(
    engine: &Arc<Engine>,
    client: &mut TcpStream,
    mut request: HttpRequest,
    remote_address: &str,
) -> Result<bool, ()> {
    let timing = ExchangeTiming::start();
    let config = engine.config();
    let request_version = request.head.version;

    let host_port = match resolve_request_target(&request.target, &request.head.headers) {
        Ok(hp) => hp,
        Err(e) => {
            warn!("could not resolve request target \"{}\": {e}", request.target);
            send_synthetic_response(client, 400, "Bad Request", request_version).await;
            return Err(());
        }
    };

    // 1. host filter
    if !config.host_filter.is_allowed(&host_port.host) {
        send_synthetic_response(client, 403, "Forbidden", request_version).await;
        return Err(());
    }

    let rule = config.rewrites.find_match(&host_port.host, request_path(&request.target)).cloned();

    // 3. request rewrite
    if let Some(rule) = &rule {
        if let Some(replacement) = &rule.request_body {
            request.head.headers.remove("content-encoding");
            request.head.body = Some(Bytes::from(replacement.clone().into_bytes()));
        }
    }

    // 2. resolve upstream endpoint and connect
    let route = upstream::resolve_route(&config, &host_port);
    let mut upstream_conn = match upstream::connect(&route).await {
        Ok(stream) => stream,
        Err(err) => {
            fail_exchange(engine, client, Some(request), remote_address, request_version, err).await;
            return Err(());
        }
    };

    request.target = target_for_upstream(&request.target, &host_port, route.via_external_proxy);
    if let Some(auth) = &route.proxy_authorization {
        request.head.headers.set("proxy-authorization", auth.clone());
    }

    // 4. encode and forward the request
    let request_bytes = encode_request(&request);
    if let Err(e) = upstream_conn.write_all(&request_bytes).await {
        fail_exchange(engine, client, Some(request), remote_address, request_version, ExchangeError::UpstreamConnect(e)).await;
        return Err(());
    }

    // 5. decode the upstream response
    let mut upstream_buf = BytesMut::with_capacity(READ_CHUNK);
    let mut response_decoder = ResponseDecoder::new();
    let mut response = match read_response(&mut upstream_conn, &mut upstream_buf, &mut response_decoder, &request.method).await {
        Ok(r) => r,
        Err(err) => {
            fail_exchange(engine, client, Some(request), remote_address, request_version, err).await;
            return Err(());
        }
    };

    // 6. response rewrite
    if let Some(rule) = &rule {
        if let Some(replacement) = &rule.response_body {
            response.head.headers.remove("content-encoding");
            response.head.body = Some(Bytes::from(replacement.clone().into_bytes()));
        }
    }

    // 7. encode and emit the response
    let response_bytes = encode_response(&response);
    if let Err(e) = client.write_all(&response_bytes).await {
        warn!("failed writing response to client: {e}");
        return Err(());
    }

    let keep_alive = wants_keep_alive(request.head.version, &request.head.headers)
        && wants_keep_alive(response.head.version, &response.head.headers);

    // 8. publish the pair
    let id = engine.exchanges().allocate_id();
    let duration_ms = timing.elapsed_ms();
    let record = ExchangeRecord {
        id,
        request,
        response: Some(response),
        remote_address: remote_address.to_string(),
        duration_ms,
    };
    engine.exchanges().insert(record.clone());
    engine.events().publish(ProxyEvent::Completed(record));

    // 9. keep-alive
    Ok(keep_alive)
}

/// Synthesizes the appropriate error response (if the client hasn't already
/// received bytes for this exchange) and publishes a `Failed` event.
async fn fail_exchange(
    engine: &Arc<Engine>,
    client: &mut TcpStream,
    request: Option<HttpRequest>,
    remote_address: &str,
    version: Version,
    err: ExchangeError,
) {
    if let Some((status, reason)) = err.synthesized_status() {
        send_synthetic_response(client, status, reason, version).await;
    }
    engine.events().publish(ProxyEvent::Failed {
        request,
        remote_address: remote_address.to_string(),
        kind: err.kind(),
        message: err.to_string(),
    });
}

async fn handle_exchange_failure(
    engine: &Arc<Engine>,
    client: &mut TcpStream,
    request: Option<HttpRequest>,
    remote_address: &str,
    err: ExchangeError,
) {
    fail_exchange(engine, client, request, remote_address, Version::HTTP_11, err).await;
}

async fn send_synthetic_response(client: &mut TcpStream, status: u16, reason: &str, version: Version) {
    let mut response = HttpResponse::new(status, reason.to_string(), version);
    response.head.headers.set("connection", "close");
    let bytes = encode_response(&response);
    let _ = client.write_all(&bytes).await;
}

fn wants_keep_alive(version: Version, headers: &interceptor_http::HttpHeaders) -> bool {
    let tokens = headers.connection_tokens();
    if version == Version::HTTP_10 {
        tokens.iter().any(|t| t == "keep-alive")
    } else {
        !tokens.iter().any(|t| t == "close")
    }
}

/// The path (and query) a request-target refers to, stripping any
/// absolute-form scheme and authority.
fn request_path(target: &str) -> &str {
    for prefix in ["http://", "https://"] {
        if let Some(rest) = target.strip_prefix(prefix) {
            return match rest.find('/') {
                Some(idx) => &rest[idx..],
                None => "/",
            };
        }
    }
    target
}

/// Rewrites a request-target for the wire it is about to go out on: when
/// forwarding through an external proxy it must be absolute-form; otherwise
/// origin servers get plain origin-form.
fn target_for_upstream(original_target: &str, host_port: &interceptor_http::HostAndPort, via_external_proxy: bool) -> String {
    if via_external_proxy {
        if original_target.starts_with("http://") || original_target.starts_with("https://") {
            original_target.to_string()
        } else {
            let scheme = if host_port.tls { "https" } else { "http" };
            format!("{scheme}://{}:{}{}", host_port.host, host_port.port, original_target)
        }
    } else {
        request_path(original_target).to_string()
    }
}
