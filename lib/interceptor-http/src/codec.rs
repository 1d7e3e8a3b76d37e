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

//! Combines the line scanner, header scanner and body reader into an
//! incremental decoder and one-shot encoder for a whole HTTP/1.x message.

use bytes::{Bytes, BytesMut};
use http::{Method, Version};

use crate::body::BodyReader;
use crate::error::ParserError;
use crate::headers::HttpHeaders;
use crate::line::{self, HeaderScanner, LineScanner, DEFAULT_MAX_INITIAL_LINE_LENGTH};
use crate::message::{HttpRequest, HttpResponse, MessageHead};

pub fn version_str(v: Version) -> &'static str {
    if v == Version::HTTP_10 {
        "HTTP/1.0"
    } else {
        "HTTP/1.1"
    }
}

fn parse_version(bytes: &[u8]) -> Result<Version, ParserError> {
    match bytes {
        b"HTTP/1.0" => Ok(Version::HTTP_10),
        b"HTTP/1.1" => Ok(Version::HTTP_11),
        _ => Err(ParserError::new(
            "unsupported protocol version",
            Bytes::copy_from_slice(bytes),
        )),
    }
}

fn gzip_encode(data: &[u8]) -> Bytes {
    use flate2::{write::GzEncoder, Compression};
    use std::io::Write;

    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).expect("in-memory gzip write cannot fail");
    Bytes::from(encoder.finish().expect("in-memory gzip finish cannot fail"))
}

fn gzip_decode(data: &[u8]) -> Result<Bytes, ParserError> {
    use flate2::read::GzDecoder;
    use std::io::Read;

    let mut decoder = GzDecoder::new(data);
    let mut out = Vec::new();
    decoder
        .read_to_end(&mut out)
        .map_err(|_| ParserError::new("invalid gzip body", Bytes::copy_from_slice(data)))?;
    Ok(Bytes::from(out))
}

/// Encodes a fully-formed message head plus optional body into wire bytes,
/// applying the gzip-on-emit and Content-Length/Transfer-Encoding rules
/// shared by requests and responses.
fn serialize(initial_line: String, mut headers: HttpHeaders, body: Option<Bytes>) -> Bytes {
    let wants_gzip = headers.is_gzip_content();
    let body_bytes = match body {
        Some(b) if wants_gzip => gzip_encode(&b),
        Some(b) => b,
        None => Bytes::new(),
    };

    headers.remove("transfer-encoding");
    if !body_bytes.is_empty() {
        headers.set("content-length", body_bytes.len().to_string());
    }

    let mut out = BytesMut::with_capacity(initial_line.len() + 2 + body_bytes.len() + 256);
    out.extend_from_slice(initial_line.as_bytes());
    out.extend_from_slice(b"\r\n");
    headers.for_each(|name, value| {
        out.extend_from_slice(name.as_bytes());
        out.extend_from_slice(b": ");
        out.extend_from_slice(value.as_bytes());
        out.extend_from_slice(b"\r\n");
    });
    out.extend_from_slice(b"\r\n");
    out.extend_from_slice(&body_bytes);
    out.freeze()
}

pub fn encode_request(req: &HttpRequest) -> Bytes {
    let initial_line = format!("{} {} {}", req.method, req.target, version_str(req.head.version));
    serialize(initial_line, req.head.headers.clone(), req.head.body.clone())
}

pub fn encode_response(resp: &HttpResponse) -> Bytes {
    let initial_line = format!(
        "{} {} {}",
        version_str(resp.head.version),
        resp.status,
        resp.reason_phrase
    );
    serialize(initial_line, resp.head.headers.clone(), resp.head.body.clone())
}

#[derive(Debug, PartialEq, Eq)]
enum State {
    ReadInitial,
    ReadHeader,
    ReadBody,
    Done,
}

fn finish_head(head: &mut MessageHead, body_reader: &mut BodyReader) -> Result<(), ParserError> {
    let raw_body = body_reader.take_body();
    head.body = if head.headers.is_gzip_content() && !raw_body.is_empty() {
        Some(gzip_decode(&raw_body)?)
    } else if raw_body.is_empty() {
        None
    } else {
        Some(raw_body)
    };
    Ok(())
}

/// Decodes a stream of client requests, one per call cycle, resetting to
/// `ReadInitial` after each completed message so the same instance can be
/// reused across a keep-alive connection.
#[derive(Debug)]
pub struct RequestDecoder {
    state: State,
    line_scanner: LineScanner,
    header_scanner: HeaderScanner,
    max_initial_line_length: usize,
    pending: Option<HttpRequest>,
    body_reader: Option<BodyReader>,
    last_body_truncated: bool,
}

impl Default for RequestDecoder {
    fn default() -> Self {
        RequestDecoder::new()
    }
}

impl RequestDecoder {
    pub fn new() -> Self {
        RequestDecoder {
            state: State::ReadInitial,
            line_scanner: LineScanner::new(),
            header_scanner: HeaderScanner::new(),
            max_initial_line_length: DEFAULT_MAX_INITIAL_LINE_LENGTH,
            pending: None,
            body_reader: None,
            last_body_truncated: false,
        }
    }

    /// True between messages, i.e. no partial request has been buffered yet.
    /// Callers use this to decide whether a read timeout or EOF means "the
    /// connection is idle" versus "the peer died mid-request".
    pub fn is_idle(&self) -> bool {
        self.state == State::ReadInitial
    }

    /// Whether the most recently decoded request's body was truncated at the
    /// length cap. Clears on read.
    pub fn take_truncated(&mut self) -> bool {
        std::mem::take(&mut self.last_body_truncated)
    }

    pub fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<HttpRequest>, ParserError> {
        loop {
            match self.state {
                State::ReadInitial => {
                    self.line_scanner.reset();
                    self.header_scanner.reset();
                    let Some(initial) =
                        line::parse_initial_line(&mut self.line_scanner, buf, self.max_initial_line_length)?
                    else {
                        return Ok(None);
                    };
                    let version = parse_version(&initial.third)?;
                    let req = HttpRequest::new(&initial.first, &initial.second, version)?;
                    self.pending = Some(req);
                    self.state = State::ReadHeader;
                }
                State::ReadHeader => {
                    let pending = self.pending.as_mut().expect("ReadHeader implies pending request");
                    let headers = &mut pending.head.headers;
                    let complete = self.header_scanner.parse_header(buf, self.max_initial_line_length, |h| {
                        let name = String::from_utf8_lossy(&h.name).into_owned();
                        let value = String::from_utf8_lossy(&h.value).into_owned();
                        let _ = headers.append(&name.to_ascii_lowercase(), &name, value);
                    })?;
                    if !complete {
                        return Ok(None);
                    }
                    pending.head.content_length = headers.content_length().unwrap_or(-1);
                    self.body_reader = Some(BodyReader::for_message(headers, false, false));
                    self.state = State::ReadBody;
                }
                State::ReadBody => {
                    let body_reader = self.body_reader.as_mut().expect("ReadBody implies body_reader");
                    if !body_reader.feed(buf)? {
                        return Ok(None);
                    }
                    self.state = State::Done;
                }
                State::Done => {
                    let mut pending = self.pending.take().expect("Done implies pending request");
                    let mut body_reader = self.body_reader.take().expect("Done implies body_reader");
                    self.last_body_truncated = body_reader.truncated;
                    finish_head(&mut pending.head, &mut body_reader)?;
                    self.state = State::ReadInitial;
                    return Ok(Some(pending));
                }
            }
        }
    }
}

/// Decodes upstream responses. Unlike requests, whether a response carries a
/// body at all depends on the paired request's method (HEAD), so the method
/// is supplied per call rather than inferred from the wire bytes.
#[derive(Debug)]
pub struct ResponseDecoder {
    state: State,
    line_scanner: LineScanner,
    header_scanner: HeaderScanner,
    max_initial_line_length: usize,
    pending: Option<HttpResponse>,
    body_reader: Option<BodyReader>,
    last_body_truncated: bool,
}

impl Default for ResponseDecoder {
    fn default() -> Self {
        ResponseDecoder::new()
    }
}

impl ResponseDecoder {
    pub fn new() -> Self {
        ResponseDecoder {
            state: State::ReadInitial,
            line_scanner: LineScanner::new(),
            header_scanner: HeaderScanner::new(),
            max_initial_line_length: DEFAULT_MAX_INITIAL_LINE_LENGTH,
            pending: None,
            body_reader: None,
            last_body_truncated: false,
        }
    }

    /// True between messages, i.e. no partial response has been buffered yet.
    pub fn is_idle(&self) -> bool {
        self.state == State::ReadInitial
    }

    /// Whether the most recently decoded response's body was truncated at
    /// the length cap. Clears on read.
    pub fn take_truncated(&mut self) -> bool {
        std::mem::take(&mut self.last_body_truncated)
    }

    pub fn decode(&mut self, buf: &mut BytesMut, request_method: &Method) -> Result<Option<HttpResponse>, ParserError> {
        loop {
            match self.state {
                State::ReadInitial => {
                    self.line_scanner.reset();
                    self.header_scanner.reset();
                    let Some(initial) =
                        line::parse_initial_line(&mut self.line_scanner, buf, self.max_initial_line_length)?
                    else {
                        return Ok(None);
                    };
                    let version = parse_version(&initial.first)?;
                    let status = atoi::atoi::<u16>(&initial.second)
                        .ok_or_else(|| ParserError::new("invalid status code", initial.second.clone()))?;
                    let reason = String::from_utf8_lossy(&initial.third).into_owned();
                    self.pending = Some(HttpResponse::new(status, reason, version));
                    self.state = State::ReadHeader;
                }
                State::ReadHeader => {
                    let pending = self.pending.as_mut().expect("ReadHeader implies pending response");
                    let headers = &mut pending.head.headers;
                    let complete = self.header_scanner.parse_header(buf, self.max_initial_line_length, |h| {
                        let name = String::from_utf8_lossy(&h.name).into_owned();
                        let value = String::from_utf8_lossy(&h.value).into_owned();
                        let _ = headers.append(&name.to_ascii_lowercase(), &name, value);
                    })?;
                    if !complete {
                        return Ok(None);
                    }
                    pending.head.content_length = headers.content_length().unwrap_or(-1);
                    let no_body = pending.has_no_body_by_status() || *request_method == Method::HEAD;
                    self.body_reader = Some(BodyReader::for_message(headers, no_body, true));
                    self.state = State::ReadBody;
                }
                State::ReadBody => {
                    let body_reader = self.body_reader.as_mut().expect("ReadBody implies body_reader");
                    if !body_reader.feed(buf)? {
                        return Ok(None);
                    }
                    self.state = State::Done;
                }
                State::Done => {
                    let mut pending = self.pending.take().expect("Done implies pending response");
                    let mut body_reader = self.body_reader.take().expect("Done implies body_reader");
                    self.last_body_truncated = body_reader.truncated;
                    finish_head(&mut pending.head, &mut body_reader)?;
                    self.state = State::ReadInitial;
                    return Ok(Some(pending));
                }
            }
        }
    }

    /// Signals client-side EOF to a response currently reading an
    /// until-close body (no Content-Length, no chunking, HTTP/1.0 or absent
    /// framing headers).
    pub fn notify_eof(&mut self) -> Result<Option<HttpResponse>, ParserError> {
        if self.state != State::ReadBody {
            return Ok(None);
        }
        if let Some(body_reader) = self.body_reader.as_mut() {
            body_reader.close();
        }
        let mut empty = BytesMut::new();
        self.decode(&mut empty, &Method::GET)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_a_simple_get_request() {
        let mut decoder = RequestDecoder::new();
        let mut buf = BytesMut::from(&b"GET /hello HTTP/1.1\r\nHost: example.com\r\n\r\n"[..]);
        let req = decoder.decode(&mut buf).unwrap().unwrap();
        assert_eq!(req.method, Method::GET);
        assert_eq!(req.target, "/hello");
        assert_eq!(req.head.headers.get_first("host"), Some("example.com"));
        assert!(req.head.body.is_none());

        let encoded = encode_request(&req);
        assert!(encoded.starts_with(b"GET /hello HTTP/1.1\r\n"));
    }

    #[test]
    fn decoder_resets_to_read_initial_after_done() {
        let mut decoder = RequestDecoder::new();
        let mut buf = BytesMut::from(&b"GET / HTTP/1.1\r\n\r\nGET /two HTTP/1.1\r\n\r\n"[..]);
        let first = decoder.decode(&mut buf).unwrap().unwrap();
        assert_eq!(first.target, "/");
        let second = decoder.decode(&mut buf).unwrap().unwrap();
        assert_eq!(second.target, "/two");
    }

    #[test]
    fn chunked_wins_over_conflicting_content_length() {
        let mut decoder = RequestDecoder::new();
        let mut buf = BytesMut::from(
            &b"POST / HTTP/1.1\r\nContent-Length: 2\r\nTransfer-Encoding: chunked\r\n\r\n5\r\nhello\r\n0\r\n\r\n"[..],
        );
        let req = decoder.decode(&mut buf).unwrap().unwrap();
        assert_eq!(req.head.body.as_deref(), Some(&b"hello"[..]));
    }

    #[test]
    fn response_without_content_length_reads_until_eof() {
        let mut decoder = ResponseDecoder::new();
        let mut buf = BytesMut::from(&b"HTTP/1.0 200 OK\r\n\r\nhello world"[..]);
        assert!(decoder.decode(&mut buf, &Method::GET).unwrap().is_none());
        let resp = decoder.notify_eof().unwrap().unwrap();
        assert_eq!(resp.head.body.as_deref(), Some(&b"hello world"[..]));
    }

    #[test]
    fn gzip_content_encoding_is_transparently_decoded() {
        let mut resp = HttpResponse::new(200, "OK".to_string(), Version::HTTP_11);
        resp.head.headers.set("content-encoding", "gzip");
        resp.head.body = Some(Bytes::from_static(b"hello world"));
        let wire = encode_response(&resp);

        let mut decoder = ResponseDecoder::new();
        let mut buf = BytesMut::from(&wire[..]);
        let decoded = decoder.decode(&mut buf, &Method::GET).unwrap().unwrap();
        assert_eq!(decoded.head.body.as_deref(), Some(&b"hello world"[..]));
    }

    #[test]
    fn head_response_has_no_body_even_with_content_length() {
        let mut decoder = ResponseDecoder::new();
        let mut buf = BytesMut::from(&b"HTTP/1.1 200 OK\r\nContent-Length: 5\r\n\r\n"[..]);
        let resp = decoder.decode(&mut buf, &Method::HEAD).unwrap().unwrap();
        assert!(resp.head.body.is_none());
    }
}
