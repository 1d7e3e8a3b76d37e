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

//! Byte-level line scanning shared by request and response parsing.
//!
//! A "line" is the run of bytes up to the first CR LF. Scanners hold only a
//! scan cursor; the bytes themselves live in the caller's buffer and are
//! consumed (via `split_to`) once a full line has been recognized, so the
//! same scanner can be fed a buffer that grows across many `decode` calls.

use bytes::{Bytes, BytesMut};

use crate::error::ParserError;

/// Default cap for both the request/status line and the whole header block.
pub const DEFAULT_MAX_INITIAL_LINE_LENGTH: usize = 10_240;

/// Finds CRLF-terminated lines inside a buffer that may grow between calls.
#[derive(Debug, Default)]
pub struct LineScanner {
    scan_from: usize,
}

impl LineScanner {
    pub fn new() -> Self {
        LineScanner { scan_from: 0 }
    }

    /// Forget any partial progress. Must be called before starting a new
    /// message on the same connection.
    pub fn reset(&mut self) {
        self.scan_from = 0;
    }

    /// Returns the length (including the trailing CRLF) of the next full
    /// line in `buf`, or `None` if the buffer does not yet contain one.
    fn next_line_len(&mut self, buf: &[u8], max_size: usize) -> Result<Option<usize>, ParserError> {
        let search_from = self.scan_from.min(buf.len());
        match memchr::memchr(b'\n', &buf[search_from..]) {
            Some(rel) => {
                let nl = search_from + rel;
                self.scan_from = 0;
                if nl == 0 || buf[nl - 1] != b'\r' {
                    return Err(ParserError::new(
                        "parseLine error",
                        Bytes::copy_from_slice(&buf[..=nl]),
                    ));
                }
                if nl + 1 > max_size {
                    return Err(ParserError::new(
                        "parseLine error",
                        Bytes::copy_from_slice(&buf[..=nl]),
                    ));
                }
                Ok(Some(nl + 1))
            }
            None => {
                self.scan_from = buf.len();
                if buf.len() >= max_size {
                    Err(ParserError::new(
                        "parseLine error",
                        Bytes::copy_from_slice(buf),
                    ))
                } else {
                    Ok(None)
                }
            }
        }
    }
}

/// The three whitespace-delimited tokens of a request-line or status-line.
pub struct InitialLine {
    pub first: Bytes,
    pub second: Bytes,
    pub third: Bytes,
}

/// Consumes bytes up to the first CRLF within `max_size` and splits them into
/// three tokens on the first two ASCII spaces. Returns `None` if `buf` does
/// not yet hold a complete line.
pub fn parse_initial_line(
    scanner: &mut LineScanner,
    buf: &mut BytesMut,
    max_size: usize,
) -> Result<Option<InitialLine>, ParserError> {
    let Some(line_len) = scanner.next_line_len(buf, max_size)? else {
        return Ok(None);
    };
    let line = buf.split_to(line_len);
    let body = &line[..line_len - 2]; // strip CRLF

    let Some(sp1) = memchr::memchr(b' ', body) else {
        return Err(ParserError::new("parseLine error", line.freeze()));
    };
    let Some(sp2) = memchr::memchr(b' ', &body[sp1 + 1..]) else {
        return Err(ParserError::new("parseLine error", line.freeze()));
    };
    let sp2 = sp1 + 1 + sp2;

    let first = line.slice(0..sp1);
    let second = line.slice(sp1 + 1..sp2);
    let third = line.slice(sp2 + 1..line_len - 2);
    Ok(Some(InitialLine {
        first: first.freeze(),
        second: second.freeze(),
        third: third.freeze(),
    }))
}

/// A single decoded `name: value` header line.
pub struct HeaderLine {
    pub name: Bytes,
    pub value: Bytes,
}

/// Incrementally parses the header block following the initial line,
/// enforcing a cap on the total header region across repeated calls.
#[derive(Debug, Default)]
pub struct HeaderScanner {
    line: LineScanner,
    consumed: usize,
}

impl HeaderScanner {
    pub fn new() -> Self {
        HeaderScanner::default()
    }

    pub fn reset(&mut self) {
        self.line.reset();
        self.consumed = 0;
    }

    /// Pulls as many complete header lines out of `buf` as are available.
    /// Returns `true` once the terminating blank line has been consumed,
    /// `false` if more bytes are needed. Parsed lines are pushed one at a
    /// time through `on_header`.
    pub fn parse_header(
        &mut self,
        buf: &mut BytesMut,
        max_size: usize,
        mut on_header: impl FnMut(HeaderLine),
    ) -> Result<bool, ParserError> {
        loop {
            if self.consumed >= max_size {
                return Err(ParserError::new(
                    "header region too large",
                    Bytes::copy_from_slice(buf),
                ));
            }
            let remaining_budget = max_size - self.consumed;
            let Some(line_len) = self.line.next_line_len(buf, remaining_budget)? else {
                return Ok(false);
            };
            self.consumed += line_len;
            let line = buf.split_to(line_len);
            let body = &line[..line_len - 2];
            if body.is_empty() {
                return Ok(true);
            }
            match memchr::memmem::find(body, b": ") {
                Some(colon) => {
                    let name = line.slice(0..colon);
                    let value = line.slice(colon + 2..line_len - 2);
                    on_header(HeaderLine {
                        name: name.freeze(),
                        value: value.freeze(),
                    });
                }
                None => {
                    return Err(ParserError::new("parseLine error", line.freeze()));
                }
            }
        }
    }
}
