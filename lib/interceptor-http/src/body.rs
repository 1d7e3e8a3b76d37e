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

//! Streaming body framing: chunked transfer, fixed content-length, and
//! read-until-close, each feeding an accumulating buffer.

use bytes::{Bytes, BytesMut};

use crate::error::ParserError;
use crate::headers::HttpHeaders;

/// Hard cap on a body read under "until close" or chunked framing. Exceeding
/// it truncates the body with a warning rather than failing the exchange.
pub const MAX_BODY_LENGTH: usize = 4_096_000;

#[derive(Debug)]
enum ChunkState {
    Size,
    Data(usize),
    TrailingCrlf,
    Trailer,
}

#[derive(Debug)]
enum Mode {
    Empty,
    Fixed { remaining: usize },
    UntilClose,
    Chunked(ChunkState),
}

/// Consumes body bytes under whichever framing the headers selected,
/// accumulating decoded payload until `done()`. Truncates (rather than
/// erroring) if a body exceeds [`MAX_BODY_LENGTH`] under the unbounded
/// framing modes.
#[derive(Debug)]
pub struct BodyReader {
    mode: Mode,
    body: BytesMut,
    done: bool,
    pub truncated: bool,
}

impl BodyReader {
    /// Chooses a framing mode from the already-parsed headers of a message.
    /// `is_response_without_body` covers 204/304/HEAD/1xx, which callers must
    /// determine from the paired request method and the status code.
    /// `fall_back_to_until_close` selects what happens when neither
    /// Transfer-Encoding nor Content-Length is present: responses read until
    /// the connection closes, while requests have no body at all.
    pub fn for_message(headers: &HttpHeaders, is_response_without_body: bool, fall_back_to_until_close: bool) -> Self {
        if is_response_without_body {
            return BodyReader::new(Mode::Empty);
        }
        if headers.is_chunked() {
            return BodyReader::new(Mode::Chunked(ChunkState::Size));
        }
        if let Some(len) = headers.content_length() {
            if len >= 0 {
                return BodyReader::new(Mode::Fixed {
                    remaining: len as usize,
                });
            }
        }
        if fall_back_to_until_close {
            BodyReader::new(Mode::UntilClose)
        } else {
            BodyReader::new(Mode::Empty)
        }
    }

    pub fn until_close() -> Self {
        BodyReader::new(Mode::UntilClose)
    }

    fn new(mode: Mode) -> Self {
        BodyReader {
            mode,
            body: BytesMut::new(),
            done: false,
            truncated: false,
        }
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Feeds newly available bytes out of `buf`, consuming as much as this
    /// mode needs. Returns `true` once the body is complete.
    pub fn feed(&mut self, buf: &mut BytesMut) -> Result<bool, ParserError> {
        if self.done {
            return Ok(true);
        }
        match &mut self.mode {
            Mode::Empty => {
                self.done = true;
            }
            Mode::Fixed { remaining } => {
                let take = (*remaining).min(buf.len());
                if take > 0 {
                    self.body.extend_from_slice(&buf.split_to(take));
                    *remaining -= take;
                }
                if *remaining == 0 {
                    self.done = true;
                }
            }
            Mode::UntilClose => {
                if !buf.is_empty() {
                    let room = MAX_BODY_LENGTH.saturating_sub(self.body.len());
                    let take = room.min(buf.len());
                    self.body.extend_from_slice(&buf.split_to(take));
                    if take < buf.len() {
                        self.truncated = true;
                        buf.clear();
                    }
                }
                if self.body.len() >= MAX_BODY_LENGTH {
                    self.truncated = true;
                    self.done = true;
                }
            }
            Mode::Chunked(_) => self.feed_chunked(buf)?,
        }
        Ok(self.done)
    }

    /// Signals EOF to an until-close body that hasn't already hit
    /// [`MAX_BODY_LENGTH`]; a no-op for framed modes, which already know
    /// when they are complete.
    pub fn close(&mut self) {
        if matches!(self.mode, Mode::UntilClose) {
            self.done = true;
        }
    }

    fn feed_chunked(&mut self, buf: &mut BytesMut) -> Result<(), ParserError> {
        loop {
            if self.body.len() >= MAX_BODY_LENGTH && !self.done {
                self.truncated = true;
            }
            let Mode::Chunked(state) = &mut self.mode else {
                unreachable!()
            };
            match state {
                ChunkState::Size => {
                    let Some(nl) = memchr::memchr(b'\n', buf) else {
                        return Ok(());
                    };
                    if nl == 0 || buf[nl - 1] != b'\r' {
                        return Err(ParserError::new(
                            "invalid chunk size line",
                            Bytes::copy_from_slice(&buf[..=nl]),
                        ));
                    }
                    let line = buf.split_to(nl + 1);
                    let size_token = &line[..line.len() - 2];
                    let size_token = match memchr::memchr(b';', size_token) {
                        Some(semi) => &size_token[..semi],
                        None => size_token,
                    };
                    let size_str = std::str::from_utf8(size_token)
                        .map_err(|_| ParserError::new("invalid chunk size", line.clone().freeze()))?;
                    let size = usize::from_str_radix(size_str.trim(), 16)
                        .map_err(|_| ParserError::new("invalid chunk size", line.freeze()))?;
                    *state = if size == 0 {
                        ChunkState::Trailer
                    } else {
                        ChunkState::Data(size)
                    };
                }
                ChunkState::Data(remaining) => {
                    let take = (*remaining).min(buf.len());
                    if take == 0 {
                        return Ok(());
                    }
                    if self.body.len() < MAX_BODY_LENGTH {
                        let room = MAX_BODY_LENGTH - self.body.len();
                        let keep = take.min(room);
                        self.body.extend_from_slice(&buf[..keep]);
                        if keep < take {
                            self.truncated = true;
                        }
                    } else {
                        self.truncated = true;
                    }
                    let _ = buf.split_to(take);
                    *remaining -= take;
                    if *remaining == 0 {
                        *state = ChunkState::TrailingCrlf;
                    }
                }
                ChunkState::TrailingCrlf => {
                    if buf.len() < 2 {
                        return Ok(());
                    }
                    if &buf[..2] != b"\r\n" {
                        return Err(ParserError::new(
                            "malformed chunk terminator",
                            Bytes::copy_from_slice(&buf[..2]),
                        ));
                    }
                    let _ = buf.split_to(2);
                    *state = ChunkState::Size;
                }
                ChunkState::Trailer => {
                    let Some(nl) = memchr::memchr(b'\n', buf) else {
                        return Ok(());
                    };
                    let line = buf.split_to(nl + 1);
                    if line.len() == 2 {
                        self.done = true;
                        return Ok(());
                    }
                    // otherwise this was a trailer header line; discarded per spec.
                }
            }
        }
    }

    /// Hands back everything accumulated so far, leaving the reader empty.
    pub fn take_body(&mut self) -> Bytes {
        self.body.split().freeze()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_length_completes_after_exact_byte_count() {
        let mut reader = BodyReader::new(Mode::Fixed { remaining: 5 });
        let mut buf = BytesMut::from(&b"hello world"[..]);
        assert!(reader.feed(&mut buf).unwrap());
        assert_eq!(reader.take_body(), Bytes::from_static(b"hello"));
        assert_eq!(&buf[..], b" world");
    }

    #[test]
    fn zero_chunk_with_no_prior_data_is_an_empty_done_body() {
        let mut reader = BodyReader::new(Mode::Chunked(ChunkState::Size));
        let mut buf = BytesMut::from(&b"0\r\n\r\n"[..]);
        assert!(reader.feed(&mut buf).unwrap());
        assert_eq!(reader.take_body(), Bytes::new());
    }

    #[test]
    fn chunked_body_reassembles_multiple_chunks() {
        let mut reader = BodyReader::new(Mode::Chunked(ChunkState::Size));
        let mut buf = BytesMut::from(&b"5\r\nhello\r\n6\r\n world\r\n0\r\n\r\n"[..]);
        assert!(reader.feed(&mut buf).unwrap());
        assert_eq!(reader.take_body(), Bytes::from_static(b"hello world"));
    }

    #[test]
    fn until_close_accumulates_until_explicit_close() {
        let mut reader = BodyReader::new(Mode::UntilClose);
        let mut buf = BytesMut::from(&b"partial"[..]);
        assert!(!reader.feed(&mut buf).unwrap());
        reader.close();
        assert!(reader.is_done());
        assert_eq!(reader.take_body(), Bytes::from_static(b"partial"));
    }

    #[test]
    fn until_close_truncates_past_the_cap_without_erroring() {
        let mut reader = BodyReader::new(Mode::UntilClose);
        let mut oversized = BytesMut::new();
        oversized.extend_from_slice(&vec![b'a'; MAX_BODY_LENGTH + 10]);
        assert!(reader.feed(&mut oversized).unwrap());
        assert!(reader.truncated);
        assert!(reader.is_done());
        assert_eq!(reader.body.len(), MAX_BODY_LENGTH);
    }

    #[test]
    fn mismatched_chunk_terminator_is_an_error() {
        let mut reader = BodyReader::new(Mode::Chunked(ChunkState::Size));
        let mut buf = BytesMut::from(&b"3\r\nabcXX"[..]);
        assert!(reader.feed(&mut buf).is_err());
    }
}
