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

//! HTTP/1.x wire codec used by the proxy engine: line scanning, header
//! storage, body framing, the message model, host/port resolution and the
//! request/response codecs built on top of them.

pub mod body;
pub mod codec;
pub mod error;
pub mod headers;
pub mod hostport;
pub mod line;
pub mod message;

pub use body::BodyReader;
pub use codec::{encode_request, encode_response, version_str, RequestDecoder, ResponseDecoder};
pub use error::{HostPortError, ParserError};
pub use headers::{HeaderFieldValue, HttpHeaders};
pub use hostport::{resolve_connect_target, resolve_request_target, HostAndPort};
pub use line::{HeaderScanner, InitialLine, LineScanner, DEFAULT_MAX_INITIAL_LINE_LENGTH};
pub use message::{ExchangeId, HttpMessage, HttpRequest, HttpResponse, MessageHead};
