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

//! Interactive, intercepting HTTP/1.x proxy engine: configuration, the
//! per-connection state machine, and the exchange/event plumbing an
//! external UI observes and drives.

pub mod config;
pub mod engine;
pub mod error;
pub mod exchange;
pub mod export;
pub mod logging;
pub mod opts;
pub mod task;
pub mod upstream;

pub use config::Configuration;
pub use engine::Engine;
pub use error::ExchangeError;
pub use exchange::{ExchangeRecord, ProxyEvent};
