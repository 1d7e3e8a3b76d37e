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

//! Process logging setup and the per-exchange log line emitted alongside
//! the UI event.

use log::{info, warn};

use crate::exchange::{ExchangeRecord, ProxyEvent};

/// Installs `env_logger` reading level from `RUST_LOG`, defaulting to
/// `info` when unset.
pub fn init() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
}

pub fn log_event(event: &ProxyEvent) {
    match event {
        ProxyEvent::Completed(record) => log_completed(record),
        ProxyEvent::Failed {
            request,
            remote_address,
            kind,
            message,
        } => {
            let target = request.as_ref().map(|r| r.target.as_str()).unwrap_or("-");
            warn!(
                "exchange failed kind={kind} remote={remote_address} target={target} reason={message}"
            );
        }
    }
}

fn log_completed(record: &ExchangeRecord) {
    let status = record.response.as_ref().map(|r| r.status).unwrap_or(0);
    info!(
        "exchange id={} method={} target={} status={} remote={} duration_ms={}",
        record.id.0, record.request.method, record.request.target, status, record.remote_address, record.duration_ms
    );
}
