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

//! Per-exchange timing marks, captured the way a forwarding task tracks its
//! own duration for the record published to subscribers.

use std::time::Instant;

#[derive(Debug, Clone, Copy)]
pub struct ExchangeTiming {
    start: Instant,
}

impl ExchangeTiming {
    pub fn start() -> Self {
        ExchangeTiming { start: Instant::now() }
    }

    pub fn elapsed_ms(&self) -> i64 {
        self.start.elapsed().as_millis() as i64
    }
}
