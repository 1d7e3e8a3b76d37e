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

//! The request/response pair published to UI subscribers for each completed
//! (or failed) exchange, plus the table that owns both halves so the pair
//! can hold an index into each other instead of a literal cyclic reference.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use interceptor_http::{ExchangeId, HttpRequest, HttpResponse};
use tokio::sync::broadcast;

/// Bounded history kept for UI lookups after an event has already been
/// broadcast; independent of the broadcast channel's own lagging behavior.
const DEFAULT_TABLE_CAPACITY: usize = 4096;

/// Event channel capacity; a slow subscriber starts missing the oldest
/// events rather than stalling the exchange that publishes them.
pub const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone)]
pub struct ExchangeRecord {
    pub id: ExchangeId,
    pub request: HttpRequest,
    pub response: Option<HttpResponse>,
    pub remote_address: String,
    pub duration_ms: i64,
}

#[derive(Debug, Clone)]
pub enum ProxyEvent {
    Completed(ExchangeRecord),
    Failed {
        request: Option<HttpRequest>,
        remote_address: String,
        kind: &'static str,
        message: String,
    },
}

struct Inner {
    records: HashMap<u64, ExchangeRecord>,
    order: VecDeque<u64>,
}

/// Owns every exchange once it completes. A connection task allocates an id
/// up front (so the request and its eventual response can both carry it),
/// then inserts the finished record here when the pair is ready to publish.
pub struct ExchangeTable {
    next_id: AtomicU64,
    capacity: usize,
    inner: Mutex<Inner>,
}

impl ExchangeTable {
    pub fn new(capacity: usize) -> Self {
        ExchangeTable {
            next_id: AtomicU64::new(1),
            capacity,
            inner: Mutex::new(Inner {
                records: HashMap::new(),
                order: VecDeque::new(),
            }),
        }
    }

    pub fn allocate_id(&self) -> ExchangeId {
        ExchangeId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    pub fn insert(&self, record: ExchangeRecord) {
        let mut inner = self.inner.lock().expect("exchange table mutex poisoned");
        let id = record.id.0;
        inner.records.insert(id, record);
        inner.order.push_back(id);
        while inner.order.len() > self.capacity {
            if let Some(oldest) = inner.order.pop_front() {
                inner.records.remove(&oldest);
            }
        }
    }

    pub fn get(&self, id: ExchangeId) -> Option<ExchangeRecord> {
        self.inner.lock().expect("exchange table mutex poisoned").records.get(&id.0).cloned()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().expect("exchange table mutex poisoned").records.len()
    }
}

impl Default for ExchangeTable {
    fn default() -> Self {
        ExchangeTable::new(DEFAULT_TABLE_CAPACITY)
    }
}

/// Publishes completed exchanges to whichever UI subscriber is attached.
/// Cloned cheaply; every connection task gets its own handle.
#[derive(Clone)]
pub struct EventPublisher {
    sender: broadcast::Sender<ProxyEvent>,
}

impl EventPublisher {
    pub fn new(capacity: usize) -> (Self, broadcast::Receiver<ProxyEvent>) {
        let (sender, receiver) = broadcast::channel(capacity);
        (EventPublisher { sender }, receiver)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ProxyEvent> {
        self.sender.subscribe()
    }

    /// Drops the event silently if there is no subscriber; a slow
    /// subscriber drops its own oldest buffered events instead of ever
    /// blocking this call, since `send` never awaits.
    pub fn publish(&self, event: ProxyEvent) {
        let _ = self.sender.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::Version;
    use interceptor_http::HttpRequest;

    fn sample_request() -> HttpRequest {
        HttpRequest::new(b"GET", b"/", Version::HTTP_11).unwrap()
    }

    #[test]
    fn table_evicts_oldest_past_capacity() {
        let table = ExchangeTable::new(2);
        for _ in 0..3 {
            let id = table.allocate_id();
            table.insert(ExchangeRecord {
                id,
                request: sample_request(),
                response: None,
                remote_address: "127.0.0.1".to_string(),
                duration_ms: 1,
            });
        }
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn publish_without_subscribers_does_not_panic() {
        let (publisher, _receiver) = EventPublisher::new(8);
        drop(_receiver);
        publisher.publish(ProxyEvent::Failed {
            request: None,
            remote_address: "127.0.0.1".to_string(),
            kind: "ParseError",
            message: "boom".to_string(),
        });
    }

    #[tokio::test]
    async fn subscriber_receives_published_event() {
        let (publisher, mut receiver) = EventPublisher::new(8);
        publisher.publish(ProxyEvent::Failed {
            request: None,
            remote_address: "127.0.0.1".to_string(),
            kind: "ParseError",
            message: "boom".to_string(),
        });
        let event = receiver.recv().await.unwrap();
        assert!(matches!(event, ProxyEvent::Failed { kind: "ParseError", .. }));
    }
}
