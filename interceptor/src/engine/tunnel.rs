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

//! The bidirectional byte pump used once a CONNECT tunnel is established.

use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::time::timeout;

/// Bound on how long the engine waits for the non-EOF side to drain after
/// the other side has already closed.
pub const TUNNEL_DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Copies bytes in both directions until one side reaches EOF, half-closes
/// the opposite direction, and gives the other copy loop a bounded window to
/// drain before abandoning it.
pub async fn pump(client: TcpStream, upstream: TcpStream) {
    let (mut client_r, mut client_w) = client.into_split();
    let (mut upstream_r, mut upstream_w) = upstream.into_split();

    let mut client_to_upstream = tokio::spawn(async move {
        let _ = tokio::io::copy(&mut client_r, &mut upstream_w).await;
        let _ = upstream_w.shutdown().await;
    });
    let mut upstream_to_client = tokio::spawn(async move {
        let _ = tokio::io::copy(&mut upstream_r, &mut client_w).await;
        let _ = client_w.shutdown().await;
    });

    tokio::select! {
        _ = &mut client_to_upstream => {
            if timeout(TUNNEL_DRAIN_TIMEOUT, &mut upstream_to_client).await.is_err() {
                upstream_to_client.abort();
            }
        }
        _ = &mut upstream_to_client => {
            if timeout(TUNNEL_DRAIN_TIMEOUT, &mut client_to_upstream).await.is_err() {
                client_to_upstream.abort();
            }
        }
    }
}
