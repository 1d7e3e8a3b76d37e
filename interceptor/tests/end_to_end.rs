//! Connection-level scenarios driving `engine::connection::handle_connection`
//! directly against real sockets: a loopback listener standing in for the
//! client-facing accept loop, and another standing in for the upstream
//! origin. Routing through a configured external proxy (pointed at the mock
//! upstream) means the request's target host never has to resolve for real.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use interceptor::config::command::ConfigCommand;
use interceptor::config::persist::{ConfigStore, JsonFileConfigStore};
use interceptor::config::{Configuration, ExternalProxyConfig, RequestRewriteRule};
use interceptor::engine::connection::handle_connection;
use interceptor::engine::Engine;
use interceptor::ProxyEvent;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

async fn mock_upstream(response: &'static [u8]) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let mut buf = [0u8; 4096];
        // Read whatever the proxy already sent; a real origin would parse
        // the request, this one just cares that bytes arrived before replying.
        let _ = stream.read(&mut buf).await;
        stream.write_all(response).await.unwrap();
    });
    addr
}

/// Binds a free port, drops the listener, and hands back the now-unbound
/// address so a connect attempt against it fails fast with connection-refused.
async fn unreachable_addr() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

/// Like [`unreachable_addr`], but just the port: a stand-in for "a port
/// nothing is listening on yet" that the engine's own listener can then bind.
async fn free_port() -> u16 {
    unreachable_addr().await.port()
}

/// Accepts connections in a loop rather than just once, since an
/// in-flight-restart scenario drives more than one exchange through the same
/// mock origin.
async fn mock_upstream_loop(response: &'static [u8]) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((mut stream, _)) = listener.accept().await {
            tokio::spawn(async move {
                let mut buf = [0u8; 4096];
                let _ = stream.read(&mut buf).await;
                let _ = stream.write_all(response).await;
            });
        }
    });
    addr
}

/// Retries a connect against a listener that may not have bound yet.
async fn wait_for_connect(addr: SocketAddr) -> TcpStream {
    for _ in 0..100 {
        if let Ok(stream) = TcpStream::connect(addr).await {
            return stream;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("nothing ever listened on {addr}");
}

fn routed_through(upstream: SocketAddr) -> Configuration {
    let mut config = Configuration::default();
    config.external_proxy = ExternalProxyConfig {
        enabled: true,
        host: upstream.ip().to_string(),
        port: upstream.port(),
        username: None,
        password: None,
        bypass: vec![],
    };
    config
}

/// Drives one client-facing connection through `handle_connection` and
/// returns the bytes the client read back.
async fn run_exchange(config: Configuration, request: &[u8]) -> (Vec<u8>, tokio::sync::broadcast::Receiver<ProxyEvent>) {
    let (engine, events) = Engine::new(config);
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let proxy_addr = listener.local_addr().unwrap();

    let accepted = tokio::spawn(async move {
        let (stream, addr) = listener.accept().await.unwrap();
        handle_connection(engine, stream, addr).await;
    });

    let mut client = TcpStream::connect(proxy_addr).await.unwrap();
    client.write_all(request).await.unwrap();
    client.shutdown().await.unwrap();

    let mut response = Vec::new();
    client.read_to_end(&mut response).await.unwrap();
    accepted.await.unwrap();
    (response, events)
}

#[tokio::test]
async fn s1_straight_pass_through() {
    let upstream = mock_upstream(b"HTTP/1.1 200 OK\r\nContent-Length: 5\r\n\r\nhello").await;
    let config = routed_through(upstream);
    let (response, mut events) = run_exchange(config, b"GET /hello HTTP/1.1\r\nHost: example.com\r\nConnection: close\r\n\r\n").await;

    let text = String::from_utf8_lossy(&response);
    assert!(text.starts_with("HTTP/1.1 200 OK"));
    assert!(text.ends_with("hello"));

    match events.recv().await.unwrap() {
        ProxyEvent::Completed(record) => {
            assert_eq!(record.request.method.as_str(), "GET");
            assert_eq!(record.response.unwrap().status, 200);
        }
        other => panic!("expected Completed, got {other:?}"),
    }
}

#[tokio::test]
async fn s2_response_body_rewrite() {
    let upstream = mock_upstream(b"HTTP/1.1 200 OK\r\nContent-Length: 7\r\n\r\nIGNORED").await;
    let mut config = routed_through(upstream);
    config.rewrites.enabled = true;
    config.rewrites.rules.push(interceptor::config::RequestRewriteRule {
        enabled: true,
        domain: None,
        path_glob: "/api/*".to_string(),
        request_body: None,
        response_body: Some("{\"ok\":true}".to_string()),
    });

    let (response, _events) = run_exchange(config, b"GET /api/x HTTP/1.1\r\nHost: example.com\r\nConnection: close\r\n\r\n").await;
    let text = String::from_utf8_lossy(&response);
    assert!(text.contains("Content-Length: 11"));
    assert!(text.ends_with("{\"ok\":true}"));
}

#[tokio::test]
async fn s3_gzip_body_is_dropped_in_favor_of_the_rewrite() {
    use std::io::Write;

    let mut gz = Vec::new();
    {
        let mut encoder = flate2::write::GzEncoder::new(&mut gz, flate2::Compression::default());
        encoder.write_all(b"hello world").unwrap();
        encoder.finish().unwrap();
    }
    let mut upstream_response = format!(
        "HTTP/1.1 200 OK\r\nContent-Encoding: gzip\r\nContent-Length: {}\r\n\r\n",
        gz.len()
    )
    .into_bytes();
    upstream_response.extend_from_slice(&gz);
    let upstream_response: &'static [u8] = Box::leak(upstream_response.into_boxed_slice());

    let upstream = mock_upstream(upstream_response).await;
    let mut config = routed_through(upstream);
    config.rewrites.enabled = true;
    config.rewrites.rules.push(interceptor::config::RequestRewriteRule {
        enabled: true,
        domain: None,
        path_glob: "/*".to_string(),
        request_body: None,
        response_body: Some("bye".to_string()),
    });

    let (response, _events) = run_exchange(config, b"GET / HTTP/1.1\r\nHost: example.com\r\nConnection: close\r\n\r\n").await;
    let text = String::from_utf8_lossy(&response);
    assert!(text.contains("Content-Length: 3"));
    assert!(!text.to_ascii_lowercase().contains("content-encoding"));
    assert!(text.ends_with("bye"));
}

#[tokio::test]
async fn s4_connect_tunnel_pumps_bytes_both_ways() {
    let upstream_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let upstream_addr = upstream_listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (mut stream, _) = upstream_listener.accept().await.unwrap();
        let mut buf = [0u8; 64];
        let n = stream.read(&mut buf).await.unwrap();
        stream.write_all(&buf[..n]).await.unwrap();
    });

    let config = routed_through(upstream_addr);
    let (engine, _events) = Engine::new(config);
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let proxy_addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (stream, addr) = listener.accept().await.unwrap();
        handle_connection(engine, stream, addr).await;
    });

    let mut client = TcpStream::connect(proxy_addr).await.unwrap();
    client
        .write_all(b"CONNECT example.com:443 HTTP/1.1\r\n\r\n")
        .await
        .unwrap();

    const CONNECT_OK: &[u8] = b"HTTP/1.1 200 Connection Established\r\n\r\n";
    let mut head = vec![0u8; CONNECT_OK.len()];
    client.read_exact(&mut head).await.unwrap();
    assert_eq!(&head[..], CONNECT_OK);

    client.write_all(b"ping").await.unwrap();
    let mut echoed = [0u8; 4];
    client.read_exact(&mut echoed).await.unwrap();
    assert_eq!(&echoed, b"ping");
}

#[tokio::test]
async fn s5_malformed_request_gets_400() {
    let config = Configuration::default();
    let (response, mut events) = run_exchange(config, b"GET\r\n\r\n").await;
    let text = String::from_utf8_lossy(&response);
    assert!(text.starts_with("HTTP/1.1 400"));

    match events.recv().await.unwrap() {
        ProxyEvent::Failed { kind, .. } => assert_eq!(kind, "ParseError"),
        other => panic!("expected Failed, got {other:?}"),
    }
}

#[tokio::test]
async fn s6_upstream_unreachable_gets_502() {
    let dead = unreachable_addr().await;
    let config = routed_through(dead);
    let (response, mut events) = run_exchange(config, b"GET / HTTP/1.1\r\nHost: example.com\r\nConnection: close\r\n\r\n").await;
    let text = String::from_utf8_lossy(&response);
    assert!(text.starts_with("HTTP/1.1 502"));

    match events.recv().await.unwrap() {
        ProxyEvent::Failed { kind, .. } => assert_eq!(kind, "UpstreamConnectError"),
        other => panic!("expected Failed, got {other:?}"),
    }
}

async fn get_close(stream: &mut TcpStream) -> Vec<u8> {
    stream
        .write_all(b"GET / HTTP/1.1\r\nHost: example.com\r\nConnection: close\r\n\r\n")
        .await
        .unwrap();
    let mut response = Vec::new();
    stream.read_to_end(&mut response).await.unwrap();
    response
}

#[tokio::test]
async fn s7_listen_port_change_rebinds_without_dropping_in_flight_work() {
    let upstream = mock_upstream_loop(b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nok").await;
    let port_a = free_port().await;
    let port_b = free_port().await;
    let mut config = routed_through(upstream);
    config.listen_port = port_a;
    let (engine, _events) = Engine::new(config);

    let (shutdown_tx, shutdown_rx) = tokio::sync::broadcast::channel(1);
    let runner_engine = Arc::clone(&engine);
    let runner = tokio::spawn(async move { runner_engine.run(shutdown_rx).await });

    let addr_a: SocketAddr = ([127, 0, 0, 1], port_a).into();
    let addr_b: SocketAddr = ([127, 0, 0, 1], port_b).into();

    let mut first = wait_for_connect(addr_a).await;
    assert!(String::from_utf8_lossy(&get_close(&mut first).await).starts_with("HTTP/1.1 200 OK"));

    assert!(engine.apply_command(ConfigCommand::SetListenPort(port_b)).unwrap());

    // The accept loop only notices the new port on its next accept, so this
    // connection still lands on the old port and still completes normally.
    let mut nudge = wait_for_connect(addr_a).await;
    assert!(String::from_utf8_lossy(&get_close(&mut nudge).await).starts_with("HTTP/1.1 200 OK"));

    let mut second = wait_for_connect(addr_b).await;
    assert!(String::from_utf8_lossy(&get_close(&mut second).await).starts_with("HTTP/1.1 200 OK"));

    shutdown_tx.send(()).unwrap();
    runner.await.unwrap().unwrap();
}

#[tokio::test]
async fn s8_persisted_rewrite_rule_survives_a_simulated_restart() {
    let dir = std::env::temp_dir().join(format!("interceptor-e2e-state-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("state.json");

    let (engine, _events) = Engine::with_store(Configuration::default(), Box::new(JsonFileConfigStore::new(&path)));
    engine
        .apply_command(ConfigCommand::UpsertRule {
            index: None,
            rule: RequestRewriteRule::new("/api/*".to_string()),
        })
        .unwrap();
    drop(engine);

    // A fresh process would construct its store and engine the same way
    // `main` does, reading back whatever the previous process last saved.
    let reloaded = JsonFileConfigStore::new(&path).load().unwrap().expect("state file was written");
    assert_eq!(reloaded.rewrites.rules.len(), 1);
    assert_eq!(reloaded.rewrites.rules[0].path_glob, "/api/*");

    let (restarted, _events) = Engine::with_store(reloaded, Box::new(JsonFileConfigStore::new(&path)));
    assert_eq!(restarted.config().rewrites.rules.len(), 1);

    std::fs::remove_dir_all(&dir).ok();
}
