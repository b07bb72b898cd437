//! Shared utilities for integration testing.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use ferry::config::{AccessLogConfig, CacheConfig, Config, ListenConfig, SessionConfig};
use ferry::proxy::ProxyServer;
use ferry::services::access_log;
use ferry::WireCache;

static NEXT_LOG_ID: AtomicUsize = AtomicUsize::new(0);

/// A minimal HTTP/1.0 origin server: answers every request with a fixed
/// body and counts accepted connections.
pub struct MockOrigin {
    pub addr: SocketAddr,
    body: Vec<u8>,
    connections: Arc<AtomicUsize>,
}

impl MockOrigin {
    pub async fn start(body: Vec<u8>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let connections = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&connections);
        let served = Arc::new(body.clone());
        tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((mut socket, _)) => {
                        counter.fetch_add(1, Ordering::SeqCst);
                        let served = Arc::clone(&served);
                        tokio::spawn(async move {
                            let mut request = Vec::new();
                            let mut buf = [0u8; 4096];
                            loop {
                                let n = socket.read(&mut buf).await.unwrap_or(0);
                                if n == 0 {
                                    break;
                                }
                                request.extend_from_slice(&buf[..n]);
                                if request.windows(4).any(|w| w == b"\r\n\r\n") {
                                    break;
                                }
                            }
                            let _ = socket.write_all(&response_bytes(&served)).await;
                            let _ = socket.shutdown().await;
                        });
                    }
                    Err(_) => break,
                }
            }
        });

        Self {
            addr,
            body,
            connections,
        }
    }

    /// How many connections the origin has accepted so far.
    pub fn connection_count(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    /// The exact byte sequence this origin sends for every request.
    pub fn expected_response(&self) -> Vec<u8> {
        response_bytes(&self.body)
    }
}

fn response_bytes(body: &[u8]) -> Vec<u8> {
    let mut response = format!(
        "HTTP/1.0 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        body.len()
    )
    .into_bytes();
    response.extend_from_slice(body);
    response
}

/// A running proxy instance bound to an ephemeral port.
pub struct TestProxy {
    pub addr: SocketAddr,
    pub log_path: String,
    shutdown: watch::Sender<bool>,
    proxy_task: JoinHandle<()>,
    log_task: JoinHandle<()>,
}

pub async fn start_proxy() -> TestProxy {
    start_proxy_with_cache(CacheConfig {
        max_cache_bytes: 1_049_000,
        max_object_bytes: 102_400,
        slots: 16,
    })
    .await
}

pub async fn start_proxy_with_cache(cache_config: CacheConfig) -> TestProxy {
    let log_path = std::env::temp_dir()
        .join(format!(
            "ferry-e2e-{}-{}.log",
            std::process::id(),
            NEXT_LOG_ID.fetch_add(1, Ordering::SeqCst)
        ))
        .to_string_lossy()
        .into_owned();

    let config = Config {
        listen: ListenConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
        },
        cache: cache_config,
        session: SessionConfig {
            max_request_bytes: 102_400,
            connect_timeout: std::time::Duration::from_secs(5),
        },
        access_log: AccessLogConfig {
            path: log_path.clone(),
        },
    };

    let cache = Arc::new(WireCache::new(&config.cache));
    let (log_handle, log_writer) = access_log::channel(config.access_log.path.clone());
    let server = ProxyServer::bind(&config, cache, log_handle).await.unwrap();
    let addr = server.local_addr().unwrap();

    let (shutdown, _) = watch::channel(false);
    let log_task = tokio::spawn(log_writer.run(shutdown.subscribe()));
    let proxy_shutdown = shutdown.subscribe();
    let proxy_task = tokio::spawn(async move {
        let _ = server.run(proxy_shutdown).await;
    });

    TestProxy {
        addr,
        log_path,
        shutdown,
        proxy_task,
        log_task,
    }
}

impl TestProxy {
    /// Shut the proxy down and wait for the access log to be flushed.
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        let _ = self.proxy_task.await;
        let _ = self.log_task.await;
    }
}

/// Send one raw request through the proxy and collect the full response.
pub async fn roundtrip(proxy: SocketAddr, request: &[u8]) -> Vec<u8> {
    let mut stream = TcpStream::connect(proxy).await.unwrap();
    stream.write_all(request).await.unwrap();
    let mut response = Vec::new();
    stream.read_to_end(&mut response).await.unwrap();
    response
}
