//! Per-client connection session
//!
//! Drives one client connection through its phases: read the full
//! request, translate it, serve from the cache or relay through the
//! origin, write the response back, close. Each session owns its
//! sockets and buffers outright; the only shared state is the cache
//! and the access-log handle.

use std::net::SocketAddr;
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, instrument};

use crate::cache::WireCache;
use crate::config::SessionConfig;
use crate::error::{FerryError, Result};
use crate::proxy::{translate, upstream};
use crate::services::access_log::AccessLog;

/// Shared collaborators handed to every session by the dispatcher.
pub struct SessionContext {
    pub cache: Arc<WireCache>,
    pub access_log: AccessLog,
    pub settings: SessionConfig,
}

/// Transfer phases, advancing forward only. The origin socket lives
/// inside the states that use it and is closed when ReadUpstream ends.
enum SessionState {
    ReadClient,
    WriteUpstream(TcpStream),
    ReadUpstream(TcpStream),
    WriteClient,
    Done,
}

/// One client connection in flight.
pub struct Session<C> {
    client: C,
    peer: SocketAddr,
    ctx: Arc<SessionContext>,
    raw_request: BytesMut,
    rewritten: Bytes,
    response: BytesMut,
    outgoing: Bytes,
    cache_key: Option<String>,
    client_bytes_read: usize,
    upstream_bytes_written: usize,
    upstream_bytes_read: usize,
    client_bytes_written: usize,
}

impl<C> Session<C>
where
    C: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(client: C, peer: SocketAddr, ctx: Arc<SessionContext>) -> Self {
        Self {
            client,
            peer,
            ctx,
            raw_request: BytesMut::with_capacity(1024),
            rewritten: Bytes::new(),
            response: BytesMut::new(),
            outgoing: Bytes::new(),
            cache_key: None,
            client_bytes_read: 0,
            upstream_bytes_written: 0,
            upstream_bytes_read: 0,
            client_bytes_written: 0,
        }
    }

    /// Run the session to completion. Any error tears down this session
    /// only; failures reaching the origin get a synthetic 502 first.
    #[instrument(skip(self), fields(peer = %self.peer))]
    pub async fn run(mut self) -> Result<()> {
        let mut state = SessionState::ReadClient;
        loop {
            state = match state {
                SessionState::ReadClient => match self.read_client().await {
                    Ok(next) => next,
                    Err(e) => {
                        if e.warrants_bad_gateway() {
                            self.send_bad_gateway().await;
                        }
                        return Err(e);
                    }
                },
                SessionState::WriteUpstream(upstream) => self.write_upstream(upstream).await?,
                SessionState::ReadUpstream(upstream) => self.read_upstream(upstream).await?,
                SessionState::WriteClient => self.write_client().await?,
                SessionState::Done => break,
            };
        }

        debug!(
            client_in = self.client_bytes_read,
            upstream_out = self.upstream_bytes_written,
            upstream_in = self.upstream_bytes_read,
            client_out = self.client_bytes_written,
            "session complete"
        );
        Ok(())
    }

    /// Accumulate the request until the blank line, then translate and
    /// route: cache hit short-circuits to WriteClient, a miss dials the
    /// origin. Malformed requests never reach upstream.
    async fn read_client(&mut self) -> Result<SessionState> {
        while translate::find_header_end(&self.raw_request).is_none() {
            if self.raw_request.len() > self.ctx.settings.max_request_bytes {
                return Err(FerryError::MalformedRequest(
                    "request headers exceed the size cap".into(),
                ));
            }
            let n = self.client.read_buf(&mut self.raw_request).await?;
            if n == 0 {
                return Err(FerryError::MalformedRequest(
                    "client closed before completing the request".into(),
                ));
            }
            self.client_bytes_read += n;
        }

        let parsed = translate::parse(&self.raw_request)?;
        self.ctx.access_log.record(&parsed.target);

        let key = parsed.canonical_key();
        if let Some(entry) = self.ctx.cache.lookup(&key) {
            debug!(key = %key, size = entry.size, "serving from cache");
            self.outgoing = entry.body.clone();
            return Ok(SessionState::WriteClient);
        }

        debug!(key = %key, "cache miss, dialing origin");
        let upstream = upstream::connect(
            &parsed.host,
            parsed.port(),
            self.ctx.settings.connect_timeout,
        )
        .await?;
        self.rewritten = parsed.rewrite();
        self.cache_key = Some(key);
        Ok(SessionState::WriteUpstream(upstream))
    }

    /// Send the rewritten request, resuming partial writes until done.
    async fn write_upstream(&mut self, mut upstream: TcpStream) -> Result<SessionState> {
        while self.upstream_bytes_written < self.rewritten.len() {
            let n = upstream
                .write(&self.rewritten[self.upstream_bytes_written..])
                .await?;
            if n == 0 {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::WriteZero,
                    "origin closed while receiving the request",
                )
                .into());
            }
            self.upstream_bytes_written += n;
        }
        upstream.flush().await?;
        Ok(SessionState::ReadUpstream(upstream))
    }

    /// Read the origin response to EOF (HTTP/1.0, the origin always
    /// closes), offer it to the cache, and release the origin socket.
    async fn read_upstream(&mut self, mut upstream: TcpStream) -> Result<SessionState> {
        loop {
            let n = upstream.read_buf(&mut self.response).await?;
            if n == 0 {
                break;
            }
            self.upstream_bytes_read += n;
        }
        drop(upstream);

        let body = self.response.split().freeze();
        if let Some(key) = self.cache_key.take() {
            // Admission rules live in the cache; rejection is a no-op.
            self.ctx.cache.insert(key, body.clone());
        }
        self.outgoing = body;
        Ok(SessionState::WriteClient)
    }

    /// Deliver the response verbatim, then close the client socket.
    async fn write_client(&mut self) -> Result<SessionState> {
        while self.client_bytes_written < self.outgoing.len() {
            let n = self
                .client
                .write(&self.outgoing[self.client_bytes_written..])
                .await?;
            if n == 0 {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::WriteZero,
                    "client closed while receiving the response",
                )
                .into());
            }
            self.client_bytes_written += n;
        }
        self.client.flush().await?;
        self.client.shutdown().await?;
        Ok(SessionState::Done)
    }

    /// Best-effort 502 when the origin was unreachable.
    async fn send_bad_gateway(&mut self) {
        if let Err(e) = self.client.write_all(bad_gateway_response().as_bytes()).await {
            debug!("failed to send 502 to client: {}", e);
        }
        let _ = self.client.shutdown().await;
    }
}

const BAD_GATEWAY_BODY: &str = "could not reach the origin server\n";

fn bad_gateway_response() -> String {
    format!(
        "HTTP/1.0 502 Bad Gateway\r\nContent-Type: text/plain\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        BAD_GATEWAY_BODY.len(),
        BAD_GATEWAY_BODY
    )
}
