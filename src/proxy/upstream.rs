//! Origin server connector
//!
//! Resolves a host/port pair and dials each candidate address in order,
//! returning the first connected socket. One pass, no retry.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::{lookup_host, TcpStream};
use tracing::{debug, instrument};

use crate::error::{FerryError, Result};

/// Connect to the origin at `host:port`.
///
/// Resolution failure maps to [`FerryError::UnknownHost`]; exhausting
/// every candidate address maps to [`FerryError::ConnectFailed`]. Each
/// attempt is bounded by `connect_timeout`.
#[instrument(skip(connect_timeout))]
pub async fn connect(host: &str, port: u16, connect_timeout: Duration) -> Result<TcpStream> {
    let addrs: Vec<SocketAddr> = lookup_host((host, port))
        .await
        .map_err(|e| FerryError::UnknownHost(format!("{}: {}", host, e)))?
        .collect();
    if addrs.is_empty() {
        return Err(FerryError::UnknownHost(host.to_string()));
    }

    let mut last_error = String::new();
    for addr in addrs {
        match tokio::time::timeout(connect_timeout, TcpStream::connect(addr)).await {
            Ok(Ok(stream)) => {
                debug!(%addr, "connected to origin");
                return Ok(stream);
            }
            Ok(Err(e)) => {
                debug!(%addr, "origin connect failed: {}", e);
                last_error = e.to_string();
            }
            Err(_) => {
                debug!(%addr, "origin connect timed out");
                last_error = "connect timed out".to_string();
            }
        }
    }

    Err(FerryError::ConnectFailed(format!(
        "{}:{}: {}",
        host, port, last_error
    )))
}
