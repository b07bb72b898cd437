//! Request parsing and rewriting
//!
//! Turns one raw absolute-form HTTP request into a [`ParsedRequest`] and
//! an origin-compatible HTTP/1.0 request. Parsing is non-destructive:
//! it borrows from the raw buffer and leaves it intact for logging.

use bytes::Bytes;

use crate::error::{FerryError, Result};

/// Fixed User-Agent injected into every rewritten request.
const USER_AGENT: &str =
    "Mozilla/5.0 (X11; Linux x86_64; rv:10.0.3) Gecko/20120305 Firefox/10.0.3";

/// Default origin port when the request target names none.
const DEFAULT_PORT: u16 = 80;

/// Headers the proxy strips and replaces with its own.
const STRIPPED_HEADERS: [&str; 3] = ["Connection", "Proxy-Connection", "User-Agent"];

/// A client request decomposed into its forwarding-relevant parts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedRequest {
    pub method: String,
    pub host: String,
    /// Port from the request target, `None` when unspecified
    pub port: Option<u16>,
    /// Path with the leading slash removed; empty means `/`
    pub path: String,
    /// All request headers in original order
    pub headers: Vec<(String, String)>,
    pub has_host_header: bool,
    /// The original request-line URL, kept verbatim for the access log
    pub target: String,
}

/// Locate the `\r\n\r\n` terminator; returns the offset where it starts.
pub fn find_header_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n")
}

fn malformed(reason: impl Into<String>) -> FerryError {
    FerryError::MalformedRequest(reason.into())
}

/// Parse one complete request (terminated by a blank line) from `raw`.
pub fn parse(raw: &[u8]) -> Result<ParsedRequest> {
    let end = find_header_end(raw).ok_or_else(|| malformed("missing blank-line terminator"))?;
    let head = std::str::from_utf8(&raw[..end])
        .map_err(|_| malformed("header section is not valid UTF-8"))?;

    let mut lines = head.split("\r\n");
    let request_line = lines.next().unwrap_or("");

    let mut tokens = request_line.split_whitespace();
    let method = tokens.next().ok_or_else(|| malformed("missing method token"))?;
    let target = tokens
        .next()
        .ok_or_else(|| malformed("missing request target"))?;
    let version = tokens
        .next()
        .ok_or_else(|| malformed("missing path/version separator"))?;
    if !version.starts_with("HTTP/") {
        return Err(malformed(format!("unrecognized version token: {}", version)));
    }

    let (host, port, path) = split_target(target)?;

    let mut headers = Vec::new();
    let mut has_host_header = false;
    for line in lines {
        if line.is_empty() {
            continue;
        }
        let (name, value) = line
            .split_once(':')
            .ok_or_else(|| malformed(format!("header line without a colon: {}", line)))?;
        if name.eq_ignore_ascii_case("Host") {
            has_host_header = true;
        }
        headers.push((name.to_string(), value.trim().to_string()));
    }

    Ok(ParsedRequest {
        method: method.to_string(),
        host,
        port,
        path,
        headers,
        has_host_header,
        target: target.to_string(),
    })
}

/// Split `http://host[:port]/path` into its parts.
fn split_target(target: &str) -> Result<(String, Option<u16>, String)> {
    let rest = target
        .strip_prefix("http://")
        .ok_or_else(|| malformed(format!("unsupported scheme in target: {}", target)))?;

    let (authority, path) = match rest.find('/') {
        Some(i) => (&rest[..i], &rest[i + 1..]),
        None => (rest, ""),
    };

    let (host, port) = match authority.rsplit_once(':') {
        Some((host, port)) => {
            let port = port
                .parse::<u16>()
                .map_err(|_| malformed(format!("invalid port in target: {}", target)))?;
            (host, Some(port))
        }
        None => (authority, None),
    };
    if host.is_empty() {
        return Err(malformed("empty host in target"));
    }

    Ok((host.to_string(), port, path.to_string()))
}

impl ParsedRequest {
    /// Origin port, defaulted when the target named none.
    pub fn port(&self) -> u16 {
        self.port.unwrap_or(DEFAULT_PORT)
    }

    /// Cache key: `host:port/path`.
    pub fn canonical_key(&self) -> String {
        format!("{}:{}/{}", self.host, self.port(), self.path)
    }

    /// Emit the rewritten origin-facing request.
    ///
    /// HTTP/1.0 with `Connection: close` forces a non-persistent origin
    /// connection, so the response ends at EOF. Ordering: request line,
    /// surviving headers in original order, synthesized Host when the
    /// client sent none, then the proxy's own three headers.
    pub fn rewrite(&self) -> Bytes {
        let mut out = String::with_capacity(128);
        out.push_str(&format!("{} /{} HTTP/1.0\r\n", self.method, self.path));
        for (name, value) in &self.headers {
            if STRIPPED_HEADERS.iter().any(|h| name.eq_ignore_ascii_case(h)) {
                continue;
            }
            out.push_str(name);
            out.push_str(": ");
            out.push_str(value);
            out.push_str("\r\n");
        }
        if !self.has_host_header {
            out.push_str("Host: ");
            out.push_str(&self.host);
            out.push_str("\r\n");
        }
        out.push_str("User-Agent: ");
        out.push_str(USER_AGENT);
        out.push_str("\r\n");
        out.push_str("Connection: close\r\n");
        out.push_str("Proxy-Connection: close\r\n");
        out.push_str("\r\n");
        Bytes::from(out)
    }
}
