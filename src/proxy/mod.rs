//! Forwarding proxy implementation
//!
//! This module provides the proxy data path:
//! - Accept loop and session dispatch
//! - Per-connection session state machine
//! - Request parsing and HTTP/1.0 rewriting
//! - Origin server connection establishment

pub mod server;
pub mod session;
pub mod translate;
pub mod upstream;

pub use server::ProxyServer;
pub use session::{Session, SessionContext};
pub use translate::ParsedRequest;
