//! Ferry - Caching Forward HTTP Proxy
//!
//! A forwarding HTTP/1.x proxy written in Rust.
//!
//! ## Features
//!
//! - Terminates client connections and relays requests to origin servers
//! - Rewrites outbound requests to HTTP/1.0 with proxy-controlled headers
//! - Bounded in-memory response cache shared across sessions
//! - One asynchronous task per connection, unbounded concurrency
//! - Append-only access log written by a background task

pub mod cache;
pub mod config;
pub mod error;
pub mod proxy;
pub mod services;

pub use cache::WireCache;
pub use config::Config;
pub use error::{FerryError, Result};
