use crate::error::{FerryError, Result};
use std::env;
use std::time::Duration;

/// Recommended cache byte budget, matching the classic proxy sizing.
pub const DEFAULT_MAX_CACHE_BYTES: usize = 1_049_000;
/// Largest response body the cache will admit.
pub const DEFAULT_MAX_OBJECT_BYTES: usize = 102_400;
/// Default number of cache slots.
pub const DEFAULT_CACHE_SLOTS: usize = 16;

/// Application configuration: the listening port comes from the CLI,
/// everything else from environment variables with defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// Listener configuration
    pub listen: ListenConfig,
    /// Wire cache sizing
    pub cache: CacheConfig,
    /// Per-session limits
    pub session: SessionConfig,
    /// Access log configuration
    pub access_log: AccessLogConfig,
}

#[derive(Debug, Clone)]
pub struct ListenConfig {
    /// Host to bind to (default: 0.0.0.0)
    pub host: String,
    /// Port to listen on for client connections
    pub port: u16,
}

#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Total live payload bytes the cache may hold
    pub max_cache_bytes: usize,
    /// Per-object admission cap in bytes
    pub max_object_bytes: usize,
    /// Number of slots in the circular store
    pub slots: usize,
}

#[derive(Debug, Clone, Copy)]
pub struct SessionConfig {
    /// Cap on accumulated request-header bytes before the request is
    /// rejected as malformed
    pub max_request_bytes: usize,
    /// Per-address upstream connect timeout
    pub connect_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct AccessLogConfig {
    /// Path of the append-only request log
    pub path: String,
}

impl Config {
    /// Build the configuration for the given listening port, applying
    /// environment overrides for everything else.
    pub fn load(port: u16) -> Result<Self> {
        let cache = CacheConfig {
            max_cache_bytes: parse_env("FERRY_CACHE_MAX_BYTES", DEFAULT_MAX_CACHE_BYTES)?,
            max_object_bytes: parse_env("FERRY_CACHE_MAX_OBJECT_BYTES", DEFAULT_MAX_OBJECT_BYTES)?,
            slots: parse_env("FERRY_CACHE_SLOTS", DEFAULT_CACHE_SLOTS)?,
        };
        if cache.slots == 0 {
            return Err(FerryError::InvalidConfig(
                "FERRY_CACHE_SLOTS must be at least 1".into(),
            ));
        }

        Ok(Config {
            listen: ListenConfig {
                host: get_env_or("FERRY_HOST", "0.0.0.0"),
                port,
            },
            cache,
            session: SessionConfig {
                max_request_bytes: parse_env("FERRY_MAX_REQUEST_BYTES", DEFAULT_MAX_OBJECT_BYTES)?,
                connect_timeout: Duration::from_secs(parse_env("FERRY_CONNECT_TIMEOUT", 10u64)?),
            },
            access_log: AccessLogConfig {
                path: get_env_or("FERRY_ACCESS_LOG", "log.txt"),
            },
        })
    }

    /// Get the listener bind address
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.listen.host, self.listen.port)
    }
}

/// Get an environment variable or a default value
fn get_env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Parse an environment variable, falling back to a default when unset.
/// A set-but-unparsable value is a configuration error, not a silent
/// fallback.
fn parse_env<T>(key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
{
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| FerryError::InvalidConfig(format!("{} must be a valid number", key))),
        Err(_) => Ok(default),
    }
}
