use thiserror::Error;

/// Unified error type for the Ferry proxy
#[derive(Error, Debug)]
pub enum FerryError {
    // Request errors
    #[error("malformed request: {0}")]
    MalformedRequest(String),

    // Upstream errors
    #[error("unknown host: {0}")]
    UnknownHost(String),

    #[error("upstream connection failed: {0}")]
    ConnectFailed(String),

    // Configuration errors
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    // I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for Ferry operations
pub type Result<T> = std::result::Result<T, FerryError>;

impl FerryError {
    /// Whether the client should receive a synthetic 502 before teardown.
    ///
    /// True for failures reaching the origin; parse and socket errors
    /// close the client connection without a response.
    pub fn warrants_bad_gateway(&self) -> bool {
        matches!(
            self,
            FerryError::UnknownHost(_) | FerryError::ConnectFailed(_)
        )
    }

    /// Whether this error is confined to a single session.
    ///
    /// Everything except configuration errors is session-local; config
    /// errors only occur at startup and are fatal to the process.
    pub fn is_session_local(&self) -> bool {
        !matches!(self, FerryError::InvalidConfig(_))
    }
}
