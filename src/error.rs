// src/error.rs

use std::io;
use thiserror::Error;

/// Fetch failure categories, normalized from the transport layer.
///
/// Each category renders as a fixed [`io::ErrorKind`], the Rust-native
/// equivalent of the classic errno table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchError {
    /// Authentication failed or was refused
    Auth,
    /// Server refused the connection
    Refused,
    /// Resource does not exist on the server
    NotFound,
    /// Network is unreachable or name resolution failed
    Network,
    /// Protocol-level error in the server response
    Proto,
    /// Request timed out
    Timeout,
    /// Server-side failure (5xx)
    Server,
    /// Resource not modified since the given timestamp
    Unchanged,
    /// URL did not parse
    BadUrl,
}

impl FetchError {
    /// Map to the fixed [`io::ErrorKind`] table.
    pub fn errno_kind(self) -> io::ErrorKind {
        match self {
            FetchError::Auth => io::ErrorKind::PermissionDenied,
            FetchError::Refused => io::ErrorKind::ConnectionRefused,
            FetchError::NotFound => io::ErrorKind::NotFound,
            FetchError::Network => io::ErrorKind::NetworkUnreachable,
            FetchError::Proto => io::ErrorKind::InvalidData,
            FetchError::Timeout => io::ErrorKind::TimedOut,
            FetchError::Server => io::ErrorKind::Other,
            FetchError::Unchanged => io::ErrorKind::AlreadyExists,
            FetchError::BadUrl => io::ErrorKind::InvalidInput,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FetchError::Auth => "authentication failed",
            FetchError::Refused => "connection refused",
            FetchError::NotFound => "not found",
            FetchError::Network => "network unreachable",
            FetchError::Proto => "protocol error",
            FetchError::Timeout => "timed out",
            FetchError::Server => "server error",
            FetchError::Unchanged => "not modified",
            FetchError::BadUrl => "invalid URL",
        }
    }
}

impl std::fmt::Display for FetchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Core error types for Larder
#[derive(Error, Debug)]
pub enum Error {
    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Structural violation of the database binary layout or a schema parse
    #[error("bad database format: {0}")]
    BadFormat(String),

    /// URL does not parse
    #[error("bad URL: {0}")]
    BadUrl(String),

    /// Dependency expression failed to parse
    #[error("invalid dependency: {0}")]
    DepFormat(String),

    /// Incompatible version operators met during evaluation
    #[error("conflicting version constraints: {0}")]
    VersionConflict(String),

    /// Transport-layer failure, normalized
    #[error("fetch failed: {0}")]
    Fetch(FetchError),

    /// Managed root not found
    #[error("database not found at path: {0}")]
    DatabaseNotFound(String),

    /// Managed root initialization error
    #[error("failed to initialize database: {0}")]
    InitError(String),

    /// Another process holds the database lock
    #[error("database is locked: {0}")]
    Locked(String),
}

impl From<FetchError> for Error {
    fn from(e: FetchError) -> Self {
        Error::Fetch(e)
    }
}

/// Result type alias using Larder's Error type
pub type Result<T> = std::result::Result<T, Error>;
