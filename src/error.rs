//! Unified error types for the probe server.

use std::net::SocketAddr;
use std::time::Duration;

use reqwest::StatusCode;
use thiserror::Error;

/// Unified error type for the probe server.
#[derive(Error, Debug)]
pub enum ServerError {
    /// Configuration loading error.
    #[error("configuration error: {0}")]
    Config(#[from] envy::Error),

    /// Configuration loaded but failed validation.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The listener could not be bound.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// Requested address.
        addr: SocketAddr,
        /// Underlying socket error.
        #[source]
        source: std::io::Error,
    },

    /// The serve task did not stop within the shutdown bound.
    #[error("server did not stop within {0:?}")]
    ShutdownTimeout(Duration),

    /// The serve task panicked or was cancelled.
    #[error("server task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    /// HTTP request error.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// A probe target could not be parsed or joined.
    #[error("invalid url: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// The probed endpoint answered with a different status.
    #[error("GET {url} returned {actual}, expected {expected}")]
    UnexpectedStatus {
        /// Requested URL.
        url: String,
        /// Status the caller required.
        expected: StatusCode,
        /// Status the server returned.
        actual: StatusCode,
    },

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenient Result type alias.
pub type Result<T> = std::result::Result<T, ServerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unexpected_status_message_names_both_codes() {
        let err = ServerError::UnexpectedStatus {
            url: "http://127.0.0.1:8080/".to_string(),
            expected: StatusCode::OK,
            actual: StatusCode::NOT_FOUND,
        };

        assert_eq!(
            err.to_string(),
            "GET http://127.0.0.1:8080/ returned 404 Not Found, expected 200 OK"
        );
    }
}
