//! Error types for toolcast.
//!
//! [`EnvelopeError`] covers wire-format failures, [`ChannelError`] covers
//! both transports, and [`ConfigError`] covers config file loading. None of
//! these cross the public transport APIs: senders, receivers, and the
//! broadcaster log them and report `false` / `None` instead.

use std::path::PathBuf;

use thiserror::Error;

/// Envelope encoding / validation failures.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum EnvelopeError {
    /// Encoding the envelope to JSON failed.
    #[error("failed to serialize tool event: {0}")]
    Serialize(#[source] serde_json::Error),

    /// The envelope violates a structural invariant.
    #[error("invalid tool event: {0}")]
    Invalid(String),
}

/// Transport-level error for the fast path and the fallback path.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ChannelError {
    /// The low-latency channel is not attached or not open.
    #[error("not connected")]
    NotConnected,

    /// The low-latency channel rejected an outbound message.
    #[error("send failed: {0}")]
    SendFailed(String),

    /// The fallback request could not be performed (network, encoding).
    #[error("fallback request failed: {0}")]
    FallbackFailed(String),

    /// The fallback endpoint answered with a non-success status.
    #[error("fallback endpoint returned status {status}")]
    FallbackStatus {
        /// HTTP status code returned by the endpoint.
        status: u16,
    },
}

/// Configuration loading errors.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ConfigError {
    /// The config file exists but could not be read.
    #[error("failed to read config file {path}: {source}")]
    Read {
        /// Path that was read.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The config file is not valid JSON for [`crate::ToolcastConfig`].
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        /// Path that was parsed.
        path: PathBuf,
        /// Underlying JSON error.
        #[source]
        source: serde_json::Error,
    },
}
