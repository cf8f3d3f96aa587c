//! Error types for the edge authentication gateway

use std::io;

use thiserror::Error;

/// Result type alias for the gateway
pub type Result<T> = std::result::Result<T, Error>;

/// Gateway errors
///
/// These are process-level failures (startup, key handling, listeners).
/// Per-request outcomes are expressed as [`crate::authz::Denial`] instead.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Signing key material could not be loaded or parsed
    #[error("Key material error: {0}")]
    KeyMaterial(String),

    /// Token signing failed
    #[error("Signing error: {0}")]
    Signing(#[from] jsonwebtoken::errors::Error),

    /// gRPC transport error
    #[error("Transport error: {0}")]
    Transport(#[from] tonic::transport::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
