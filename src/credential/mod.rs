//! Credential parsing: identity tokens and personal access tokens.

pub mod api_key;
pub mod base62;
pub mod bearer;

use thiserror::Error;

pub use api_key::{PersonalAccessToken, calculate_hash};
pub use bearer::{BearerToken, ExternalClaims};

/// Errors raised while parsing a credential
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CredentialError {
    /// `Authorization` header does not split into scheme and token
    #[error("malformed authorization header")]
    MalformedHeader,

    /// Identity token is not a decodable JWT
    #[error("malformed identity token: {0}")]
    MalformedToken(String),

    /// API key does not follow the `geti_pat_<random>_<checksum>` format
    #[error("malformed API key: {0}")]
    MalformedApiKey(&'static str),

    /// API key checksum does not match its random segment
    #[error("API key checksum mismatch")]
    ChecksumMismatch,
}
