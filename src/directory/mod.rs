//! Directory Service collaborator
//!
//! The gateway only reads users and personal access tokens, and pushes
//! login-time bookkeeping. Lookups sit behind two capability traits so the
//! authorization flow can run against in-memory fakes.

pub mod grpc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

pub use grpc::GrpcDirectoryClient;

/// Errors returned by the Directory Service
#[derive(Error, Debug)]
pub enum DirectoryError {
    /// The requested user or access token does not exist
    #[error("not found")]
    NotFound,

    /// Any other failure: transport, timeout, or server fault
    #[error("directory unavailable: {0}")]
    Unavailable(#[from] tonic::Status),
}

/// A resolved platform user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRecord {
    /// Platform user id
    pub id: String,
    /// Identity-provider subject
    pub external_id: String,
    /// Organizations the user belongs to
    pub organization_ids: Vec<String>,
    /// Contact address, used as a username fallback
    pub email: Option<String>,
    /// Most recent logout
    pub last_logout: Option<DateTime<Utc>>,
    /// Most recent login applied by the gateway
    pub current_login: Option<DateTime<Utc>>,
    /// Login before `current_login`
    pub previous_login: Option<DateTime<Utc>>,
}

impl UserRecord {
    /// Organization ids as carried in the internal token
    #[must_use]
    pub fn joined_organization_ids(&self) -> String {
        self.organization_ids.join(",")
    }

    /// Whether the user belongs to `organization_id`
    #[must_use]
    pub fn belongs_to(&self, organization_id: &str) -> bool {
        self.organization_ids.iter().any(|id| id == organization_id)
    }

    /// True when a token issued at `issued_at` predates the last logout.
    #[must_use]
    pub fn logged_out_since(&self, issued_at: i64) -> bool {
        self.last_logout
            .is_some_and(|logout| issued_at < logout.timestamp())
    }

    /// Whether a login at `auth_time` is newer than the recorded one.
    #[must_use]
    pub fn is_login_newer(&self, auth_time: i64) -> bool {
        self.current_login
            .is_none_or(|login| auth_time > login.timestamp())
    }

    /// Shift the login window forward to `auth_time`.
    #[must_use]
    pub fn with_login_at(&self, auth_time: DateTime<Utc>) -> Self {
        Self {
            previous_login: self.current_login,
            current_login: Some(auth_time),
            ..self.clone()
        }
    }
}

/// A resolved personal access token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessTokenRecord {
    /// Access token id
    pub id: String,
    /// Owning user id
    pub user_id: String,
    /// Organization the token is bound to
    pub organization_id: Option<String>,
    /// Expiration; a token without one is treated as expired
    pub expires_at: Option<DateTime<Utc>>,
    /// Lifecycle status, `active` when usable
    pub status: String,
}

impl AccessTokenRecord {
    /// Whether the token has expired at `now`
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_none_or(|expires| expires <= now)
    }

    /// Whether the token's status allows use
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.status.eq_ignore_ascii_case("active")
    }
}

/// User lookups and login bookkeeping
#[async_trait]
pub trait UserLookup: Send + Sync + 'static {
    /// Fetch a user by identity-provider subject (already URL-encoded)
    async fn user_by_external_id(&self, external_id: &str) -> Result<UserRecord, DirectoryError>;

    /// Persist the login window of `user`
    async fn update_login_time(&self, user: &UserRecord) -> Result<(), DirectoryError>;
}

/// Personal access token lookups
#[async_trait]
pub trait AccessTokenLookup: Send + Sync + 'static {
    /// Fetch an access token by its lookup hash
    async fn access_token_by_hash(&self, hash: &str) -> Result<AccessTokenRecord, DirectoryError>;
}
