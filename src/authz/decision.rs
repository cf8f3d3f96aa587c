//! Outcomes of an authorization decision

use serde::Serialize;
use thiserror::Error;

/// Message for 400 responses
pub const BAD_REQUEST: &str = "Bad request";
/// Message for 401 responses
pub const INVALID_TOKEN: &str = "Invalid authorization token";
/// Message for 403 responses
pub const FORBIDDEN: &str = "Forbidden";
/// Message for 500 responses
pub const INTERNAL_ERROR: &str = "Internal server error";
/// Access token past its expiration
pub const ACCESS_TOKEN_EXPIRED: &str = "Access token is expired";
/// Access token whose status is not `active`
pub const ACCESS_TOKEN_INACTIVE: &str = "Access token is not active";

/// A request the gateway refuses to forward
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Denial {
    /// Malformed request or credential format (400)
    #[error("{0}")]
    BadRequest(String),
    /// Credential invalid, expired, unknown or revoked by logout (401)
    #[error("{0}")]
    Unauthenticated(String),
    /// Authenticated, but not entitled to the requested organization (403)
    #[error("{0}")]
    Forbidden(String),
    /// Key, signing or Directory Service fault (500)
    #[error("{0}")]
    Internal(String),
}

impl Denial {
    /// 400 with the standard message
    #[must_use]
    pub fn bad_request() -> Self {
        Self::BadRequest(BAD_REQUEST.to_string())
    }

    /// 401 with the standard message
    #[must_use]
    pub fn invalid_token() -> Self {
        Self::Unauthenticated(INVALID_TOKEN.to_string())
    }

    /// 403 with the standard message
    #[must_use]
    pub fn forbidden() -> Self {
        Self::Forbidden(FORBIDDEN.to_string())
    }

    /// 500 with the standard message
    #[must_use]
    pub fn internal() -> Self {
        Self::Internal(INTERNAL_ERROR.to_string())
    }

    /// HTTP status code of the immediate response
    #[must_use]
    pub fn status_code(&self) -> u16 {
        match self {
            Self::BadRequest(_) => 400,
            Self::Unauthenticated(_) => 401,
            Self::Forbidden(_) => 403,
            Self::Internal(_) => 500,
        }
    }

    /// Body of the immediate response
    #[must_use]
    pub fn message(&self) -> &str {
        match self {
            Self::BadRequest(m) | Self::Unauthenticated(m) | Self::Forbidden(m) | Self::Internal(m) => m,
        }
    }
}

/// Kind of principal an internal token was minted for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PrincipalKind {
    /// Platform user with an identity token
    User,
    /// Administrative identity
    Admin,
    /// Personal access token
    AccessToken,
    /// Identity token on an unauthenticated route
    Unauthenticated,
}

/// Who a request was admitted as
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Principal {
    /// Principal kind
    pub kind: PrincipalKind,
    /// Platform user id, access token id, or identity subject
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    /// Organization scope
    #[serde(skip_serializing_if = "Option::is_none")]
    pub organization_id: Option<String>,
}

impl Principal {
    /// Principal with no identity
    #[must_use]
    pub fn unauthenticated() -> Self {
        Self {
            kind: PrincipalKind::Unauthenticated,
            subject: None,
            organization_id: None,
        }
    }
}

/// A request admitted with a freshly minted or cached internal token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Allowed {
    /// Internal token to inject
    pub token: String,
    /// Who the token represents
    pub principal: Principal,
}

/// Terminal outcome for one request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Forward with the internal token header set
    Allow(Allowed),
    /// No credential presented; forward without a token
    Anonymous,
    /// Cookie-exchange endpoint; forward untouched
    PassThrough,
    /// Short-circuit with an immediate error response
    Deny(Denial),
}

impl From<Result<Allowed, Denial>> for Decision {
    fn from(result: Result<Allowed, Denial>) -> Self {
        match result {
            Ok(allowed) => Self::Allow(allowed),
            Err(denial) => Self::Deny(denial),
        }
    }
}
