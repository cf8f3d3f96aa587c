//! Internal token issuance
//!
//! Every token is RS512-signed, carries the signing key's `kid`, and lives
//! for a fixed TTL from issuance. Tokens are never renewed; the next request
//! mints a new one.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use jsonwebtoken::{Algorithm, Header};
use serde::{Deserialize, Serialize};

use super::KeyMaterial;
use crate::Result;
use crate::credential::ExternalClaims;
use crate::directory::{AccessTokenRecord, UserRecord};

/// `iss` claim of every internal token
pub const INTERNAL_ISSUER: &str = "Intel Geti";

/// How the caller authenticated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenSource {
    /// Interactive session backed by an identity token
    Browser,
    /// Personal access token
    Pat,
}

/// Claims of an internal token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InternalClaims {
    /// Platform user id, or access token id for API keys
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,
    /// Comma-joined organization id(s)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization_id: Option<String>,
    /// Display name
    #[serde(default)]
    pub preferred_username: String,
    /// Roles copied from the identity token
    #[serde(default)]
    pub roles: Vec<String>,
    /// Original identity token, passed through opaquely
    #[serde(default)]
    pub external_token: String,
    /// Authentication source
    pub source: TokenSource,
    /// Administrative principal
    pub is_internal: bool,
    /// Owning user of an access token
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_id: Option<String>,
    /// Issuer
    pub iss: String,
    /// Audience
    pub aud: String,
    /// Issued at
    pub iat: i64,
    /// Not before
    pub nbf: i64,
    /// Expiry
    pub exp: i64,
}

/// Who a session token is being minted for
struct SessionSubject<'a> {
    subject: Option<String>,
    organization_id: Option<String>,
    preferred_username: String,
    roles: &'a [String],
    external_token: &'a str,
    is_internal: bool,
}

/// Mints internal tokens
#[derive(Debug, Clone)]
pub struct TokenIssuer {
    keys: Arc<KeyMaterial>,
    ttl: Duration,
    audience: String,
}

impl TokenIssuer {
    /// Create an issuer signing with `keys`
    #[must_use]
    pub fn new(keys: Arc<KeyMaterial>, ttl: Duration, audience: impl Into<String>) -> Self {
        Self {
            keys,
            ttl,
            audience: audience.into(),
        }
    }

    /// `kid` stamped on minted tokens
    #[must_use]
    pub fn kid(&self) -> &str {
        self.keys.kid()
    }

    /// Token for a resolved platform user.
    ///
    /// # Errors
    ///
    /// Returns an error if signing fails.
    pub fn browser_token(
        &self,
        user: &UserRecord,
        claims: &ExternalClaims,
        external_token: &str,
    ) -> Result<String> {
        let preferred_username = claims
            .preferred_username
            .clone()
            .or_else(|| user.email.clone())
            .unwrap_or_else(|| user.external_id.clone());
        self.session_token(&SessionSubject {
            subject: Some(user.id.clone()),
            organization_id: Some(user.joined_organization_ids()).filter(|o| !o.is_empty()),
            preferred_username,
            roles: &claims.roles,
            external_token,
            is_internal: claims.is_internal,
        })
    }

    /// Token for an administrative identity.
    ///
    /// # Errors
    ///
    /// Returns an error if signing fails.
    pub fn admin_token(&self, claims: &ExternalClaims, external_token: &str) -> Result<String> {
        self.session_token(&SessionSubject {
            subject: claims.subject.clone(),
            organization_id: None,
            preferred_username: claims
                .preferred_username
                .clone()
                .or_else(|| claims.subject.clone())
                .unwrap_or_default(),
            roles: &claims.roles,
            external_token,
            is_internal: true,
        })
    }

    /// Token without subject or organization, for unauthenticated routes.
    ///
    /// # Errors
    ///
    /// Returns an error if signing fails.
    pub fn anonymous_token(&self, external_token: &str) -> Result<String> {
        self.session_token(&SessionSubject {
            subject: None,
            organization_id: None,
            preferred_username: String::new(),
            roles: &[],
            external_token,
            is_internal: false,
        })
    }

    /// Token for an API-key principal.
    ///
    /// # Errors
    ///
    /// Returns an error if signing fails.
    pub fn access_token(&self, record: &AccessTokenRecord) -> Result<String> {
        let (iat, exp) = self.window();
        self.sign(&InternalClaims {
            sub: Some(record.id.clone()),
            organization_id: record.organization_id.clone(),
            preferred_username: record.user_id.clone(),
            roles: Vec::new(),
            external_token: String::new(),
            source: TokenSource::Pat,
            is_internal: false,
            owner_id: Some(record.user_id.clone()),
            iss: INTERNAL_ISSUER.to_string(),
            aud: self.audience.clone(),
            iat,
            nbf: iat,
            exp,
        })
    }

    fn session_token(&self, subject: &SessionSubject<'_>) -> Result<String> {
        let (iat, exp) = self.window();
        self.sign(&InternalClaims {
            sub: subject.subject.clone(),
            organization_id: subject.organization_id.clone(),
            preferred_username: subject.preferred_username.clone(),
            roles: subject.roles.to_vec(),
            external_token: subject.external_token.to_string(),
            source: TokenSource::Browser,
            is_internal: subject.is_internal,
            owner_id: None,
            iss: INTERNAL_ISSUER.to_string(),
            aud: self.audience.clone(),
            iat,
            nbf: iat,
            exp,
        })
    }

    fn window(&self) -> (i64, i64) {
        let now = Utc::now().timestamp();
        let ttl = i64::try_from(self.ttl.as_secs()).unwrap_or(i64::MAX);
        (now, now.saturating_add(ttl))
    }

    fn sign(&self, claims: &InternalClaims) -> Result<String> {
        let mut header = Header::new(Algorithm::RS512);
        header.kid = Some(self.keys.kid().to_string());
        Ok(jsonwebtoken::encode(&header, claims, self.keys.encoding_key())?)
    }
}
