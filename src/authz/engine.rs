//! Per-request authorization state machine
//!
//! ```text
//! Start -- no :path ------------------------------> Deny(400)
//!       -- cookie-exchange path ------------------> PassThrough
//!       -- Authorization --> BearerPath
//!       -- X-API-Key -----> ApiKeyPath
//!       -- neither -------------------------------> Anonymous
//!
//! BearerPath -- unparseable ----------------------> Deny(500)
//!            -- unauthenticated route ------------> Allow(anonymous token)
//!            -- single tenant / external issuer --> ExternalUserFlow
//!            -- internal issuer ------------------> AdminFlow
//!            -- unknown issuer -------------------> Deny(401)
//! ```
//!
//! Nothing survives between requests except what the identity cache holds.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use super::audit::{self, AuditEvent};
use super::decision::{
    ACCESS_TOKEN_EXPIRED, ACCESS_TOKEN_INACTIVE, Allowed, Decision, Denial, INVALID_TOKEN,
    Principal, PrincipalKind,
};
use super::request::AuthRequest;
use crate::cache::{CachedAccessToken, CachedUser, IdentityCache};
use crate::config::{IssuersConfig, RoutesConfig};
use crate::credential::{BearerToken, PersonalAccessToken};
use crate::directory::{
    AccessTokenLookup, AccessTokenRecord, DirectoryError, UserLookup, UserRecord,
};
use crate::token::TokenIssuer;

/// Decides, for each request, whether and as whom it is admitted
pub struct AuthorizationEngine {
    users: Arc<dyn UserLookup>,
    access_tokens: Arc<dyn AccessTokenLookup>,
    cache: Arc<IdentityCache>,
    issuer: TokenIssuer,
    issuers: IssuersConfig,
    routes: RoutesConfig,
}

impl AuthorizationEngine {
    /// Wire the engine to its collaborators
    #[must_use]
    pub fn new(
        users: Arc<dyn UserLookup>,
        access_tokens: Arc<dyn AccessTokenLookup>,
        cache: Arc<IdentityCache>,
        issuer: TokenIssuer,
        issuers: IssuersConfig,
        routes: RoutesConfig,
    ) -> Self {
        Self {
            users,
            access_tokens,
            cache,
            issuer,
            issuers,
            routes,
        }
    }

    /// Identity cache shared with the HTTP surface
    #[must_use]
    pub fn cache(&self) -> &Arc<IdentityCache> {
        &self.cache
    }

    /// Decide one request and record the outcome in the audit log.
    pub async fn authorize(&self, request: &AuthRequest) -> Decision {
        let decision = self.decide(request).await;
        audit::emit(&AuditEvent::for_decision(request.path.as_deref(), &decision));
        decision
    }

    async fn decide(&self, request: &AuthRequest) -> Decision {
        let Some(path) = request.path.as_deref() else {
            return Decision::Deny(Denial::bad_request());
        };

        if path == self.routes.cookie_exchange {
            return Decision::PassThrough;
        }

        if let Some(header) = request.authorization.as_deref() {
            return self.bearer(request, path, header).await.into();
        }

        if let Some(key) = request.api_key.as_deref() {
            return self.api_key(request, key).await.into();
        }

        Decision::Anonymous
    }

    async fn bearer(
        &self,
        request: &AuthRequest,
        path: &str,
        header: &str,
    ) -> Result<Allowed, Denial> {
        let bearer = BearerToken::from_header(header).map_err(|e| {
            warn!(error = %e, "Identity token could not be parsed");
            Denial::internal()
        })?;

        if self.routes.unauthenticated.iter().any(|route| route == path) {
            let token = self
                .issuer
                .anonymous_token(bearer.raw())
                .map_err(signing_failed)?;
            return Ok(Allowed {
                token,
                principal: Principal::unauthenticated(),
            });
        }

        if self.issuers.is_single_tenant() {
            return self.external_user(request, &bearer).await;
        }

        let claims = bearer.claims();
        let matches = |pair: &Option<crate::config::IssuerPair>| {
            pair.as_ref()
                .is_some_and(|p| claims.matches(&p.issuer, &p.audience))
        };

        if matches(&self.issuers.internal) {
            self.admin(&bearer)
        } else if matches(&self.issuers.external) {
            self.external_user(request, &bearer).await
        } else {
            debug!(issuer = ?claims.issuer, "Identity token from unknown issuer");
            Err(Denial::invalid_token())
        }
    }

    fn admin(&self, bearer: &BearerToken) -> Result<Allowed, Denial> {
        let claims = bearer.claims();
        let missing: Vec<&str> = self
            .issuers
            .required_roles
            .iter()
            .filter(|role| !claims.roles.contains(role))
            .map(String::as_str)
            .collect();
        if !missing.is_empty() {
            debug!(missing = ?missing, "Administrative token lacks required roles");
            return Err(Denial::invalid_token());
        }

        let token = self
            .issuer
            .admin_token(claims, bearer.raw())
            .map_err(signing_failed)?;
        Ok(Allowed {
            token,
            principal: Principal {
                kind: PrincipalKind::Admin,
                subject: claims.subject.clone(),
                organization_id: None,
            },
        })
    }

    async fn external_user(
        &self,
        request: &AuthRequest,
        bearer: &BearerToken,
    ) -> Result<Allowed, Denial> {
        let claims = bearer.claims();
        let Some(subject) = claims.subject.as_deref() else {
            debug!("Identity token has no subject");
            return Err(Denial::invalid_token());
        };

        if let Some(cached) = self.cache.user(subject, claims.auth_time) {
            check_user(&cached.record, claims.login_time(), request.organization_id())?;
            return Ok(user_allowed(&cached.record, cached.token.clone()));
        }

        let external_id: String = url::form_urlencoded::byte_serialize(subject.as_bytes()).collect();
        let mut user = match self.users.user_by_external_id(&external_id).await {
            Ok(user) => user,
            Err(DirectoryError::NotFound) => {
                debug!("No platform user for identity subject");
                return Err(Denial::invalid_token());
            }
            Err(DirectoryError::Unavailable(status)) => {
                warn!(code = ?status.code(), error = %status.message(), "User lookup failed");
                return Err(Denial::internal());
            }
        };

        check_user(&user, claims.login_time(), request.organization_id())?;

        if let Some(login) = claims
            .auth_time
            .filter(|t| user.is_login_newer(*t))
            .and_then(|t| DateTime::from_timestamp(t, 0))
        {
            user = user.with_login_at(login);
            if let Err(e) = self.users.update_login_time(&user).await {
                warn!(user_id = %user.id, error = %e, "Failed to record login time");
            }
        }

        let token = self
            .issuer
            .browser_token(&user, claims, bearer.raw())
            .map_err(signing_failed)?;
        let allowed = user_allowed(&user, token.clone());
        self.cache.insert_user(subject, CachedUser { record: user, token });
        Ok(allowed)
    }

    async fn api_key(&self, request: &AuthRequest, key: &str) -> Result<Allowed, Denial> {
        let pat = PersonalAccessToken::parse(key).map_err(|e| {
            debug!(error = %e, "Malformed API key");
            Denial::bad_request()
        })?;
        pat.verify_checksum().map_err(|e| {
            debug!(error = %e, "Rejected API key");
            Denial::invalid_token()
        })?;

        let hash = pat.hash();
        let now = Utc::now();

        if let Some(cached) = self.cache.access_token(&hash) {
            return match cached.as_ref() {
                CachedAccessToken::Rejected { message } => {
                    Err(Denial::Unauthenticated(message.clone()))
                }
                CachedAccessToken::Resolved { record, token } => {
                    check_access_token(record, now)?;
                    check_access_token_scope(record, request.organization_id())?;
                    Ok(access_token_allowed(record, token.clone()))
                }
            };
        }

        let record = match self.access_tokens.access_token_by_hash(&hash).await {
            Ok(record) => record,
            Err(DirectoryError::NotFound) => {
                debug!("Unknown API key");
                return Err(self.reject_access_token(&hash, Denial::invalid_token()));
            }
            Err(DirectoryError::Unavailable(status)) => {
                warn!(code = ?status.code(), error = %status.message(), "Access token lookup failed");
                return Err(Denial::internal());
            }
        };

        if let Err(denial) = check_access_token(&record, now) {
            return Err(self.reject_access_token(&hash, denial));
        }

        let token = self
            .issuer
            .access_token(&record)
            .map_err(signing_failed)?;
        self.cache.insert_access_token(
            &hash,
            CachedAccessToken::Resolved {
                record: record.clone(),
                token: token.clone(),
            },
        );

        check_access_token_scope(&record, request.organization_id())?;
        Ok(access_token_allowed(&record, token))
    }

    fn reject_access_token(&self, hash: &str, denial: Denial) -> Denial {
        self.cache.insert_access_token(
            hash,
            CachedAccessToken::Rejected {
                message: denial.message().to_string(),
            },
        );
        denial
    }
}

fn signing_failed(e: crate::Error) -> Denial {
    warn!(error = %e, "Failed to sign internal token");
    Denial::internal()
}

/// Logout and organization checks, applied to cached and fresh records alike.
fn check_user(
    user: &UserRecord,
    login_time: Option<i64>,
    path_organization: Option<&str>,
) -> Result<(), Denial> {
    let logged_out = match login_time {
        Some(issued_at) => user.logged_out_since(issued_at),
        None => user.last_logout.is_some(),
    };
    if logged_out {
        debug!(user_id = %user.id, "Identity token predates logout");
        return Err(Denial::invalid_token());
    }

    if let Some(organization) = path_organization {
        if !user.belongs_to(organization) {
            debug!(user_id = %user.id, organization = %organization, "User outside requested organization");
            return Err(Denial::forbidden());
        }
    }
    Ok(())
}

/// Checks that do not depend on the request path; failures are cacheable.
fn check_access_token(record: &AccessTokenRecord, now: DateTime<Utc>) -> Result<(), Denial> {
    if record.is_expired(now) {
        return Err(Denial::Unauthenticated(ACCESS_TOKEN_EXPIRED.to_string()));
    }
    if !record.is_active() {
        return Err(Denial::Unauthenticated(ACCESS_TOKEN_INACTIVE.to_string()));
    }
    if record.organization_id.is_none() {
        return Err(Denial::Unauthenticated(INVALID_TOKEN.to_string()));
    }
    Ok(())
}

fn check_access_token_scope(
    record: &AccessTokenRecord,
    path_organization: Option<&str>,
) -> Result<(), Denial> {
    match path_organization {
        Some(organization) if record.organization_id.as_deref() != Some(organization) => {
            debug!(token_id = %record.id, organization = %organization, "Access token outside requested organization");
            Err(Denial::invalid_token())
        }
        _ => Ok(()),
    }
}

fn user_allowed(user: &UserRecord, token: String) -> Allowed {
    Allowed {
        token,
        principal: Principal {
            kind: PrincipalKind::User,
            subject: Some(user.id.clone()),
            organization_id: Some(user.joined_organization_ids()).filter(|o| !o.is_empty()),
        },
    }
}

fn access_token_allowed(record: &AccessTokenRecord, token: String) -> Allowed {
    Allowed {
        token,
        principal: Principal {
            kind: PrincipalKind::AccessToken,
            subject: Some(record.id.clone()),
            organization_id: record.organization_id.clone(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(secs: i64) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(secs, 0)
    }

    fn user() -> UserRecord {
        UserRecord {
            id: "u-1".into(),
            external_id: "ext-1".into(),
            organization_ids: vec!["org-a".into()],
            email: None,
            last_logout: at(50),
            current_login: at(100),
            previous_login: None,
        }
    }

    fn record(expires_in: i64) -> AccessTokenRecord {
        AccessTokenRecord {
            id: "pat-1".into(),
            user_id: "u-1".into(),
            organization_id: Some("org-a".into()),
            expires_at: Some(Utc::now() + chrono::Duration::seconds(expires_in)),
            status: "active".into(),
        }
    }

    #[test]
    fn user_check_rejects_logged_out_tokens() {
        assert_eq!(check_user(&user(), Some(49), None), Err(Denial::invalid_token()));
        assert_eq!(check_user(&user(), None, None), Err(Denial::invalid_token()));
        assert_eq!(check_user(&user(), Some(50), None), Ok(()));
    }

    #[test]
    fn user_check_scopes_organization() {
        assert_eq!(check_user(&user(), Some(100), Some("org-a")), Ok(()));
        assert_eq!(
            check_user(&user(), Some(100), Some("org-b")),
            Err(Denial::forbidden())
        );
    }

    #[test]
    fn access_token_checks() {
        let now = Utc::now();
        assert_eq!(check_access_token(&record(60), now), Ok(()));
        assert_eq!(
            check_access_token(&record(-60), now),
            Err(Denial::Unauthenticated(ACCESS_TOKEN_EXPIRED.into()))
        );

        let mut revoked = record(60);
        revoked.status = "revoked".into();
        assert_eq!(
            check_access_token(&revoked, now),
            Err(Denial::Unauthenticated(ACCESS_TOKEN_INACTIVE.into()))
        );

        let mut unbound = record(60);
        unbound.organization_id = None;
        assert_eq!(check_access_token(&unbound, now), Err(Denial::invalid_token()));
    }

    #[test]
    fn access_token_scope_is_401_on_mismatch() {
        let record = record(60);
        assert_eq!(check_access_token_scope(&record, None), Ok(()));
        assert_eq!(check_access_token_scope(&record, Some("org-a")), Ok(()));
        assert_eq!(
            check_access_token_scope(&record, Some("org-b")),
            Err(Denial::invalid_token())
        );
    }
}
