//! Identity-token parsing.
//!
//! The gateway sits behind an ingress that has already authenticated the
//! caller with the identity provider, so the token is decoded without
//! signature verification. It must still be a structurally valid JWT.

use std::fmt;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::Deserialize;
use serde_json::Value;

use super::CredentialError;

/// Separator between the scheme and the token in the `Authorization` header
const BEARER_SEPARATOR: &str = "Bearer";

/// Claims the authorization flow reads from an identity token.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExternalClaims {
    /// `sub`
    pub subject: Option<String>,
    /// `iss`
    pub issuer: Option<String>,
    /// `aud`, a single string or a list of strings
    pub audience: Vec<String>,
    /// `auth_time` (Unix seconds), absent when outside the representable range
    pub auth_time: Option<i64>,
    /// `iat` (Unix seconds)
    pub issued_at: Option<i64>,
    /// `roles`
    pub roles: Vec<String>,
    /// `isInternal`
    pub is_internal: bool,
    /// `preferred_username`, falling back to `email`
    pub preferred_username: Option<String>,
}

impl ExternalClaims {
    /// The moment the user authenticated: `auth_time`, else `iat`.
    #[must_use]
    pub fn login_time(&self) -> Option<i64> {
        self.auth_time.or(self.issued_at)
    }

    /// Whether the token was issued for `audience`.
    #[must_use]
    pub fn has_audience(&self, audience: &str) -> bool {
        self.audience.iter().any(|a| a == audience)
    }

    /// Whether the token matches an issuer/audience pair.
    #[must_use]
    pub fn matches(&self, issuer: &str, audience: &str) -> bool {
        self.issuer.as_deref() == Some(issuer) && self.has_audience(audience)
    }
}

/// A parsed bearer token: the raw JWT plus its decoded claims.
#[derive(Clone)]
pub struct BearerToken {
    raw: String,
    claims: ExternalClaims,
}

impl BearerToken {
    /// Parse an `Authorization` header value.
    pub fn from_header(header: &str) -> Result<Self, CredentialError> {
        let token = extract_token(header)?;
        let claims = decode_unverified(token)?;
        Ok(Self {
            raw: token.to_string(),
            claims,
        })
    }

    /// The original JWT, forwarded inside the internal token.
    #[must_use]
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Decoded claims.
    #[must_use]
    pub fn claims(&self) -> &ExternalClaims {
        &self.claims
    }
}

impl fmt::Debug for BearerToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BearerToken")
            .field("raw", &"<redacted>")
            .field("claims", &self.claims)
            .finish()
    }
}

/// Split the header on the `Bearer` separator.
pub fn extract_token(header: &str) -> Result<&str, CredentialError> {
    let parts: Vec<&str> = header.split(BEARER_SEPARATOR).collect();
    let [_, token] = parts.as_slice() else {
        return Err(CredentialError::MalformedHeader);
    };
    let token = token.trim();
    if token.is_empty() {
        return Err(CredentialError::MalformedHeader);
    }
    Ok(token)
}

#[derive(Debug, Deserialize)]
struct RawClaims {
    #[serde(default)]
    sub: Option<String>,
    #[serde(default)]
    iss: Option<String>,
    #[serde(default)]
    aud: Value,
    #[serde(default)]
    auth_time: Value,
    #[serde(default)]
    iat: Value,
    #[serde(default)]
    roles: Value,
    #[serde(default, rename = "isInternal")]
    is_internal: Value,
    #[serde(default)]
    preferred_username: Option<String>,
    #[serde(default)]
    email: Option<String>,
}

/// Decode a JWT's claims without checking its signature.
pub fn decode_unverified(token: &str) -> Result<ExternalClaims, CredentialError> {
    let parts: Vec<&str> = token.split('.').collect();
    let [_, payload, _] = parts.as_slice() else {
        return Err(CredentialError::MalformedToken(
            "expected three dot-separated segments".into(),
        ));
    };

    jsonwebtoken::decode_header(token)
        .map_err(|e| CredentialError::MalformedToken(format!("header: {e}")))?;

    let payload = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .map_err(|e| CredentialError::MalformedToken(format!("payload encoding: {e}")))?;

    let raw: RawClaims = serde_json::from_slice(&payload)
        .map_err(|e| CredentialError::MalformedToken(format!("payload: {e}")))?;

    Ok(ExternalClaims {
        subject: raw.sub.filter(|s| !s.is_empty()),
        issuer: raw.iss,
        audience: audience(&raw.aud),
        auth_time: timestamp(&raw.auth_time),
        issued_at: timestamp(&raw.iat),
        roles: string_or_list(&raw.roles),
        is_internal: flag(&raw.is_internal),
        preferred_username: raw.preferred_username.or(raw.email),
    })
}

fn audience(value: &Value) -> Vec<String> {
    match value {
        Value::String(s) if !s.is_empty() => vec![s.clone()],
        Value::Array(items) => items
            .iter()
            .filter_map(Value::as_str)
            .map(String::from)
            .collect(),
        _ => Vec::new(),
    }
}

fn string_or_list(value: &Value) -> Vec<String> {
    match value {
        Value::String(s) => s
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect(),
        Value::Array(items) => items
            .iter()
            .filter_map(Value::as_str)
            .map(String::from)
            .collect(),
        _ => Vec::new(),
    }
}

#[allow(clippy::cast_possible_truncation)]
fn timestamp(value: &Value) -> Option<i64> {
    let seconds = match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }?;
    chrono::DateTime::from_timestamp(seconds, 0).map(|_| seconds)
}

fn flag(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::String(s) => s.eq_ignore_ascii_case("true"),
        _ => false,
    }
}
