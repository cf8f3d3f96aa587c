//! Shared fixtures for integration tests

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde_json::Value;
use sha2::{Digest, Sha256};

use edge_auth_gateway::authz::AuthorizationEngine;
use edge_auth_gateway::cache::IdentityCache;
use edge_auth_gateway::config::{IssuerPair, IssuersConfig, RoutesConfig};
use edge_auth_gateway::credential::PersonalAccessToken;
use edge_auth_gateway::directory::{
    AccessTokenLookup, AccessTokenRecord, DirectoryError, UserLookup, UserRecord,
};
use edge_auth_gateway::token::{INTERNAL_ISSUER, InternalClaims, KeyMaterial, TokenIssuer};

pub const PRIVATE_PEM: &str = include_str!("../fixtures/private.pem");
pub const PUBLIC_PEM: &str = include_str!("../fixtures/public.pem");

pub const EXTERNAL_ISSUER: &str = "https://idp.example.com";
pub const EXTERNAL_AUDIENCE: &str = "platform";
pub const INTERNAL_ISSUER_URL: &str = "https://admin-idp.example.com";
pub const INTERNAL_AUDIENCE: &str = "platform-admin";
pub const TOKEN_AUDIENCE: &str = "geti-services";

/// In-memory Directory Service that counts calls
#[derive(Default)]
pub struct FakeDirectory {
    users: Mutex<HashMap<String, UserRecord>>,
    tokens: Mutex<HashMap<String, AccessTokenRecord>>,
    pub updates: Mutex<Vec<UserRecord>>,
    pub user_calls: AtomicUsize,
    pub token_calls: AtomicUsize,
    pub update_calls: AtomicUsize,
    pub unavailable: AtomicBool,
    pub updates_fail: AtomicBool,
}

impl FakeDirectory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Register a user under its (URL-encoded) external id
    pub fn add_user(&self, lookup_id: &str, user: UserRecord) {
        self.users.lock().insert(lookup_id.to_string(), user);
    }

    pub fn add_token(&self, hash: &str, token: AccessTokenRecord) {
        self.tokens.lock().insert(hash.to_string(), token);
    }

    pub fn user_calls(&self) -> usize {
        self.user_calls.load(Ordering::SeqCst)
    }

    pub fn token_calls(&self) -> usize {
        self.token_calls.load(Ordering::SeqCst)
    }

    pub fn update_calls(&self) -> usize {
        self.update_calls.load(Ordering::SeqCst)
    }

    fn check_available(&self) -> Result<(), DirectoryError> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(DirectoryError::Unavailable(tonic::Status::unavailable(
                "directory down",
            )))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl UserLookup for FakeDirectory {
    async fn user_by_external_id(&self, external_id: &str) -> Result<UserRecord, DirectoryError> {
        self.user_calls.fetch_add(1, Ordering::SeqCst);
        self.check_available()?;
        self.users
            .lock()
            .get(external_id)
            .cloned()
            .ok_or(DirectoryError::NotFound)
    }

    async fn update_login_time(&self, user: &UserRecord) -> Result<(), DirectoryError> {
        self.update_calls.fetch_add(1, Ordering::SeqCst);
        if self.updates_fail.load(Ordering::SeqCst) {
            return Err(DirectoryError::Unavailable(tonic::Status::internal(
                "write failed",
            )));
        }
        self.updates.lock().push(user.clone());
        self.users
            .lock()
            .insert(user.external_id.clone(), user.clone());
        Ok(())
    }
}

#[async_trait]
impl AccessTokenLookup for FakeDirectory {
    async fn access_token_by_hash(&self, hash: &str) -> Result<AccessTokenRecord, DirectoryError> {
        self.token_calls.fetch_add(1, Ordering::SeqCst);
        self.check_available()?;
        self.tokens
            .lock()
            .get(hash)
            .cloned()
            .ok_or(DirectoryError::NotFound)
    }
}

pub fn at(secs: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(secs, 0)
}

pub fn user(external_id: &str, organizations: &[&str]) -> UserRecord {
    UserRecord {
        id: format!("user-{external_id}"),
        external_id: external_id.to_string(),
        organization_ids: organizations.iter().map(|o| (*o).to_string()).collect(),
        email: Some(format!("{external_id}@example.com")),
        last_logout: None,
        current_login: None,
        previous_login: None,
    }
}

pub fn access_token(organization: &str, expires_in: chrono::Duration) -> AccessTokenRecord {
    AccessTokenRecord {
        id: "pat-1".to_string(),
        user_id: "user-owner".to_string(),
        organization_id: Some(organization.to_string()),
        expires_at: Some(Utc::now() + expires_in),
        status: "active".to_string(),
    }
}

/// Deterministic API key for `seed`
pub fn api_key(seed: u32) -> PersonalAccessToken {
    let digest = Sha256::digest(seed.to_be_bytes());
    let mut bytes = [0u8; 32];
    bytes.copy_from_slice(digest.as_slice());
    PersonalAccessToken::from_random_bytes(&bytes)
}

/// Unsigned identity token carrying `claims`
pub fn identity_token(claims: &Value) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"RS256","typ":"JWT","kid":"idp"}"#);
    let payload = URL_SAFE_NO_PAD.encode(claims.to_string());
    format!("{header}.{payload}.dW52ZXJpZmllZA")
}

pub fn external_issuers() -> IssuersConfig {
    IssuersConfig {
        internal: Some(IssuerPair {
            issuer: INTERNAL_ISSUER_URL.to_string(),
            audience: INTERNAL_AUDIENCE.to_string(),
        }),
        external: Some(IssuerPair {
            issuer: EXTERNAL_ISSUER.to_string(),
            audience: EXTERNAL_AUDIENCE.to_string(),
        }),
        required_roles: vec!["admin".to_string()],
    }
}

pub fn key_material() -> Arc<KeyMaterial> {
    Arc::new(KeyMaterial::from_pem(PRIVATE_PEM.as_bytes(), PUBLIC_PEM).unwrap())
}

pub fn engine(directory: &Arc<FakeDirectory>, issuers: IssuersConfig) -> AuthorizationEngine {
    let issuer = TokenIssuer::new(key_material(), Duration::from_secs(3600), TOKEN_AUDIENCE);
    AuthorizationEngine::new(
        Arc::clone(directory) as _,
        Arc::clone(directory) as _,
        Arc::new(IdentityCache::new(Duration::from_secs(60), 10)),
        issuer,
        issuers,
        RoutesConfig::default(),
    )
}

/// Verify an internal token against the fixture public key
pub fn verify(token: &str) -> InternalClaims {
    let mut validation = jsonwebtoken::Validation::new(jsonwebtoken::Algorithm::RS512);
    validation.set_audience(&[TOKEN_AUDIENCE]);
    validation.set_issuer(&[INTERNAL_ISSUER]);
    let key = jsonwebtoken::DecodingKey::from_rsa_pem(PUBLIC_PEM.as_bytes()).unwrap();
    jsonwebtoken::decode::<InternalClaims>(token, &key, &validation)
        .unwrap()
        .claims
}
