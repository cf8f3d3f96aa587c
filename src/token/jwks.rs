//! JSON Web Key publication
//!
//! The public key file is re-read on a schedule so that a rotated key shows
//! up without a restart. Each key stays published until it has gone
//! `key_expiration` without being seen, which keeps the previous key
//! verifiable while tokens signed with it are still alive.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use dashmap::DashMap;
use parking_lot::RwLock;
use rsa::RsaPublicKey;
use rsa::traits::PublicKeyParts;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::keys::{key_id, parse_public_key};
use crate::{Error, Result};

/// An RSA signing key in JWK form
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Jwk {
    /// Key type, always `RSA`
    pub kty: String,
    /// Hex SHA-512 of the DER public key
    pub kid: String,
    /// Signing algorithm, always `RS512`
    pub alg: String,
    /// Key use, always `sig`
    #[serde(rename = "use")]
    pub key_use: String,
    /// Modulus, base64url without padding
    pub n: String,
    /// Public exponent, base64url without padding
    pub e: String,
}

impl Jwk {
    /// Build the JWK for an RSA public key.
    ///
    /// # Errors
    ///
    /// Returns an error if the key cannot be DER-encoded for its `kid`.
    pub fn from_public_key(key: &RsaPublicKey) -> Result<Self> {
        Ok(Self {
            kty: "RSA".to_string(),
            kid: key_id(key)?,
            alg: "RS512".to_string(),
            key_use: "sig".to_string(),
            n: URL_SAFE_NO_PAD.encode(key.n().to_bytes_be()),
            e: URL_SAFE_NO_PAD.encode(key.e().to_bytes_be()),
        })
    }
}

/// RFC 7517 key set document
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JwkSet {
    /// Published keys
    pub keys: Vec<Jwk>,
}

struct PublishedKey {
    jwk: Jwk,
    expires_at: Instant,
}

/// Periodically republishes the signing key set
pub struct JwkPublisher {
    public_key_path: PathBuf,
    key_expiration: Duration,
    keys: DashMap<String, PublishedKey>,
    published: RwLock<String>,
}

impl JwkPublisher {
    /// Create a publisher for the key at `public_key_path`
    #[must_use]
    pub fn new(public_key_path: impl Into<PathBuf>, key_expiration: Duration) -> Self {
        Self {
            public_key_path: public_key_path.into(),
            key_expiration,
            keys: DashMap::new(),
            published: RwLock::new(r#"{"keys":[]}"#.to_string()),
        }
    }

    /// Run one update cycle: load the current key, purge expired keys,
    /// reserialize. Expired keys are purged even when loading fails.
    ///
    /// # Errors
    ///
    /// Returns an error if the key file cannot be read or parsed.
    pub fn refresh(&self) -> Result<()> {
        let loaded = self.load_current();
        self.publish()?;
        loaded
    }

    fn load_current(&self) -> Result<()> {
        let pem = std::fs::read_to_string(&self.public_key_path).map_err(|e| {
            Error::KeyMaterial(format!("read {}: {e}", self.public_key_path.display()))
        })?;
        let jwk = Jwk::from_public_key(&parse_public_key(&pem)?)?;
        let expires_at = Instant::now() + self.key_expiration;

        if !self.keys.contains_key(&jwk.kid) {
            info!(kid = %jwk.kid, "Publishing new signing key");
        }
        self.keys
            .insert(jwk.kid.clone(), PublishedKey { jwk, expires_at });
        Ok(())
    }

    fn publish(&self) -> Result<()> {
        let now = Instant::now();
        self.keys.retain(|kid, key| {
            let keep = key.expires_at > now;
            if !keep {
                info!(kid = %kid, "Signing key expired from published set");
            }
            keep
        });

        let mut keys: Vec<Jwk> = self.keys.iter().map(|k| k.jwk.clone()).collect();
        keys.sort_by(|a, b| a.kid.cmp(&b.kid));
        let document = serde_json::to_string(&JwkSet { keys })?;
        *self.published.write() = document;
        Ok(())
    }

    /// The last serialized key set, verbatim
    #[must_use]
    pub fn published(&self) -> String {
        self.published.read().clone()
    }

    /// Number of keys currently published
    #[must_use]
    pub fn key_count(&self) -> usize {
        self.keys.len()
    }

    /// Refresh every `interval` until shutdown. Each refresh reads the key
    /// file on the blocking pool.
    pub fn spawn(
        self: Arc<Self>,
        interval: Duration,
        mut shutdown: broadcast::Receiver<()>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let publisher = Arc::clone(&self);
                        match tokio::task::spawn_blocking(move || publisher.refresh()).await {
                            Ok(Ok(())) => {}
                            Ok(Err(e)) => warn!(error = %e, "JWKS refresh failed"),
                            Err(e) => warn!(error = %e, "JWKS refresh task aborted"),
                        }
                    }
                    _ = shutdown.recv() => {
                        debug!("JWKS publisher shutting down");
                        break;
                    }
                }
            }
        })
    }
}
