//! RSA key material for signing and publication

use std::path::Path;

use jsonwebtoken::EncodingKey;
use rsa::pkcs1::{DecodeRsaPrivateKey, DecodeRsaPublicKey};
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePublicKey};
use rsa::{RsaPrivateKey, RsaPublicKey};
use sha2::{Digest, Sha512};

use crate::{Error, Result};

/// Signing key pair, loaded once at startup and immutable afterwards
pub struct KeyMaterial {
    encoding: EncodingKey,
    public: RsaPublicKey,
    kid: String,
}

impl KeyMaterial {
    /// Load PEM files from disk.
    ///
    /// # Errors
    ///
    /// Returns [`Error::KeyMaterial`] if either file is unreadable or invalid.
    pub fn load(private_key_path: &Path, public_key_path: &Path) -> Result<Self> {
        let private = std::fs::read(private_key_path).map_err(|e| {
            Error::KeyMaterial(format!("read {}: {e}", private_key_path.display()))
        })?;
        let public = std::fs::read_to_string(public_key_path).map_err(|e| {
            Error::KeyMaterial(format!("read {}: {e}", public_key_path.display()))
        })?;
        Self::from_pem(&private, &public)
    }

    /// Build from PEM-encoded keys (PKCS#1 or PKCS#8 private, SPKI or PKCS#1 public).
    ///
    /// # Errors
    ///
    /// Returns [`Error::KeyMaterial`] if either key cannot be parsed or the
    /// public key is not the private key's counterpart.
    pub fn from_pem(private_pem: &[u8], public_pem: &str) -> Result<Self> {
        let encoding = EncodingKey::from_rsa_pem(private_pem)
            .map_err(|e| Error::KeyMaterial(format!("private key: {e}")))?;
        let private = parse_private_key(private_pem)?;
        let public = parse_public_key(public_pem)?;
        if private.to_public_key() != public {
            return Err(Error::KeyMaterial(
                "private and public keys do not match".to_string(),
            ));
        }
        let kid = key_id(&public)?;
        Ok(Self {
            encoding,
            public,
            kid,
        })
    }

    /// Key used to sign internal tokens
    #[must_use]
    pub fn encoding_key(&self) -> &EncodingKey {
        &self.encoding
    }

    /// Public half of the pair
    #[must_use]
    pub fn public_key(&self) -> &RsaPublicKey {
        &self.public
    }

    /// `kid` stamped on every minted token
    #[must_use]
    pub fn kid(&self) -> &str {
        &self.kid
    }
}

impl std::fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyMaterial").field("kid", &self.kid).finish_non_exhaustive()
    }
}

fn parse_private_key(pem: &[u8]) -> Result<RsaPrivateKey> {
    let pem = std::str::from_utf8(pem)
        .map_err(|e| Error::KeyMaterial(format!("private key: {e}")))?;
    RsaPrivateKey::from_pkcs8_pem(pem)
        .or_else(|_| RsaPrivateKey::from_pkcs1_pem(pem))
        .map_err(|e| Error::KeyMaterial(format!("private key: {e}")))
}

/// Parse an RSA public key in SPKI (`BEGIN PUBLIC KEY`) or PKCS#1 form.
///
/// # Errors
///
/// Returns [`Error::KeyMaterial`] if neither form parses.
pub fn parse_public_key(pem: &str) -> Result<RsaPublicKey> {
    RsaPublicKey::from_public_key_pem(pem)
        .or_else(|_| RsaPublicKey::from_pkcs1_pem(pem))
        .map_err(|e| Error::KeyMaterial(format!("public key: {e}")))
}

/// Hex SHA-512 of the DER-encoded (SPKI) public key.
///
/// # Errors
///
/// Returns [`Error::KeyMaterial`] if the key cannot be DER-encoded.
pub fn key_id(public: &RsaPublicKey) -> Result<String> {
    let der = public
        .to_public_key_der()
        .map_err(|e| Error::KeyMaterial(format!("encode public key: {e}")))?;
    Ok(hex::encode(Sha512::digest(der.as_bytes())))
}

#[cfg(test)]
mod tests {
    use super::*;

    const PRIVATE: &str = include_str!("../../tests/fixtures/private.pem");
    const PUBLIC: &str = include_str!("../../tests/fixtures/public.pem");
    const ROTATED: &str = include_str!("../../tests/fixtures/rotated_public.pem");

    #[test]
    fn loads_pem_pair() {
        let keys = KeyMaterial::from_pem(PRIVATE.as_bytes(), PUBLIC).unwrap();

        assert_eq!(keys.kid().len(), 128);
        assert!(keys.kid().bytes().all(|b| b.is_ascii_hexdigit()));
    }

    #[test]
    fn key_id_is_stable_and_distinct() {
        let first = key_id(&parse_public_key(PUBLIC).unwrap()).unwrap();
        let again = key_id(&parse_public_key(PUBLIC).unwrap()).unwrap();
        let rotated = key_id(&parse_public_key(ROTATED).unwrap()).unwrap();

        assert_eq!(first, again);
        assert_ne!(first, rotated);
    }

    #[test]
    fn rejects_garbage() {
        assert!(matches!(
            KeyMaterial::from_pem(b"not a key", PUBLIC),
            Err(Error::KeyMaterial(_))
        ));
        assert!(matches!(
            KeyMaterial::from_pem(PRIVATE.as_bytes(), "not a key"),
            Err(Error::KeyMaterial(_))
        ));
    }

    #[test]
    fn rejects_mismatched_pair() {
        // GIVEN: a private key and the public half of a different key
        // WHEN: building key material from them
        let result = KeyMaterial::from_pem(PRIVATE.as_bytes(), ROTATED);

        // THEN: loading fails instead of publishing the wrong kid
        assert!(
            matches!(result, Err(Error::KeyMaterial(ref msg)) if msg.contains("do not match")),
            "{result:?}"
        );
    }

    #[test]
    fn load_reports_missing_files() {
        let result = KeyMaterial::load(
            Path::new("/nonexistent/private.pem"),
            Path::new("/nonexistent/public.pem"),
        );

        assert!(matches!(result, Err(Error::KeyMaterial(msg)) if msg.contains("private.pem")));
    }
}
