//! Personal access token (API key) format, checksum and lookup hash.
//!
//! Keys look like `geti_pat_<random>_<checksum>`:
//!
//! - `<random>`: 43 base62 characters encoding 32 random bytes
//! - `<checksum>`: 6 base62 characters encoding the little-endian CRC32
//!   (IEEE) of those 32 bytes
//!
//! The plaintext key is never stored. Lookups use [`calculate_hash`], a
//! 65-character base62 rendering of the SHA-384 digest of the whole key.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use sha2::{Digest, Sha384};

use super::{CredentialError, base62};

/// Prefix shared by every personal access token
pub const API_KEY_PREFIX: &str = "geti_pat";

/// Length of the random segment in characters
pub const RANDOM_LEN: usize = 43;
/// Length of the checksum segment in characters
pub const CHECKSUM_LEN: usize = 6;
/// Length of the lookup hash in characters
pub const HASH_LEN: usize = 65;
/// Number of random bytes behind the random segment
pub const RANDOM_BYTES: usize = 32;

static RANDOM_SEGMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9a-zA-Z]{43}$").expect("static regex"));
static CHECKSUM_SEGMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9a-zA-Z]{6}$").expect("static regex"));

/// A structurally valid personal access token.
///
/// Parsing only checks the format; call [`verify_checksum`](Self::verify_checksum)
/// before trusting it enough to hit the directory.
#[derive(Clone, PartialEq, Eq)]
pub struct PersonalAccessToken {
    key: String,
    random: String,
    checksum: String,
}

impl PersonalAccessToken {
    /// Parse the `X-API-Key` header value.
    pub fn parse(key: &str) -> Result<Self, CredentialError> {
        if !key.starts_with(API_KEY_PREFIX) {
            return Err(CredentialError::MalformedApiKey("unknown prefix"));
        }

        let segments: Vec<&str> = key.split('_').collect();
        let [_, _, random, checksum] = segments.as_slice() else {
            return Err(CredentialError::MalformedApiKey("wrong number of segments"));
        };

        if !RANDOM_SEGMENT.is_match(random) {
            return Err(CredentialError::MalformedApiKey("invalid random segment"));
        }
        if !CHECKSUM_SEGMENT.is_match(checksum) {
            return Err(CredentialError::MalformedApiKey("invalid checksum segment"));
        }

        Ok(Self {
            key: key.to_string(),
            random: (*random).to_string(),
            checksum: (*checksum).to_string(),
        })
    }

    /// Build a key from 32 random bytes.
    #[must_use]
    pub fn from_random_bytes(bytes: &[u8; RANDOM_BYTES]) -> Self {
        let random = base62::pad(&base62::encode(bytes), RANDOM_LEN);
        let checksum = checksum(bytes);
        Self {
            key: format!("{API_KEY_PREFIX}_{random}_{checksum}"),
            random,
            checksum,
        }
    }

    /// Recompute the checksum from the random segment and compare.
    ///
    /// # Errors
    ///
    /// Returns [`CredentialError::ChecksumMismatch`] if the key was mistyped
    /// or tampered with.
    pub fn verify_checksum(&self) -> Result<(), CredentialError> {
        if self.is_checksum_valid() {
            Ok(())
        } else {
            Err(CredentialError::ChecksumMismatch)
        }
    }

    fn is_checksum_valid(&self) -> bool {
        let Some(decoded) = base62::decode(&self.random) else {
            return false;
        };
        // Leading zero bytes are lost by base62 decoding; restore them.
        let decoded = decoded.as_slice();
        let significant = match decoded.iter().position(|b| *b != 0) {
            Some(first) => &decoded[first..],
            None => &[],
        };
        if significant.len() > RANDOM_BYTES {
            return false;
        }
        let mut bytes = [0u8; RANDOM_BYTES];
        bytes[RANDOM_BYTES - significant.len()..].copy_from_slice(significant);

        checksum(&bytes) == self.checksum
    }

    /// Lookup hash for the directory and the identity cache.
    #[must_use]
    pub fn hash(&self) -> String {
        calculate_hash(&self.key)
    }

    /// The full key as presented by the caller.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.key
    }
}

impl fmt::Debug for PersonalAccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PersonalAccessToken")
            .field("key", &"<redacted>")
            .field("checksum", &self.checksum)
            .finish()
    }
}

/// Checksum segment for 32 random bytes.
#[must_use]
pub fn checksum(bytes: &[u8; RANDOM_BYTES]) -> String {
    let crc = crc32fast::hash(bytes);
    base62::pad(&base62::encode(&crc.to_le_bytes()), CHECKSUM_LEN)
}

/// SHA-384 over the whole key, rendered as 65 zero-padded base62 characters.
#[must_use]
pub fn calculate_hash(key: &str) -> String {
    let digest = Sha384::digest(key.as_bytes());
    base62::pad(&base62::encode(digest.as_slice()), HASH_LEN)
}
