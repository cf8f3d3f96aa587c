//! Configuration management
//!
//! Values come from an optional YAML file merged with `EDGE_AUTH_`-prefixed
//! environment variables (`__` separates nested keys, e.g.
//! `EDGE_AUTH_CACHE__TTL=90s`).

use std::{path::Path, path::PathBuf, time::Duration};

use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use serde::{Deserialize, Deserializer, Serialize};

use crate::{Error, Result};

/// Environment variable prefix for all configuration keys
pub const ENV_PREFIX: &str = "EDGE_AUTH_";

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Listener and upstream addresses
    pub server: ServerConfig,
    /// Accepted identity-token issuers
    pub issuers: IssuersConfig,
    /// Internal token issuance
    pub token: TokenConfig,
    /// Identity cache bounds
    pub cache: CacheConfig,
    /// JWKS publication schedule
    pub jwks: JwksConfig,
    /// Route classification
    pub routes: RoutesConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,
    /// Port for the ext_proc gRPC listener
    pub grpc_port: u16,
    /// Port for the HTTP listener (JWKS, cookie exchange, health)
    pub http_port: u16,
    /// Directory Service gRPC endpoint
    pub directory_url: String,
    /// Per-call timeout for Directory Service requests
    #[serde(with = "humantime_serde")]
    pub directory_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            grpc_port: 9000,
            http_port: 8080,
            directory_url: "http://directory:5001".to_string(),
            directory_timeout: Duration::from_secs(5),
        }
    }
}

/// An issuer/audience pair an identity token must match
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssuerPair {
    /// Expected `iss` claim
    pub issuer: String,
    /// Expected `aud` claim
    pub audience: String,
}

/// Issuer configuration
///
/// Leaving both pairs unset selects single-tenant mode, where issuer and
/// audience are not checked at all.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct IssuersConfig {
    /// Pair identifying administrative (internal) identity tokens
    pub internal: Option<IssuerPair>,
    /// Pair identifying regular user (external) identity tokens
    pub external: Option<IssuerPair>,
    /// Roles an administrative token must carry
    #[serde(deserialize_with = "string_list")]
    pub required_roles: Vec<String>,
}

impl IssuersConfig {
    /// True when no issuer pair is configured
    #[must_use]
    pub fn is_single_tenant(&self) -> bool {
        self.internal.is_none() && self.external.is_none()
    }
}

/// Internal token configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenConfig {
    /// Lifetime of minted internal tokens
    #[serde(with = "humantime_serde")]
    pub ttl: Duration,
    /// `aud` claim written into minted tokens
    pub audience: String,
    /// RSA private key (PEM) used for signing
    pub private_key_path: PathBuf,
    /// RSA public key (PEM) published as a JWK
    pub public_key_path: PathBuf,
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(60 * 60),
            audience: "geti-services".to_string(),
            private_key_path: PathBuf::from("/etc/edge-auth/keys/private.pem"),
            public_key_path: PathBuf::from("/etc/edge-auth/keys/public.pem"),
        }
    }
}

/// Identity cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Maximum age of any cache entry
    #[serde(with = "humantime_serde")]
    pub ttl: Duration,
    /// Total size bound in megabytes
    pub size_mb: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(60),
            size_mb: 10,
        }
    }
}

/// JWKS publication configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JwksConfig {
    /// How often the public key file is re-read
    #[serde(with = "humantime_serde")]
    pub refresh_interval: Duration,
    /// How long a published key survives without being refreshed
    #[serde(with = "humantime_serde")]
    pub key_expiration: Duration,
}

impl Default for JwksConfig {
    fn default() -> Self {
        Self {
            refresh_interval: Duration::from_secs(1),
            key_expiration: Duration::from_secs(15 * 60),
        }
    }
}

/// Route classification
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutesConfig {
    /// Paths that receive an anonymous internal token when a bearer token is present
    #[serde(deserialize_with = "string_list")]
    pub unauthenticated: Vec<String>,
    /// Cookie-exchange endpoint, passed through without resolution
    pub cookie_exchange: String,
}

fn default_unauthenticated_routes() -> Vec<String> {
    [
        "/api/v1/users/active",
        "/api/v1/logout",
        "/api/v1/onboarding/user",
        "/api/v1/feature_flags",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

impl Default for RoutesConfig {
    fn default() -> Self {
        Self {
            unauthenticated: default_unauthenticated_routes(),
            cookie_exchange: "/api/v1/set_cookie".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from file and environment
    ///
    /// # Errors
    ///
    /// Returns an error if the config file does not exist, cannot be parsed,
    /// or fails [`Config::validate`].
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::new();

        if let Some(p) = path {
            if !p.exists() {
                return Err(Error::Config(format!(
                    "Config file not found: {}",
                    p.display()
                )));
            }
            figment = figment.merge(Yaml::file(p));
        }

        figment = figment.merge(Env::prefixed(ENV_PREFIX).split("__"));

        let config: Self = figment
            .extract()
            .map_err(|e| Error::Config(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    /// Reject configurations that cannot produce correct decisions
    pub fn validate(&self) -> Result<()> {
        for (name, pair) in [
            ("internal", &self.issuers.internal),
            ("external", &self.issuers.external),
        ] {
            if let Some(pair) = pair {
                if pair.issuer.is_empty() || pair.audience.is_empty() {
                    return Err(Error::Config(format!(
                        "issuers.{name} needs both issuer and audience"
                    )));
                }
            }
        }

        if self.token.ttl.is_zero() {
            return Err(Error::Config("token.ttl must be greater than zero".into()));
        }
        if self.cache.size_mb == 0 {
            return Err(Error::Config("cache.size_mb must be greater than zero".into()));
        }
        if self.jwks.refresh_interval.is_zero() {
            return Err(Error::Config(
                "jwks.refresh_interval must be greater than zero".into(),
            ));
        }

        Ok(())
    }
}

/// Accept either a sequence or a single comma-separated string.
fn string_list<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        List(Vec<String>),
        Joined(String),
    }

    let items = match Raw::deserialize(deserializer)? {
        Raw::List(items) => items,
        Raw::Joined(joined) => joined.split(',').map(String::from).collect(),
    };

    Ok(items
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = Config::default();

        assert_eq!(config.token.ttl, Duration::from_secs(3600));
        assert_eq!(config.cache.ttl, Duration::from_secs(60));
        assert_eq!(config.cache.size_mb, 10);
        assert_eq!(config.jwks.refresh_interval, Duration::from_secs(1));
        assert_eq!(config.jwks.key_expiration, Duration::from_secs(900));
        assert!(config.issuers.is_single_tenant());
        assert!(config.routes.unauthenticated.contains(&"/api/v1/logout".to_string()));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn yaml_accepts_comma_separated_lists() {
        let yaml = r#"
issuers:
  external:
    issuer: "https://idp.example.com"
    audience: "platform"
  required_roles: "admin, auditor ,"
routes:
  unauthenticated: "/a,/b"
token:
  ttl: 15m
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();

        assert_eq!(config.issuers.required_roles, vec!["admin", "auditor"]);
        assert_eq!(config.routes.unauthenticated, vec!["/a", "/b"]);
        assert_eq!(config.token.ttl, Duration::from_secs(900));
        assert!(!config.issuers.is_single_tenant());
    }

    #[test]
    fn yaml_accepts_sequences() {
        let yaml = r#"
routes:
  unauthenticated:
    - /health
issuers:
  required_roles: [admin]
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();

        assert_eq!(config.routes.unauthenticated, vec!["/health"]);
        assert_eq!(config.issuers.required_roles, vec!["admin"]);
    }

    #[test]
    fn validate_rejects_half_configured_issuer() {
        let mut config = Config::default();
        config.issuers.internal = Some(IssuerPair {
            issuer: "https://idp".to_string(),
            audience: String::new(),
        });

        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn validate_rejects_zero_bounds() {
        let mut config = Config::default();
        config.cache.size_mb = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.token.ttl = Duration::ZERO;
        assert!(config.validate().is_err());
    }

    #[test]
    fn load_rejects_missing_file() {
        let result = Config::load(Some(Path::new("/nonexistent/edge-auth.yaml")));
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn load_reads_yaml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("edge-auth.yaml");
        std::fs::write(&path, "cache:\n  size_mb: 32\n  ttl: 2m\n").unwrap();

        let config = Config::load(Some(&path)).unwrap();

        assert_eq!(config.cache.size_mb, 32);
        assert_eq!(config.cache.ttl, Duration::from_secs(120));
    }
}
