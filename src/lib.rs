//! Edge Authentication Gateway Library
//!
//! Authorization decision point for an Envoy ingress. Every inbound request
//! is checked by the external-processing stream before it reaches the
//! platform:
//!
//! - **Identity tokens**: resolved to a platform user, with logout and
//!   organization checks
//! - **Personal access tokens**: checksum-verified, then resolved by hash
//! - **Internal tokens**: RS512 JWTs minted per request and verifiable
//!   against the published key set
//! - **Identity cache**: keeps the Directory Service off the hot path
//!   without serving sessions that predate a newer login

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod authz;
pub mod cache;
pub mod cli;
pub mod config;
pub mod credential;
pub mod directory;
pub mod error;
pub mod gateway;
pub mod processor;
pub mod token;

pub use error::{Error, Result};

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Setup tracing/logging
pub fn setup_tracing(level: &str, format: Option<&str>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::registry().with(filter);

    match format {
        Some("json") => {
            subscriber.with(fmt::layer().json()).init();
        }
        _ => {
            subscriber.with(fmt::layer()).init();
        }
    }

    Ok(())
}
