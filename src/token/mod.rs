//! Internal token issuance and signing-key publication

pub mod issuer;
pub mod jwks;
pub mod keys;

pub use issuer::{INTERNAL_ISSUER, InternalClaims, TokenIssuer, TokenSource};
pub use jwks::{Jwk, JwkPublisher, JwkSet};
pub use keys::KeyMaterial;
