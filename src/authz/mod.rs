//! Authorization decisions for inbound requests

pub mod audit;
pub mod decision;
pub mod engine;
pub mod request;

pub use decision::{Allowed, Decision, Denial, Principal, PrincipalKind};
pub use engine::AuthorizationEngine;
pub use request::AuthRequest;
