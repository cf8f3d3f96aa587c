//! Audit logging for authorization decisions.
//!
//! Every decision is emitted via `tracing::info!` with the event serialized
//! into the `audit` field. Credentials never appear in an event.
//!
//! # Events
//!
//! | Event | When |
//! |-------|------|
//! | `auth.allowed` | An internal token was attached |
//! | `auth.anonymous` | No credential was presented |
//! | `auth.passthrough` | The cookie-exchange endpoint was forwarded untouched |
//! | `auth.denied` | The request was short-circuited with an error |

use serde::Serialize;

use super::decision::{Decision, Principal};

/// Structured audit event emitted for every decision.
#[derive(Debug, Serialize)]
pub struct AuditEvent<'a> {
    /// Event type string (e.g., `"auth.allowed"`).
    pub event: &'static str,
    /// Request path.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<&'a str>,
    /// Admitted principal (for `auth.allowed`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub principal: Option<&'a Principal>,
    /// Immediate response status (for `auth.denied`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    /// Immediate response body (for `auth.denied`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<&'a str>,
}

impl<'a> AuditEvent<'a> {
    /// Build the event describing `decision` for a request to `path`.
    #[must_use]
    pub fn for_decision(path: Option<&'a str>, decision: &'a Decision) -> Self {
        let mut event = Self {
            event: "auth.anonymous",
            path,
            principal: None,
            status: None,
            reason: None,
        };
        match decision {
            Decision::Allow(allowed) => {
                event.event = "auth.allowed";
                event.principal = Some(&allowed.principal);
            }
            Decision::Anonymous => {}
            Decision::PassThrough => event.event = "auth.passthrough",
            Decision::Deny(denial) => {
                event.event = "auth.denied";
                event.status = Some(denial.status_code());
                event.reason = Some(denial.message());
            }
        }
        event
    }
}

/// Emit an audit event via `tracing::info!`.
pub fn emit(event: &AuditEvent<'_>) {
    match serde_json::to_string(event) {
        Ok(ref json) => tracing::info!(audit = %json, "authorization audit"),
        Err(ref e) => tracing::warn!(error = %e, "Failed to serialize audit event"),
    }
}
