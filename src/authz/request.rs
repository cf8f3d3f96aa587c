//! Request attributes the authorization flow looks at

use std::sync::LazyLock;

use regex::Regex;

/// Pseudo-header carrying the request path
pub const PATH_HEADER: &str = ":path";
/// Identity token header
pub const AUTHORIZATION_HEADER: &str = "authorization";
/// Personal access token header
pub const API_KEY_HEADER: &str = "x-api-key";

static ORGANIZATION_PATH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^/api/v\d+/organizations/([^/]+)").expect("static regex")
});

/// The credential-relevant view of one inbound request
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthRequest {
    /// Request path without its query string
    pub path: Option<String>,
    /// `Authorization` header value
    pub authorization: Option<String>,
    /// `X-API-Key` header value
    pub api_key: Option<String>,
}

impl AuthRequest {
    /// Pick the relevant headers out of `(name, value)` pairs.
    ///
    /// Names match case-insensitively; empty values count as absent.
    pub fn from_headers<I, N, V>(headers: I) -> Self
    where
        I: IntoIterator<Item = (N, V)>,
        N: AsRef<str>,
        V: Into<String>,
    {
        let mut request = Self::default();
        for (name, value) in headers {
            let name = name.as_ref();
            let slot = if name.eq_ignore_ascii_case(PATH_HEADER) {
                &mut request.path
            } else if name.eq_ignore_ascii_case(AUTHORIZATION_HEADER) {
                &mut request.authorization
            } else if name.eq_ignore_ascii_case(API_KEY_HEADER) {
                &mut request.api_key
            } else {
                continue;
            };
            let value: String = value.into();
            if !value.is_empty() {
                *slot = Some(value);
            }
        }
        if let Some(path) = request.path.as_mut() {
            if let Some(query) = path.find('?') {
                path.truncate(query);
            }
        }
        request
    }

    /// Organization id embedded in the path, if any
    #[must_use]
    pub fn organization_id(&self) -> Option<&str> {
        self.path.as_deref().and_then(organization_id)
    }
}

/// Extract `{id}` from `/api/v{N}/organizations/{id}/...`
#[must_use]
pub fn organization_id(path: &str) -> Option<&str> {
    ORGANIZATION_PATH
        .captures(path)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn picks_headers_case_insensitively() {
        let request = AuthRequest::from_headers([
            (":path", "/api/v1/projects?page=2"),
            ("Authorization", "Bearer abc"),
            ("X-Api-Key", "geti_pat_x"),
            ("content-type", "application/json"),
        ]);

        assert_eq!(request.path.as_deref(), Some("/api/v1/projects"));
        assert_eq!(request.authorization.as_deref(), Some("Bearer abc"));
        assert_eq!(request.api_key.as_deref(), Some("geti_pat_x"));
    }

    #[test]
    fn empty_values_are_absent() {
        let request = AuthRequest::from_headers([(":path", "/"), ("authorization", "")]);

        assert_eq!(request.authorization, None);
        assert_eq!(request.api_key, None);
    }

    #[test]
    fn missing_path_stays_missing() {
        let request = AuthRequest::from_headers([("authorization", "Bearer abc")]);
        assert_eq!(request.path, None);
        assert_eq!(request.organization_id(), None);
    }

    #[test]
    fn extracts_organization_from_path() {
        assert_eq!(
            organization_id("/api/v1/organizations/org-1/workspaces/ws-2"),
            Some("org-1")
        );
        assert_eq!(organization_id("/api/v2/organizations/org-9"), Some("org-9"));
        assert_eq!(organization_id("/api/v1/users/active"), None);
        assert_eq!(organization_id("/internal/organizations/org-1"), None);
    }
}
