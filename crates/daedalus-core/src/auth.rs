//! Authentication scheme markers.
//!
//! An endpoint or route may publish a named scheme. The scheme drives a
//! precondition check: when the `Authorization` header is absent or does
//! not match the scheme, the request is answered with `401` and a
//! `WWW-Authenticate` challenge.

use crate::problem::{Problem, ProblemKind};

/// A named authentication scheme published by an endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthScheme {
    /// HTTP Basic credentials.
    Basic,
    /// A bearer token.
    Bearer,
    /// OAuth2 password flow; tokens are presented as bearer credentials.
    PasswordFlow,
}

impl AuthScheme {
    /// Returns the scheme prefix expected in the `Authorization` header.
    #[must_use]
    pub const fn scheme_name(&self) -> &'static str {
        match self {
            Self::Basic => "Basic",
            Self::Bearer | Self::PasswordFlow => "Bearer",
        }
    }

    /// Returns the `WWW-Authenticate` challenge value.
    #[must_use]
    pub const fn challenge_value(&self) -> &'static str {
        match self {
            Self::Basic => "Basic",
            Self::Bearer | Self::PasswordFlow => "Bearer",
        }
    }

    /// Checks whether an `Authorization` header value matches this scheme.
    #[must_use]
    pub fn accepts(&self, authorization: &str) -> bool {
        let prefix = self.scheme_name();
        authorization.len() > prefix.len()
            && authorization[..prefix.len()].eq_ignore_ascii_case(prefix)
            && authorization.as_bytes()[prefix.len()] == b' '
    }

    /// Builds the `401` problem carrying the challenge header.
    #[must_use]
    pub fn unauthorized(&self) -> Problem {
        Problem::new(ProblemKind::Unauthorized)
            .with_detail("authentication credentials were not provided")
            .with_header("www-authenticate", self.challenge_value())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_matching_scheme() {
        assert!(AuthScheme::Bearer.accepts("Bearer abc.def"));
        assert!(AuthScheme::Bearer.accepts("bearer abc.def"));
        assert!(AuthScheme::Basic.accepts("Basic dXNlcjpwYXNz"));
    }

    #[test]
    fn test_rejects_wrong_or_empty_scheme() {
        assert!(!AuthScheme::Bearer.accepts("Basic dXNlcjpwYXNz"));
        assert!(!AuthScheme::Bearer.accepts("Bearer"));
        assert!(!AuthScheme::Basic.accepts(""));
    }

    #[test]
    fn test_unauthorized_challenge() {
        let problem = AuthScheme::Bearer.unauthorized();
        assert_eq!(problem.status().as_u16(), 401);
        assert_eq!(
            problem.headers().get("www-authenticate").unwrap(),
            "Bearer"
        );
    }
}
