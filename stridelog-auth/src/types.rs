//! Core data types for stridelog auth

use serde::{Deserialize, Serialize};
use std::fmt;

/// The authenticated identity embedded in tokens.
///
/// Immutable once issued; sourced from the principal store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub id: String,
    pub email: String,
}

impl Principal {
    pub fn new(id: impl Into<String>, email: impl Into<String>) -> Self {
        Principal {
            id: id.into(),
            email: email.into(),
        }
    }
}

/// Purpose a token was minted for.
///
/// Access tokens authorize individual API requests; refresh tokens are
/// only good for minting new pairs. The kind is immutable once signed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::Access => write!(f, "access"),
            TokenKind::Refresh => write!(f, "refresh"),
        }
    }
}

/// The two independently signed tokens minted at login or refresh.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

/// Outcome of validating a token: the subject identity plus the claims
/// later operations need (revocation wants the token id and its natural
/// expiry).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedToken {
    /// Principal id the token was issued to.
    pub subject: String,
    /// Present on access tokens only; refresh tokens carry the bare
    /// subject to minimize exposure if leaked.
    pub email: Option<String>,
    /// Unique id of this issuance.
    pub token_id: String,
    pub kind: TokenKind,
    /// Natural expiry, seconds since the Unix epoch.
    pub expires_at: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_kind_serialized_lowercase() {
        assert_eq!(serde_json::to_string(&TokenKind::Access).unwrap(), "\"access\"");
        assert_eq!(serde_json::to_string(&TokenKind::Refresh).unwrap(), "\"refresh\"");
    }

    #[test]
    fn test_token_kind_display() {
        assert_eq!(TokenKind::Access.to_string(), "access");
        assert_eq!(TokenKind::Refresh.to_string(), "refresh");
    }
}
