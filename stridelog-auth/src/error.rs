//! Error types for stridelog auth

use thiserror::Error;

use crate::types::TokenKind;

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Token expired")]
    TokenExpired,

    #[error("Malformed token: {0}")]
    TokenMalformed(String),

    #[error("Wrong token kind: expected {expected}, got {actual}")]
    WrongTokenKind {
        expected: TokenKind,
        actual: TokenKind,
    },

    #[error("Token revoked")]
    TokenRevoked,

    #[error("Decryption failed: {0}")]
    Decryption(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AuthError {
    /// Whether this failure is an authentication failure (a rejected
    /// credential) as opposed to a server-side fault.
    ///
    /// The HTTP boundary surfaces all of these as the same generic 401 so
    /// callers cannot probe which specific check failed.
    pub fn is_authentication_failure(&self) -> bool {
        matches!(
            self,
            AuthError::TokenExpired
                | AuthError::TokenMalformed(_)
                | AuthError::WrongTokenKind { .. }
                | AuthError::TokenRevoked
        )
    }
}
