//! Bearer-token authentication for protected handlers
//!
//! Extracts and validates the access token, attaching the identity to
//! the request. Any failure short-circuits the caller with the single
//! generic 401 so clients cannot probe which check failed.

use hyper::header::AUTHORIZATION;
use hyper::Request;

use stridelog_auth::{extract_from_header, AuthError, AuthenticatedToken, TokenKind, TokenService};

/// Identity attached to a request once its access token validates.
#[derive(Debug, Clone)]
pub struct Identity {
    pub id: String,
    pub email: String,
    /// The validated token, kept around for logout-style revocation.
    pub token: AuthenticatedToken,
}

/// Gate a request on a valid access token.
pub fn authenticate<B>(req: &Request<B>, tokens: &TokenService) -> Result<Identity, AuthError> {
    let header = req
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok());

    let token = extract_from_header(header)
        .ok_or_else(|| AuthError::TokenMalformed("missing bearer token".to_string()))?;

    let validated = tokens.validate(token, TokenKind::Access)?;

    Ok(Identity {
        id: validated.subject.clone(),
        email: validated.email.clone().unwrap_or_default(),
        token: validated,
    })
}
