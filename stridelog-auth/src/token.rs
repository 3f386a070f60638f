//! Session token issuance and validation
//!
//! Mints and verifies the signed bearer tokens that represent a
//! principal's session: a short-lived access token carrying the
//! identity, and a longer-lived refresh token carrying only the subject.
//! Tokens are HMAC-signed JWTs keyed on the configured secret.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use jwt_simple::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::AuthConfig;
use crate::revocation::RevocationStore;
use crate::types::{AuthenticatedToken, Principal, TokenKind, TokenPair};
use crate::{AuthError, Result};

/// Custom claims carried alongside the registered JWT claims.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionClaims {
    pub kind: TokenKind,
    /// Present on access tokens only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

// Expiry is checked explicitly in `validate` so that expired and
// malformed tokens map to distinct errors; the verification library gets
// enough tolerance to never reject on time itself. Thirty years stays
// well inside coarsetime's tick range.
const EXPIRY_CHECK_TOLERANCE_SECS: u64 = 30 * 365 * 24 * 60 * 60;

/// Issues and validates session tokens for principals.
///
/// The signing secret is validated at construction, before any signing
/// attempt. The revocation store is injected so deployments can swap the
/// in-memory registry for a shared one.
pub struct TokenService {
    key: HS256Key,
    config: AuthConfig,
    revocations: Arc<dyn RevocationStore>,
}

impl TokenService {
    pub fn new(config: AuthConfig, revocations: Arc<dyn RevocationStore>) -> Result<Self> {
        if config.signing_secret.is_empty() {
            return Err(AuthError::Configuration(
                "signing secret is not configured".to_string(),
            ));
        }
        let key = HS256Key::from_bytes(config.signing_secret.as_bytes());
        Ok(TokenService {
            key,
            config,
            revocations,
        })
    }

    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    /// Mint an access/refresh pair for a principal.
    ///
    /// The two tokens are independently signed and each carries a fresh
    /// random token id.
    pub fn issue(&self, principal: &Principal) -> Result<TokenPair> {
        let access_token = self.sign(principal, TokenKind::Access)?;
        let refresh_token = self.sign(principal, TokenKind::Refresh)?;

        info!(
            component = "token",
            operation = "issue",
            subject = %principal.id,
            "session tokens issued"
        );

        Ok(TokenPair {
            access_token,
            refresh_token,
        })
    }

    fn sign(&self, principal: &Principal, kind: TokenKind) -> Result<String> {
        let ttl = match kind {
            TokenKind::Access => self.config.access_ttl,
            TokenKind::Refresh => self.config.refresh_ttl,
        };
        let custom = SessionClaims {
            kind,
            email: match kind {
                TokenKind::Access => Some(principal.email.clone()),
                TokenKind::Refresh => None,
            },
        };

        let claims = Claims::with_custom_claims(
            custom,
            jwt_simple::prelude::Duration::from_secs(ttl.as_secs()),
        )
        .with_issuer(&self.config.issuer)
        .with_audience(&self.config.audience)
        .with_subject(&principal.id)
        .with_jwt_id(Uuid::new_v4().to_string());

        self.key
            .authenticate(claims)
            .map_err(|e| AuthError::Internal(format!("token signing failed: {}", e)))
    }

    /// Verify a token and return the identity it carries.
    ///
    /// Checks run in a fixed order — signature and structure, then
    /// expiry, then kind, then revocation — so a malformed token never
    /// falsely reports as revoked.
    pub fn validate(&self, token: &str, expected_kind: TokenKind) -> Result<AuthenticatedToken> {
        let options = VerificationOptions {
            allowed_issuers: Some(HashSet::from([self.config.issuer.clone()])),
            allowed_audiences: Some(HashSet::from([self.config.audience.clone()])),
            time_tolerance: Some(jwt_simple::prelude::Duration::from_secs(
                EXPIRY_CHECK_TOLERANCE_SECS,
            )),
            ..Default::default()
        };

        let claims = self
            .key
            .verify_token::<SessionClaims>(token, Some(options))
            .map_err(|e| AuthError::TokenMalformed(e.to_string()))?;

        let subject = claims
            .subject
            .ok_or_else(|| AuthError::TokenMalformed("missing subject claim".to_string()))?;
        let token_id = claims
            .jwt_id
            .ok_or_else(|| AuthError::TokenMalformed("missing token id claim".to_string()))?;
        let expires_at = claims
            .expires_at
            .map(|t| t.as_secs())
            .ok_or_else(|| AuthError::TokenMalformed("missing expiry claim".to_string()))?;

        if unix_now() >= expires_at {
            return Err(AuthError::TokenExpired);
        }

        let kind = claims.custom.kind;
        if kind != expected_kind {
            return Err(AuthError::WrongTokenKind {
                expected: expected_kind,
                actual: kind,
            });
        }

        if self.revocations.is_revoked(&token_id) {
            return Err(AuthError::TokenRevoked);
        }

        debug!(
            component = "token",
            operation = "validate",
            subject = %subject,
            kind = %kind,
            "token accepted"
        );

        Ok(AuthenticatedToken {
            subject,
            email: claims.custom.email,
            token_id,
            kind,
            expires_at,
        })
    }

    /// Revoke a validated token until its natural expiry.
    pub fn revoke(&self, token: &AuthenticatedToken) {
        self.revocations.revoke(&token.token_id, token.expires_at);
        info!(
            component = "token",
            operation = "revoke",
            subject = %token.subject,
            kind = %token.kind,
            "token revoked"
        );
    }
}

/// Parse a `Bearer <token>` authorization header value.
///
/// Pure parse: missing, empty, wrong-scheme, token-less, or
/// extra-segment values yield `None`, never an error.
pub fn extract_from_header(header: Option<&str>) -> Option<&str> {
    let header = header?;
    let mut parts = header.split(' ');
    let scheme = parts.next()?;
    let token = parts.next()?;
    if parts.next().is_some() {
        return None;
    }
    if scheme != "Bearer" || token.is_empty() {
        return None;
    }
    Some(token)
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::revocation::InMemoryRevocationStore;
    use std::time::Duration;

    fn service() -> TokenService {
        service_with(AuthConfig::with_secret("test-signing-secret"))
    }

    fn service_with(config: AuthConfig) -> TokenService {
        TokenService::new(config, Arc::new(InMemoryRevocationStore::new())).unwrap()
    }

    fn runner() -> Principal {
        Principal::new("u1", "a@b.com")
    }

    /// Flip the first character of the signature segment.
    fn tamper(token: &str) -> String {
        let dot = token.rfind('.').unwrap();
        let mut chars: Vec<char> = token.chars().collect();
        chars[dot + 1] = if chars[dot + 1] == 'A' { 'B' } else { 'A' };
        chars.into_iter().collect()
    }

    #[test]
    fn token_roundtrip_returns_principal() {
        let service = service();
        let pair = service.issue(&runner()).unwrap();

        let access = service.validate(&pair.access_token, TokenKind::Access).unwrap();
        assert_eq!(access.subject, "u1");
        assert_eq!(access.email.as_deref(), Some("a@b.com"));
        assert_eq!(access.kind, TokenKind::Access);
        assert!(!access.token_id.is_empty());

        let refresh = service.validate(&pair.refresh_token, TokenKind::Refresh).unwrap();
        assert_eq!(refresh.subject, "u1");
        assert_eq!(refresh.kind, TokenKind::Refresh);
    }

    #[test]
    fn token_refresh_carries_no_email() {
        let service = service();
        let pair = service.issue(&runner()).unwrap();

        let refresh = service.validate(&pair.refresh_token, TokenKind::Refresh).unwrap();
        assert_eq!(refresh.email, None);
    }

    #[test]
    fn token_kind_mismatch_rejected_both_ways() {
        let service = service();
        let pair = service.issue(&runner()).unwrap();

        assert!(matches!(
            service.validate(&pair.access_token, TokenKind::Refresh),
            Err(AuthError::WrongTokenKind {
                expected: TokenKind::Refresh,
                actual: TokenKind::Access,
            })
        ));
        assert!(matches!(
            service.validate(&pair.refresh_token, TokenKind::Access),
            Err(AuthError::WrongTokenKind {
                expected: TokenKind::Access,
                actual: TokenKind::Refresh,
            })
        ));
    }

    #[test]
    fn token_ids_are_unique_per_issuance() {
        let service = service();
        let first = service.issue(&runner()).unwrap();
        let second = service.issue(&runner()).unwrap();

        let a = service.validate(&first.access_token, TokenKind::Access).unwrap();
        let b = service.validate(&second.access_token, TokenKind::Access).unwrap();
        let r = service.validate(&first.refresh_token, TokenKind::Refresh).unwrap();

        assert_ne!(a.token_id, b.token_id);
        assert_ne!(a.token_id, r.token_id);
    }

    #[test]
    fn token_garbage_is_malformed() {
        let service = service();
        assert!(matches!(
            service.validate("not-a-token", TokenKind::Access),
            Err(AuthError::TokenMalformed(_))
        ));
        assert!(matches!(
            service.validate("", TokenKind::Access),
            Err(AuthError::TokenMalformed(_))
        ));
    }

    #[test]
    fn token_foreign_secret_is_malformed() {
        let service = service();
        let other = service_with(AuthConfig::with_secret("a-different-secret"));
        let pair = other.issue(&runner()).unwrap();

        assert!(matches!(
            service.validate(&pair.access_token, TokenKind::Access),
            Err(AuthError::TokenMalformed(_))
        ));
    }

    #[test]
    fn token_revoked_is_rejected() {
        let revocations = Arc::new(InMemoryRevocationStore::new());
        let service = TokenService::new(
            AuthConfig::with_secret("test-signing-secret"),
            revocations.clone(),
        )
        .unwrap();

        let pair = service.issue(&runner()).unwrap();
        let access = service.validate(&pair.access_token, TokenKind::Access).unwrap();

        service.revoke(&access);
        assert!(matches!(
            service.validate(&pair.access_token, TokenKind::Access),
            Err(AuthError::TokenRevoked)
        ));
        // The refresh token has its own id and stays valid.
        assert!(service.validate(&pair.refresh_token, TokenKind::Refresh).is_ok());
    }

    #[test]
    fn token_malformed_never_reports_revoked() {
        let revocations = Arc::new(InMemoryRevocationStore::new());
        let service = TokenService::new(
            AuthConfig::with_secret("test-signing-secret"),
            revocations.clone(),
        )
        .unwrap();

        let pair = service.issue(&runner()).unwrap();
        let access = service.validate(&pair.access_token, TokenKind::Access).unwrap();
        service.revoke(&access);

        // Same token, broken signature: the structural failure must win.
        assert!(matches!(
            service.validate(&tamper(&pair.access_token), TokenKind::Access),
            Err(AuthError::TokenMalformed(_))
        ));
    }

    #[test]
    fn token_expired_access_while_refresh_survives() {
        let mut config = AuthConfig::with_secret("test-signing-secret");
        config.access_ttl = Duration::ZERO;
        let service = service_with(config);

        let pair = service.issue(&runner()).unwrap();
        std::thread::sleep(Duration::from_millis(1200));

        assert!(matches!(
            service.validate(&pair.access_token, TokenKind::Access),
            Err(AuthError::TokenExpired)
        ));
        assert!(service.validate(&pair.refresh_token, TokenKind::Refresh).is_ok());
    }

    #[test]
    fn token_missing_secret_fails_before_signing() {
        let result = TokenService::new(
            AuthConfig::with_secret(""),
            Arc::new(InMemoryRevocationStore::new()),
        );
        assert!(matches!(result, Err(AuthError::Configuration(_))));
    }

    #[test]
    fn header_extraction_is_a_pure_parse() {
        assert_eq!(extract_from_header(None), None);
        assert_eq!(extract_from_header(Some("")), None);
        assert_eq!(extract_from_header(Some("Basic xyz")), None);
        assert_eq!(extract_from_header(Some("Bearer")), None);
        assert_eq!(extract_from_header(Some("Bearer a b")), None);
        assert_eq!(extract_from_header(Some("bearer token")), None);
        assert_eq!(extract_from_header(Some("Bearer token")), Some("token"));
    }
}
