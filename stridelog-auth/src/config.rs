//! Environment-sourced configuration
//!
//! All knobs come in as `STRIDELOG_*` environment variables. Production
//! deployments fail fast on missing secrets; development gets defaults
//! for everything except the signing secret, which is always required.

use std::time::Duration;

use crate::{AuthError, Result};

/// Access tokens default to one hour.
pub const DEFAULT_ACCESS_TTL: Duration = Duration::from_secs(60 * 60);
/// Refresh tokens default to seven days.
pub const DEFAULT_REFRESH_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

pub const DEFAULT_ISSUER: &str = "stridelog";
pub const DEFAULT_AUDIENCE: &str = "stridelog-api";

#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// Secret the token signatures are keyed on. Required.
    pub signing_secret: String,
    pub access_ttl: Duration,
    pub refresh_ttl: Duration,
    pub issuer: String,
    pub audience: String,
    /// Field-encryption key material (hex or base64). Required in
    /// production; a deterministic key is derived otherwise.
    pub encryption_key: Option<String>,
    /// Whether this is a production-designated environment.
    pub production: bool,
}

impl AuthConfig {
    /// Build a config from process environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_vars(|name| std::env::var(name).ok())
    }

    /// Build a config from an arbitrary variable source.
    pub fn from_vars(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let signing_secret = lookup("STRIDELOG_JWT_SECRET").unwrap_or_default();
        if signing_secret.is_empty() {
            return Err(AuthError::Configuration(
                "STRIDELOG_JWT_SECRET is not set".to_string(),
            ));
        }

        let config = AuthConfig {
            signing_secret,
            access_ttl: parse_ttl(lookup("STRIDELOG_ACCESS_TTL_SECS"), DEFAULT_ACCESS_TTL)?,
            refresh_ttl: parse_ttl(lookup("STRIDELOG_REFRESH_TTL_SECS"), DEFAULT_REFRESH_TTL)?,
            issuer: lookup("STRIDELOG_TOKEN_ISSUER").unwrap_or_else(|| DEFAULT_ISSUER.to_string()),
            audience: lookup("STRIDELOG_TOKEN_AUDIENCE")
                .unwrap_or_else(|| DEFAULT_AUDIENCE.to_string()),
            encryption_key: lookup("STRIDELOG_ENCRYPTION_KEY").filter(|k| !k.is_empty()),
            production: lookup("STRIDELOG_ENV").as_deref() == Some("production"),
        };

        config.validate()?;
        Ok(config)
    }

    /// Config with the given secret and defaults for everything else.
    /// Convenient for tests and embedding.
    pub fn with_secret(secret: impl Into<String>) -> Self {
        AuthConfig {
            signing_secret: secret.into(),
            access_ttl: DEFAULT_ACCESS_TTL,
            refresh_ttl: DEFAULT_REFRESH_TTL,
            issuer: DEFAULT_ISSUER.to_string(),
            audience: DEFAULT_AUDIENCE.to_string(),
            encryption_key: None,
            production: false,
        }
    }

    /// Check invariants that must hold before any signing or encryption
    /// is attempted.
    pub fn validate(&self) -> Result<()> {
        if self.signing_secret.is_empty() {
            return Err(AuthError::Configuration(
                "signing secret is not configured".to_string(),
            ));
        }
        if self.production && self.encryption_key.is_none() {
            return Err(AuthError::Configuration(
                "encryption key is required in production".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse_ttl(raw: Option<String>, default: Duration) -> Result<Duration> {
    match raw {
        None => Ok(default),
        Some(s) => {
            let secs: u64 = s.parse().map_err(|_| {
                AuthError::Configuration(format!("invalid TTL value '{}'", s))
            })?;
            Ok(Duration::from_secs(secs))
        }
    }
}
