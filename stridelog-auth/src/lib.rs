//! Session-token and field-encryption core for stridelog
//!
//! This crate implements the security plane of the stridelog running
//! log:
//! - HMAC-signed access/refresh session tokens with issuance and
//!   ordered validation
//! - An injected revocation registry that forgets entries at their
//!   natural expiry
//! - Authenticated field-level encryption for sensitive values bound to
//!   a fixed usage context
//!
//! Persistence and HTTP transport are collaborators; this crate returns
//! explicit errors and leaves status-code mapping to the boundary.

pub mod config;
pub mod crypto;
pub mod error;
pub mod revocation;
pub mod token;
pub mod types;

pub use config::*;
pub use crypto::*;
pub use error::*;
pub use revocation::*;
pub use token::*;
pub use types::*;

/// Result type alias for stridelog auth operations
pub type Result<T> = std::result::Result<T, AuthError>;
