//! Principal persistence collaborator
//!
//! The real store is owned by the persistence layer; this module defines
//! the interface the session service consumes plus an in-memory
//! implementation for single-process deployments and tests. Stores are
//! explicitly constructed and injected, never ambient globals.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::RwLock;
use uuid::Uuid;

use stridelog_auth::{constant_time_eq, AuthError, FieldCipher, Principal};

/// Profile fields encrypted before they reach the store.
pub const SENSITIVE_PROFILE_FIELDS: &[&str] = &["notes", "emergency_contact"];

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("email already registered")]
    EmailTaken,

    #[error(transparent)]
    Auth(#[from] AuthError),
}

/// Request to create a principal.
#[derive(Debug, Clone, Deserialize)]
pub struct NewPrincipal {
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub profile: Value,
}

#[async_trait]
pub trait PrincipalStore: Send + Sync {
    async fn create(&self, new: NewPrincipal) -> Result<Principal, StoreError>;

    async fn find_by_id(&self, id: &str) -> Option<Principal>;

    async fn find_by_email(&self, email: &str) -> Option<Principal>;

    /// Constant-time credential check; `None` for an unknown email or a
    /// wrong password alike.
    async fn verify_password(&self, email: &str, password: &str) -> Option<Principal>;

    /// Decrypted profile for a principal. Fields that fail to decrypt
    /// stay encrypted (see [`FieldCipher::decrypt_fields`]).
    async fn profile(&self, id: &str) -> Option<Value>;
}

struct StoredPrincipal {
    principal: Principal,
    // A production store holds a password hash; the in-memory
    // collaborator keeps the raw credential for tests and demos.
    password: String,
    profile: Value,
}

/// In-memory principal store with field-encrypted profiles.
pub struct MemoryPrincipalStore {
    cipher: Arc<FieldCipher>,
    principals: RwLock<HashMap<String, StoredPrincipal>>,
}

impl MemoryPrincipalStore {
    pub fn new(cipher: Arc<FieldCipher>) -> Self {
        MemoryPrincipalStore {
            cipher,
            principals: RwLock::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl PrincipalStore for MemoryPrincipalStore {
    async fn create(&self, new: NewPrincipal) -> Result<Principal, StoreError> {
        let mut principals = self.principals.write().await;
        if principals
            .values()
            .any(|stored| stored.principal.email == new.email)
        {
            return Err(StoreError::EmailTaken);
        }

        let mut profile = if new.profile.is_null() {
            Value::Object(Default::default())
        } else {
            new.profile
        };
        self.cipher
            .encrypt_fields(&mut profile, SENSITIVE_PROFILE_FIELDS)?;

        let principal = Principal::new(Uuid::new_v4().to_string(), new.email);
        principals.insert(
            principal.id.clone(),
            StoredPrincipal {
                principal: principal.clone(),
                password: new.password,
                profile,
            },
        );
        Ok(principal)
    }

    async fn find_by_id(&self, id: &str) -> Option<Principal> {
        self.principals
            .read()
            .await
            .get(id)
            .map(|stored| stored.principal.clone())
    }

    async fn find_by_email(&self, email: &str) -> Option<Principal> {
        self.principals
            .read()
            .await
            .values()
            .find(|stored| stored.principal.email == email)
            .map(|stored| stored.principal.clone())
    }

    async fn verify_password(&self, email: &str, password: &str) -> Option<Principal> {
        let principals = self.principals.read().await;
        let stored = principals
            .values()
            .find(|stored| stored.principal.email == email)?;
        if constant_time_eq(stored.password.as_bytes(), password.as_bytes()) {
            Some(stored.principal.clone())
        } else {
            None
        }
    }

    async fn profile(&self, id: &str) -> Option<Value> {
        let mut profile = self.principals.read().await.get(id)?.profile.clone();
        self.cipher
            .decrypt_fields(&mut profile, SENSITIVE_PROFILE_FIELDS);
        Some(profile)
    }
}
