//! Field-level authenticated encryption
//!
//! Confidentiality and integrity for sensitive field values before they
//! reach the persistence layer. ChaCha20-Poly1305 with a fresh random
//! nonce per call; a fixed context string is bound as additional
//! authenticated data so ciphertext cannot be silently repurposed in
//! another context.

use std::fmt;

use base64::{engine::general_purpose, Engine as _};
use chacha20poly1305::aead::{Aead, KeyInit, Payload};
use chacha20poly1305::{ChaCha20Poly1305, Nonce};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use subtle::ConstantTimeEq;
use tracing::warn;

use crate::config::AuthConfig;
use crate::{AuthError, Result};

/// Context bound as AAD to every field ciphertext.
const FIELD_CONTEXT: &[u8] = b"stridelog.field.v1";
/// Derivation context for the non-production fallback key.
const DEV_KEY_CONTEXT: &str = "stridelog 2025 field encryption dev key";

pub const KEY_LEN: usize = 32;
pub const NONCE_LEN: usize = 12;
pub const TAG_LEN: usize = 16;

/// A 256-bit symmetric field-encryption key.
#[derive(Clone)]
pub struct EncryptionKey([u8; KEY_LEN]);

impl EncryptionKey {
    /// Create from raw bytes.
    pub const fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self(bytes)
    }

    /// Generate a new random key.
    pub fn generate() -> Self {
        let mut bytes = [0u8; KEY_LEN];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Parse configured key material.
    ///
    /// Accepts hex or base64 (standard or url-safe, unpadded) that
    /// decodes to exactly the cipher's key length.
    pub fn from_material(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();

        if trimmed.len() == KEY_LEN * 2 && trimmed.chars().all(|c| c.is_ascii_hexdigit()) {
            if let Ok(bytes) = hex::decode(trimmed) {
                if let Ok(key) = <[u8; KEY_LEN]>::try_from(bytes.as_slice()) {
                    return Ok(Self(key));
                }
            }
        }

        if let Ok(bytes) = general_purpose::STANDARD.decode(trimmed) {
            if let Ok(key) = <[u8; KEY_LEN]>::try_from(bytes.as_slice()) {
                return Ok(Self(key));
            }
        }

        if let Ok(bytes) = general_purpose::URL_SAFE_NO_PAD.decode(trimmed) {
            if let Ok(key) = <[u8; KEY_LEN]>::try_from(bytes.as_slice()) {
                return Ok(Self(key));
            }
        }

        Err(AuthError::Configuration(format!(
            "encryption key must decode to exactly {} bytes",
            KEY_LEN
        )))
    }

    /// Deterministic key for non-production environments, so development
    /// setups need no key provisioning.
    pub fn derive_dev_key() -> Self {
        Self(blake3::derive_key(DEV_KEY_CONTEXT, b"stridelog-dev"))
    }

    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }
}

impl PartialEq for EncryptionKey {
    fn eq(&self, other: &Self) -> bool {
        self.0.ct_eq(&other.0).into()
    }
}

impl Eq for EncryptionKey {}

impl fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncryptionKey").finish_non_exhaustive()
    }
}

/// Constant-time comparison for secrets and credentials.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.ct_eq(b).into()
}

/// Self-describing encrypted field value, all parts hex-encoded.
///
/// Decrypting with the wrong key or a tampered tag fails closed; no
/// partial plaintext is ever returned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedBlob {
    pub ciphertext: String,
    pub nonce: String,
    pub auth_tag: String,
    pub encrypted: bool,
}

/// Encrypts and decrypts sensitive field values under a single key.
#[derive(Clone)]
pub struct FieldCipher {
    key: EncryptionKey,
}

impl FieldCipher {
    pub fn new(key: EncryptionKey) -> Self {
        Self { key }
    }

    /// Build from configuration: explicit key material when present,
    /// a derived key outside production, an error otherwise.
    pub fn from_config(config: &AuthConfig) -> Result<Self> {
        match &config.encryption_key {
            Some(raw) => Ok(Self::new(EncryptionKey::from_material(raw)?)),
            None if config.production => Err(AuthError::Configuration(
                "encryption key is required in production".to_string(),
            )),
            None => Ok(Self::new(EncryptionKey::derive_dev_key())),
        }
    }

    /// Encrypt a single value under a fresh random nonce.
    pub fn encrypt(&self, plaintext: &str) -> Result<EncryptedBlob> {
        let cipher = ChaCha20Poly1305::new_from_slice(self.key.as_bytes())
            .map_err(|e| AuthError::Internal(format!("cipher init failed: {}", e)))?;

        let mut nonce_bytes = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let sealed = cipher
            .encrypt(
                nonce,
                Payload {
                    msg: plaintext.as_bytes(),
                    aad: FIELD_CONTEXT,
                },
            )
            .map_err(|_| AuthError::Internal("field encryption failed".to_string()))?;

        let split = sealed.len() - TAG_LEN;
        Ok(EncryptedBlob {
            ciphertext: hex::encode(&sealed[..split]),
            nonce: hex::encode(nonce_bytes),
            auth_tag: hex::encode(&sealed[split..]),
            encrypted: true,
        })
    }

    /// Decrypt a single value. Fails closed on tampering or wrong key.
    pub fn decrypt(&self, blob: &EncryptedBlob) -> Result<String> {
        let ciphertext = hex::decode(&blob.ciphertext)
            .map_err(|_| AuthError::Decryption("invalid ciphertext encoding".to_string()))?;
        let nonce_bytes = hex::decode(&blob.nonce)
            .map_err(|_| AuthError::Decryption("invalid nonce encoding".to_string()))?;
        let tag = hex::decode(&blob.auth_tag)
            .map_err(|_| AuthError::Decryption("invalid tag encoding".to_string()))?;

        if nonce_bytes.len() != NONCE_LEN || tag.len() != TAG_LEN {
            return Err(AuthError::Decryption(
                "nonce or tag has the wrong length".to_string(),
            ));
        }

        let cipher = ChaCha20Poly1305::new_from_slice(self.key.as_bytes())
            .map_err(|e| AuthError::Internal(format!("cipher init failed: {}", e)))?;

        let mut sealed = ciphertext;
        sealed.extend_from_slice(&tag);

        let plaintext = cipher
            .decrypt(
                Nonce::from_slice(&nonce_bytes),
                Payload {
                    msg: &sealed,
                    aad: FIELD_CONTEXT,
                },
            )
            .map_err(|_| AuthError::Decryption("authentication failed".to_string()))?;

        String::from_utf8(plaintext)
            .map_err(|_| AuthError::Decryption("plaintext is not valid UTF-8".to_string()))
    }

    /// Encrypt the named string fields of a JSON record in place.
    ///
    /// Absent and null fields are left untouched; so are non-string
    /// values, since the sensitive running-log fields are all text.
    pub fn encrypt_fields(&self, record: &mut Value, fields: &[&str]) -> Result<()> {
        let Some(map) = record.as_object_mut() else {
            return Ok(());
        };
        for name in fields {
            let plaintext = match map.get(*name) {
                Some(Value::String(s)) => s.clone(),
                _ => continue,
            };
            let blob = self.encrypt(&plaintext)?;
            map.insert((*name).to_string(), serde_json::to_value(blob)?);
        }
        Ok(())
    }

    /// Decrypt the named fields of a JSON record in place.
    ///
    /// A field that fails to decrypt is logged and left in its encrypted
    /// state while the rest of the record proceeds; callers must treat
    /// the result as possibly partially decrypted.
    pub fn decrypt_fields(&self, record: &mut Value, fields: &[&str]) {
        let Some(map) = record.as_object_mut() else {
            return;
        };
        for name in fields {
            let Some(value) = map.get(*name) else {
                continue;
            };
            let Ok(blob) = serde_json::from_value::<EncryptedBlob>(value.clone()) else {
                continue;
            };
            if !blob.encrypted {
                continue;
            }
            match self.decrypt(&blob) {
                Ok(plaintext) => {
                    map.insert((*name).to_string(), Value::String(plaintext));
                }
                Err(err) => {
                    warn!(
                        component = "crypto",
                        operation = "decrypt_fields",
                        field = *name,
                        error = %err,
                        "field left encrypted"
                    );
                }
            }
        }
    }
}

impl fmt::Debug for FieldCipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldCipher").finish_non_exhaustive()
    }
}
