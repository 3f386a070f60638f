//! Property-based tests for stridelog auth

use proptest::prelude::*;
use std::sync::Arc;
use stridelog_auth::*;

fn cipher() -> FieldCipher {
    FieldCipher::new(EncryptionKey::derive_dev_key())
}

proptest! {
    #[test]
    fn props_encrypt_then_decrypt_returns_same_plaintext(plaintext in any::<String>()) {
        let cipher = cipher();
        let blob = cipher.encrypt(&plaintext).unwrap();
        prop_assert_eq!(cipher.decrypt(&blob).unwrap(), plaintext);
    }

    #[test]
    fn props_identical_plaintexts_produce_distinct_ciphertexts(plaintext in any::<String>()) {
        let cipher = cipher();
        let a = cipher.encrypt(&plaintext).unwrap();
        let b = cipher.encrypt(&plaintext).unwrap();
        prop_assert_ne!(a.nonce, b.nonce);
    }

    #[test]
    fn props_any_byte_flip_fails_closed(
        plaintext in any::<String>(),
        idx in any::<usize>(),
        bit in 0u8..8,
    ) {
        let cipher = cipher();
        let blob = cipher.encrypt(&plaintext).unwrap();

        let mut ciphertext = hex::decode(&blob.ciphertext).unwrap();
        let mut tag = hex::decode(&blob.auth_tag).unwrap();
        let i = idx % (ciphertext.len() + tag.len());
        let mask = 1u8 << bit;

        let mut mutated = blob.clone();
        if i < ciphertext.len() {
            ciphertext[i] ^= mask;
            mutated.ciphertext = hex::encode(&ciphertext);
        } else {
            tag[i - ciphertext.len()] ^= mask;
            mutated.auth_tag = hex::encode(&tag);
        }

        // Never altered plaintext, always a closed failure.
        prop_assert!(cipher.decrypt(&mutated).is_err());
    }

    #[test]
    fn props_header_parse_is_total(header in any::<String>()) {
        if let Some(token) = extract_from_header(Some(&header)) {
            prop_assert!(header.starts_with("Bearer "));
            prop_assert!(!token.is_empty());
        }
    }

    #[test]
    fn props_issue_validate_roundtrip(
        id in "[a-zA-Z0-9_-]{1,24}",
        email in "[a-z0-9.]{1,16}@[a-z]{1,10}\\.[a-z]{2,4}",
    ) {
        let service = TokenService::new(
            AuthConfig::with_secret("property-test-secret"),
            Arc::new(InMemoryRevocationStore::new()),
        )
        .unwrap();

        let principal = Principal::new(id.clone(), email.clone());
        let pair = service.issue(&principal).unwrap();

        let access = service.validate(&pair.access_token, TokenKind::Access).unwrap();
        prop_assert_eq!(access.subject, id);
        prop_assert_eq!(access.email.as_deref(), Some(email.as_str()));
    }
}
