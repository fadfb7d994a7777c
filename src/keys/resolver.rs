//! Verification Resolver
//!
//! Read-only `kid` -> public key view over the Key Set Store, built once at
//! initialization. Only keys published for signature use are admitted, so a
//! token can never be verified against an encryption key. Lookups are purely
//! in-memory.

use std::collections::HashMap;
use std::fmt;

use ed25519_dalek::VerifyingKey;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, TokenData, Validation};
use serde::de::DeserializeOwned;

use crate::keys::jwk::{KeyUse, PublishedKey};
use crate::keys::store::KeySetStore;
use crate::types::{KeywardError, Result};

struct ResolvedKey {
    verifying_key: VerifyingKey,
    decoding_key: DecodingKey,
}

/// Resolves token key IDs to signature-verification keys
pub struct VerificationResolver {
    keys: HashMap<String, ResolvedKey>,
}

impl VerificationResolver {
    /// Build from the current contents of a store.
    ///
    /// Not updated afterwards: keys written to the store later are not seen.
    pub async fn from_store(store: &KeySetStore) -> Result<Self> {
        Self::from_keys(store.snapshot().await)
    }

    /// Build from published keys, dropping any not marked for signature use.
    pub fn from_keys(keys: impl IntoIterator<Item = PublishedKey>) -> Result<Self> {
        let mut resolved = HashMap::new();

        for key in keys {
            if key.key_use() != KeyUse::Signature {
                continue;
            }

            let verifying_key = key.verifying_key()?;
            let decoding_key = DecodingKey::from_ed_components(key.x()).map_err(|e| {
                KeywardError::Internal(format!("Invalid decoding key for {}: {e}", key.kid()))
            })?;

            resolved.insert(
                key.kid().to_string(),
                ResolvedKey {
                    verifying_key,
                    decoding_key,
                },
            );
        }

        Ok(Self { keys: resolved })
    }

    /// Public key for a `kid`, or `UnknownKey`
    pub fn resolve(&self, kid: &str) -> Result<VerifyingKey> {
        self.keys
            .get(kid)
            .map(|k| k.verifying_key)
            .ok_or_else(|| KeywardError::UnknownKey(kid.to_string()))
    }

    /// jsonwebtoken decoding key for a `kid`, or `UnknownKey`
    pub fn decoding_key(&self, kid: &str) -> Result<&DecodingKey> {
        self.keys
            .get(kid)
            .map(|k| &k.decoding_key)
            .ok_or_else(|| KeywardError::UnknownKey(kid.to_string()))
    }

    /// Verify a compact JWS using the key named in its header.
    ///
    /// Only `EdDSA` tokens carrying a `kid` are accepted.
    pub fn verify<C: DeserializeOwned>(
        &self,
        token: &str,
        validation: &Validation,
    ) -> Result<TokenData<C>> {
        let header = decode_header(token).map_err(jwt_error)?;

        if header.alg != Algorithm::EdDSA {
            return Err(KeywardError::Auth(format!(
                "Unsupported token algorithm: {:?}",
                header.alg
            )));
        }

        let kid = header
            .kid
            .ok_or_else(|| KeywardError::Auth("Token header has no kid".into()))?;
        let key = self.decoding_key(&kid)?;

        decode::<C>(token, key, validation).map_err(jwt_error)
    }

    pub fn contains(&self, kid: &str) -> bool {
        self.keys.contains_key(kid)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

impl fmt::Debug for VerificationResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut kids: Vec<&String> = self.keys.keys().collect();
        kids.sort();
        f.debug_struct("VerificationResolver")
            .field("kids", &kids)
            .finish()
    }
}

fn jwt_error(err: jsonwebtoken::errors::Error) -> KeywardError {
    let msg = match err.kind() {
        ErrorKind::ExpiredSignature => "Token expired",
        ErrorKind::InvalidToken => "Invalid token",
        ErrorKind::InvalidSignature => "Invalid signature",
        ErrorKind::InvalidIssuer => "Invalid issuer",
        ErrorKind::InvalidAlgorithm => "Invalid algorithm",
        _ => "Token validation failed",
    };
    KeywardError::Auth(msg.to_string())
}
