//! Published key records in JWK / JWKS format (RFC 7517, RFC 8037)
//!
//! Only public key material is representable here.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use ed25519_dalek::VerifyingKey;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::keys::generator::PUBLIC_KEY_LEN;
use crate::types::{KeywardError, Result};

/// JWK key type for Ed25519 (octet key pair)
pub const KTY_OKP: &str = "OKP";

/// JWK curve name
pub const CRV_ED25519: &str = "Ed25519";

/// JWS algorithm tag for Ed25519 signatures
pub const ALG_EDDSA: &str = "EdDSA";

/// Intended use of a published key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeyUse {
    /// Signature verification
    #[serde(rename = "sig")]
    Signature,
    /// Encryption
    #[serde(rename = "enc")]
    Encryption,
}

/// A single published public key.
///
/// Immutable once built; fields are only readable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishedKey {
    kty: String,
    crv: String,
    alg: String,
    #[serde(rename = "use")]
    key_use: KeyUse,
    kid: String,
    x: String,
}

impl PublishedKey {
    /// Publish an Ed25519 public key.
    ///
    /// When `kid` is `None` the RFC 7638 thumbprint is used as the key ID.
    pub fn ed25519(verifying_key: &VerifyingKey, kid: Option<String>, key_use: KeyUse) -> Self {
        let x = URL_SAFE_NO_PAD.encode(verifying_key.to_bytes());
        let kid = kid.unwrap_or_else(|| thumbprint(&x));
        Self {
            kty: KTY_OKP.to_string(),
            crv: CRV_ED25519.to_string(),
            alg: ALG_EDDSA.to_string(),
            key_use,
            kid,
            x,
        }
    }

    pub fn kid(&self) -> &str {
        &self.kid
    }

    pub fn key_use(&self) -> KeyUse {
        self.key_use
    }

    pub fn alg(&self) -> &str {
        &self.alg
    }

    /// Base64url public key (`x` parameter)
    pub fn x(&self) -> &str {
        &self.x
    }

    /// Decode the `x` parameter back into a verifying key
    pub fn verifying_key(&self) -> Result<VerifyingKey> {
        if self.kty != KTY_OKP || self.crv != CRV_ED25519 {
            return Err(KeywardError::Internal(format!(
                "Unsupported key type {}/{} for kid {}",
                self.kty, self.crv, self.kid
            )));
        }

        let bytes = URL_SAFE_NO_PAD
            .decode(&self.x)
            .map_err(|e| KeywardError::Internal(format!("Invalid base64url in x: {e}")))?;
        let bytes: [u8; PUBLIC_KEY_LEN] = bytes.try_into().map_err(|b: Vec<u8>| {
            KeywardError::Internal(format!(
                "Invalid key length: expected {} bytes, got {}",
                PUBLIC_KEY_LEN,
                b.len()
            ))
        })?;

        VerifyingKey::from_bytes(&bytes)
            .map_err(|e| KeywardError::Internal(format!("Invalid Ed25519 public key: {e}")))
    }
}

/// JWKS document: `{"keys": [...]}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeySetDocument {
    pub keys: Vec<PublishedKey>,
}

/// RFC 7638 JWK thumbprint of an OKP key, base64url without padding.
///
/// Members are hashed in lexicographic order with no whitespace.
pub fn thumbprint(x: &str) -> String {
    let canonical = format!(r#"{{"crv":"{CRV_ED25519}","kty":"{KTY_OKP}","x":"{x}"}}"#);
    URL_SAFE_NO_PAD.encode(Sha256::digest(canonical.as_bytes()))
}
