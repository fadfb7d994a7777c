//! Key pair generation.
//!
//! # Algorithm
//!
//! - **Key Generation**: Ed25519, seeded from the OS CSPRNG
//! - **Token algorithm**: EdDSA (JWS `alg` tag)
//!
//! The seed is drawn with `try_fill_bytes`, so an unavailable randomness
//! source surfaces as `KeyInitialization` rather than a panic.

use std::fmt;

use ed25519_dalek::{SigningKey, VerifyingKey};
use rand::rngs::OsRng;
use rand::RngCore;
use zeroize::Zeroizing;

use crate::types::{KeywardError, Result};

// =============================================================================
// Constants
// =============================================================================

/// Ed25519 private key (seed) length (32 bytes)
pub const PRIVATE_KEY_LEN: usize = 32;

/// Ed25519 public key length (32 bytes)
pub const PUBLIC_KEY_LEN: usize = 32;

// =============================================================================
// Signing Key Pair
// =============================================================================

/// An Ed25519 signing key pair.
///
/// The public half is always derived from the private half, so the two can
/// never come from different generations. The private key is zeroized on drop
/// by `ed25519-dalek` and is never printed.
#[derive(Clone)]
pub struct SigningKeyPair {
    signing_key: SigningKey,
    verifying_key: VerifyingKey,
}

impl SigningKeyPair {
    /// Build a key pair from a private key.
    pub fn from_signing_key(signing_key: SigningKey) -> Self {
        let verifying_key = signing_key.verifying_key();
        Self {
            signing_key,
            verifying_key,
        }
    }

    /// Build a key pair from a 32-byte seed.
    pub fn from_seed(seed: &[u8; PRIVATE_KEY_LEN]) -> Self {
        Self::from_signing_key(SigningKey::from_bytes(seed))
    }

    pub fn signing_key(&self) -> &SigningKey {
        &self.signing_key
    }

    pub fn verifying_key(&self) -> VerifyingKey {
        self.verifying_key
    }

    /// Raw public key bytes (the only half ever serialized)
    pub fn public_key_bytes(&self) -> [u8; PUBLIC_KEY_LEN] {
        self.verifying_key.to_bytes()
    }
}

impl fmt::Debug for SigningKeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningKeyPair")
            .field("verifying_key", &self.verifying_key)
            .field("signing_key", &"<redacted>")
            .finish()
    }
}

// =============================================================================
// Key Sources
// =============================================================================

/// Produces fresh signing key pairs.
///
/// The manager calls this at most once per successful initialization.
pub trait KeySource: Send + Sync {
    fn generate(&self) -> Result<SigningKeyPair>;
}

/// Key source backed by the operating system's secure random number generator.
#[derive(Debug, Default, Clone, Copy)]
pub struct OsRngKeySource;

impl KeySource for OsRngKeySource {
    fn generate(&self) -> Result<SigningKeyPair> {
        let mut seed = Zeroizing::new([0u8; PRIVATE_KEY_LEN]);
        OsRng.try_fill_bytes(seed.as_mut_slice()).map_err(|e| {
            KeywardError::KeyInitialization(format!("Randomness source failed: {e}"))
        })?;
        Ok(SigningKeyPair::from_seed(&seed))
    }
}

/// Generate a new Ed25519 signing key pair from the OS RNG.
pub fn generate_keypair() -> Result<SigningKeyPair> {
    OsRngKeySource.generate()
}
