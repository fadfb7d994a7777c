//! JWT issuing and verification
//!
//! Tokens are signed with EdDSA using the Key Manager's private key. The
//! header carries the published `kid`, and verification resolves that `kid`
//! through the Verification Resolver, so any relying party holding the
//! published key set can check the same tokens.
//!
//! Security notes:
//! - Only EdDSA tokens with a `kid` are accepted
//! - Default expiry is 1 hour
//! - The private key never leaves the manager; only the jsonwebtoken
//!   encoding key derived from it is used here

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use jsonwebtoken::{encode, Algorithm, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::keys::KeyManager;
use crate::types::{KeywardError, Result};

/// Payload stored in JWT token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Subject the token was issued to
    pub sub: String,
    /// Issuer
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,
    /// Space-separated scopes
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub scope: String,
    /// Issued at (Unix timestamp)
    pub iat: u64,
    /// Expiration time (Unix timestamp)
    pub exp: u64,
}

/// Input for creating a new token
#[derive(Debug, Clone)]
pub struct TokenInput {
    pub subject: String,
    pub scopes: Vec<String>,
}

/// Result of token validation
#[derive(Debug)]
pub struct TokenValidationResult {
    pub valid: bool,
    pub claims: Option<Claims>,
    pub error: Option<String>,
}

impl TokenValidationResult {
    pub fn valid(claims: Claims) -> Self {
        Self {
            valid: true,
            claims: Some(claims),
            error: None,
        }
    }

    pub fn invalid(error: impl Into<String>) -> Self {
        Self {
            valid: false,
            claims: None,
            error: Some(error.into()),
        }
    }
}

/// Issues and verifies tokens with the managed signing key
#[derive(Clone)]
pub struct TokenIssuer {
    keys: Arc<KeyManager>,
    issuer: Option<String>,
    expiry_seconds: u64,
}

impl TokenIssuer {
    pub fn new(keys: Arc<KeyManager>, issuer: Option<String>, expiry_seconds: u64) -> Self {
        Self {
            keys,
            issuer,
            expiry_seconds,
        }
    }

    /// Generate a signed token for a subject
    pub async fn generate_token(&self, input: TokenInput) -> Result<String> {
        let now = unix_now()?;

        let claims = Claims {
            sub: input.subject,
            iss: self.issuer.clone(),
            scope: input.scopes.join(" "),
            iat: now,
            exp: now.checked_add(self.expiry_seconds).ok_or_else(|| {
                KeywardError::Internal(format!(
                    "Token expiry of {}s overflows the timestamp",
                    self.expiry_seconds
                ))
            })?,
        };

        self.sign_claims(&claims).await
    }

    /// Sign arbitrary claims with the current key
    pub async fn sign_claims(&self, claims: &Claims) -> Result<String> {
        let mut header = Header::new(Algorithm::EdDSA);
        header.kid = Some(self.keys.key_id().await?.to_string());

        let key = self.keys.encoding_key().await?;
        encode(&header, claims, key)
            .map_err(|e| KeywardError::Auth(format!("Failed to generate token: {}", e)))
    }

    /// Verify and decode a token
    pub async fn verify_token(&self, token: &str) -> TokenValidationResult {
        let resolver = match self.keys.verification_resolver().await {
            Ok(resolver) => resolver,
            Err(e) => {
                tracing::error!(error = %e, "Verification resolver unavailable");
                return TokenValidationResult::invalid("Verification keys unavailable");
            }
        };

        let mut validation = Validation::new(Algorithm::EdDSA);
        if let Some(ref iss) = self.issuer {
            validation.set_issuer(&[iss]);
        }

        match resolver.verify::<Claims>(token, &validation) {
            Ok(data) => TokenValidationResult::valid(data.claims),
            Err(KeywardError::UnknownKey(_)) => TokenValidationResult::invalid("Unknown signing key"),
            Err(KeywardError::Auth(msg)) => TokenValidationResult::invalid(msg),
            Err(_) => TokenValidationResult::invalid("Token validation failed"),
        }
    }
}

fn unix_now() -> Result<u64> {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .map_err(|e| KeywardError::Internal(format!("System time error: {}", e)))
}
