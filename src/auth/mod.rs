//! Token issuing and verification for Keyward
//!
//! Provides:
//! - EdDSA JWT generation with the managed signing key
//! - JWT verification through the published key set

pub mod jwt;

pub use jwt::{Claims, TokenInput, TokenIssuer, TokenValidationResult};
