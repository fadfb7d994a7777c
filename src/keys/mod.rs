//! Signing key lifecycle and public key publication
//!
//! - `generator`: Ed25519 key pair generation
//! - `jwk`: published key records (JWK / JWKS)
//! - `store`: in-memory key set store
//! - `resolver`: `kid` -> verification key lookup, signature-use keys only
//! - `manager`: once-only initialization and accessors

pub mod generator;
pub mod jwk;
pub mod manager;
pub mod resolver;
pub mod store;

pub use generator::{generate_keypair, KeySource, OsRngKeySource, SigningKeyPair};
pub use jwk::{KeySetDocument, KeyUse, PublishedKey, ALG_EDDSA};
pub use manager::{KeyManager, KeyManagerConfig};
pub use resolver::VerificationResolver;
pub use store::KeySetStore;
