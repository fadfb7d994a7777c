//! Keyward - signing key lifecycle and public key publication
//!
//! Keyward generates one Ed25519 signing key per process on first use,
//! hands the private half to the token-issuing path, and publishes the
//! public half as a JWKS document that relying parties fetch to verify
//! issued tokens.
//!
//! ## Components
//!
//! - **Keys**: generation, key set store, verification resolver, manager
//! - **Auth**: EdDSA token issuing and verification
//! - **Routes**: `/keys` publication endpoint and health probes

pub mod auth;
pub mod config;
pub mod keys;
pub mod routes;
pub mod server;
pub mod types;

pub use config::Args;
pub use keys::KeyManager;
pub use server::{run, AppState};
pub use types::{KeywardError, Result};
