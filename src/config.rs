//! Configuration for Keyward
//!
//! CLI arguments and environment variable handling using clap.

use clap::Parser;
use std::net::SocketAddr;
use uuid::Uuid;

/// Longest accepted explicit key ID
pub const MAX_KEY_ID_LEN: usize = 256;

/// Longest accepted token lifetime (one year)
pub const MAX_JWT_EXPIRY_SECONDS: u64 = 365 * 24 * 60 * 60;

/// Keyward - signing key lifecycle and public key publication
#[derive(Parser, Debug, Clone)]
#[command(name = "keyward")]
#[command(about = "Signing key lifecycle and JWKS publication for an authentication gateway")]
pub struct Args {
    /// Unique node identifier for this instance
    #[arg(long, env = "NODE_ID", default_value_t = Uuid::new_v4())]
    pub node_id: Uuid,

    /// Address to listen on
    #[arg(long, env = "LISTEN", default_value = "0.0.0.0:8080")]
    pub listen: SocketAddr,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Log output format (text, json)
    #[arg(long, env = "LOG_FORMAT", default_value = "text")]
    pub log_format: String,

    /// Key ID to publish the signing key under.
    /// Defaults to the RFC 7638 JWK thumbprint of the public key.
    #[arg(long, env = "KEY_ID")]
    pub key_id: Option<String>,

    /// Cache-Control max-age for the published key set, in seconds
    #[arg(long = "keys-max-age", env = "KEYS_MAX_AGE_SECONDS", default_value = "3600")]
    pub keys_max_age_seconds: u64,

    /// Issuer claim stamped on issued tokens and required on verified ones
    #[arg(long, env = "JWT_ISSUER")]
    pub jwt_issuer: Option<String>,

    /// JWT token expiry in seconds
    #[arg(long, env = "JWT_EXPIRY_SECONDS", default_value = "3600")]
    pub jwt_expiry_seconds: u64,

    /// Generate the signing key at startup instead of on first use
    #[arg(long, env = "EAGER_KEYS", default_value = "false")]
    pub eager_keys: bool,
}

impl Args {
    /// Whether logs should be emitted as JSON
    pub fn json_logs(&self) -> bool {
        self.log_format.eq_ignore_ascii_case("json")
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if let Some(ref kid) = self.key_id {
            if kid.trim().is_empty() {
                return Err("KEY_ID cannot be empty".to_string());
            }
            if kid.len() > MAX_KEY_ID_LEN {
                return Err(format!("KEY_ID too long (max {} chars)", MAX_KEY_ID_LEN));
            }
        }

        if self.keys_max_age_seconds == 0 {
            return Err("KEYS_MAX_AGE_SECONDS must be greater than zero".to_string());
        }

        if self.jwt_expiry_seconds == 0 {
            return Err("JWT_EXPIRY_SECONDS must be greater than zero".to_string());
        }
        if self.jwt_expiry_seconds > MAX_JWT_EXPIRY_SECONDS {
            return Err(format!(
                "JWT_EXPIRY_SECONDS too large (max {})",
                MAX_JWT_EXPIRY_SECONDS
            ));
        }

        if !matches!(self.log_format.to_ascii_lowercase().as_str(), "text" | "json") {
            return Err(format!(
                "LOG_FORMAT must be 'text' or 'json', got '{}'",
                self.log_format
            ));
        }

        Ok(())
    }
}
