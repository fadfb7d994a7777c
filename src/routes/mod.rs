//! HTTP routes for Keyward

pub mod health;
pub mod keys;

pub use health::{health_check, readiness_check};
pub use keys::{handle_keys, http_date, internal_error_response, parse_http_date};
