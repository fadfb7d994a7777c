//! HTTP server for Keyward

pub mod http;

pub use http::{route, run, AppState};
