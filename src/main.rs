//! Keyward - signing key lifecycle and JWKS publication

use clap::Parser;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use keyward::{
    config::Args,
    keys::{KeyManager, KeyManagerConfig},
    server::{self, AppState},
    KeywardError,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    let args = Args::parse();

    // Initialize tracing/logging
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("keyward={},info", args.log_level).into());
    let registry = tracing_subscriber::registry().with(filter);
    if args.json_logs() {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }

    if let Err(e) = args.validate().map_err(KeywardError::Config) {
        error!("{}", e);
        std::process::exit(1);
    }

    info!("======================================");
    info!("  Keyward - signing key publication");
    info!("======================================");
    info!("Node ID: {}", args.node_id);
    info!("Listen: {}", args.listen);
    info!(
        "Key ID: {}",
        args.key_id.as_deref().unwrap_or("(JWK thumbprint)")
    );
    info!("Key set max-age: {}s", args.keys_max_age_seconds);
    info!("Key generation: {}", if args.eager_keys { "EAGER" } else { "LAZY" });
    info!("======================================");

    let keys = Arc::new(KeyManager::new(KeyManagerConfig::from_args(&args)));

    if args.eager_keys {
        if let Err(e) = keys.ensure_initialized().await {
            error!("Signing key generation failed: {}", e);
            std::process::exit(1);
        }
    }

    let state = Arc::new(AppState::with_key_manager(args, keys));

    tokio::select! {
        result = server::run(state) => result?,
        _ = tokio::signal::ctrl_c() => {
            warn!("Shutdown signal received");
        }
    }

    info!("Keyward stopped");
    Ok(())
}
