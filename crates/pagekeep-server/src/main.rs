//! # pagekeep-server
//!
//! HTTP backend for the pagekeep block editor.
//!
//! This binary provides:
//! - **Bearer-token verification** against the identity provider's published
//!   signing keys, cached and refreshed in the background of requests
//! - **Profile and page routes** (axum) whose every database statement runs
//!   inside a transaction scoped to the verified caller
//! - A **health check** for load balancers

mod api;
mod auth;
mod config;
mod error;
mod verifier;

use std::sync::{Arc, Mutex};

use anyhow::Context;
use pagekeep_store::Database;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::api::AppState;
use crate::config::ServerConfig;
use crate::verifier::{HttpKeySource, TokenVerifier, VerifierSettings};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // -----------------------------------------------------------------------
    // 1. Initialize tracing (respects RUST_LOG env var)
    // -----------------------------------------------------------------------
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,pagekeep_server=debug")),
        )
        .init();

    info!("Starting pagekeep server v{}", env!("CARGO_PKG_VERSION"));

    // -----------------------------------------------------------------------
    // 2. Load configuration
    // -----------------------------------------------------------------------
    let config = ServerConfig::from_env();
    config.validate().map_err(anyhow::Error::msg)?;
    info!(?config, "Loaded configuration");

    let issuer = config.issuer.clone().context("ISSUER is not set")?;
    let jwks_url = config.jwks_url().context("no key-set URL configured")?;

    // -----------------------------------------------------------------------
    // 3. Initialize subsystems
    // -----------------------------------------------------------------------
    let db = Database::open_at(&config.database_path)
        .with_context(|| format!("opening {}", config.database_path.display()))?;

    let key_source = HttpKeySource::new(jwks_url.clone())?;
    let verifier = Arc::new(TokenVerifier::new(
        Arc::new(key_source),
        VerifierSettings {
            issuer,
            audience: config.audience.clone(),
            algorithms: config.algorithms.clone(),
            refresh_interval: config.jwks_refresh,
            min_refresh_interval: config.jwks_min_refresh,
        },
    ));

    // Not fatal: the first authenticated request retries the fetch.
    if let Err(e) = verifier.prefetch().await {
        warn!(url = %jwks_url, error = %e, "Could not fetch signing keys at startup");
    }

    let http_addr = config.http_addr;
    let app_state = AppState {
        db: Arc::new(Mutex::new(db)),
        verifier,
        config: Arc::new(config),
    };

    // -----------------------------------------------------------------------
    // 4. Run the HTTP API server (blocks until shutdown)
    // -----------------------------------------------------------------------
    tokio::select! {
        result = api::serve(app_state, http_addr) => {
            if let Err(e) = result {
                tracing::error!(error = %e, "HTTP server failed");
                return Err(e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    Ok(())
}
