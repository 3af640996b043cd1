//! Server configuration loaded from environment variables.
//!
//! Everything except the token issuer has a default, so a local instance
//! only needs `ISSUER` to start.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use jsonwebtoken::Algorithm;
use pagekeep_shared::constants::{DEFAULT_AVATAR_URL, DEFAULT_HTTP_PORT};

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Socket address for the HTTP API.
    /// Env: `HTTP_ADDR`
    /// Default: `0.0.0.0:3000`
    pub http_addr: SocketAddr,

    /// SQLite database file.
    /// Env: `DATABASE_PATH`, or `DATABASE_URL` with an optional `sqlite://` prefix.
    /// Default: `./pagekeep.db`
    pub database_path: PathBuf,

    /// Trusted token issuer, compared against the `iss` claim.
    /// Env: `ISSUER`
    /// Required.
    pub issuer: Option<String>,

    /// Where the issuer publishes its signing keys.
    /// Env: `JWKS_URL`
    /// Default: `{ISSUER}/.well-known/jwks.json`
    pub jwks_url: Option<String>,

    /// Expected `aud` claim.
    /// Env: `JWT_AUDIENCE`
    /// Default: unset (audience not checked).
    pub audience: Option<String>,

    /// Accepted signing algorithms.
    /// Env: `JWT_ALGORITHMS` (comma separated)
    /// Default: `RS256,ES256`
    pub algorithms: Vec<Algorithm>,

    /// Env: `JWKS_REFRESH_SECS`
    /// Default: 600
    pub jwks_refresh: Duration,

    /// Env: `JWKS_MIN_REFRESH_SECS`
    /// Default: 30
    pub jwks_min_refresh: Duration,

    /// Avatar stored for profiles created without one.
    /// Env: `DEFAULT_AVATAR_URL`
    pub default_avatar_url: String,

    /// Maximum request body size in bytes (2 MiB).
    /// Env: `MAX_BODY_BYTES`
    pub max_body_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: ([0, 0, 0, 0], DEFAULT_HTTP_PORT).into(),
            database_path: PathBuf::from("./pagekeep.db"),
            issuer: None,
            jwks_url: None,
            audience: None,
            algorithms: vec![Algorithm::RS256, Algorithm::ES256],
            jwks_refresh: Duration::from_secs(600),
            jwks_min_refresh: Duration::from_secs(30),
            default_avatar_url: DEFAULT_AVATAR_URL.to_string(),
            max_body_bytes: 2 * 1024 * 1024, // 2 MiB
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(addr) = var("HTTP_ADDR") {
            if let Ok(parsed) = addr.parse::<SocketAddr>() {
                config.http_addr = parsed;
            } else {
                tracing::warn!(value = %addr, "Invalid HTTP_ADDR, using default");
            }
        }

        if let Some(path) = var("DATABASE_PATH") {
            config.database_path = PathBuf::from(path);
        } else if let Some(url) = var("DATABASE_URL") {
            config.database_path = database_path_from_url(&url);
        }

        config.issuer = non_empty(var("ISSUER")).map(|s| s.trim_end_matches('/').to_string());
        config.jwks_url = non_empty(var("JWKS_URL"));
        config.audience = non_empty(var("JWT_AUDIENCE"));

        if let Some(list) = var("JWT_ALGORITHMS") {
            match parse_algorithms(&list) {
                Ok(algs) => config.algorithms = algs,
                Err(e) => tracing::warn!(error = %e, "Invalid JWT_ALGORITHMS, using default"),
            }
        }

        if let Some(secs) = parse_number::<u64>(&var, "JWKS_REFRESH_SECS") {
            config.jwks_refresh = Duration::from_secs(secs);
        }
        if let Some(secs) = parse_number::<u64>(&var, "JWKS_MIN_REFRESH_SECS") {
            config.jwks_min_refresh = Duration::from_secs(secs);
        }

        if let Some(url) = non_empty(var("DEFAULT_AVATAR_URL")) {
            config.default_avatar_url = url;
        }

        if let Some(bytes) = parse_number::<usize>(&var, "MAX_BODY_BYTES") {
            config.max_body_bytes = bytes;
        }

        config
    }

    /// Check settings that have no usable default.
    pub fn validate(&self) -> Result<(), String> {
        if self.issuer.is_none() {
            return Err("ISSUER must be set to the trusted token issuer".into());
        }
        if self.algorithms.is_empty() {
            return Err("JWT_ALGORITHMS must name at least one algorithm".into());
        }
        Ok(())
    }

    /// Key-set URL, derived from the issuer when not set explicitly.
    pub fn jwks_url(&self) -> Option<String> {
        self.jwks_url.clone().or_else(|| {
            self.issuer
                .as_ref()
                .map(|iss| format!("{iss}/.well-known/jwks.json"))
        })
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_number<T: FromStr>(var: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let raw = var(key)?;
    match raw.trim().parse::<T>() {
        Ok(n) => Some(n),
        Err(_) => {
            tracing::warn!(key, value = %raw, "Invalid number, using default");
            None
        }
    }
}

/// `sqlite://data/app.db` and `sqlite:data/app.db` both become `data/app.db`.
fn database_path_from_url(url: &str) -> PathBuf {
    let path = url
        .strip_prefix("sqlite://")
        .or_else(|| url.strip_prefix("sqlite:"))
        .unwrap_or(url);
    PathBuf::from(path)
}

fn parse_algorithms(list: &str) -> Result<Vec<Algorithm>, String> {
    let algs = list
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| Algorithm::from_str(s).map_err(|_| format!("unknown algorithm: {s}")))
        .collect::<Result<Vec<_>, _>>()?;

    if algs.is_empty() {
        return Err("no algorithms listed".into());
    }
    Ok(algs)
}
