//! Configuration for the API gateway
//!
//! Loads settings from environment variables, after an optional `.env` file.
//! Backend targets are optional: a service without a target is simply not
//! registered and requests for it get `400 Service not found`.

use anyhow::{bail, Context, Result};
use std::env;
use std::fmt;
use std::time::Duration;
use tracing::warn;

/// Service names and the variables holding their base URLs
pub const SERVICE_TARGET_VARS: &[(&str, &str)] = &[
    ("users", "USER_URL"),
    ("tasks", "TASKS_URL"),
    ("assignments", "ASSIGNMENTS_URL"),
    ("notifications", "NOTIFICATIONS_URL"),
    ("dashboard", "DASHBOARD_URL"),
];

/// Shortest secret that does not trigger a startup warning
const RECOMMENDED_SECRET_BYTES: usize = 32;

#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub jwt: JwtConfig,
    /// Deadline applied to every upstream call
    pub upstream_timeout: Duration,
    /// `(service name, base URL)` for every configured backend
    pub services: Vec<(String, String)>,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Clone)]
pub struct JwtConfig {
    pub secret: String,
}

impl fmt::Debug for JwtConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JwtConfig")
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let secret = env::var("JWT_SECRET_KEY").context("JWT_SECRET_KEY must be set")?;
        if secret.is_empty() {
            bail!("JWT_SECRET_KEY must not be empty");
        }
        if secret.len() < RECOMMENDED_SECRET_BYTES {
            warn!(
                length = secret.len(),
                "JWT_SECRET_KEY is shorter than {} bytes", RECOMMENDED_SECRET_BYTES
            );
        }

        let port = match env::var("SERVER_PORT") {
            Ok(raw) => raw.parse().context("SERVER_PORT must be a port number")?,
            Err(_) => 8080,
        };

        let timeout_secs: u64 = match env::var("UPSTREAM_TIMEOUT_SECS") {
            Ok(raw) => raw
                .parse()
                .context("UPSTREAM_TIMEOUT_SECS must be a whole number of seconds")?,
            Err(_) => 10,
        };
        if timeout_secs == 0 {
            bail!("UPSTREAM_TIMEOUT_SECS must be greater than zero");
        }

        let services = SERVICE_TARGET_VARS
            .iter()
            .filter_map(|(name, var)| {
                env::var(var)
                    .ok()
                    .filter(|url| !url.trim().is_empty())
                    .map(|url| (name.to_string(), url.trim().to_string()))
            })
            .collect();

        Ok(Self {
            server: ServerConfig {
                host: env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                port,
            },
            jwt: JwtConfig { secret },
            upstream_timeout: Duration::from_secs(timeout_secs),
            services,
        })
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}
