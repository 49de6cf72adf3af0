use anyhow::{Context, Result};
use std::env;

#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub errors: ErrorConfig,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub instance_id: String,
}

/// How errors are rendered to clients
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ErrorConfig {
    /// Development mode: expose stack traces in error bodies.
    ///
    /// Stacks name functions only while the binary keeps its symbol table;
    /// a fully stripped build renders every frame as `<unknown>`.
    pub include_stack: bool,
}

impl ErrorConfig {
    /// `override_flag` (ERROR_INCLUDE_STACK) wins over the environment name
    pub fn resolve(app_env: Option<&str>, override_flag: Option<&str>) -> Result<Self> {
        let include_stack = match override_flag {
            Some(flag) => flag
                .trim()
                .parse::<bool>()
                .context("ERROR_INCLUDE_STACK must be true or false")?,
            None => app_env
                .map(|name| name.trim().eq_ignore_ascii_case("development"))
                .unwrap_or(false),
        };

        Ok(Self { include_stack })
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        // Load .env file if it exists
        dotenvy::dotenv().ok();

        Ok(Config {
            server: ServerConfig {
                host: env::var("API_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                port: env::var("API_PORT")
                    .unwrap_or_else(|_| "8080".to_string())
                    .parse()
                    .context("API_PORT must be a valid port number")?,
                // Used only for debugging/observability. If unset, fall back to HOSTNAME if
                // present (e.g. Docker/Kubernetes), otherwise "unknown".
                instance_id: env::var("INSTANCE_ID")
                    .or_else(|_| env::var("HOSTNAME"))
                    .unwrap_or_else(|_| "unknown".to_string()),
            },
            errors: ErrorConfig::resolve(
                env::var("APP_ENV").ok().as_deref(),
                env::var("ERROR_INCLUDE_STACK").ok().as_deref(),
            )?,
        })
    }

    pub fn server_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}
