//! Process configuration, read once from the environment at startup.

use std::net::SocketAddr;

use thiserror::Error;

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";
const DEV_JWT_SECRET: &str = "dev-secret";
const DEFAULT_RETRY_MAX_ATTEMPTS: u32 = 5;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("BIND_ADDR is not a socket address: {0}")]
    InvalidBindAddr(String),

    #[error("RETRY_MAX_ATTEMPTS must be a positive integer (got {0:?})")]
    InvalidRetryAttempts(String),
}

#[derive(Clone, PartialEq, Eq)]
pub struct ApiConfig {
    pub bind_addr: SocketAddr,
    pub jwt_secret: String,
    pub retry_max_attempts: u32,
    /// Postgres connection string; the event log stays in memory without it.
    pub database_url: Option<String>,
}

impl core::fmt::Debug for ApiConfig {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ApiConfig")
            .field("bind_addr", &self.bind_addr)
            .field("retry_max_attempts", &self.retry_max_attempts)
            .field("database_url", &self.database_url.as_ref().map(|_| "<set>"))
            .finish_non_exhaustive()
    }
}

impl ApiConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; `from_env` passes the process environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let bind_addr = lookup("BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string());
        let bind_addr = bind_addr
            .parse()
            .map_err(|_| ConfigError::InvalidBindAddr(bind_addr))?;

        let jwt_secret = match lookup("JWT_SECRET").filter(|s| !s.is_empty()) {
            Some(secret) => secret,
            None => {
                tracing::warn!("JWT_SECRET not set; using insecure dev default");
                DEV_JWT_SECRET.to_string()
            }
        };

        let retry_max_attempts = match lookup("RETRY_MAX_ATTEMPTS") {
            None => DEFAULT_RETRY_MAX_ATTEMPTS,
            Some(raw) => match raw.trim().parse::<u32>() {
                Ok(n) if n > 0 => n,
                _ => return Err(ConfigError::InvalidRetryAttempts(raw)),
            },
        };

        Ok(Self {
            bind_addr,
            jwt_secret,
            retry_max_attempts,
            database_url: lookup("DATABASE_URL").filter(|s| !s.is_empty()),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config(vars: &[(&str, &str)]) -> Result<ApiConfig, ConfigError> {
        let vars: HashMap<String, String> =
            vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        ApiConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_nothing_is_set() {
        let cfg = config(&[]).unwrap();
        assert_eq!(cfg.bind_addr, "0.0.0.0:8080".parse().unwrap());
        assert_eq!(cfg.jwt_secret, "dev-secret");
        assert_eq!(cfg.retry_max_attempts, 5);
        assert_eq!(cfg.database_url, None);
    }

    #[test]
    fn explicit_values_win() {
        let cfg = config(&[
            ("BIND_ADDR", "127.0.0.1:9000"),
            ("JWT_SECRET", "s3cret"),
            ("RETRY_MAX_ATTEMPTS", "8"),
            ("DATABASE_URL", "postgres://localhost/consignment"),
        ])
        .unwrap();
        assert_eq!(cfg.bind_addr.port(), 9000);
        assert_eq!(cfg.jwt_secret, "s3cret");
        assert_eq!(cfg.retry_max_attempts, 8);
        assert_eq!(cfg.database_url.as_deref(), Some("postgres://localhost/consignment"));
    }

    #[test]
    fn bad_values_are_reported() {
        assert_eq!(
            config(&[("BIND_ADDR", "nowhere")]),
            Err(ConfigError::InvalidBindAddr("nowhere".into()))
        );
        assert_eq!(
            config(&[("RETRY_MAX_ATTEMPTS", "0")]),
            Err(ConfigError::InvalidRetryAttempts("0".into()))
        );
    }

    #[test]
    fn debug_output_hides_secrets() {
        let cfg = config(&[("JWT_SECRET", "s3cret"), ("DATABASE_URL", "postgres://u:p@db/x")]).unwrap();
        let shown = format!("{cfg:?}");
        assert!(!shown.contains("s3cret"));
        assert!(!shown.contains("u:p"));
    }
}
