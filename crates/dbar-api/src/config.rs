//! # Service Configuration
//!
//! Everything is read from the environment once at startup. Secrets
//! (hash key, hash IV, admin token, test secret) are redacted from `Debug`.

use std::path::PathBuf;
use std::time::Duration;

use dbar_core::{Credential, TenantId};
use dbar_gateway::GatewayEnvironment;
use thiserror::Error;

/// Which gateway deployment and which storage policy to run with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    /// Live gateway.
    Production,
    /// Gateway stage environment.
    Stage,
    /// Stage gateway, JSON-file store regardless of `DATABASE_URL`.
    Sandbox,
}

impl Environment {
    pub fn gateway(self) -> GatewayEnvironment {
        match self {
            Self::Production => GatewayEnvironment::Production,
            Self::Stage | Self::Sandbox => GatewayEnvironment::Stage,
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "production" | "prod" => Some(Self::Production),
            "stage" | "staging" => Some(Self::Stage),
            "sandbox" => Some(Self::Sandbox),
            _ => None,
        }
    }
}

/// Log output format for the binary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

/// Error reading configuration from the environment.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {var}: {value:?}")]
    InvalidValue { var: &'static str, value: String },
}

/// Application configuration.
#[derive(Clone)]
pub struct AppConfig {
    pub port: u16,
    /// Public origin used to build gateway callback URLs, without trailing slash.
    pub base_url: String,
    pub environment: Environment,
    pub database_url: Option<String>,
    pub db_path: PathBuf,
    /// Static credential, the resolver's fallback. `None` unless complete.
    pub static_credential: Option<Credential>,
    /// Bearer token for `/admin/*`. Admin routes answer 503 when unset.
    pub admin_token: Option<String>,
    /// Enables the webhook test-payload generator when set.
    pub webhook_test_secret: Option<String>,
    pub callback_deadline: Duration,
    pub default_tenant: TenantId,
    pub log_format: LogFormat,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("port", &self.port)
            .field("base_url", &self.base_url)
            .field("environment", &self.environment)
            .field("database_url", &self.database_url.as_ref().map(|_| "[REDACTED]"))
            .field("db_path", &self.db_path)
            .field("static_credential", &self.static_credential)
            .field("admin_token", &self.admin_token.as_ref().map(|_| "[REDACTED]"))
            .field(
                "webhook_test_secret",
                &self.webhook_test_secret.as_ref().map(|_| "[REDACTED]"),
            )
            .field("callback_deadline", &self.callback_deadline)
            .field("default_tenant", &self.default_tenant)
            .field("log_format", &self.log_format)
            .finish()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: 3000,
            base_url: "http://localhost:3000".to_string(),
            environment: Environment::Stage,
            database_url: None,
            db_path: PathBuf::from("db.json"),
            static_credential: None,
            admin_token: None,
            webhook_test_secret: None,
            callback_deadline: Duration::from_millis(4000),
            default_tenant: TenantId::default_tenant(),
            log_format: LogFormat::Pretty,
        }
    }
}

impl AppConfig {
    /// Read configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Read configuration through `lookup`; blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |var: &str| lookup(var).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let defaults = Self::default();

        let port = match get("PORT") {
            Some(v) => v
                .parse()
                .map_err(|_| ConfigError::InvalidValue { var: "PORT", value: v })?,
            None => defaults.port,
        };

        let environment = match get("ENVIRONMENT") {
            Some(v) => Environment::parse(&v).ok_or(ConfigError::InvalidValue {
                var: "ENVIRONMENT",
                value: v,
            })?,
            None => defaults.environment,
        };

        let callback_deadline = match get("CALLBACK_DEADLINE_MS") {
            Some(v) => match v.parse::<u64>() {
                Ok(ms) if ms > 0 => Duration::from_millis(ms),
                _ => {
                    return Err(ConfigError::InvalidValue {
                        var: "CALLBACK_DEADLINE_MS",
                        value: v,
                    })
                }
            },
            None => defaults.callback_deadline,
        };

        let default_tenant = match get("DEFAULT_TENANT") {
            Some(v) => TenantId::new(v.clone()).map_err(|_| ConfigError::InvalidValue {
                var: "DEFAULT_TENANT",
                value: v,
            })?,
            None => defaults.default_tenant,
        };

        let log_format = match get("LOG_FORMAT").as_deref() {
            Some("json") => LogFormat::Json,
            Some("pretty") | None => LogFormat::Pretty,
            Some(other) => {
                return Err(ConfigError::InvalidValue {
                    var: "LOG_FORMAT",
                    value: other.to_string(),
                })
            }
        };

        let merchant_id = get("MERCHANT_ID");
        let hash_key = get("HASH_KEY");
        let hash_iv = get("HASH_IV");
        // A partial static credential is treated as absent; the resolver then
        // fails closed for tenants without a persisted one.
        let static_credential =
            Credential::from_parts(merchant_id.as_deref(), hash_key.as_deref(), hash_iv.as_deref())
                .ok();

        Ok(Self {
            port,
            base_url: get("BASE_URL")
                .map(|u| u.trim_end_matches('/').to_string())
                .unwrap_or(defaults.base_url),
            environment,
            database_url: get("DATABASE_URL"),
            db_path: get("DB_PATH").map(PathBuf::from).unwrap_or(defaults.db_path),
            static_credential,
            admin_token: get("ADMIN_TOKEN"),
            webhook_test_secret: get("WEBHOOK_TEST_SECRET"),
            callback_deadline,
            default_tenant,
            log_format,
        })
    }
}
