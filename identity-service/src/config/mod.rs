use serde::Deserialize;
use service_core::config as core_config;
use service_core::error::AppError;
use std::env;
use std::time::Duration;

/// Minimum length of `TOKEN_HASH_SECRET` (256 bits of key material).
pub const MIN_TOKEN_HASH_SECRET_LEN: usize = 32;

#[derive(Debug, Clone, Deserialize)]
pub struct IdentityConfig {
    #[serde(flatten)]
    pub common: core_config::Config,
    pub environment: Environment,
    pub service_name: String,
    pub service_version: String,
    pub log_level: String,
    pub otlp_endpoint: Option<String>,
    pub database: DatabaseConfig,
    pub jwt: JwtConfig,
    pub tokens: TokenConfig,
    pub app: AppUrlConfig,
    pub smtp: SmtpConfig,
    pub outbox: OutboxConfig,
    pub security: SecurityConfig,
    pub rate_limit: RateLimitConfig,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Dev,
    Prod,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub private_key_path: String,
    pub public_key_path: String,
    pub access_token_expiry_minutes: i64,
    pub refresh_token_expiry_days: i64,
}

#[derive(Clone, Deserialize)]
pub struct TokenConfig {
    pub hash_secret: String,
}

impl std::fmt::Debug for TokenConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenConfig")
            .field("hash_secret", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppUrlConfig {
    /// Public URL of the web front end; email links point here.
    pub public_url: String,
}

#[derive(Clone, Deserialize)]
pub struct SmtpConfig {
    pub enabled: bool,
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub from_email: String,
    pub from_name: String,
}

impl std::fmt::Debug for SmtpConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmtpConfig")
            .field("enabled", &self.enabled)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("from_email", &self.from_email)
            .field("from_name", &self.from_name)
            .finish()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct OutboxConfig {
    pub enabled: bool,
    pub poll_interval_seconds: u64,
    pub batch_size: i64,
    pub max_attempts: i32,
    pub claim_timeout_seconds: u64,
    pub stale_claim_minutes: i64,
}

impl OutboxConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_seconds)
    }

    pub fn claim_timeout(&self) -> Duration {
        Duration::from_secs(self.claim_timeout_seconds)
    }
}

impl Default for OutboxConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            poll_interval_seconds: 30,
            batch_size: 25,
            max_attempts: 3,
            claim_timeout_seconds: 10,
            stale_claim_minutes: 15,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SecurityConfig {
    pub allowed_origins: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    pub register_attempts: u32,
    pub register_window_seconds: u64,
    pub login_attempts: u32,
    pub login_window_seconds: u64,
    pub invite_accept_attempts: u32,
    pub invite_accept_window_seconds: u64,
    pub global_ip_limit: u32,
    pub global_ip_window_seconds: u64,
}

impl IdentityConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let common_config = core_config::Config::load()?;

        let env_str = env::var("ENVIRONMENT").unwrap_or_else(|_| "dev".to_string());
        let environment: Environment = env_str
            .parse()
            .map_err(|e: String| AppError::ConfigError(anyhow::anyhow!(e)))?;

        let is_prod = environment == Environment::Prod;

        let config = IdentityConfig {
            common: common_config,
            environment: environment.clone(),
            service_name: get_env("SERVICE_NAME", Some("identity-service"), is_prod)?,
            service_version: get_env("SERVICE_VERSION", Some(env!("CARGO_PKG_VERSION")), is_prod)?,
            log_level: get_env("LOG_LEVEL", Some("info"), is_prod)?,
            otlp_endpoint: env::var("OTLP_ENDPOINT").ok().filter(|s| !s.is_empty()),
            database: DatabaseConfig {
                url: get_env("DATABASE_URL", None, is_prod)?,
                max_connections: parse_env("DATABASE_MAX_CONNECTIONS", "10", is_prod)?,
                min_connections: parse_env("DATABASE_MIN_CONNECTIONS", "1", is_prod)?,
            },
            jwt: JwtConfig {
                private_key_path: get_env("JWT_PRIVATE_KEY_PATH", None, is_prod)?,
                public_key_path: get_env("JWT_PUBLIC_KEY_PATH", None, is_prod)?,
                access_token_expiry_minutes: parse_env(
                    "JWT_ACCESS_TOKEN_EXPIRY_MINUTES",
                    "15",
                    is_prod,
                )?,
                refresh_token_expiry_days: parse_env("REFRESH_TOKEN_EXPIRY_DAYS", "30", is_prod)?,
            },
            // No default in any environment: a missing secret must stop the boot.
            tokens: TokenConfig {
                hash_secret: get_env("TOKEN_HASH_SECRET", None, true)?,
            },
            app: AppUrlConfig {
                public_url: get_env("APP_PUBLIC_URL", Some("http://localhost:3000"), is_prod)?
                    .trim_end_matches('/')
                    .to_string(),
            },
            smtp: SmtpConfig {
                enabled: parse_env("SMTP_ENABLED", "false", is_prod)?,
                host: get_env("SMTP_HOST", Some("localhost"), is_prod)?,
                port: parse_env("SMTP_PORT", "587", is_prod)?,
                user: get_env("SMTP_USER", Some(""), is_prod)?,
                password: get_env("SMTP_PASSWORD", Some(""), is_prod)?,
                from_email: get_env("SMTP_FROM_EMAIL", Some("no-reply@localhost"), is_prod)?,
                from_name: get_env("SMTP_FROM_NAME", Some("Project Hub"), is_prod)?,
            },
            outbox: OutboxConfig {
                enabled: parse_env("OUTBOX_ENABLED", "true", is_prod)?,
                poll_interval_seconds: parse_env("OUTBOX_POLL_INTERVAL_SECONDS", "30", is_prod)?,
                batch_size: parse_env("OUTBOX_BATCH_SIZE", "25", is_prod)?,
                max_attempts: parse_env("OUTBOX_MAX_ATTEMPTS", "3", is_prod)?,
                claim_timeout_seconds: parse_env("OUTBOX_CLAIM_TIMEOUT_SECONDS", "10", is_prod)?,
                stale_claim_minutes: parse_env("OUTBOX_STALE_CLAIM_MINUTES", "15", is_prod)?,
            },
            security: SecurityConfig {
                allowed_origins: get_env(
                    "ALLOWED_ORIGINS",
                    Some("http://localhost:3000"),
                    is_prod,
                )?
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            },
            rate_limit: RateLimitConfig {
                register_attempts: parse_env("RATE_LIMIT_REGISTER_ATTEMPTS", "5", is_prod)?,
                register_window_seconds: parse_env(
                    "RATE_LIMIT_REGISTER_WINDOW_SECONDS",
                    "3600",
                    is_prod,
                )?,
                login_attempts: parse_env("RATE_LIMIT_LOGIN_ATTEMPTS", "10", is_prod)?,
                login_window_seconds: parse_env("RATE_LIMIT_LOGIN_WINDOW_SECONDS", "900", is_prod)?,
                invite_accept_attempts: parse_env(
                    "RATE_LIMIT_INVITE_ACCEPT_ATTEMPTS",
                    "10",
                    is_prod,
                )?,
                invite_accept_window_seconds: parse_env(
                    "RATE_LIMIT_INVITE_ACCEPT_WINDOW_SECONDS",
                    "3600",
                    is_prod,
                )?,
                global_ip_limit: parse_env("RATE_LIMIT_GLOBAL_IP_LIMIT", "100", is_prod)?,
                global_ip_window_seconds: parse_env(
                    "RATE_LIMIT_GLOBAL_IP_WINDOW_SECONDS",
                    "60",
                    is_prod,
                )?,
            },
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if self.common.port == 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "PORT must be greater than 0"
            )));
        }

        if self.tokens.hash_secret.chars().count() < MIN_TOKEN_HASH_SECRET_LEN {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "TOKEN_HASH_SECRET must be at least {} characters",
                MIN_TOKEN_HASH_SECRET_LEN
            )));
        }

        if self.jwt.access_token_expiry_minutes <= 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "JWT_ACCESS_TOKEN_EXPIRY_MINUTES must be positive"
            )));
        }

        if self.jwt.refresh_token_expiry_days <= 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "REFRESH_TOKEN_EXPIRY_DAYS must be positive"
            )));
        }

        if self.outbox.max_attempts < 1 || self.outbox.batch_size < 1 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "OUTBOX_MAX_ATTEMPTS and OUTBOX_BATCH_SIZE must be at least 1"
            )));
        }

        if self.environment == Environment::Prod {
            if self.security.allowed_origins.iter().any(|o| o == "*") {
                return Err(AppError::ConfigError(anyhow::anyhow!(
                    "Wildcard CORS origin not allowed in production"
                )));
            }

            if !self.smtp.enabled {
                tracing::error!("SMTP is disabled in production; outbox emails will fail and retry");
            }
        }

        Ok(())
    }
}

fn get_env(key: &str, default: Option<&str>, is_prod: bool) -> Result<String, AppError> {
    match env::var(key) {
        Ok(val) => Ok(val),
        Err(_) => {
            if is_prod {
                Err(AppError::ConfigError(anyhow::anyhow!(
                    "{} is required in production but not set",
                    key
                )))
            } else if let Some(def) = default {
                Ok(def.to_string())
            } else {
                Err(AppError::ConfigError(anyhow::anyhow!(
                    "{} is required but not set",
                    key
                )))
            }
        }
    }
}

fn parse_env<T>(key: &str, default: &str, is_prod: bool) -> Result<T, AppError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    let raw = get_env(key, Some(default), is_prod)?;
    raw.trim().parse::<T>().map_err(|e| {
        AppError::ConfigError(anyhow::anyhow!("{} has an invalid value '{}': {}", key, raw, e))
    })
}

impl std::str::FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "dev" => Ok(Environment::Dev),
            "prod" => Ok(Environment::Prod),
            _ => Err(format!("Invalid environment: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    pub(crate) fn sample_config() -> IdentityConfig {
        IdentityConfig {
            common: core_config::Config::default(),
            environment: Environment::Dev,
            service_name: "identity-service-test".to_string(),
            service_version: "0.0.0".to_string(),
            log_level: "debug".to_string(),
            otlp_endpoint: None,
            database: DatabaseConfig {
                url: "postgres://localhost/identity_test".to_string(),
                max_connections: 2,
                min_connections: 1,
            },
            jwt: JwtConfig {
                private_key_path: "/dev/null".to_string(),
                public_key_path: "/dev/null".to_string(),
                access_token_expiry_minutes: 15,
                refresh_token_expiry_days: 30,
            },
            tokens: TokenConfig {
                hash_secret: "0123456789abcdef0123456789abcdef".to_string(),
            },
            app: AppUrlConfig {
                public_url: "http://localhost:3000".to_string(),
            },
            smtp: SmtpConfig {
                enabled: false,
                host: "localhost".to_string(),
                port: 587,
                user: String::new(),
                password: String::new(),
                from_email: "no-reply@localhost".to_string(),
                from_name: "Project Hub".to_string(),
            },
            outbox: OutboxConfig::default(),
            security: SecurityConfig {
                allowed_origins: vec!["http://localhost:3000".to_string()],
            },
            rate_limit: RateLimitConfig {
                register_attempts: 5,
                register_window_seconds: 3600,
                login_attempts: 10,
                login_window_seconds: 900,
                invite_accept_attempts: 10,
                invite_accept_window_seconds: 3600,
                global_ip_limit: 100,
                global_ip_window_seconds: 60,
            },
        }
    }

    #[test]
    fn test_valid_config_passes() {
        assert!(sample_config().validate().is_ok());
    }

    #[test]
    fn test_short_token_secret_is_fatal() {
        let mut config = sample_config();
        config.tokens.hash_secret = "too-short".to_string();
        assert!(matches!(config.validate(), Err(AppError::ConfigError(_))));
    }

    #[test]
    fn test_wildcard_origin_rejected_in_prod() {
        let mut config = sample_config();
        config.environment = Environment::Prod;
        config.smtp.enabled = true;
        config.security.allowed_origins = vec!["*".to_string()];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_secret_is_redacted_in_debug() {
        let config = sample_config();
        let rendered = format!("{:?}", config.tokens);
        assert!(!rendered.contains("0123456789abcdef"));
    }
}
