/// Configuration management for the auth service
use crate::error::{AuthError, AuthResult};
use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

/// Main server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub service: ServiceConfig,
    pub storage: StorageConfig,
    pub tokens: TokenConfig,
    pub google: Option<GoogleConfig>,
    pub lockout: LockoutPolicy,
    pub otp: OtpConfig,
    pub email: Option<EmailConfig>,
    pub cookies: CookieConfig,
    pub logging: LoggingConfig,
}

/// Service-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub hostname: String,
    pub port: u16,
    pub frontend_url: String,
    /// Fixed delay inserted into login failure paths
    pub failure_delay_ms: u64,
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub database_path: PathBuf,
}

/// Signing secrets and lifetimes for issued tokens
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenConfig {
    pub access_secret: String,
    pub refresh_secret: String,
    pub access_ttl_minutes: i64,
    pub refresh_ttl_days: i64,
}

impl TokenConfig {
    pub fn access_ttl(&self) -> Duration {
        Duration::minutes(self.access_ttl_minutes)
    }

    pub fn refresh_ttl(&self) -> Duration {
        Duration::days(self.refresh_ttl_days)
    }
}

/// Google sign-in configuration; absent means the feature is disabled
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GoogleConfig {
    pub client_id: String,
    pub jwks_url: String,
}

/// Brute-force lockout thresholds
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct LockoutPolicy {
    pub max_attempts: u32,
    pub lockout_minutes: i64,
    pub reset_window_minutes: i64,
}

impl Default for LockoutPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            lockout_minutes: 15,
            reset_window_minutes: 30,
        }
    }
}

impl LockoutPolicy {
    pub fn lockout_duration(&self) -> Duration {
        Duration::minutes(self.lockout_minutes)
    }

    pub fn reset_window(&self) -> Duration {
        Duration::minutes(self.reset_window_minutes)
    }
}

/// One-time code configuration
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct OtpConfig {
    pub ttl_minutes: i64,
}

impl Default for OtpConfig {
    fn default() -> Self {
        Self { ttl_minutes: 15 }
    }
}

/// Email configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailConfig {
    pub smtp_url: String,
    pub from_address: String,
}

/// Auth cookie attributes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CookieConfig {
    pub secure: bool,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub json: bool,
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> AuthResult<T> {
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| AuthError::BadInput(format!("Invalid value for {}", key))),
        Err(_) => Ok(default),
    }
}

impl ServerConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> AuthResult<Self> {
        dotenv::dotenv().ok();

        let hostname = env::var("AUTH_HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port = env_parse("AUTH_PORT", 4000u16)?;
        let frontend_url =
            env::var("FRONTEND_URL").unwrap_or_else(|_| "http://localhost:3000".to_string());
        let failure_delay_ms = env_parse("AUTH_FAILURE_DELAY_MS", 100u64)?;

        let database_path = env::var("AUTH_DATABASE_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./data/auth.sqlite"));

        let access_secret = env::var("JWT_SECRET")
            .map_err(|_| AuthError::BadInput("JWT_SECRET is required".to_string()))?;
        let refresh_secret = env::var("JWT_REFRESH_SECRET")
            .map_err(|_| AuthError::BadInput("JWT_REFRESH_SECRET is required".to_string()))?;
        let access_ttl_minutes = env_parse("ACCESS_TOKEN_TTL_MINUTES", 15i64)?;
        let refresh_ttl_days = env_parse("REFRESH_TOKEN_TTL_DAYS", 7i64)?;

        let google = env::var("GOOGLE_CLIENT_ID")
            .ok()
            .filter(|id| !id.trim().is_empty())
            .map(|client_id| GoogleConfig {
                client_id,
                jwks_url: env::var("GOOGLE_JWKS_URL").unwrap_or_else(|_| {
                    "https://www.googleapis.com/oauth2/v3/certs".to_string()
                }),
            });

        let defaults = LockoutPolicy::default();
        let lockout = LockoutPolicy {
            max_attempts: env_parse("LOCKOUT_MAX_ATTEMPTS", defaults.max_attempts)?,
            lockout_minutes: env_parse("LOCKOUT_DURATION_MINUTES", defaults.lockout_minutes)?,
            reset_window_minutes: env_parse(
                "LOCKOUT_RESET_WINDOW_MINUTES",
                defaults.reset_window_minutes,
            )?,
        };

        let otp = OtpConfig {
            ttl_minutes: env_parse("OTP_TTL_MINUTES", OtpConfig::default().ttl_minutes)?,
        };

        let email = if let Ok(smtp_url) = env::var("SMTP_URL") {
            Some(EmailConfig {
                smtp_url,
                from_address: env::var("EMAIL_FROM_ADDRESS")
                    .unwrap_or_else(|_| format!("noreply@{}", hostname)),
            })
        } else {
            None
        };

        let cookies = CookieConfig {
            secure: env_parse("COOKIE_SECURE", true)?,
        };

        let logging = LoggingConfig {
            level: env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
            json: env::var("LOG_FORMAT")
                .map(|f| f.eq_ignore_ascii_case("json"))
                .unwrap_or(false),
        };

        Ok(ServerConfig {
            service: ServiceConfig {
                hostname,
                port,
                frontend_url,
                failure_delay_ms,
            },
            storage: StorageConfig { database_path },
            tokens: TokenConfig {
                access_secret,
                refresh_secret,
                access_ttl_minutes,
                refresh_ttl_days,
            },
            google,
            lockout,
            otp,
            email,
            cookies,
            logging,
        })
    }

    /// Validate configuration
    pub fn validate(&self) -> AuthResult<()> {
        if self.tokens.access_secret.len() < 32 || self.tokens.refresh_secret.len() < 32 {
            return Err(AuthError::BadInput(
                "JWT secrets must be at least 32 characters".to_string(),
            ));
        }

        if self.tokens.access_secret == self.tokens.refresh_secret {
            return Err(AuthError::BadInput(
                "Access and refresh secrets must differ".to_string(),
            ));
        }

        if self.tokens.access_ttl_minutes <= 0 || self.tokens.refresh_ttl_days <= 0 {
            return Err(AuthError::BadInput(
                "Token lifetimes must be positive".to_string(),
            ));
        }

        if self.lockout.max_attempts == 0 || self.otp.ttl_minutes <= 0 {
            return Err(AuthError::BadInput(
                "Lockout threshold and OTP lifetime must be positive".to_string(),
            ));
        }

        Ok(())
    }

    /// Configuration used by unit and integration tests
    pub fn for_tests() -> Self {
        ServerConfig {
            service: ServiceConfig {
                hostname: "127.0.0.1".to_string(),
                port: 4000,
                frontend_url: "http://localhost:3000".to_string(),
                failure_delay_ms: 0,
            },
            storage: StorageConfig {
                database_path: PathBuf::from(":memory:"),
            },
            tokens: TokenConfig {
                access_secret: "test-access-secret-for-testing-only-0001".to_string(),
                refresh_secret: "test-refresh-secret-for-testing-only-0002".to_string(),
                access_ttl_minutes: 15,
                refresh_ttl_days: 7,
            },
            google: None,
            lockout: LockoutPolicy::default(),
            otp: OtpConfig::default(),
            email: None,
            cookies: CookieConfig { secure: true },
            logging: LoggingConfig {
                level: "info".to_string(),
                json: false,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_accepts_test_config() {
        assert!(ServerConfig::for_tests().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_shared_secret() {
        let mut config = ServerConfig::for_tests();
        config.tokens.refresh_secret = config.tokens.access_secret.clone();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_short_secret() {
        let mut config = ServerConfig::for_tests();
        config.tokens.access_secret = "short".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_lockout_defaults() {
        let policy = LockoutPolicy::default();
        assert_eq!(policy.max_attempts, 5);
        assert_eq!(policy.lockout_duration(), Duration::minutes(15));
        assert_eq!(policy.reset_window(), Duration::minutes(30));
    }
}
