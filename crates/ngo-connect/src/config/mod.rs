use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::ops::RangeInclusive;
use std::time::Duration;

const DEV_SESSION_SECRET: &str = "ngo-connect-development-session-secret";
const DEV_WEBHOOK_SECRET: &str = "ngo-connect-development-webhook-secret";
const MIN_SECRET_BYTES: usize = 32;
const MAX_SESSION_TTL_MINUTES: u64 = 60 * 24 * 30;
const MAX_PERIOD_DAYS: u64 = 366;

/// Distinguishes runtime behavior for different stages of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Test,
    Production,
}

impl AppEnvironment {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            "test" | "ci" => Self::Test,
            _ => Self::Development,
        }
    }
}

/// Top-level configuration for the application.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub auth: AuthConfig,
    pub billing: BillingConfig,
    pub payments: PaymentConfig,
    pub admin_seed: Option<AdminSeed>,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(
            &env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
        );

        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort)?;

        let log_level = env::var("APP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let session_secret = secret_var("APP_SESSION_SECRET", environment, DEV_SESSION_SECRET)?;
        let webhook_secret =
            secret_var("APP_PAYMENT_WEBHOOK_SECRET", environment, DEV_WEBHOOK_SECRET)?;

        let ttl_minutes =
            bounded_var("APP_SESSION_TTL_MINUTES", 1440, 1..=MAX_SESSION_TTL_MINUTES)?;
        let session_ttl = ttl_minutes
            .checked_mul(60)
            .map(Duration::from_secs)
            .ok_or(ConfigError::InvalidNumber {
                var: "APP_SESSION_TTL_MINUTES",
            })?;
        let plus_month_cents = number_var("APP_PLUS_PRICE_CENTS", 900)?;
        let period_days = bounded_var("APP_PLUS_PERIOD_DAYS", 30, 1..=MAX_PERIOD_DAYS)?;

        let admin_seed = match (
            env::var("APP_ADMIN_EMAIL"),
            env::var("APP_ADMIN_PASSWORD_HASH"),
        ) {
            (Ok(email), Ok(password_hash)) => Some(AdminSeed {
                email,
                password_hash,
            }),
            _ => None,
        };

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig { log_level },
            auth: AuthConfig {
                session_secret,
                session_ttl,
            },
            billing: BillingConfig {
                plus_month_cents,
                period_days,
            },
            payments: PaymentConfig { webhook_secret },
            admin_seed,
        })
    }
}

fn number_var(name: &'static str, default: u64) -> Result<u64, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<u64>()
            .map_err(|_| ConfigError::InvalidNumber { var: name }),
        Err(_) => Ok(default),
    }
}

fn bounded_var(
    name: &'static str,
    default: u64,
    range: RangeInclusive<u64>,
) -> Result<u64, ConfigError> {
    let value = number_var(name, default)?;
    if range.contains(&value) {
        Ok(value)
    } else {
        Err(ConfigError::InvalidNumber { var: name })
    }
}

/// Reads a signing secret. Production must set it; elsewhere a fixed development value
/// stands in.
fn secret_var(
    name: &'static str,
    environment: AppEnvironment,
    development: &str,
) -> Result<Vec<u8>, ConfigError> {
    let secret = match env::var(name) {
        Ok(secret) => secret,
        Err(_) if environment == AppEnvironment::Production => {
            return Err(ConfigError::MissingSecret { var: name })
        }
        Err(_) => development.to_string(),
    };
    if secret.len() < MIN_SECRET_BYTES {
        return Err(ConfigError::WeakSecret {
            var: name,
            min: MIN_SECRET_BYTES,
        });
    }
    Ok(secret.into_bytes())
}

/// Settings controlling the HTTP server binding.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        if self.host.eq_ignore_ascii_case("localhost") {
            return Ok(SocketAddr::new(IpAddr::from([127, 0, 0, 1]), self.port));
        }

        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|source| ConfigError::InvalidHost { source })?;

        Ok(SocketAddr::new(ip, self.port))
    }
}

/// Tracing and metrics controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
}

/// Session signing material.
#[derive(Clone)]
pub struct AuthConfig {
    pub session_secret: Vec<u8>,
    pub session_ttl: Duration,
}

impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthConfig")
            .field("session_secret", &"<redacted>")
            .field("session_ttl", &self.session_ttl)
            .finish()
    }
}

/// Pricing of the paid plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BillingConfig {
    pub plus_month_cents: u64,
    pub period_days: u64,
}

impl Default for BillingConfig {
    fn default() -> Self {
        Self {
            plus_month_cents: 900,
            period_days: 30,
        }
    }
}

/// Shared secret the payment provider signs its callbacks with.
#[derive(Clone)]
pub struct PaymentConfig {
    pub webhook_secret: Vec<u8>,
}

impl fmt::Debug for PaymentConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PaymentConfig")
            .field("webhook_secret", &"<redacted>")
            .finish()
    }
}

/// Administrator account created at startup when both variables are present.
#[derive(Debug, Clone)]
pub struct AdminSeed {
    pub email: String,
    pub password_hash: String,
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidNumber { var: &'static str },
    MissingSecret { var: &'static str },
    WeakSecret { var: &'static str, min: usize },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidNumber { var } => {
                write!(f, "{var} must be an integer within its allowed range")
            }
            ConfigError::MissingSecret { var } => write!(f, "{var} is required in production"),
            ConfigError::WeakSecret { var, min } => {
                write!(f, "{var} must be at least {min} bytes")
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidHost { source } => Some(source),
            _ => None,
        }
    }
}
