use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};

use url::Url;
use zeroize::Zeroize;

const DEFAULT_PORTAL_URL: &str = "http://localhost:3000/induction";
const DEFAULT_TOKEN_TTL_DAYS: i64 = 7;
const DEFAULT_MAX_DOCUMENT_BYTES: usize = 10 * 1024 * 1024;
const DEVELOPMENT_DEFAULT_PASSWORD: &str = "Welcome2Fleet!";

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
    pub onboarding: OnboardingConfig,
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
        let log_format = LogFormat::from_str(
            &env::var("APP_LOG_FORMAT").unwrap_or_else(|_| "compact".to_string()),
        );
        let onboarding = OnboardingConfig::from_env(environment)?;

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig {
                log_level,
                log_format,
            },
            onboarding,
        })
    }
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
    pub log_format: LogFormat,
}

/// Output shape of the tracing subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Compact,
    Json,
}

impl LogFormat {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "json" => Self::Json,
            _ => Self::Compact,
        }
    }
}

/// Knobs for the driver onboarding workflow.
#[derive(Debug, Clone)]
pub struct OnboardingConfig {
    /// Base URL of the public induction form; the token and email are appended as query parameters.
    pub portal_url: String,
    pub token_ttl_days: i64,
    pub max_document_bytes: usize,
    pub default_password: DefaultPassword,
}

impl OnboardingConfig {
    fn from_env(environment: AppEnvironment) -> Result<Self, ConfigError> {
        let portal_url =
            env::var("ONBOARDING_PORTAL_URL").unwrap_or_else(|_| DEFAULT_PORTAL_URL.to_string());
        Url::parse(&portal_url).map_err(|source| ConfigError::InvalidPortalUrl { source })?;

        let token_ttl_days = match env::var("ONBOARDING_TOKEN_TTL_DAYS") {
            Ok(raw) => raw
                .trim()
                .parse::<i64>()
                .ok()
                .filter(|days| *days > 0)
                .ok_or(ConfigError::InvalidTokenTtl)?,
            Err(_) => DEFAULT_TOKEN_TTL_DAYS,
        };

        let max_document_bytes = match env::var("ONBOARDING_MAX_DOCUMENT_BYTES") {
            Ok(raw) => raw
                .trim()
                .parse::<usize>()
                .ok()
                .filter(|bytes| *bytes > 0)
                .ok_or(ConfigError::InvalidDocumentLimit)?,
            Err(_) => DEFAULT_MAX_DOCUMENT_BYTES,
        };

        let default_password = match env::var("ONBOARDING_DEFAULT_PASSWORD") {
            Ok(raw) if !raw.trim().is_empty() => DefaultPassword::new(raw),
            _ if environment == AppEnvironment::Production => {
                return Err(ConfigError::MissingDefaultPassword)
            }
            _ => DefaultPassword::new(DEVELOPMENT_DEFAULT_PASSWORD),
        };

        Ok(Self {
            portal_url,
            token_ttl_days,
            max_document_bytes,
            default_password,
        })
    }
}

impl Default for OnboardingConfig {
    fn default() -> Self {
        Self {
            portal_url: DEFAULT_PORTAL_URL.to_string(),
            token_ttl_days: DEFAULT_TOKEN_TTL_DAYS,
            max_document_bytes: DEFAULT_MAX_DOCUMENT_BYTES,
            default_password: DefaultPassword::new(DEVELOPMENT_DEFAULT_PASSWORD),
        }
    }
}

/// Password assigned to newly approved drivers. Redacted in `Debug` and wiped on drop.
#[derive(Clone)]
pub struct DefaultPassword(String);

impl DefaultPassword {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for DefaultPassword {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("DefaultPassword(**redacted**)")
    }
}

impl Drop for DefaultPassword {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidPortalUrl { source: url::ParseError },
    InvalidTokenTtl,
    InvalidDocumentLimit,
    MissingDefaultPassword,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidPortalUrl { .. } => {
                write!(f, "ONBOARDING_PORTAL_URL must be an absolute URL")
            }
            ConfigError::InvalidTokenTtl => {
                write!(f, "ONBOARDING_TOKEN_TTL_DAYS must be a positive number of days")
            }
            ConfigError::InvalidDocumentLimit => {
                write!(f, "ONBOARDING_MAX_DOCUMENT_BYTES must be a positive byte count")
            }
            ConfigError::MissingDefaultPassword => {
                write!(f, "ONBOARDING_DEFAULT_PASSWORD is required in production")
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidHost { source } => Some(source),
            ConfigError::InvalidPortalUrl { source } => Some(source),
            ConfigError::InvalidPort
            | ConfigError::InvalidTokenTtl
            | ConfigError::InvalidDocumentLimit
            | ConfigError::MissingDefaultPassword => None,
        }
    }
}
