use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};

use crate::housing::{AllocationSettings, PriorityWeights, DEFAULT_MAX_COMMIT_ATTEMPTS};

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
    pub allocation: AllocationSettings,
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
        let production = environment == AppEnvironment::Production;

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig {
                log_level,
                with_target: !production,
                ansi: false,
            },
            allocation: load_allocation()?,
        })
    }
}

fn load_allocation() -> Result<AllocationSettings, ConfigError> {
    let defaults = PriorityWeights::default();

    let max_commit_attempts: u8 = read_number(
        "ALLOC_MAX_COMMIT_ATTEMPTS",
        DEFAULT_MAX_COMMIT_ATTEMPTS,
    )?;
    if max_commit_attempts == 0 {
        return Err(ConfigError::InvalidNumber {
            key: "ALLOC_MAX_COMMIT_ATTEMPTS",
            value: "0".to_string(),
        });
    }

    let weights = PriorityWeights {
        year1: read_number("ALLOC_PRIORITY_YEAR1", defaults.year1)?,
        year2_3: read_number("ALLOC_PRIORITY_YEAR2_3", defaults.year2_3)?,
        year4_plus: read_number("ALLOC_PRIORITY_YEAR4_PLUS", defaults.year4_plus)?,
        per_completed_residency: read_number(
            "ALLOC_PRIORITY_PER_RESIDENCY_YEAR",
            defaults.per_completed_residency,
        )?,
        continuity_bonus: read_number("ALLOC_PRIORITY_CONTINUITY", defaults.continuity_bonus)?,
    };
    if !weights.is_monotonic() {
        return Err(ConfigError::NonMonotonicPriority {
            year1: weights.year1,
            year2_3: weights.year2_3,
            year4_plus: weights.year4_plus,
        });
    }

    Ok(AllocationSettings {
        max_commit_attempts,
        weights,
    })
}

fn read_number<T: std::str::FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|_| ConfigError::InvalidNumber { key, value: raw }),
        Err(_) => Ok(default),
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

/// Tracing controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
    pub with_target: bool,
    pub ansi: bool,
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidNumber { key: &'static str, value: String },
    NonMonotonicPriority { year1: u32, year2_3: u32, year4_plus: u32 },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidNumber { key, value } => {
                write!(f, "{key} must be a positive integer, got '{value}'")
            }
            ConfigError::NonMonotonicPriority {
                year1,
                year2_3,
                year4_plus,
            } => write!(
                f,
                "priority weights must increase with seniority, got {year1}/{year2_3}/{year4_plus}"
            ),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidHost { source } => Some(source),
            ConfigError::InvalidPort
            | ConfigError::InvalidNumber { .. }
            | ConfigError::NonMonotonicPriority { .. } => None,
        }
    }
}
