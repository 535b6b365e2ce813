use std::{env, fmt, net::SocketAddr};

pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:8080";
pub const DEFAULT_DATABASE_URL: &str = "sqlite:jobtrack.db?mode=rwc";

/// Loads environment variables from `.env` when available.
///
/// Missing files are ignored so the function is safe in production builds
/// where dotenv files are not deployed.
pub fn load_env_file() {
    let _ = dotenvy::dotenv();
}

/// Application runtime environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
    Test,
}

impl Environment {
    fn from_str(value: &str) -> Result<Self, ConfigError> {
        match value {
            "development" | "dev" => Ok(Self::Development),
            "production" | "prod" => Ok(Self::Production),
            "test" => Ok(Self::Test),
            other => Err(ConfigError::InvalidEnvironment(other.to_string())),
        }
    }

    /// Returns `true` when the current environment should behave as development.
    pub fn is_development(self) -> bool {
        matches!(self, Self::Development)
    }

    /// Returns the canonical name used for logging labels.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Development => "development",
            Self::Production => "production",
            Self::Test => "test",
        }
    }

    fn default_jwt_secret(self) -> &'static str {
        match self {
            Self::Development | Self::Test => "dev-secret-key",
            Self::Production => "change-me-in-production",
        }
    }

    fn default_access_ttl_secs(self) -> u64 {
        match self {
            // Short-lived tokens in production, an hour elsewhere.
            Self::Production => 900,
            Self::Development | Self::Test => 3600,
        }
    }
}

/// Runtime configuration resolved from environment variables.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    pub environment: Environment,
    pub database_url: String,
    pub jwt_secret: String,
    pub access_ttl_secs: u64,
}

impl AppConfig {
    /// Constructs the configuration by reading and validating environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let env_value = env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());
        let environment = Environment::from_str(&env_value)?;

        let bind_value =
            env::var("APP_BIND_ADDR").unwrap_or_else(|_| DEFAULT_BIND_ADDR.to_string());
        let bind_addr = bind_value.parse().map_err(ConfigError::BindAddress)?;

        let database_url =
            env::var("DATABASE_URL").unwrap_or_else(|_| DEFAULT_DATABASE_URL.to_string());

        let jwt_secret = env::var("JWT_SECRET")
            .unwrap_or_else(|_| environment.default_jwt_secret().to_string());

        let access_ttl_secs = match env::var("ACCESS_TOKEN_TTL_SECS") {
            Ok(raw) => raw
                .parse()
                .map_err(|_| ConfigError::InvalidAccessTtl(raw))?,
            Err(_) => environment.default_access_ttl_secs(),
        };

        Ok(Self {
            bind_addr,
            environment,
            database_url,
            jwt_secret,
            access_ttl_secs,
        })
    }
}

/// Errors that can occur during configuration loading.
#[derive(Debug)]
pub enum ConfigError {
    InvalidEnvironment(String),
    BindAddress(std::net::AddrParseError),
    InvalidAccessTtl(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidEnvironment(value) => write!(
                f,
                "APP_ENV must be one of 'development', 'production', or 'test' (got {value})"
            ),
            Self::BindAddress(err) => write!(f, "invalid APP_BIND_ADDR value: {err}"),
            Self::InvalidAccessTtl(value) => write!(
                f,
                "ACCESS_TOKEN_TTL_SECS must be a number of seconds (got {value})"
            ),
        }
    }
}

impl std::error::Error for ConfigError {}
