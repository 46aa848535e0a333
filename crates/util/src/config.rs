use std::{env, fmt, net::SocketAddr, path::PathBuf};

use super::{database_url, server_bind_address, DEFAULT_API_URL, DEFAULT_LOG_DIR};

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

    /// Returns the canonical name used for logging/metrics labels.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Development => "development",
            Self::Production => "production",
            Self::Test => "test",
        }
    }
}

/// Settings for the periodic jobs and the API client they use.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobsConfig {
    pub api_url: String,
    pub log_dir: PathBuf,
    pub enabled: bool,
}

impl JobsConfig {
    /// Reads `CRM_API_URL`, `CRM_LOG_DIR` and `CRM_JOBS_ENABLED`.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut api_url = env::var("CRM_API_URL").unwrap_or_else(|_| DEFAULT_API_URL.to_string());
        if !api_url.starts_with("http://") && !api_url.starts_with("https://") {
            return Err(ConfigError::InvalidApiUrl(api_url));
        }
        // Relative joins drop the last path segment unless it ends with a slash.
        if !api_url.ends_with('/') {
            api_url.push('/');
        }

        let log_dir = env::var("CRM_LOG_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_LOG_DIR));

        let enabled = match env::var("CRM_JOBS_ENABLED") {
            Ok(value) => parse_bool(&value)
                .ok_or_else(|| ConfigError::InvalidJobsEnabled(value.clone()))?,
            Err(_) => true,
        };

        Ok(Self {
            api_url,
            log_dir,
            enabled,
        })
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Runtime configuration resolved from environment variables.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    pub environment: Environment,
    pub database_url: String,
    pub jobs: JobsConfig,
}

impl AppConfig {
    /// Constructs the configuration by reading and validating environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let env_value = env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());
        let environment = Environment::from_str(&env_value)?;
        let bind_addr = server_bind_address().map_err(ConfigError::BindAddress)?;
        let jobs = JobsConfig::from_env()?;

        Ok(Self {
            bind_addr,
            environment,
            database_url: database_url(),
            jobs,
        })
    }
}

/// Errors that can occur during configuration loading.
#[derive(Debug)]
pub enum ConfigError {
    InvalidEnvironment(String),
    BindAddress(std::net::AddrParseError),
    InvalidApiUrl(String),
    InvalidJobsEnabled(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidEnvironment(value) => write!(
                f,
                "APP_ENV must be one of 'development', 'production', or 'test' (got {value})"
            ),
            Self::BindAddress(err) => write!(f, "invalid APP_BIND_ADDR value: {err}"),
            Self::InvalidApiUrl(value) => {
                write!(f, "CRM_API_URL must be an http(s) URL (got {value})")
            }
            Self::InvalidJobsEnabled(value) => {
                write!(f, "CRM_JOBS_ENABLED must be true or false (got {value})")
            }
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
pub(crate) static ENV_GUARD: std::sync::LazyLock<std::sync::Mutex<()>> =
    std::sync::LazyLock::new(|| std::sync::Mutex::new(()));
