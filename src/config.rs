//! Configuration types.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ConfigError;

/// Product wording used in survey prompts.
#[derive(Debug, Clone)]
pub struct SurveyConfig {
    /// Product being rated, as it should appear to users.
    pub product_name: String,
    /// Where users are redirected once the survey is over.
    pub support_channel: String,
}

impl Default for SurveyConfig {
    fn default() -> Self {
        Self {
            product_name: "nuestro servicio".to_string(),
            support_channel: "nuestros canales de atención al cliente habituales".to_string(),
        }
    }
}

impl SurveyConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        Self {
            product_name: non_empty(lookup("SURVEY_PRODUCT_NAME"))
                .unwrap_or(defaults.product_name),
            support_channel: non_empty(lookup("SURVEY_SUPPORT_CHANNEL"))
                .unwrap_or(defaults.support_channel),
        }
    }
}

/// HTTP server and storage settings.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    /// libSQL file for sessions. `None` keeps sessions in memory.
    pub db_path: Option<PathBuf>,
    /// Sessions untouched for this long are deleted.
    pub session_ttl: Duration,
    /// How often idle sessions are swept.
    pub sweep_interval: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 5000),
            db_path: None,
            session_ttl: Duration::from_secs(60 * 60),
            sweep_interval: Duration::from_secs(60),
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let port: u16 = match non_empty(lookup("PORT")) {
            Some(raw) => raw.parse().map_err(|e| ConfigError::InvalidValue {
                key: "PORT".to_string(),
                message: format!("{e}"),
            })?,
            None => defaults.bind_addr.port(),
        };

        let ip: IpAddr = match non_empty(lookup("BIND_ADDR")) {
            Some(raw) => raw.parse().map_err(|e| ConfigError::InvalidValue {
                key: "BIND_ADDR".to_string(),
                message: format!("{e}"),
            })?,
            None => defaults.bind_addr.ip(),
        };

        let session_ttl = match non_empty(lookup("SURVEY_SESSION_TTL_MINS")) {
            Some(raw) => match raw.parse::<u64>() {
                Ok(mins) if mins > 0 => Duration::from_secs(mins * 60),
                Ok(_) => {
                    return Err(ConfigError::InvalidValue {
                        key: "SURVEY_SESSION_TTL_MINS".to_string(),
                        message: "must be at least 1".to_string(),
                    });
                }
                Err(e) => {
                    return Err(ConfigError::InvalidValue {
                        key: "SURVEY_SESSION_TTL_MINS".to_string(),
                        message: format!("{e}"),
                    });
                }
            },
            None => defaults.session_ttl,
        };

        Ok(Self {
            bind_addr: SocketAddr::new(ip, port),
            db_path: non_empty(lookup("SURVEY_DB_PATH")).map(PathBuf::from),
            session_ttl,
            sweep_interval: defaults.sweep_interval,
        })
    }
}

/// Load `.env` from the working directory or a parent, if present.
///
/// Variables already set in the process are not overridden. Returns the
/// path that was loaded.
pub fn load_dotenv() -> Result<Option<PathBuf>, ConfigError> {
    match dotenvy::dotenv() {
        Ok(path) => Ok(Some(path)),
        Err(e) if e.not_found() => Ok(None),
        Err(e) => Err(ConfigError::Dotenv(e.to_string())),
    }
}

/// Load a specific env file. A missing file is not an error.
pub fn load_dotenv_from(path: &Path) -> Result<bool, ConfigError> {
    match dotenvy::from_path(path) {
        Ok(()) => Ok(true),
        Err(e) if e.not_found() => Ok(false),
        Err(e) => Err(ConfigError::Dotenv(e.to_string())),
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
