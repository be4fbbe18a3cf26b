//! Engine configuration loaded from the environment.

use std::path::PathBuf;

use fieldops_auth::RoleSource;
use fieldops_core::DomainError;
use thiserror::Error;

pub const ENV_METADATA_DIR: &str = "FIELDOPS_METADATA_DIR";
pub const ENV_ROLE_SOURCE: &str = "FIELDOPS_ROLE_SOURCE";
pub const ENV_TEST_MODE: &str = "FIELDOPS_TEST_MODE";
pub const ENV_DATABASE_URL: &str = "DATABASE_URL";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("{var}: invalid value '{value}' (expected {expected})")]
    Invalid {
        var: &'static str,
        value: String,
        expected: &'static str,
    },

    #[error("{0} is required when roles are loaded from the store")]
    Missing(&'static str),
}

impl From<ConfigError> for DomainError {
    fn from(value: ConfigError) -> Self {
        DomainError::configuration(value.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Directory of entity descriptor documents; embedded set when `None`.
    pub metadata_dir: Option<PathBuf>,
    pub role_source: RoleSource,
    /// Lets the role provider fall back to bootstrap roles silently.
    pub test_mode: bool,
    pub database_url: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            metadata_dir: None,
            role_source: RoleSource::Fallback,
            test_mode: false,
            database_url: None,
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup (the process environment in production).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let role_source = match non_empty(ENV_ROLE_SOURCE).as_deref() {
            None => RoleSource::Fallback,
            Some("store") => RoleSource::Store,
            Some("fallback") => RoleSource::Fallback,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    var: ENV_ROLE_SOURCE,
                    value: other.to_string(),
                    expected: "store | fallback",
                });
            }
        };

        let test_mode = match non_empty(ENV_TEST_MODE).as_deref() {
            None => false,
            Some("1" | "true" | "yes") => true,
            Some("0" | "false" | "no") => false,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    var: ENV_TEST_MODE,
                    value: other.to_string(),
                    expected: "true | false",
                });
            }
        };

        let database_url = non_empty(ENV_DATABASE_URL);
        if role_source == RoleSource::Store && database_url.is_none() {
            return Err(ConfigError::Missing(ENV_DATABASE_URL));
        }

        Ok(Self {
            metadata_dir: non_empty(ENV_METADATA_DIR).map(PathBuf::from),
            role_source,
            test_mode,
            database_url,
        })
    }
}
