//! Configuration management for the application shell.

use std::env;
use std::path::PathBuf;
use storefront_engine::DEFAULT_PAGE_SIZE;

/// Shell configuration loaded from environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Page size for list queries and the sync-down limit
    pub page_size: usize,
    /// Where the local cache snapshot is kept between runs
    pub data_path: PathBuf,
    /// JSON file seeding the in-memory remote, keyed by object name
    pub remote_fixture: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            data_path: PathBuf::from("storefront-cache.json"),
            remote_fixture: None,
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let page_size = match lookup("STOREFRONT_PAGE_SIZE") {
            Some(raw) => match raw.trim().parse::<usize>() {
                Ok(size) if size > 0 => size,
                _ => return Err(ConfigError::InvalidPageSize(raw)),
            },
            None => defaults.page_size,
        };

        let data_path = lookup("STOREFRONT_DATA_PATH")
            .filter(|p| !p.is_empty())
            .map(PathBuf::from)
            .unwrap_or(defaults.data_path);

        let remote_fixture = lookup("STOREFRONT_REMOTE_FIXTURE")
            .filter(|p| !p.is_empty())
            .map(PathBuf::from);

        Ok(Self {
            page_size,
            data_path,
            remote_fixture,
        })
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid STOREFRONT_PAGE_SIZE value: {0:?}")]
    InvalidPageSize(String),
}
