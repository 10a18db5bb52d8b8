//! Storefront application shell.
//!
//! Wires the storefront engine to process-level concerns: environment
//! configuration, logging and the on-disk cache.

pub mod config;
pub mod error;
pub mod launch;

pub use config::{Config, ConfigError};
pub use error::{AppError, Result};
pub use launch::App;
