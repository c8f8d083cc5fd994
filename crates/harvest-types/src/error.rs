//! Configuration errors.

use std::path::PathBuf;

/// Errors raised while loading or validating a [`HarvestConfig`](crate::HarvestConfig).
///
/// The engine assumes its configuration was validated up front, so these
/// only ever surface from the loading step.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {reason}")]
    Parse { path: PathBuf, reason: String },

    #[error("missing required configuration value: {field}")]
    Missing { field: &'static str },

    #[error("invalid configuration value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}
