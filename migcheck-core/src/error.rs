use crate::config::ConfigError;
use migcheck_scanner::ScanError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Scan(#[from] ScanError),

    #[error("Failed to access {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid JSON in {}: {source}", path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl CoreError {
    pub fn is_config(&self) -> bool {
        matches!(self, CoreError::Config(_))
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;
