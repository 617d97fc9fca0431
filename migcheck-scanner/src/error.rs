use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScanError {
    #[error("HTTP client error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Invalid exclude pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

pub type Result<T> = std::result::Result<T, ScanError>;
