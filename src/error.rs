use thiserror::Error;

pub type Result<T> = std::result::Result<T, AcquisitionError>;

#[derive(Error, Debug)]
pub enum AcquisitionError {
    #[error("Credential exchange failed: {0}")]
    AuthFailure(String),

    #[error("Rate limited by the imagery API")]
    RateLimited,

    #[error("Imagery API returned {status}: {body}")]
    Api {
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("Transport failure: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Invalid date range: {0}")]
    InvalidRange(String),

    #[error("Invalid grid: {0}")]
    InvalidGrid(String),

    #[error("Invalid bounds: {0}")]
    InvalidBounds(String),

    #[error("Missing credentials: set client_id and client_secret")]
    MissingCredentials,

    #[error("Invalid settings: {0}")]
    Settings(String),

    #[error("Storage error: {0}")]
    Storage(#[from] std::io::Error),

    #[error("Unable to encode metadata: {0}")]
    Metadata(#[from] serde_json::Error),
}
