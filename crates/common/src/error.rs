use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid image reference '{reference}': {reason}")]
    InvalidImageReference { reference: String, reason: String },

    #[error("Unknown mirror job: {0}")]
    UnknownJob(String),

    #[error("Duplicate mirror job definition: {0}")]
    DuplicateJob(String),

    #[error("JSON serialization error: {0}")]
    JsonSerialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
