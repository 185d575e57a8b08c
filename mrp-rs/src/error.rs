use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, MrpError>;

/// Failures while reading a run description or writing model outputs.
#[derive(Error, Debug)]
pub enum MrpError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid JSON run description: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid TOML run description: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("no input on stdin")]
    EmptyInput,

    #[error("run description does not name a file called {0:?}")]
    MissingFile(String),

    #[error("unsupported run description format: {0}")]
    UnsupportedFormat(PathBuf),

    #[error("failed to deserialize input: {0}")]
    Input(String),
}
