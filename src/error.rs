use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, KeyfallError>;

/// Failure to turn a score file into a `Song`. Every variant names the file.
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("unsupported score format '{extension}' for {}", path.display())]
    UnsupportedFormat { path: PathBuf, extension: String },

    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed score {}: {reason}", path.display())]
    Malformed { path: PathBuf, reason: String },

    #[error("invalid note #{index} in {}: {reason}", path.display())]
    InvalidNote {
        path: PathBuf,
        index: usize,
        reason: String,
    },
}

#[derive(Error, Debug)]
pub enum KeyfallError {
    #[error(transparent)]
    Load(#[from] LoadError),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}
