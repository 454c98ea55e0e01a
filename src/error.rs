use std::io;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum FitError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Bruker data error in {path}: {message}")]
    BrukerData { path: PathBuf, message: String },
    #[error("Invalid configuration: {0}")]
    Config(String),
    #[error("Optimization failed: {0}")]
    Optimization(String),
}

impl FitError {
    pub fn bruker(path: &std::path::Path, message: impl Into<String>) -> Self {
        FitError::BrukerData {
            path: path.to_path_buf(),
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, FitError>;
