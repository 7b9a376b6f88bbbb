//! Shared error type used across all workflow-kernel crates.

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("transport: {0}")]
    Transport(String),
    #[error("extraction failed after {attempts} attempt(s): {0}", attempts = .attempts)]
    Extraction { attempts: u32, message: String },
    #[error("validation: {0}")]
    Validation(String),
    #[error("boundary violation: {0}")]
    Boundary(String),
    #[error("concurrency: {0}")]
    Concurrency(String),
    #[error("workspace: {0}")]
    Workspace(String),
    #[error("state integrity: {0}")]
    StateIntegrity(String),
    #[error("config: {0}")]
    Config(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;
