use thiserror::Error;

#[derive(Error, Debug)]
pub enum IndexError {
    #[error("artifact id must not be empty")]
    EmptyId,

    #[error("unsupported snapshot version {found} (expected {expected})")]
    UnsupportedVersion { found: u32, expected: u32 },

    #[error("inconsistent snapshot: {0}")]
    InconsistentSnapshot(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("bincode error: {0}")]
    Bincode(#[from] bincode::Error),
}

pub type Result<T> = std::result::Result<T, IndexError>;
