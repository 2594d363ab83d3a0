use thiserror::Error;

#[derive(Debug, Error)]
pub enum SobelError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Communication error: {0}")]
    Communication(String),

    #[error("Run aborted by rank {origin}")]
    Aborted { origin: usize },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, SobelError>;
