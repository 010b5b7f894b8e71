#[derive(Debug, thiserror::Error)]
pub enum EnvClientError {
    #[error("project directory not found: {0}")]
    ProjectDirNotFound(String),

    #[error("Write permission is disabled in env-client.config.ts")]
    WritePermissionDenied,

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("storage error: {0}")]
    StorageError(String),

    #[error("io error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, EnvClientError>;
