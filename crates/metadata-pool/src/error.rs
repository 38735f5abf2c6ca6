use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("component collision: {0}")]
    Collision(String),

    #[error("component ignored: {0}")]
    Ignored(String),

    #[error("cache location is not writable: {0}")]
    TargetNotWritable(PathBuf),

    #[error("Cache write error: {0}")]
    CacheWrite(String),

    #[error("Cache read error: {0}")]
    CacheRead(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("failed to watch {path}: {message}")]
    Watch { path: PathBuf, message: String },

    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("operation was cancelled")]
    Cancelled,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl PoolError {
    /// Parse and collision failures are reported per component or file and
    /// never abort a load.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            PoolError::Parse { .. } | PoolError::Collision(_) | PoolError::Ignored(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, PoolError>;
