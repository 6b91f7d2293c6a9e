use thiserror::Error;

#[derive(Debug, Error)]
pub enum ArchiveError {
    /// No archived message with this id.
    #[error("no archived message with id {0}")]
    NotFound(u64),

    /// Strict insert hit an existing primary key.
    #[error("message {0} is already archived")]
    Conflict(u64),

    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("database lock poisoned")]
    LockPoisoned,
}

pub type Result<T> = std::result::Result<T, ArchiveError>;
