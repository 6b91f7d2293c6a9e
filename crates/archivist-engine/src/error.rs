use std::fmt;

use archivist_db::ArchiveError;
use thiserror::Error;

/// Failure class used as the `kind` field when errors are logged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Conflict,
    StorageIo,
    NetworkIo,
}

impl ErrorKind {
    pub fn of_archive(err: &ArchiveError) -> Self {
        match err {
            ArchiveError::NotFound(_) => Self::NotFound,
            ArchiveError::Conflict(_) => Self::Conflict,
            ArchiveError::Storage(_) | ArchiveError::LockPoisoned => Self::StorageIo,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self {
            Self::NotFound => "not_found",
            Self::Conflict => "conflict",
            Self::StorageIo => "storage_io",
            Self::NetworkIo => "network_io",
        };
        f.write_str(tag)
    }
}

/// Failure talking to the chat platform.
#[derive(Debug, Error)]
pub enum PlatformError {
    #[error("request failed: {0}")]
    Transport(String),

    #[error("platform returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("unexpected response: {0}")]
    Decode(String),
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Archive(#[from] ArchiveError),

    #[error(transparent)]
    Platform(#[from] PlatformError),

    #[error("store task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Archive(e) => ErrorKind::of_archive(e),
            Self::Platform(_) => ErrorKind::NetworkIo,
            Self::Join(_) => ErrorKind::StorageIo,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Archive(ArchiveError::NotFound(_)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_tags() {
        assert_eq!(EngineError::from(ArchiveError::NotFound(1)).kind().to_string(), "not_found");
        assert_eq!(EngineError::from(ArchiveError::Conflict(1)).kind(), ErrorKind::Conflict);
        assert_eq!(EngineError::from(ArchiveError::LockPoisoned).kind().to_string(), "storage_io");

        let net = EngineError::from(PlatformError::Status { status: 500, body: "oops".into() });
        assert_eq!(net.kind().to_string(), "network_io");
        assert!(!net.is_not_found());
        assert!(EngineError::from(ArchiveError::NotFound(3)).is_not_found());
    }
}
