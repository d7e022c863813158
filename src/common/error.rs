use thiserror::Error;

/// Crate-wide error kinds.
///
/// Most buffer-pool and tree operations still return `bool`/`Option` to
/// callers — `StorageError` is reserved for the handful of calls where a
/// caller needs to know *why* something failed, and for the two conditions
/// treated as fatal.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("no unpinned frame available to evict")]
    OutOfFrames,

    #[error("key or page id not found")]
    NotFound,

    #[error("key already exists")]
    AlreadyExists,

    #[error("cannot delete a pinned page")]
    PinnedOnDelete,

    #[error("allocation failed")]
    OutOfMemory,

    #[error("page header is malformed or out of bounds")]
    CorruptPage,
}

pub type StorageResult<T> = Result<T, StorageError>;
