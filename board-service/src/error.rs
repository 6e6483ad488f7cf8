/// Error types for board-service
///
/// The first four variants are expected business outcomes and propagate
/// unchanged to the caller; the infrastructure variants wrap storage/cache
/// failures and stay distinguishable from them.
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BoardError {
    /// Entity absent, or present but soft-deleted (reads as absent).
    #[error("not found: {0}")]
    NotFound(String),

    /// Actor does not own the entity (or batch) it tried to mutate.
    #[error("not owner: {0}")]
    NotOwner(String),

    /// Lost a try-lock race; the operation did not happen and may be retried
    /// by the user. The service never retries on its own.
    #[error("concurrent modification: {0}")]
    ConcurrentModification(String),

    /// The entity exists and is owned, but its state forbids the operation
    /// (missing admin role, unverified account, duplicate nickname, expired
    /// token).
    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("cache error: {0}")]
    Cache(#[from] redis::RedisError),
}

/// Result type alias for board-service operations
pub type Result<T> = std::result::Result<T, BoardError>;
