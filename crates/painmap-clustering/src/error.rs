use painmap_db::DbError;
use thiserror::Error;

/// Failures reported by a [`ClusteringStore`](crate::store::ClusteringStore).
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("record not found")]
    NotFound,

    #[error("clustering run {id} is not in the expected '{expected_status}' state")]
    InvalidTransition {
        id: i64,
        expected_status: &'static str,
    },

    /// Another run already holds the single running slot.
    #[error("another clustering run is already active")]
    ActiveRunConflict,

    /// A stored value could not be mapped onto a domain type.
    #[error("corrupt stored value: {0}")]
    Decode(String),

    #[error(transparent)]
    Db(DbError),
}

impl From<DbError> for StoreError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound => StoreError::NotFound,
            DbError::InvalidClusteringRunTransition {
                id,
                expected_status,
            } => StoreError::InvalidTransition {
                id,
                expected_status,
            },
            DbError::ActiveRunConflict => StoreError::ActiveRunConflict,
            other => StoreError::Db(other),
        }
    }
}

#[derive(Debug, Error)]
pub enum ClusteringError {
    /// A run is already pending or running; nothing was started.
    #[error("a clustering run is already in progress")]
    Conflict,

    #[error("clustering run {0} not found")]
    RunNotFound(i64),

    #[error("theme {0} not found")]
    ThemeNotFound(i64),

    #[error(transparent)]
    Store(#[from] StoreError),
}
