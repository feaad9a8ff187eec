use thiserror::Error;

#[derive(Debug, Error)]
pub enum QueryError {
    /// Invariant violation: unexpected statement kind, malformed plan shape.
    /// Fatal to the statement.
    #[error("internal error: {0}")]
    Internal(String),
    #[error("config error: {0}")]
    Config(String),
    #[error("not implemented: {0}")]
    NotImplemented(String),
    #[error(transparent)]
    Catalog(#[from] storage::StorageError),
    #[error(transparent)]
    Lock(#[from] txn::LockError),
    #[error(transparent)]
    Wal(#[from] wal::WalError),
    #[error("column {0}.{1} not in executor output")]
    UnknownColumn(String, String),
}

pub type QueryResult<T> = Result<T, QueryError>;
