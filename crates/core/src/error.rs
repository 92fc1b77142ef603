use stratadb_types::ValueError;
use thiserror::Error;

/// Errors from the key-value storage layer.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("key not found")]
    KeyNotFound,
    #[error("store `{0}` not found")]
    StoreNotFound(String),
    #[error("store `{0}` already exists")]
    StoreAlreadyExists(String),
    #[error("transaction is read-only")]
    ReadOnly,
    #[error("transaction has been discarded")]
    Discarded,
    #[error("operation cancelled")]
    Cancelled,
    #[error("engine is closed")]
    Closed,
    #[error("corrupted store: {0}")]
    Corruption(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),
}

/// Errors from the schema catalog.
#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("table `{0}` not found")]
    TableNotFound(String),
    #[error("table `{0}` already exists")]
    TableAlreadyExists(String),
    #[error("index `{0}` not found")]
    IndexNotFound(String),
    #[error("index `{0}` already exists")]
    IndexAlreadyExists(String),
    #[error("sequence `{0}` not found")]
    SequenceNotFound(String),
    #[error("sequence `{0}` already exists")]
    SequenceAlreadyExists(String),
    #[error("sequence `{0}` reached its bound")]
    SequenceExhausted(String),
    #[error("table `{0}` is read-only")]
    ReadOnlyTable(String),
}

/// A rejected write: the row would break a declared constraint.
#[derive(Error, Debug)]
pub enum ConstraintViolation {
    #[error("NOT NULL constraint violated on column `{0}`")]
    NotNull(String),
    #[error("PRIMARY KEY constraint violated on table `{0}`")]
    PrimaryKey(String),
    #[error("UNIQUE constraint violated on index `{0}`")]
    Unique(String),
    #[error("CHECK constraint violated: {0}")]
    Check(String),
}

/// Top-level error for every fallible engine operation.
#[derive(Error, Debug)]
pub enum DBError {
    #[error(transparent)]
    Value(#[from] ValueError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    #[error(transparent)]
    Constraint(#[from] ConstraintViolation),
    /// Control sentinel used by the stream layer to terminate a pipeline
    /// early. Swallowed by the executor, never surfaced to callers.
    #[error("stream closed")]
    StreamClosed,
    #[error("parameter {0} not found")]
    ParameterNotFound(String),
    #[error("isolation level unsupported")]
    IsolationUnsupported,
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

impl DBError {
    pub fn invalid_argument(msg: impl Into<String>) -> DBError {
        DBError::InvalidArgument(msg.into())
    }

    pub fn is_stream_closed(&self) -> bool {
        matches!(self, DBError::StreamClosed)
    }

    pub fn is_key_not_found(&self) -> bool {
        matches!(self, DBError::Storage(StorageError::KeyNotFound))
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, DBError::Storage(StorageError::Cancelled))
    }
}

impl From<sled::Error> for DBError {
    fn from(e: sled::Error) -> Self {
        DBError::Storage(StorageError::Sled(e))
    }
}

impl From<std::io::Error> for DBError {
    fn from(e: std::io::Error) -> Self {
        DBError::Storage(StorageError::Io(e))
    }
}
