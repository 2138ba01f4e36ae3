use crate::codec::DecodeError;
use crate::collection::CollectionError;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("connection failed: {0}")]
    Connection(#[source] CollectionError),
    #[error("storage {op} failed: {source}")]
    Storage {
        op: &'static str,
        #[source]
        source: CollectionError,
    },
    #[error("storage {op} exceeded deadline of {timeout:?}")]
    DeadlineExceeded { op: &'static str, timeout: Duration },
    #[error("cannot save a filtered policy")]
    FilteredSave,
    #[error("invalid rule document: {0}")]
    Decode(#[from] DecodeError),
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl AdapterError {
    /// Attribute a backend failure to the storage operation `op`.
    pub(crate) fn storage(op: &'static str, err: CollectionError) -> Self {
        match err {
            CollectionError::Decode(decode) => AdapterError::Decode(decode),
            other => AdapterError::Storage { op, source: other },
        }
    }
}

pub type AdapterResult<T> = Result<T, AdapterError>;
