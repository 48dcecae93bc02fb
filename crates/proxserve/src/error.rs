use proxserve_path::PathError;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProxserveError {
    /// Only objects and arrays can be observed.
    #[error("must observe an Object/Array, got {0}")]
    UnsupportedType(&'static str),
    #[error("invalid path was given: {0:?}")]
    InvalidPath(String),
    #[error("{event} is not a valid event. valid events are {valid}")]
    InvalidEvent { event: String, valid: String },
    #[error("property {0:?} cannot be expressed as a path segment")]
    NotPathable(String),
    #[error("{0:?} is not a valid array index")]
    InvalidIndex(String),
    #[error("{method} can only be called on an array")]
    NotAnArray { method: &'static str },
    /// The wrapper was destroyed; its handle no longer grants access.
    #[error("cannot perform operation on a revoked wrapper")]
    Revoked,
}

impl From<PathError> for ProxserveError {
    fn from(err: PathError) -> Self {
        match err {
            PathError::InvalidPath(path) => ProxserveError::InvalidPath(path),
            PathError::NotPathable(key) => ProxserveError::NotPathable(key),
        }
    }
}
