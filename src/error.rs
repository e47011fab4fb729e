use std::error::Error as StdError;
use std::fmt;

/// Crate error type for document storage operations.
#[derive(Debug)]
pub enum Error {
    /// Wraps errors returned by `rusqlite`.
    Database(rusqlite::Error),
    /// A caller-supplied argument is malformed or inconsistent with the document's schema.
    InvalidArgument(String),
    /// A metadata path failed to parse (empty components, leading/trailing slash).
    InvalidPath(String),
    /// A requested operation is not valid in the document's current configuration.
    InvalidOperation(String),
    /// Opening an existing file failed schema discovery or validation.
    Discovery(String),
    /// A tile or brick primary key was not found.
    NonExistingTile(i64),
    /// A metadata item primary key was not found.
    NonExistingItem(i64),
    /// An invariant the engine relies on was violated; not expected to be recoverable.
    Internal(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Database(err) => write!(f, "{err}"),
            Self::InvalidArgument(msg) => write!(f, "invalid argument: {msg}"),
            Self::InvalidPath(msg) => write!(f, "invalid path: {msg}"),
            Self::InvalidOperation(msg) => write!(f, "invalid operation: {msg}"),
            Self::Discovery(msg) => write!(f, "schema discovery failed: {msg}"),
            Self::NonExistingTile(pk) => write!(f, "no tile with primary key {pk}"),
            Self::NonExistingItem(pk) => write!(f, "no metadata item with primary key {pk}"),
            Self::Internal(msg) => write!(f, "internal error: {msg}"),
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Self::Database(err) => Some(err),
            _ => None,
        }
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Self::Database(err)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
