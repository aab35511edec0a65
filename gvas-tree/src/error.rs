use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("unexpected end of data")]
    TruncatedData,
    #[error("size mismatch at offset {offset}: declared {declared} bytes, consumed {consumed}")]
    SizeMismatch {
        offset: u64,
        declared: u64,
        consumed: u64,
    },
    #[error("unsupported operation: {0}")]
    UnsupportedOperation(String),
    #[error("type mismatch: expected {expected}, found {found}")]
    TypeMismatch { expected: String, found: String },
    #[error("no value at path {0}")]
    PathNotFound(String),
    #[error("index {index} out of bounds for container of length {len}")]
    IndexOutOfBounds { index: usize, len: usize },
    #[error("unsupported variant: {0}")]
    UnsupportedVariant(String),
    #[error("invalid data: {0}")]
    InvalidData(String),
    #[error("io error: {0}")]
    Io(std::io::Error),
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        match e.kind() {
            std::io::ErrorKind::UnexpectedEof => Error::TruncatedData,
            _ => Error::Io(e),
        }
    }
}

impl From<tempfile::PersistError> for Error {
    fn from(e: tempfile::PersistError) -> Self {
        Error::Io(e.error)
    }
}

impl Error {
    pub(crate) fn mismatch(expected: impl Into<String>, found: impl Into<String>) -> Self {
        Error::TypeMismatch {
            expected: expected.into(),
            found: found.into(),
        }
    }
}

/// Failure to decode a save, carrying the stream offset the decoder had reached.
#[derive(Error, Debug)]
#[error("at offset {offset}: {error}")]
pub struct ParseError {
    pub offset: usize,
    #[source]
    pub error: Error,
}
