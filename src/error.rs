use thiserror::Error;

/// Errors surfaced by the public engine API.
#[derive(Debug, Error)]
pub enum Error {
    #[error("key must not be empty")]
    KeyEmpty,

    #[error("key not found")]
    KeyNotFound,

    #[error("engine is closed")]
    Closed,

    #[error("key/value pair does not fit in a page")]
    ValueTooLarge,

    #[error("invalid database file: {0}")]
    InvalidDatabase(String),

    #[error("corrupt on-disk structure: {0}")]
    Corrupt(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Internal error produced by page-level mutation. The engine must always
/// intercept `PageFull` and react by splitting; it should never reach a
/// caller.
#[derive(Debug, Error)]
pub enum PageError {
    #[error("page has no room for this cell")]
    PageFull,

    #[error("corrupt page: {0}")]
    Corrupt(String),
}

impl From<PageError> for Error {
    fn from(e: PageError) -> Self {
        match e {
            PageError::PageFull => {
                unreachable!("PageFull must be handled by the engine before it escapes")
            }
            PageError::Corrupt(msg) => Error::Corrupt(msg),
        }
    }
}
