use rayon::ThreadPoolBuildError;
use std::fmt;
use zip::result::ZipError;

/// Errors that abort a whole run
///
/// Anything that goes wrong inside a single class (or a single method) is not an error at this
/// level: it is reported to the [`Observer`](super::Observer) and the original bytes are kept.
#[derive(Debug)]
pub enum Error {
    /// Bad arguments or settings, detected before any archive is opened
    Configuration(String),

    Io(std::io::Error),

    /// Input is not a readable archive, or the output archive could not be finished
    Archive(ZipError),

    /// Worker threads could not be started
    ThreadPool(ThreadPoolBuildError),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Configuration(msg) => write!(f, "{}", msg),
            Error::Io(err) => write!(f, "I/O error: {}", err),
            Error::Archive(err) => write!(f, "archive error: {}", err),
            Error::ThreadPool(err) => write!(f, "failed to start worker threads: {}", err),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Configuration(_) => None,
            Error::Io(err) => Some(err),
            Error::Archive(err) => Some(err),
            Error::ThreadPool(err) => Some(err),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Error {
        Error::Io(err)
    }
}

impl From<ZipError> for Error {
    fn from(err: ZipError) -> Error {
        match err {
            ZipError::Io(err) => Error::Io(err),
            other => Error::Archive(other),
        }
    }
}

impl From<ThreadPoolBuildError> for Error {
    fn from(err: ThreadPoolBuildError) -> Error {
        Error::ThreadPool(err)
    }
}
