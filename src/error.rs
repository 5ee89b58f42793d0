use std::fmt;
use std::io;

/// Alias for `Result<T, Error>`, used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced across reactor, dispatch and logger boundaries.
///
/// OS-level registration failures pass through as [`Error::Io`]; misuse of
/// the library's single-init contracts becomes [`Error::DoubleInitialization`]
/// or [`Error::Configuration`]; `activate()` without a bound listener is
/// [`Error::NotBound`].
#[derive(Debug)]
pub enum Error {
    /// An OS call (epoll_ctl, socket option, bind, ...) failed.
    Io(io::Error),
    /// The caller asked for something the component isn't configured for.
    Configuration(&'static str),
    /// A process-wide singleton (logger, signal self-pipe) was initialized
    /// more than once.
    DoubleInitialization(&'static str),
    /// `activate()` was called on a dispatcher with no listening socket bound.
    NotBound,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(e) => write!(f, "{e}"),
            Error::Configuration(msg) => write!(f, "configuration error: {msg}"),
            Error::DoubleInitialization(what) => write!(f, "{what} initialized twice"),
            Error::NotBound => write!(f, "activate() called without a bound listening socket"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Error {
        Error::Io(e)
    }
}
