//
// Errors
//
use std::io;
use std::result;
use std::error;
use std::fmt;
use serde_json;

/// Type alias for marcflow errors
pub type Result<X> = result::Result<X, Error>;

/// Wrapper for many kinds of errors occuring while ingesting a collection
#[derive(Debug)]
pub enum Error {
    IOError(io::Error),
    JsonError(serde_json::Error),
    /// A manifest entry could not be opened
    MissingFile(String, Option<io::Error>),
    TagMapSyntax(String),
    /// The decoder could not make any more progress on this file
    Decode(String, io::Error),
    Other(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Error::IOError(ref err) => write!(f, "IO error: {}", err),
            Error::JsonError(ref err) => write!(f, "JSON error: {}", err),
            Error::MissingFile(ref path, ref opt_err) => {
                write!(f,
                    "The source file {} should have been downloaded already but there was a \
                    problem opening it. Wrong data directory? The OS error was: ",
                    path)?;
                if let Some(ref err) = *opt_err { err.fmt(f) }
                else { write!(f, "Unknown") }
            },
            Error::TagMapSyntax(ref info) => write!(f, "Can't read tag map: {}", info),
            Error::Decode(ref path, ref err) => write!(f, "Decoding {} stopped: {}", path, err),
            Error::Other(ref info) => write!(f, "{}", info),
        }
    }
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match *self {
            Error::IOError(ref err) => Some(err),
            Error::JsonError(ref err) => Some(err),
            Error::MissingFile(_, Some(ref err)) => Some(err),
            Error::MissingFile(_, None) => None,
            Error::TagMapSyntax(_) => None,
            Error::Decode(_, ref err) => Some(err),
            Error::Other(_) => None,
        }
    }
}
//
// Convert everything else into Error
//
impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::IOError(err)
    }
}
impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::JsonError(err)
    }
}
