//! Error types
//!
//! Only connection establishment and transport setup surface as errors.
//! Steady-state conditions (slow subscribers, closed hubs, malformed frames,
//! end of stream) are absorbed and expressed through state instead.

use reqwest::StatusCode;

/// Result alias used across the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for hub, server and receiver operations
#[derive(Debug)]
pub enum Error {
    /// Socket level failure
    Io(std::io::Error),
    /// The stream request could not be sent or its body could not be read
    Request(reqwest::Error),
    /// The remote answered with something other than `200 OK`
    UnexpectedStatus(StatusCode),
    /// `connect` was called on a receiver that already left the unconnected state
    AlreadyConnected,
    /// hyper failed while serving a connection
    Http(hyper::Error),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Io(e) => write!(f, "I/O error: {}", e),
            Error::Request(e) => write!(f, "Request failed: {}", e),
            Error::UnexpectedStatus(status) => write!(f, "Unexpected response code: {}", status),
            Error::AlreadyConnected => write!(f, "Receiver already connected"),
            Error::Http(e) => write!(f, "HTTP error: {}", e),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            Error::Request(e) => Some(e),
            Error::Http(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e)
    }
}

impl From<hyper::Error> for Error {
    fn from(e: hyper::Error) -> Self {
        Error::Http(e)
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Request(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let err = Error::UnexpectedStatus(StatusCode::NOT_FOUND);
        assert_eq!(err.to_string(), "Unexpected response code: 404 Not Found");

        let err = Error::AlreadyConnected;
        assert_eq!(err.to_string(), "Receiver already connected");
    }

    #[test]
    fn test_io_source() {
        use std::error::Error as _;

        let err: Error = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "gone").into();
        assert!(matches!(err, Error::Io(_)));
        assert!(err.source().is_some());
        assert!(Error::AlreadyConnected.source().is_none());
    }
}
