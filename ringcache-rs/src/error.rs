//! Defines the error type of all cache lookups.
//!
//! A lookup can fail locally (unknown group, invalid key, failing loader) or remotely while
//! fetching from a peer. Remote failures are never retried and never turned into a cache miss.
//! The caller (usually a [Group](crate::group::Group)) decides whether to fall back to its
//! loader.
//!
//! # Example
//!
//! ```
//! # use ringcache::error::CacheError;
//! # use hyper::StatusCode;
//! let error = CacheError::RemoteStatus(StatusCode::NOT_FOUND);
//! assert_eq!(error.to_string(), "Peer responded with status: 404 Not Found");
//! assert_eq!(error.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
//!
//! let error = CacheError::NotFound("no such group: scores".to_owned());
//! assert_eq!(error.status_code(), StatusCode::NOT_FOUND);
//! ```
use std::error::Error;
use std::fmt::{Display, Formatter};

use hyper::StatusCode;

/// Enumerates the error kinds of the cache core.
#[derive(Debug)]
pub enum CacheError {
    /// An operation was attempted with a missing or invalid setup, e.g. registering peers
    /// twice or looking up an empty key.
    Configuration(String),

    /// Connecting to a peer, sending the request or reading its response failed or timed out.
    Network(anyhow::Error),

    /// A peer answered with a status other than 200.
    RemoteStatus(StatusCode),

    /// The body sent by a peer is not a valid response message.
    Decode(prost::DecodeError),

    /// The requested group doesn't exist.
    NotFound(String),

    /// The loader of a group failed to provide a value.
    Load(anyhow::Error),
}

impl CacheError {
    /// Returns the HTTP status used to report this error to a remote caller.
    pub fn status_code(&self) -> StatusCode {
        match self {
            CacheError::NotFound(_) => StatusCode::NOT_FOUND,
            CacheError::Configuration(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<prost::DecodeError> for CacheError {
    fn from(err: prost::DecodeError) -> CacheError {
        CacheError::Decode(err)
    }
}

impl From<hyper::Error> for CacheError {
    fn from(err: hyper::Error) -> CacheError {
        CacheError::Network(err.into())
    }
}

impl From<tokio::time::error::Elapsed> for CacheError {
    fn from(err: tokio::time::error::Elapsed) -> CacheError {
        CacheError::Network(err.into())
    }
}

impl Display for CacheError {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        match self {
            CacheError::Configuration(msg) => write!(f, "Configuration error: {}", msg),
            CacheError::Network(e) => write!(f, "Network error: {:#}", e),
            CacheError::RemoteStatus(status) => {
                write!(f, "Peer responded with status: {}", status)
            }
            CacheError::Decode(e) => write!(f, "Cannot decode peer response: {}", e),
            CacheError::NotFound(msg) => write!(f, "Not found: {}", msg),
            CacheError::Load(e) => write!(f, "Loader failed: {:#}", e),
        }
    }
}

impl Error for CacheError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match *self {
            CacheError::Decode(ref e) => Some(e),
            CacheError::Network(ref e) | CacheError::Load(ref e) => Some(&**e),
            _ => None,
        }
    }
}
