//! Error types for poesaver

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while converting a fetched page
#[derive(Debug, Error)]
pub enum ConvertError {
    /// No recognizable turn containers in the document.
    ///
    /// Fatal for this document; re-parsing identical HTML cannot succeed,
    /// so any retry belongs to the fetch layer.
    #[error("extraction failed: no_turns_found")]
    NoTurnsFound,

    /// Turns were found but every one of them was empty after normalization
    #[error("validation failed: empty_conversation")]
    EmptyConversation,
}

/// Errors that can occur while fetching a shared conversation page
#[derive(Debug, Error)]
pub enum FetchError {
    /// URL is not a Poe share link
    #[error("invalid share URL: {0} (expected https://poe.com/s/<id>)")]
    InvalidShareUrl(String),

    /// Failed to build HTTP client
    #[error("failed to create HTTP client")]
    ClientBuildError(#[source] reqwest::Error),

    /// Request timed out
    #[error("request timed out")]
    Timeout,

    /// Failed to connect to server
    #[error("failed to connect to server")]
    ConnectError(#[source] reqwest::Error),

    /// Server answered with a non-success status
    #[error("server returned status {0}")]
    HttpStatus(u16),

    /// The body does not look like a real conversation page
    #[error("suspicious response body: {0}")]
    SuspiciousContent(&'static str),

    /// Other request error
    #[error("request failed: {0}")]
    RequestError(String),

    /// All attempts failed; carries the last attempt's error
    #[error("failed to fetch {url} after {attempts} attempts")]
    RetriesExhausted {
        url: String,
        attempts: u32,
        #[source]
        source: Box<FetchError>,
    },
}

impl FetchError {
    /// Create an error from a reqwest error
    pub fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FetchError::Timeout
        } else if err.is_connect() {
            FetchError::ConnectError(err)
        } else {
            FetchError::RequestError(err.to_string())
        }
    }
}

/// Errors that can occur while choosing or creating output paths
#[derive(Debug, Error)]
pub enum StorageError {
    /// Output directory could not be created
    #[error("failed to create directory {path}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Every numbered candidate name was already taken
    #[error("no free filename for {base:?} after {limit} attempts")]
    NamespaceExhausted { base: String, limit: u32 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_convert_error_messages() {
        assert_eq!(
            ConvertError::NoTurnsFound.to_string(),
            "extraction failed: no_turns_found"
        );
        assert_eq!(
            ConvertError::EmptyConversation.to_string(),
            "validation failed: empty_conversation"
        );
    }

    #[test]
    fn test_fetch_error_messages() {
        assert_eq!(
            FetchError::InvalidShareUrl("https://example.com".to_string()).to_string(),
            "invalid share URL: https://example.com (expected https://poe.com/s/<id>)"
        );
        assert_eq!(
            FetchError::SuspiciousContent("body_too_short").to_string(),
            "suspicious response body: body_too_short"
        );
        assert_eq!(FetchError::HttpStatus(403).to_string(), "server returned status 403");
    }

    #[test]
    fn test_retries_exhausted_keeps_source() {
        let err = FetchError::RetriesExhausted {
            url: "https://poe.com/s/abc".to_string(),
            attempts: 3,
            source: Box::new(FetchError::Timeout),
        };
        assert_eq!(
            err.to_string(),
            "failed to fetch https://poe.com/s/abc after 3 attempts"
        );
        let source = std::error::Error::source(&err).map(|s| s.to_string());
        assert_eq!(source, Some("request timed out".to_string()));
    }
}
