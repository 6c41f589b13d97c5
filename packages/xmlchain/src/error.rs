//! Error types for xmlchain.
//!
//! Uses the dual-error pattern: `ResolveError` is what callers of a
//! resolution see (always delivered through the completion path), and
//! `FetchError` carries transport detail inside the fetch capability.
//!
//! `ResolveError` is `Clone`: the same failure is recorded on the root that
//! failed and handed to the completion callback, so sources are captured as
//! messages instead of being wrapped.

use thiserror::Error;

/// Main error type for parsing and resolving chained responses.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    /// The buffer handed to a parse pass was empty.
    #[error("The data to parse is empty")]
    EmptyInput,

    /// The byte stream is not well-formed XML.
    #[error("Malformed XML at byte {position}: {message}")]
    MalformedXml { position: u64, message: String },

    /// The token stream is well-formed but is not a single-rooted document.
    #[error("Document validation failed: {0}")]
    Validation(String),

    /// A referenced document could not be fetched.
    #[error("Failed to fetch {url}: {reason}")]
    FetchFailure { url: String, reason: String },

    /// A mapped element lacks a key its type requires.
    #[error("Element <{tag}> is missing required {key}")]
    MissingIdentifier { tag: String, key: &'static str },

    /// The parse pass was cancelled before it finished.
    #[error("Parsing was aborted")]
    Aborted,

    /// A blocking parse was started from the parse queue's own worker.
    #[error("Reentrant parse: a parse pass cannot be started from inside another pass")]
    ReentrantParse,

    /// The process-wide parse queue is no longer accepting work.
    #[error("The parse queue is unavailable")]
    QueueUnavailable,

    /// A listener panicked while handling parse events.
    #[error("Parse pass panicked: {0}")]
    PassPanicked(String),

    /// The chain of wrapped documents is deeper than allowed.
    #[error("Chain depth {depth} exceeds the limit of {limit}")]
    ChainTooDeep { depth: usize, limit: usize },

    /// The task resolving a chained document did not finish.
    #[error("Chain resolution task failed: {0}")]
    ChainTaskFailed(String),

    /// The chain refers back to a document already being resolved.
    #[error("Chain cycle detected: {0} is already being resolved")]
    ChainCycle(String),

    /// A value that was expected to be a URL is not one.
    #[error("Invalid reference URL: '{0}'")]
    InvalidUrl(String),

    /// Writing a tree back to XML failed.
    #[error("XML serialization failed: {0}")]
    Serialization(String),

    /// IO error on a local source.
    #[error("IO error on {path}: {message}")]
    Io { path: String, message: String },

    /// Invalid configuration value.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl ResolveError {
    /// Whether this error came out of a parse pass (as opposed to fetching or guards).
    #[must_use]
    pub fn is_parse_error(&self) -> bool {
        matches!(
            self,
            Self::EmptyInput | Self::MalformedXml { .. } | Self::Validation(_)
        )
    }
}

/// Errors raised by a fetch capability.
#[derive(Debug, Error)]
pub enum FetchError {
    /// HTTP request failed.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The server answered with a non-success status.
    #[error("Unexpected HTTP status {status}")]
    Status { status: u16 },

    /// The response body is larger than the configured limit.
    #[error("Response of {size} bytes exceeds the limit of {limit} bytes")]
    TooLarge { size: u64, limit: u64 },

    /// All retry attempts failed.
    #[error("Giving up after {attempts} attempts: {message}")]
    RetriesExhausted { attempts: u32, message: String },

    /// Reading a local document failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The URL scheme is not served by this fetcher.
    #[error("Unsupported URL scheme '{0}'")]
    UnsupportedScheme(String),

    /// No document is known under this URL.
    #[error("No document at {0}")]
    NotFound(String),
}

impl FetchError {
    /// Convert into the resolution-level failure for `url`.
    #[must_use]
    pub fn into_resolve_error(self, url: &url::Url) -> ResolveError {
        ResolveError::FetchFailure {
            url: url.to_string(),
            reason: self.to_string(),
        }
    }
}

/// Result type alias for xmlchain operations.
pub type Result<T> = std::result::Result<T, ResolveError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ResolveError::MalformedXml {
            position: 12,
            message: "unexpected end".to_string(),
        };
        assert_eq!(err.to_string(), "Malformed XML at byte 12: unexpected end");
    }

    #[test]
    fn test_missing_identifier_display() {
        let err = ResolveError::MissingIdentifier {
            tag: "ChildNode".to_string(),
            key: "reference URL",
        };
        assert_eq!(
            err.to_string(),
            "Element <ChildNode> is missing required reference URL"
        );
    }

    #[test]
    fn test_is_parse_error() {
        assert!(ResolveError::EmptyInput.is_parse_error());
        assert!(ResolveError::Validation("two roots".into()).is_parse_error());
        assert!(!ResolveError::Aborted.is_parse_error());
        assert!(!ResolveError::ChainCycle("http://a".into()).is_parse_error());
    }

    #[test]
    fn test_fetch_error_conversion() {
        let url = url::Url::parse("https://ads.example.com/wrapper.xml").unwrap();
        let err = FetchError::Status { status: 404 }.into_resolve_error(&url);
        assert_eq!(
            err,
            ResolveError::FetchFailure {
                url: "https://ads.example.com/wrapper.xml".to_string(),
                reason: "Unexpected HTTP status 404".to_string(),
            }
        );
    }
}
