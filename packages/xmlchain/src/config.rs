//! Configuration constants, URL recognition and resolver settings.

use regex::Regex;
use std::sync::LazyLock;
use std::time::Duration;

use url::Url;

use crate::error::{ResolveError, Result};

/// HTTP timeout in seconds for a single fetch attempt.
pub const HTTP_TIMEOUT_SECS: u64 = 30;

/// Default maximum size of a fetched document in bytes (16 MB).
///
/// Response documents are small; anything larger is treated as a failed fetch.
pub const DEFAULT_MAX_RESPONSE_SIZE: u64 = 16 * 1024 * 1024;

/// Default maximum number of wrapped documents followed from one top-level root.
pub const DEFAULT_MAX_CHAIN_DEPTH: usize = 32;

/// Maximum number of attempts for transient fetch failures.
pub const MAX_FETCH_RETRIES: u32 = 3;

/// Base delay for exponential backoff between fetch attempts (milliseconds).
pub const RETRY_BASE_DELAY_MS: u64 = 500;

/// A reference value: a supported scheme followed by a non-blank remainder.
#[allow(clippy::expect_used)] // Static regex that is guaranteed to be valid
static REFERENCE_URL_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^(https?|file)://\S+$").expect("valid regex"));

/// Interpret a text value as a reference URL.
///
/// Returns `None` when the value does not look like a supported URL.
///
/// # Examples
/// ```
/// use xmlchain::config::parse_reference;
///
/// assert!(parse_reference(" https://ads.example.com/vast.xml ").is_some());
/// assert!(parse_reference("not a url").is_none());
/// assert!(parse_reference("mailto:someone@example.com").is_none());
/// ```
pub fn parse_reference(value: &str) -> Option<Url> {
    let trimmed = value.trim();
    if !REFERENCE_URL_PATTERN.is_match(trimmed) {
        return None;
    }
    Url::parse(trimmed).ok()
}

/// Validate a reference URL supplied by a caller.
///
/// # Returns
/// * `Ok(Url)` if the value is an `http`, `https` or `file` URL
/// * `Err(ResolveError::InvalidUrl)` otherwise
pub fn validate_reference_url(value: &str) -> Result<Url> {
    parse_reference(value).ok_or_else(|| ResolveError::InvalidUrl(value.to_string()))
}

/// Settings for a resolver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolverConfig {
    /// Deepest chain level that may still be fetched; `None` follows chains without limit.
    pub max_chain_depth: Option<usize>,
    /// Per-attempt timeout of the HTTP fetcher.
    pub fetch_timeout: Duration,
    /// Largest accepted fetched document.
    pub max_response_size: u64,
    /// Refuse to fetch a URL that is already an ancestor in the same chain.
    pub detect_cycles: bool,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            max_chain_depth: Some(DEFAULT_MAX_CHAIN_DEPTH),
            fetch_timeout: Duration::from_secs(HTTP_TIMEOUT_SECS),
            max_response_size: DEFAULT_MAX_RESPONSE_SIZE,
            detect_cycles: true,
        }
    }
}

impl ResolverConfig {
    /// Read settings from the environment, falling back to the defaults.
    ///
    /// * `XMLCHAIN_MAX_CHAIN_DEPTH`: `0` disables the limit
    /// * `XMLCHAIN_FETCH_TIMEOUT_SECS`
    /// * `XMLCHAIN_MAX_RESPONSE_SIZE` in bytes
    /// * `XMLCHAIN_DETECT_CYCLES`: `false`/`0` disables cycle detection
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let max_chain_depth = match std::env::var("XMLCHAIN_MAX_CHAIN_DEPTH") {
            Ok(raw) => {
                let depth: usize = raw.trim().parse().map_err(|_| {
                    ResolveError::Config(format!("XMLCHAIN_MAX_CHAIN_DEPTH is not a number: {raw}"))
                })?;
                (depth > 0).then_some(depth)
            }
            Err(_) => defaults.max_chain_depth,
        };

        let fetch_timeout_secs: u64 = std::env::var("XMLCHAIN_FETCH_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(HTTP_TIMEOUT_SECS);

        let max_response_size = std::env::var("XMLCHAIN_MAX_RESPONSE_SIZE")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.max_response_size);

        let detect_cycles = std::env::var("XMLCHAIN_DETECT_CYCLES")
            .ok()
            .map(|v| v != "false" && v != "0")
            .unwrap_or(defaults.detect_cycles);

        Ok(Self {
            max_chain_depth,
            fetch_timeout: Duration::from_secs(fetch_timeout_secs),
            max_response_size,
            detect_cycles,
        })
    }

    #[must_use]
    pub fn with_max_chain_depth(mut self, depth: Option<usize>) -> Self {
        self.max_chain_depth = depth;
        self
    }

    #[must_use]
    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_max_response_size(mut self, bytes: u64) -> Self {
        self.max_response_size = bytes;
        self
    }

    #[must_use]
    pub fn with_cycle_detection(mut self, enabled: bool) -> Self {
        self.detect_cycles = enabled;
        self
    }

    /// Check the chain depth limit for a root at `depth`.
    pub fn check_depth(&self, depth: usize) -> Result<()> {
        match self.max_chain_depth {
            Some(limit) if depth > limit => Err(ResolveError::ChainTooDeep { depth, limit }),
            _ => Ok(()),
        }
    }
}
