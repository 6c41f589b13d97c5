//! Fetching referenced documents.
//!
//! The resolver only sees the [`Fetch`] trait. [`HttpFetcher`] serves
//! `http`, `https` and `file` URLs; [`MemoryFetcher`] serves a fixed set of
//! documents and records what was asked for.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};
use url::Url;

use crate::config::{
    ResolverConfig, DEFAULT_MAX_RESPONSE_SIZE, HTTP_TIMEOUT_SECS, MAX_FETCH_RETRIES,
    RETRY_BASE_DELAY_MS,
};
use crate::error::FetchError;

/// User agent string identifying this resolver.
const USER_AGENT: &str = concat!("xmlchain/", env!("CARGO_PKG_VERSION"));

/// Capability to load the bytes behind a reference URL.
#[async_trait]
pub trait Fetch: Send + Sync {
    async fn fetch(&self, url: &Url) -> Result<Vec<u8>, FetchError>;
}

#[async_trait]
impl<T: Fetch + ?Sized> Fetch for Arc<T> {
    async fn fetch(&self, url: &Url) -> Result<Vec<u8>, FetchError> {
        (**self).fetch(url).await
    }
}

/// Fetcher for `http`, `https` and `file` URLs.
pub struct HttpFetcher {
    client: reqwest::Client,
    max_response_size: u64,
    retry_base_delay: Duration,
}

impl HttpFetcher {
    /// Create a fetcher with the default timeout and size limit.
    pub fn new() -> Result<Self, FetchError> {
        Self::build(
            Duration::from_secs(HTTP_TIMEOUT_SECS),
            DEFAULT_MAX_RESPONSE_SIZE,
        )
    }

    /// Create a fetcher using the timeout and size limit of `config`.
    pub fn from_config(config: &ResolverConfig) -> Result<Self, FetchError> {
        Self::build(config.fetch_timeout, config.max_response_size)
    }

    fn build(timeout: Duration, max_response_size: u64) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()?;
        Ok(Self {
            client,
            max_response_size,
            retry_base_delay: Duration::from_millis(RETRY_BASE_DELAY_MS),
        })
    }

    /// Change the base delay of the exponential backoff between attempts.
    #[must_use]
    pub fn with_retry_base_delay(mut self, delay: Duration) -> Self {
        self.retry_base_delay = delay;
        self
    }

    /// Download with retries.
    ///
    /// Network errors and 5xx responses are retried with exponential backoff;
    /// 4xx responses fail at once.
    async fn fetch_http(&self, url: &Url) -> Result<Vec<u8>, FetchError> {
        let mut last_error: Option<String> = None;

        for attempt in 0..MAX_FETCH_RETRIES {
            if attempt > 0 {
                let delay = self.retry_base_delay * (1 << (attempt - 1));
                let delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
                debug!(attempt, delay_ms, "Retrying after delay");
                tokio::time::sleep(delay).await;
            }

            match self.client.get(url.clone()).send().await {
                Ok(response) => {
                    let status = response.status();

                    if status.is_server_error() {
                        warn!(
                            %url,
                            status = %status,
                            attempt = attempt + 1,
                            max_retries = MAX_FETCH_RETRIES,
                            "Server error, will retry"
                        );
                        last_error = Some(format!("Server error: {status}"));
                        continue;
                    }
                    if !status.is_success() {
                        return Err(FetchError::Status {
                            status: status.as_u16(),
                        });
                    }

                    if let Some(size) = response.content_length() {
                        self.check_size(size)?;
                    }
                    let bytes = response.bytes().await?;
                    self.check_size(bytes.len() as u64)?;
                    return Ok(bytes.to_vec());
                }
                Err(e) => {
                    if e.is_connect() || e.is_timeout() {
                        warn!(
                            %url,
                            error = %e,
                            attempt = attempt + 1,
                            max_retries = MAX_FETCH_RETRIES,
                            "Connection error, will retry"
                        );
                        last_error = Some(e.to_string());
                        continue;
                    }
                    return Err(FetchError::Http(e));
                }
            }
        }

        Err(FetchError::RetriesExhausted {
            attempts: MAX_FETCH_RETRIES,
            message: last_error.unwrap_or_else(|| "Unknown error".to_string()),
        })
    }

    async fn fetch_file(&self, url: &Url) -> Result<Vec<u8>, FetchError> {
        let path = url
            .to_file_path()
            .map_err(|()| FetchError::NotFound(url.to_string()))?;
        let metadata = tokio::fs::metadata(&path).await?;
        self.check_size(metadata.len())?;
        Ok(tokio::fs::read(&path).await?)
    }

    fn check_size(&self, size: u64) -> Result<(), FetchError> {
        if size > self.max_response_size {
            return Err(FetchError::TooLarge {
                size,
                limit: self.max_response_size,
            });
        }
        Ok(())
    }
}

#[async_trait]
impl Fetch for HttpFetcher {
    async fn fetch(&self, url: &Url) -> Result<Vec<u8>, FetchError> {
        match url.scheme() {
            "http" | "https" => self.fetch_http(url).await,
            "file" => self.fetch_file(url).await,
            other => Err(FetchError::UnsupportedScheme(other.to_string())),
        }
    }
}

/// Fetcher over an in-memory set of documents.
#[derive(Debug, Default)]
pub struct MemoryFetcher {
    documents: HashMap<String, Vec<u8>>,
    delays: HashMap<String, Duration>,
    requests: Mutex<Vec<String>>,
}

impl MemoryFetcher {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `body` for `url`.
    #[must_use]
    pub fn with_document(mut self, url: &str, body: impl Into<Vec<u8>>) -> Self {
        self.documents.insert(url.to_string(), body.into());
        self
    }

    /// Answer requests for `url` only after `delay`.
    #[must_use]
    pub fn with_delay(mut self, url: &str, delay: Duration) -> Self {
        self.delays.insert(url.to_string(), delay);
        self
    }

    /// Every URL requested so far, in request order.
    #[must_use]
    pub fn requests(&self) -> Vec<String> {
        self.requests
            .lock()
            .map(|requests| requests.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl Fetch for MemoryFetcher {
    async fn fetch(&self, url: &Url) -> Result<Vec<u8>, FetchError> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(url.to_string());
        }
        if let Some(delay) = self.delays.get(url.as_str()) {
            tokio::time::sleep(*delay).await;
        }
        self.documents
            .get(url.as_str())
            .cloned()
            .ok_or_else(|| FetchError::NotFound(url.to_string()))
    }
}
