//! HTTP GET transport.
//!
//! The exchange only needs "execute GET, return status and body stream".
//! [`HttpTransport`] provides it on reqwest's blocking client with retries
//! and capped exponential backoff; tests substitute their own [`Transport`].

use std::io::Read;
use std::thread::sleep;
use std::time::Duration;

use reqwest::Url;
use reqwest::blocking::Client;
use tracing::{debug, warn};

use crate::config::NetworkConfig;
use crate::error::{Result, SruError};

const TARGET: &str = "sru_client::transport";

/// Status line and body of a GET exchange
pub struct TransportResponse {
    pub status: u16,
    pub body: Box<dyn Read + Send>,
}

impl TransportResponse {
    pub fn new(status: u16, body: Box<dyn Read + Send>) -> Self {
        Self { status, body }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

impl std::fmt::Debug for TransportResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportResponse")
            .field("status", &self.status)
            .finish_non_exhaustive()
    }
}

/// Executes GET requests on behalf of one client
pub trait Transport: Send {
    fn execute(&self, uri: &Url) -> Result<TransportResponse>;
}

/// Blocking HTTP transport with retry logic
pub struct HttpTransport {
    client: Client,
    config: NetworkConfig,
}

impl HttpTransport {
    /// Create a new HTTP transport with the given configuration
    pub fn new(config: NetworkConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout())
            .user_agent(&config.user_agent)
            .pool_idle_timeout(Duration::from_secs(30))
            .pool_max_idle_per_host(10)
            .build()
            .map_err(SruError::from)?;

        Ok(Self { client, config })
    }

    /// Make a single HTTP request
    fn make_request(&self, uri: &Url) -> Result<reqwest::blocking::Response> {
        self.client.get(uri.clone()).send().map_err(|e| {
            if e.is_timeout() {
                SruError::Timeout {
                    url: uri.to_string(),
                    timeout_seconds: self.config.timeout_seconds,
                }
            } else {
                SruError::from(e)
            }
        })
    }

    /// Delay before retry `attempt`, doubling per attempt up to the cap
    fn retry_delay(&self, attempt: u32) -> Duration {
        let factor = 2_u32.saturating_pow(attempt);
        self.config
            .retry_delay()
            .saturating_mul(factor)
            .min(self.config.max_retry_delay())
    }

    /// Check if an error is retryable
    fn is_retryable_error(&self, error: &SruError) -> bool {
        match error {
            SruError::Http(reqwest_error) => {
                reqwest_error.is_timeout() || reqwest_error.is_connect() || reqwest_error.is_request()
            }
            SruError::Timeout { .. } => true,
            _ => false,
        }
    }

    pub fn config(&self) -> &NetworkConfig {
        &self.config
    }
}

impl Transport for HttpTransport {
    fn execute(&self, uri: &Url) -> Result<TransportResponse> {
        let mut attempt = 0;

        loop {
            match self.make_request(uri) {
                Ok(response) => {
                    let status = response.status();
                    // Retry on server errors (5xx) but not client errors (4xx)
                    if status.is_server_error() && attempt < self.config.retry_attempts {
                        warn!(target: TARGET, %uri, status = status.as_u16(), attempt, "retrying after server error");
                        sleep(self.retry_delay(attempt));
                        attempt += 1;
                        continue;
                    }
                    debug!(target: TARGET, %uri, status = status.as_u16(), "response received");
                    return Ok(TransportResponse::new(status.as_u16(), Box::new(response)));
                }
                Err(error) => {
                    if attempt < self.config.retry_attempts && self.is_retryable_error(&error) {
                        warn!(target: TARGET, %uri, attempt, error = %error, "retrying after transport error");
                        sleep(self.retry_delay(attempt));
                        attempt += 1;
                        continue;
                    }
                    return Err(error);
                }
            }
        }
    }
}
