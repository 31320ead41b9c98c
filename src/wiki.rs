use std::io::Write;
use std::thread;
use std::time::Duration;

use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};

use crate::error::CatalogError;

const MAX_RETRIES: usize = 2;
const BASE_DELAY_MS: u64 = 500;

pub trait WikiClient: Send + Sync {
    fn fetch_page(&self, url: &str) -> Result<String, CatalogError>;

    /// Streams the body at `url` into `destination`, returning the byte count.
    fn download(&self, url: &str, destination: &mut dyn Write) -> Result<u64, CatalogError>;
}

#[derive(Clone)]
pub struct WikiHttpClient {
    client: Client,
    min_retry_delay: Duration,
}

impl WikiHttpClient {
    /// `min_retry_delay` is the configured gap between wiki requests; retries never
    /// come back sooner than that.
    pub fn new(
        user_agent: &str,
        timeout: Duration,
        min_retry_delay: Duration,
    ) -> Result<Self, CatalogError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(user_agent)
                .map_err(|err| CatalogError::ConfigInvalid(format!("user_agent: {err}")))?,
        );
        let client = Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|err| CatalogError::WikiHttp(err.to_string()))?;
        Ok(Self {
            client,
            min_retry_delay,
        })
    }

    fn handle_status(response: Response) -> Result<Response, CatalogError> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status().as_u16();
        let message = response
            .status()
            .canonical_reason()
            .unwrap_or("wiki request failed")
            .to_string();
        Err(CatalogError::WikiStatus { status, message })
    }

    fn retry_delay(&self, attempt: usize) -> Duration {
        let backoff = Duration::from_millis(BASE_DELAY_MS * (attempt as u64 + 1));
        backoff.max(self.min_retry_delay)
    }

    fn send_with_retries<F>(&self, mut make_req: F) -> Result<Response, CatalogError>
    where
        F: FnMut() -> RequestBuilder,
    {
        let mut attempt = 0usize;
        loop {
            match make_req().send() {
                Ok(resp) => {
                    let status = resp.status().as_u16();
                    if attempt < MAX_RETRIES && is_retryable_status(status) {
                        let delay = self.retry_delay(attempt);
                        tracing::warn!(
                            status,
                            delay_ms = delay.as_millis() as u64,
                            "retrying wiki request"
                        );
                        thread::sleep(delay);
                        attempt += 1;
                        continue;
                    }
                    return Ok(resp);
                }
                Err(err) => {
                    if attempt < MAX_RETRIES && is_retryable_error(&err) {
                        let delay = self.retry_delay(attempt);
                        tracing::warn!(
                            error = %err,
                            delay_ms = delay.as_millis() as u64,
                            "retrying wiki request"
                        );
                        thread::sleep(delay);
                        attempt += 1;
                        continue;
                    }
                    return Err(CatalogError::WikiHttp(err.to_string()));
                }
            }
        }
    }
}

impl WikiClient for WikiHttpClient {
    fn fetch_page(&self, url: &str) -> Result<String, CatalogError> {
        let response = self.send_with_retries(|| self.client.get(url))?;
        let response = Self::handle_status(response)?;
        response
            .text()
            .map_err(|err| CatalogError::WikiHttp(err.to_string()))
    }

    fn download(&self, url: &str, destination: &mut dyn Write) -> Result<u64, CatalogError> {
        let response = self.send_with_retries(|| self.client.get(url))?;
        let mut response = Self::handle_status(response)?;
        std::io::copy(&mut response, destination)
            .map_err(|err| CatalogError::WikiHttp(format!("stream interrupted: {err}")))
    }
}

fn is_retryable_status(status: u16) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 504)
}

fn is_retryable_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect()
}
