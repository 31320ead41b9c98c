use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{ACCEPT, HeaderMap, HeaderValue, USER_AGENT};
use serde_json::Value;

use crate::error::CatalogError;

pub trait CharacterApi: Send + Sync {
    fn fetch_payload(&self) -> Result<Value, CatalogError>;
}

#[derive(Clone)]
pub struct ApiHttpClient {
    client: Client,
    url: String,
}

impl ApiHttpClient {
    pub fn new(url: &str, user_agent: &str, timeout: Duration) -> Result<Self, CatalogError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(user_agent)
                .map_err(|err| CatalogError::ConfigInvalid(format!("user_agent: {err}")))?,
        );
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        let client = Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|err| CatalogError::ApiHttp(err.to_string()))?;
        Ok(Self {
            client,
            url: url.to_string(),
        })
    }
}

impl CharacterApi for ApiHttpClient {
    fn fetch_payload(&self) -> Result<Value, CatalogError> {
        tracing::info!(url = %self.url, "requesting character payload");
        let response = self
            .client
            .get(&self.url)
            .send()
            .map_err(|err| CatalogError::ApiHttp(err.to_string()))?;
        let status = response.status();
        tracing::info!(status = status.as_u16(), "character API responded");
        if !status.is_success() {
            let message = response
                .text()
                .unwrap_or_else(|_| "character API request failed".to_string());
            return Err(CatalogError::ApiStatus {
                status: status.as_u16(),
                message,
            });
        }
        let body = response
            .text()
            .map_err(|err| CatalogError::ApiHttp(err.to_string()))?;
        serde_json::from_str(&body).map_err(|err| CatalogError::Parse(err.to_string()))
    }
}
