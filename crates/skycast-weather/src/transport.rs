//! HTTP transport abstraction.
//!
//! The API client and geocoder speak to the network only through
//! [`HttpTransport`], so retry and classification logic does not depend on
//! a particular HTTP stack.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};

use crate::error::TransportError;

/// A fully-read HTTP response
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: StatusCode,
    /// Header names are lower-cased
    pub headers: HashMap<String, String>,
    pub body: String,
}

impl HttpResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// `Retry-After` in its delta-seconds form
    pub fn retry_after(&self) -> Option<Duration> {
        self.header("retry-after")
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map(Duration::from_secs)
    }
}

#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// Perform a GET and read the whole body.
    ///
    /// Non-2xx statuses are returned as responses, not errors.
    async fn get(
        &self,
        url: &str,
        headers: &[(&str, &str)],
    ) -> Result<HttpResponse, TransportError>;
}

/// `reqwest`-backed transport with a per-request timeout
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new(user_agent: &str, timeout: Duration) -> Result<Self, TransportError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn get(
        &self,
        url: &str,
        headers: &[(&str, &str)],
    ) -> Result<HttpResponse, TransportError> {
        let mut request = self.client.get(url);
        for (name, value) in headers {
            request = request.header(*name, *value);
        }

        let response = request.send().await?;
        let status = response.status();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_ascii_lowercase(), v.to_string()))
            })
            .collect();
        let body = response.text().await?;

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}

pub(crate) const ACCEPT_GEO_JSON: (&str, &str) = ("Accept", "application/geo+json");
