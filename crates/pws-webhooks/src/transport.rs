//! Outbound HTTP delivery.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;

use crate::error::WebhookResult;
use crate::signer::WebhookHeaders;

/// Outcome of a single delivery attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryResult {
    /// Whether the endpoint answered with a 2xx status
    pub success: bool,

    /// HTTP status code, if a response was received
    pub http_status: Option<u16>,

    /// Response time in milliseconds
    pub response_time_ms: u32,

    /// Error message if failed
    pub error: Option<String>,
}

impl DeliveryResult {
    pub fn success(http_status: u16, response_time_ms: u32) -> Self {
        Self {
            success: true,
            http_status: Some(http_status),
            response_time_ms,
            error: None,
        }
    }

    /// A failure without an HTTP response (connect error, timeout).
    pub fn failure(error: impl Into<String>, response_time_ms: u32) -> Self {
        Self {
            success: false,
            http_status: None,
            response_time_ms,
            error: Some(error.into()),
        }
    }

    pub fn http_failure(http_status: u16, error: impl Into<String>, response_time_ms: u32) -> Self {
        Self {
            success: false,
            http_status: Some(http_status),
            response_time_ms,
            error: Some(error.into()),
        }
    }
}

/// Delivers a body to a URL with a given header set.
#[async_trait]
pub trait WebhookTransport: Send + Sync {
    async fn post(&self, url: &str, headers: &WebhookHeaders, body: &str) -> DeliveryResult;
}

pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new(timeout: Duration, connect_timeout: Duration) -> WebhookResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(connect_timeout)
            .build()?;
        Ok(Self { client })
    }

    /// Create with a custom client.
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl WebhookTransport for HttpTransport {
    async fn post(&self, url: &str, headers: &WebhookHeaders, body: &str) -> DeliveryResult {
        let start = Instant::now();

        let mut request = self.client.post(url);
        for (key, value) in headers {
            request = request.header(key.as_str(), value.as_str());
        }

        let response = request.body(body.to_owned()).send().await;
        let elapsed = start.elapsed().as_millis() as u32;

        match response {
            Ok(resp) => {
                let status = resp.status();
                if status.is_success() {
                    DeliveryResult::success(status.as_u16(), elapsed)
                } else {
                    let error_body = resp.text().await.unwrap_or_default();
                    DeliveryResult::http_failure(
                        status.as_u16(),
                        format!("HTTP {}: {}", status.as_u16(), error_body),
                        elapsed,
                    )
                }
            }
            Err(e) => DeliveryResult::failure(e.to_string(), elapsed),
        }
    }
}
