//! Transports deliver a challenge and hand back the raw response.

use crate::challenge::Challenge;
use crate::error::{TransportError, TransportErrorKind};
use crate::response::RawResponse;
use async_trait::async_trait;
use credsweep_core::TransportConfig;
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;

const SOAP_CONTENT_TYPE: &str = "application/soap+xml; charset=utf-8";

/// Sends one challenge.
///
/// Any delivered response is `Ok`, whatever its status; `Err` means no
/// response was received at all.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Deliver `challenge` and return the response.
    async fn send(&self, challenge: &Challenge) -> Result<RawResponse, TransportError>;
}

/// HTTPS transport backed by a pooled `reqwest` client.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    /// Build a transport with the configured timeout and user agent.
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be created.
    pub fn new(config: &TransportConfig) -> Result<Self, TransportError> {
        let client = Client::builder()
            .timeout(config.timeout())
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| {
                TransportError::new(
                    TransportErrorKind::Other,
                    format!("failed to create HTTP client: {e}"),
                )
            })?;

        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, challenge: &Challenge) -> Result<RawResponse, TransportError> {
        let response = self
            .client
            .post(&challenge.url)
            .query(&[("client-request-id", challenge.correlation_id.to_string())])
            .header(CONTENT_TYPE, SOAP_CONTENT_TYPE)
            .body(challenge.payload.clone())
            .send()
            .await?;

        let status = response.status().as_u16();
        let body = response.text().await?;

        tracing::trace!(
            "Response for {}: HTTP {} ({} bytes)",
            challenge.correlation_id,
            status,
            body.len()
        );

        Ok(RawResponse::new(status, body))
    }
}
