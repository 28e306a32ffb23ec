//! Delivery of signed envelopes to the VetStat endpoint.

use std::time::Duration;

use reqwest::Client;
use reqwest::header::{CONTENT_TYPE, HeaderValue};
use thiserror::Error;
use tracing::{debug, error};

use crate::config::VetStatConfig;
use crate::soap;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Invalid endpoint configuration: {0}")]
    Config(String),

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
}

/// Status and body of one HTTP exchange, whatever the status
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportResponse {
    pub status: u16,
    pub body: String,
}

/// Sends one serialized envelope and returns the raw response.
///
/// Implementations report network failures as errors. Any HTTP status,
/// including 5xx, is a response.
pub trait Transport: Send + Sync + 'static {
    fn send(
        &self,
        envelope: Vec<u8>,
    ) -> impl Future<Output = Result<TransportResponse, TransportError>> + Send;
}

/// `reqwest` based transport posting to a fixed endpoint
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    endpoint: String,
    soap_action: HeaderValue,
    timeout: Duration,
}

impl HttpTransport {
    pub fn new(
        endpoint: impl Into<String>,
        soap_action: &str,
        timeout: Duration,
    ) -> Result<Self, TransportError> {
        let endpoint = endpoint.into();
        reqwest::Url::parse(&endpoint)
            .map_err(|e| TransportError::Config(format!("endpoint {endpoint}: {e}")))?;
        let soap_action = HeaderValue::from_str(soap_action)
            .map_err(|e| TransportError::Config(format!("SOAPAction: {e}")))?;
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            endpoint,
            soap_action,
            timeout,
        })
    }

    pub fn from_config(config: &VetStatConfig) -> Result<Self, TransportError> {
        Self::new(config.endpoint.clone(), &config.soap_action, config.timeout())
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl Transport for HttpTransport {
    async fn send(&self, envelope: Vec<u8>) -> Result<TransportResponse, TransportError> {
        debug!(endpoint = %self.endpoint, len = envelope.len(), "Posting SOAP request");

        let response = self
            .client
            .post(&self.endpoint)
            .header(CONTENT_TYPE, soap::CONTENT_TYPE)
            .header("SOAPAction", self.soap_action.clone())
            .body(envelope)
            .send()
            .await
            .map_err(|e| self.map_error(e))?;

        let status = response.status().as_u16();
        let body = response.text().await.map_err(|e| self.map_error(e))?;
        debug!(status, len = body.len(), "Received SOAP response");

        Ok(TransportResponse { status, body })
    }
}

impl HttpTransport {
    fn map_error(&self, e: reqwest::Error) -> TransportError {
        if e.is_timeout() {
            error!(endpoint = %self.endpoint, "Request timed out");
            TransportError::Timeout(self.timeout)
        } else {
            error!(endpoint = %self.endpoint, "Request failed: {e}");
            TransportError::Http(e)
        }
    }
}
