use crate::push::PushBatch;
use crate::sink::{LogSink, SinkError};
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Url};
use std::time::Duration;

/// Upper bound for a single push, regardless of the client timeout.
pub const PUSH_TIMEOUT: Duration = Duration::from_secs(5);

/// Client timeout used when none is configured.
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(5);

/// Loki implementation of [`LogSink`] using the JSON push API.
///
/// Each call to [`LogSink::push`] is one `POST` of the whole batch to the
/// configured endpoint, e.g. `http://loki:3100/loki/api/v1/push`.
#[derive(Clone, Debug)]
pub struct LokiSink {
    client: Client,
    endpoint: Url,
    push_timeout: Duration,
}

impl LokiSink {
    /// Construct a sink posting to `endpoint`.
    ///
    /// **Parameters**
    /// - `endpoint`: absolute `http`/`https` URL of the push API.
    /// - `http_timeout`: client-wide timeout; `None` means 5 seconds.
    ///
    /// **Returns**
    /// - `Err(EndpointError::Invalid)` if `endpoint` is not a usable URL.
    pub fn new(endpoint: &str, http_timeout: Option<Duration>) -> Result<Self, EndpointError> {
        let endpoint = parse_endpoint(endpoint)?;
        let http_timeout = http_timeout.unwrap_or(DEFAULT_HTTP_TIMEOUT);
        let client = Client::builder().timeout(http_timeout).build()?;

        Ok(LokiSink {
            client,
            endpoint,
            push_timeout: PUSH_TIMEOUT.min(http_timeout),
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Timeout applied to each push request.
    pub fn push_timeout(&self) -> Duration {
        self.push_timeout
    }
}

#[async_trait]
impl LogSink for LokiSink {
    async fn push(&self, batch: &PushBatch) -> Result<(), SinkError> {
        let body = batch.to_json()?;
        let resp = self
            .client
            .post(self.endpoint.clone())
            .header(CONTENT_TYPE, "application/json")
            .timeout(self.push_timeout)
            .body(body)
            .send()
            .await?;

        if resp.status().is_success() {
            Ok(())
        } else {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_else(|_| "<no body>".to_string());
            Err(SinkError::Status { status, body })
        }
    }
}

/// Validate a push endpoint: it must be an absolute `http` or `https` URL.
pub fn parse_endpoint(endpoint: &str) -> Result<Url, EndpointError> {
    let trimmed = endpoint.trim();
    if trimmed.is_empty() {
        return Err(EndpointError::Empty);
    }

    let url = Url::parse(trimmed).map_err(|e| EndpointError::Invalid(e.to_string()))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(EndpointError::UnsupportedScheme(other.to_string())),
    }
}

/// Error type returned when building a [`LokiSink`].
#[derive(thiserror::Error, Debug)]
pub enum EndpointError {
    #[error("push endpoint is empty")]
    Empty,

    #[error("invalid push endpoint: {0}")]
    Invalid(String),

    #[error("unsupported push endpoint scheme: {0}")]
    UnsupportedScheme(String),

    #[error("failed to build http client: {0}")]
    Client(#[from] reqwest::Error),
}
