//! HTTP transport and sleeping, behind traits so the poll loop can run
//! against mocks and virtual time.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::HOST;
use reqwest::StatusCode;
use thiserror::Error;

use crate::request::ProbeRequest;

/// Failure to get any response at all
#[derive(Error, Debug, Clone)]
pub enum TransportError {
    #[error("request timed out")]
    Timeout,

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("{0}")]
    Other(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            TransportError::Timeout
        } else if e.is_connect() {
            TransportError::Connect(e.to_string())
        } else {
            TransportError::Other(e.to_string())
        }
    }
}

/// A response whose body has not been read yet
#[async_trait]
pub trait ProbeResponse: Send {
    fn status(&self) -> StatusCode;

    /// Read the whole body as text. Consumes the response, releasing the
    /// connection whether or not the read succeeds.
    async fn text(self) -> Result<String, String>;
}

/// Executes a single attempt
#[async_trait]
pub trait Transport: Send + Sync {
    type Response: ProbeResponse;

    async fn send(&self, request: &ProbeRequest) -> Result<Self::Response, TransportError>;
}

/// Waits out the backoff between attempts
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Real sleeps on the tokio timer (virtual under a paused test clock)
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Transport backed by a shared reqwest client
#[derive(Debug, Clone, Default)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    type Response = reqwest::Response;

    async fn send(&self, request: &ProbeRequest) -> Result<Self::Response, TransportError> {
        let mut builder = self
            .client
            .get(request.url.clone())
            .headers(request.headers.clone())
            .timeout(request.timeout);

        // hyper routes with an explicit Host header in place of the URL authority
        if let Some(host) = &request.host {
            builder = builder.header(HOST, host.clone());
        }

        Ok(builder.send().await?)
    }
}

#[async_trait]
impl ProbeResponse for reqwest::Response {
    fn status(&self) -> StatusCode {
        reqwest::Response::status(self)
    }

    async fn text(self) -> Result<String, String> {
        reqwest::Response::text(self).await.map_err(|e| e.to_string())
    }
}
