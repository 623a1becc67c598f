// src/relay/transport.rs

//! How log payloads reach the collector.
//!
//! The relay talks to a `LogTransport` rather than an HTTP client directly,
//! so tests can script collector responses without a server.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use reqwest::header::CONTENT_TYPE;

use crate::errors::{DeployerError, Result};

/// Status and body of a collector response.
///
/// `body` is `Err` when the status arrived but the body could not be read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportResponse {
    pub status: u16,
    pub body: std::result::Result<Vec<u8>, String>,
}

/// A way to POST a JSON body to a URL.
///
/// `Err` means the request did not produce a response (connection refused,
/// timeout, ...). The relay retries those.
pub trait LogTransport: Send + Sync {
    fn post<'a>(
        &'a self,
        url: &'a str,
        body: Vec<u8>,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<TransportResponse>> + Send + 'a>>;
}

/// Production transport backed by `reqwest`.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(request_timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| DeployerError::ConfigError(format!("building HTTP client: {e}")))?;
        Ok(Self { client })
    }
}

impl LogTransport for HttpTransport {
    fn post<'a>(
        &'a self,
        url: &'a str,
        body: Vec<u8>,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<TransportResponse>> + Send + 'a>> {
        Box::pin(async move {
            let response = self
                .client
                .post(url)
                .header(CONTENT_TYPE, "application/json")
                .body(body)
                .send()
                .await?;
            let status = response.status().as_u16();
            let body = response
                .bytes()
                .await
                .map(|bytes| bytes.to_vec())
                .map_err(|e| e.to_string());
            Ok(TransportResponse { status, body })
        })
    }
}
