// src/relay/mod.rs

//! Forwarding command output to the remote log collector.
//!
//! The collector hands out a fresh endpoint with every accepted post, so the
//! session is a chain of single-use URLs. [`LogRelay`] owns the current one
//! and is the only thing that advances it.

pub mod transport;

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::config::RelaySection;
use crate::errors::{DeployerError, Result};
use crate::framer::LineGroup;

pub use transport::{HttpTransport, LogTransport, TransportResponse};

/// Request body posted to the collector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogPayload {
    pub lines: Vec<String>,
    pub done: bool,
    pub error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ContinueResponse {
    #[serde(rename = "continue")]
    next: String,
}

/// Doubling retry delay with an upper bound.
#[derive(Debug, Clone)]
pub struct Backoff {
    next: Duration,
    max: Duration,
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            next: initial.min(max),
            max,
        }
    }

    /// Delay before the next retry.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.next;
        self.next = (self.next * 2).min(self.max);
        delay
    }
}

/// Sequential poster of log payloads.
pub struct LogRelay<T: LogTransport> {
    transport: T,
    endpoint: String,
    initial_backoff: Duration,
    max_backoff: Duration,
}

impl<T: LogTransport> LogRelay<T> {
    /// An empty `endpoint` disables forwarding; lines are still echoed.
    pub fn new(transport: T, endpoint: impl Into<String>, settings: &RelaySection) -> Self {
        Self {
            transport,
            endpoint: endpoint.into(),
            initial_backoff: settings.initial_backoff(),
            max_backoff: settings.max_backoff(),
        }
    }

    /// The endpoint the next post will go to.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Forward one group of output lines.
    pub async fn relay_lines(&mut self, group: &LineGroup) -> Result<()> {
        let payload = LogPayload {
            lines: group.to_text(),
            done: false,
            error: None,
        };
        self.post(&payload).await
    }

    /// Report a failure as the last post of the session.
    ///
    /// Returns the error the caller should propagate: `error` itself once the
    /// collector has it, or the relay's own fatal error if posting failed.
    pub async fn relay_failure(&mut self, error: DeployerError) -> DeployerError {
        let payload = LogPayload {
            lines: Vec::new(),
            done: true,
            error: Some(error.to_string()),
        };
        match self.post(&payload).await {
            Ok(()) => error,
            Err(relay_error) => {
                warn!(error = %error, "log relay failed while reporting an error");
                relay_error
            }
        }
    }

    /// Close the session successfully with a final group of lines.
    pub async fn finish(&mut self, lines: Vec<String>) -> Result<()> {
        let payload = LogPayload {
            lines,
            done: true,
            error: None,
        };
        self.post(&payload).await
    }

    async fn post(&mut self, payload: &LogPayload) -> Result<()> {
        for line in &payload.lines {
            println!("{line}");
        }
        if self.endpoint.is_empty() {
            return Ok(());
        }

        let body = serde_json::to_vec(payload)?;
        let mut backoff = Backoff::new(self.initial_backoff, self.max_backoff);

        loop {
            match self.transport.post(&self.endpoint, body.clone()).await {
                Ok(response) if response.status == 200 => {
                    return self.accept(payload, response.body);
                }
                Ok(response) if response.status < 500 => {
                    return Err(DeployerError::LogRejected {
                        endpoint: self.endpoint.clone(),
                        status: response.status,
                    });
                }
                Ok(response) => {
                    warn!(
                        endpoint = %self.endpoint,
                        status = response.status,
                        "server error from log endpoint"
                    );
                }
                Err(e) => {
                    warn!(endpoint = %self.endpoint, error = %e, "failed to send log data");
                }
            }

            let delay = backoff.next_delay();
            info!(?delay, "backing off before retrying");
            sleep(delay).await;
        }
    }

    /// Handle a 200 response: adopt the continuation unless the session is
    /// over.
    ///
    /// The endpoint is spent once the collector answered 200, so a body that
    /// cannot be read or decoded is fatal rather than retried.
    fn accept(
        &mut self,
        payload: &LogPayload,
        body: std::result::Result<Vec<u8>, String>,
    ) -> Result<()> {
        if payload.done {
            debug!(endpoint = %self.endpoint, "log session closed");
            return Ok(());
        }
        let body = body.map_err(|e| {
            DeployerError::LogProtocol(format!(
                "failed to read response from {}: {e}",
                self.endpoint
            ))
        })?;
        let next: ContinueResponse = serde_json::from_slice(&body).map_err(|e| {
            DeployerError::LogProtocol(format!(
                "failed to decode response from {}: {e}",
                self.endpoint
            ))
        })?;
        debug!(from = %self.endpoint, to = %next.next, "log endpoint advanced");
        self.endpoint = next.next;
        Ok(())
    }
}
