use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use deployer::relay::{LogPayload, LogTransport, TransportResponse};
use tokio::time::Instant;

/// One scripted collector reaction.
#[derive(Debug, Clone)]
pub enum Reply {
    Status(u16, Vec<u8>),
    /// A 200 whose body cannot be read.
    UnreadableBody,
    /// The request never produces a response.
    Unreachable,
}

/// A request the fake received.
#[derive(Debug, Clone)]
pub struct Recorded {
    pub url: String,
    pub payload: LogPayload,
    pub at: Instant,
}

/// A log collector that answers from a script.
///
/// Clones share state, so a test can hand one clone to the relay and inspect
/// the requests through another. Once the script runs out, every request is
/// answered with 200 and a continuation back to the same URL.
#[derive(Debug, Clone, Default)]
pub struct FakeTransport {
    inner: Arc<Mutex<Inner>>,
}

#[derive(Debug, Default)]
struct Inner {
    script: VecDeque<Reply>,
    requests: Vec<Recorded>,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn then(self, reply: Reply) -> Self {
        self.inner.lock().unwrap().script.push_back(reply);
        self
    }

    pub fn then_status(self, status: u16) -> Self {
        self.then(Reply::Status(status, Vec::new()))
    }

    /// 200 pointing the session at `next`.
    pub fn then_continue(self, next: &str) -> Self {
        let body = serde_json::json!({ "continue": next }).to_string().into_bytes();
        self.then(Reply::Status(200, body))
    }

    pub fn requests(&self) -> Vec<Recorded> {
        self.inner.lock().unwrap().requests.clone()
    }

    pub fn urls(&self) -> Vec<String> {
        self.requests().into_iter().map(|r| r.url).collect()
    }
}

impl LogTransport for FakeTransport {
    fn post<'a>(
        &'a self,
        url: &'a str,
        body: Vec<u8>,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<TransportResponse>> + Send + 'a>> {
        Box::pin(async move {
            let payload: LogPayload = serde_json::from_slice(&body)?;
            let reply = {
                let mut inner = self.inner.lock().unwrap();
                inner.requests.push(Recorded {
                    url: url.to_string(),
                    payload,
                    at: Instant::now(),
                });
                inner.script.pop_front()
            };

            match reply {
                Some(Reply::Status(status, body)) => Ok(TransportResponse {
                    status,
                    body: Ok(body),
                }),
                Some(Reply::UnreadableBody) => Ok(TransportResponse {
                    status: 200,
                    body: Err("connection reset while reading body".to_string()),
                }),
                Some(Reply::Unreachable) => Err(anyhow::anyhow!("connection refused")),
                None => Ok(TransportResponse {
                    status: 200,
                    body: Ok(serde_json::json!({ "continue": url }).to_string().into_bytes()),
                }),
            }
        })
    }
}
