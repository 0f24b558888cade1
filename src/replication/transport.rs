use dashmap::DashMap;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use super::apply::ApplyEngine;
use super::protocol::ENDPOINT_APPLY;
use super::types::{ApplyOutcome, ReplicationMessage};
use crate::error::DeliveryError;
use crate::topology::types::{NodeId, NodeRef};

pub type DeliveryFuture<'a> =
    Pin<Box<dyn Future<Output = Result<ApplyOutcome, DeliveryError>> + Send + 'a>>;

/// Delivers one replication message to a peer's Apply Engine.
pub trait ReplicationTransport: Send + Sync {
    fn deliver<'a>(&'a self, peer: &'a NodeRef, message: &'a ReplicationMessage)
    -> DeliveryFuture<'a>;
}

/// JSON-over-HTTP client for node-to-node calls.
///
/// Transport-level failures are retried with exponential backoff and jitter;
/// any HTTP response, success or not, ends the retry loop.
#[derive(Clone)]
pub struct PeerClient {
    http: reqwest::Client,
    timeout: Duration,
    attempts: usize,
}

impl PeerClient {
    pub fn new(timeout: Duration, attempts: usize) -> Self {
        Self {
            http: reqwest::Client::new(),
            timeout,
            attempts: attempts.max(1),
        }
    }

    async fn post_with_retry<T: Serialize>(
        &self,
        url: &str,
        payload: &T,
    ) -> Result<reqwest::Response, DeliveryError> {
        let mut delay_ms = 150u64;

        for attempt in 0..self.attempts {
            let response = self
                .http
                .post(url)
                .json(payload)
                .timeout(self.timeout)
                .send()
                .await;

            match response {
                Ok(resp) => return Ok(resp),
                Err(e) => {
                    if attempt + 1 == self.attempts {
                        return Err(DeliveryError::Transport(e.to_string()));
                    }
                    tracing::debug!("POST {} failed (attempt {}): {}", url, attempt + 1, e);
                    let jitter = rand::random::<u64>() % 50;
                    tokio::time::sleep(Duration::from_millis(delay_ms + jitter)).await;
                    delay_ms = (delay_ms * 2).min(1200);
                }
            }
        }

        Err(DeliveryError::Transport("retry attempts exhausted".to_string()))
    }

    /// POSTs `payload` and decodes a JSON answer. Non-2xx becomes `Rejected`.
    pub async fn post_json<T, R>(&self, url: &str, payload: &T) -> Result<R, DeliveryError>
    where
        T: Serialize,
        R: DeserializeOwned,
    {
        let response = self.post_with_retry(url, payload).await?;
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DeliveryError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        response
            .json::<R>()
            .await
            .map_err(|e| DeliveryError::Transport(format!("invalid response body: {}", e)))
    }
}

pub struct HttpTransport {
    client: PeerClient,
}

impl HttpTransport {
    pub fn new(client: PeerClient) -> Self {
        Self { client }
    }
}

impl ReplicationTransport for HttpTransport {
    fn deliver<'a>(
        &'a self,
        peer: &'a NodeRef,
        message: &'a ReplicationMessage,
    ) -> DeliveryFuture<'a> {
        Box::pin(async move {
            self.client
                .post_json::<_, ApplyOutcome>(&peer.url(ENDPOINT_APPLY), message)
                .await
        })
    }
}

/// Fault injected into a loopback peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerFault {
    /// Behaves like a refused connection.
    Unreachable,
    /// Answers every delivery with HTTP 503.
    Rejecting,
}

/// In-process transport that calls the target's Apply Engine directly.
#[derive(Default)]
pub struct LoopbackTransport {
    engines: DashMap<NodeId, Arc<ApplyEngine>>,
    faults: DashMap<NodeId, PeerFault>,
}

impl LoopbackTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn register(&self, engine: Arc<ApplyEngine>) {
        self.engines.insert(engine.local_id().clone(), engine);
    }

    pub fn set_fault(&self, node: &NodeId, fault: Option<PeerFault>) {
        match fault {
            Some(fault) => {
                self.faults.insert(node.clone(), fault);
            }
            None => {
                self.faults.remove(node);
            }
        }
    }
}

impl ReplicationTransport for LoopbackTransport {
    fn deliver<'a>(
        &'a self,
        peer: &'a NodeRef,
        message: &'a ReplicationMessage,
    ) -> DeliveryFuture<'a> {
        Box::pin(async move {
            match self.faults.get(&peer.id).map(|f| *f) {
                Some(PeerFault::Unreachable) => {
                    return Err(DeliveryError::Transport(format!(
                        "connection refused by {}",
                        peer.id
                    )));
                }
                Some(PeerFault::Rejecting) => {
                    return Err(DeliveryError::Rejected {
                        status: 503,
                        body: format!("{} is unavailable", peer.id),
                    });
                }
                None => {}
            }

            let engine = self
                .engines
                .get(&peer.id)
                .map(|e| e.value().clone())
                .ok_or_else(|| DeliveryError::Transport(format!("no route to {}", peer.id)))?;

            engine
                .receive(message)
                .await
                .map_err(|e| DeliveryError::Rejected {
                    status: e.status_code().as_u16(),
                    body: e.to_string(),
                })
        })
    }
}
