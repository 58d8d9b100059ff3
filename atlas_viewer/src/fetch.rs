//! Request lanes over a pluggable HTTP transport.
//!
//! Each [`Lane`] carries at most one in-flight request. Starting a request
//! on a lane signals the previous one, which resolves to
//! [`FetchError::Cancelled`] instead of its response.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::oneshot;
use tracing::{debug, trace};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Lane {
    Configuration,
    Update,
    Markers,
}

impl Lane {
    pub const ALL: [Lane; 3] = [Lane::Configuration, Lane::Update, Lane::Markers];

    fn index(self) -> usize {
        match self {
            Lane::Configuration => 0,
            Lane::Update => 1,
            Lane::Markers => 2,
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    #[error("{lane:?} request superseded by a newer one")]
    Cancelled { lane: Lane },
    #[error("Network request failed: {0}")]
    Network(String),
    #[error("Network request failed ({reason})")]
    Status { status: u16, reason: String },
    #[error("Request returned invalid json")]
    InvalidJson,
    #[error("Login required")]
    LoginRequired,
    #[error("{0}")]
    Server(String),
}

impl FetchError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, FetchError::Cancelled { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub reason: String,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Decode the body, rejecting non-success statuses first.
    pub fn into_json(self) -> Result<Value, FetchError> {
        if !self.is_success() {
            let reason = if self.reason.is_empty() {
                "Unknown".to_string()
            } else {
                self.reason
            };
            return Err(FetchError::Status {
                status: self.status,
                reason,
            });
        }
        serde_json::from_slice(&self.body).map_err(|_| FetchError::InvalidJson)
    }
}

#[async_trait]
pub trait Transport: Send + Sync {
    async fn get(&self, url: &str) -> Result<HttpResponse, FetchError>;
    async fn post(&self, url: &str, body: String) -> Result<HttpResponse, FetchError>;
}

pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(timeout: Duration) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| FetchError::Network(err.to_string()))?;
        Ok(Self { client })
    }

    async fn collect(response: reqwest::Response) -> Result<HttpResponse, FetchError> {
        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|err| FetchError::Network(err.to_string()))?;
        Ok(HttpResponse {
            status: status.as_u16(),
            reason: status.canonical_reason().unwrap_or_default().to_string(),
            body: body.to_vec(),
        })
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn get(&self, url: &str) -> Result<HttpResponse, FetchError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|err| FetchError::Network(err.to_string()))?;
        Self::collect(response).await
    }

    async fn post(&self, url: &str, body: String) -> Result<HttpResponse, FetchError> {
        let response = self
            .client
            .post(url)
            .body(body)
            .send()
            .await
            .map_err(|err| FetchError::Network(err.to_string()))?;
        Self::collect(response).await
    }
}

#[derive(Default)]
struct RequestLane {
    generation: u64,
    cancel: Option<oneshot::Sender<()>>,
}

pub struct FetchCoordinator {
    transport: Arc<dyn Transport>,
    lanes: [Mutex<RequestLane>; 3],
}

impl FetchCoordinator {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            lanes: Default::default(),
        }
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    /// GET `url` on `lane` and decode the JSON body.
    pub async fn get_json(&self, lane: Lane, url: &str) -> Result<Value, FetchError> {
        let (generation, cancelled) = self.begin(lane);
        let _slot = LaneSlot {
            lane: &self.lanes[lane.index()],
            generation,
        };
        trace!(target: "atlas::fetch", ?lane, url, generation, "request.started");

        let result = tokio::select! {
            biased;
            _ = cancelled => Err(FetchError::Cancelled { lane }),
            response = self.transport.get(url) => response.and_then(HttpResponse::into_json),
        };

        if result.as_ref().is_err_and(FetchError::is_cancelled) {
            debug!(target: "atlas::fetch", ?lane, url, generation, "request.cancelled");
        }
        result
    }

    /// Abort whatever is in flight on `lane`.
    pub fn cancel(&self, lane: Lane) {
        let mut slot = self.lanes[lane.index()].lock();
        if let Some(cancel) = slot.cancel.take() {
            let _ = cancel.send(());
        }
    }

    pub fn cancel_all(&self) {
        for lane in Lane::ALL {
            self.cancel(lane);
        }
    }

    pub fn in_flight(&self, lane: Lane) -> bool {
        self.lanes[lane.index()].lock().cancel.is_some()
    }

    fn begin(&self, lane: Lane) -> (u64, oneshot::Receiver<()>) {
        let (sender, receiver) = oneshot::channel();
        let mut slot = self.lanes[lane.index()].lock();
        if let Some(previous) = slot.cancel.replace(sender) {
            let _ = previous.send(());
        }
        slot.generation += 1;
        (slot.generation, receiver)
    }
}

/// Releases a lane when its request ends, including when the caller drops
/// the request future. A newer request on the same lane is left alone.
struct LaneSlot<'a> {
    lane: &'a Mutex<RequestLane>,
    generation: u64,
}

impl Drop for LaneSlot<'_> {
    fn drop(&mut self) {
        let mut slot = self.lane.lock();
        if slot.generation == self.generation {
            slot.cancel = None;
        }
    }
}
