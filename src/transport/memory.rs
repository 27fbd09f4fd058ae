//! In-memory transport.
//!
//! Each endpoint has a feed: a FIFO of scripted items shared by every stream opened
//! on that endpoint, so items queued after an idle timeout are delivered to the
//! reopened stream. Every `open` is recorded, which lets callers inspect the exact
//! parameters (notably the cursor) each request carried. Intended for embedded use,
//! tests, and as a reference implementation of `WatchTransport`.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::{TransportError, STATUS_GONE};
use crate::event::RawEvent;
use crate::kind::EndpointKey;
use crate::operation::WatchOperation;
use crate::watch::WatchParams;

use super::{RawEventStream, StopHandle, WatchTransport};

/// Scripted feed item.
#[derive(Debug, Clone, PartialEq)]
pub enum FeedItem {
    /// Deliver an envelope.
    Event(RawEvent),
    /// Fail the open stream.
    Error(TransportError),
    /// End the open stream as if the idle timeout had elapsed.
    Timeout,
}

/// Configuration for `InMemoryTransport`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InMemoryTransportConfig {
    /// Idle window used instead of `timeout_seconds` when the request carries a
    /// non-zero timeout. `None` uses `timeout_seconds` as given.
    pub idle_timeout_ms: Option<u64>,
    /// How often a blocked stream re-checks its stop handle.
    pub poll_interval_ms: u64,
}

impl Default for InMemoryTransportConfig {
    fn default() -> Self {
        Self {
            idle_timeout_ms: None,
            poll_interval_ms: 10,
        }
    }
}

/// A recorded `open` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchRequest {
    /// Endpoint the watch was opened on.
    pub endpoint: EndpointKey,
    /// Request target built by the operation.
    pub target: String,
    /// Parameters at the time of the call.
    pub params: WatchParams,
}

#[derive(Debug)]
struct Feed {
    tx: Sender<FeedItem>,
    rx: Receiver<FeedItem>,
}

impl Feed {
    fn new() -> Self {
        let (tx, rx) = unbounded();
        Self { tx, rx }
    }
}

#[derive(Debug, Default)]
struct TransportState {
    feeds: HashMap<EndpointKey, Feed>,
    requests: Vec<WatchRequest>,
}

/// Scripted transport backed by in-process channels.
#[derive(Debug, Default)]
pub struct InMemoryTransport {
    cfg: InMemoryTransportConfig,
    state: Mutex<TransportState>,
}

impl InMemoryTransport {
    /// Creates a transport with the given configuration.
    #[must_use]
    pub fn new(cfg: InMemoryTransportConfig) -> Self {
        Self {
            cfg,
            state: Mutex::new(TransportState::default()),
        }
    }

    /// Creates a transport whose non-zero idle timeouts last `idle` instead of
    /// the requested number of seconds.
    #[must_use]
    pub fn with_idle_timeout(idle: Duration) -> Self {
        Self::new(InMemoryTransportConfig {
            idle_timeout_ms: Some(u64::try_from(idle.as_millis()).unwrap_or(u64::MAX)),
            ..InMemoryTransportConfig::default()
        })
    }

    /// Handle for scripting the feed of an endpoint.
    pub fn feed(&self, endpoint: &EndpointKey) -> FeedHandle {
        let mut state = self.state.lock();
        let feed = state
            .feeds
            .entry(endpoint.clone())
            .or_insert_with(Feed::new);
        FeedHandle {
            tx: feed.tx.clone(),
        }
    }

    /// Every `open` call so far, oldest first.
    #[must_use]
    pub fn requests(&self) -> Vec<WatchRequest> {
        self.state.lock().requests.clone()
    }

    /// Requests made to one endpoint, oldest first.
    #[must_use]
    pub fn requests_for(&self, endpoint: &EndpointKey) -> Vec<WatchRequest> {
        self.state
            .lock()
            .requests
            .iter()
            .filter(|r| &r.endpoint == endpoint)
            .cloned()
            .collect()
    }

    fn idle_window(&self, params: &WatchParams) -> Option<Duration> {
        match params.timeout_seconds {
            None | Some(0) => None,
            Some(secs) => Some(
                self.cfg
                    .idle_timeout_ms
                    .map_or_else(|| Duration::from_secs(u64::from(secs)), Duration::from_millis),
            ),
        }
    }
}

impl WatchTransport for InMemoryTransport {
    fn open(
        &self,
        operation: &dyn WatchOperation,
        params: &WatchParams,
        stop: StopHandle,
    ) -> Result<RawEventStream, TransportError> {
        let endpoint = operation.endpoint().clone();
        let rx = {
            let mut state = self.state.lock();
            state.requests.push(WatchRequest {
                endpoint: endpoint.clone(),
                target: operation.request_target(params),
                params: params.clone(),
            });
            state
                .feeds
                .entry(endpoint)
                .or_insert_with(Feed::new)
                .rx
                .clone()
        };

        Ok(Box::new(InMemoryStream {
            rx,
            stop,
            idle: self.idle_window(params),
            poll: Duration::from_millis(self.cfg.poll_interval_ms.max(1)),
            finished: false,
        }))
    }
}

struct InMemoryStream {
    rx: Receiver<FeedItem>,
    stop: StopHandle,
    idle: Option<Duration>,
    poll: Duration,
    finished: bool,
}

impl Iterator for InMemoryStream {
    type Item = Result<RawEvent, TransportError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        let started = Instant::now();
        loop {
            if self.stop.is_stopped() {
                self.finished = true;
                return None;
            }

            let wait = match self.idle {
                Some(idle) => {
                    let elapsed = started.elapsed();
                    if elapsed >= idle {
                        self.finished = true;
                        return None;
                    }
                    self.poll.min(idle - elapsed)
                }
                None => self.poll,
            };

            match self.rx.recv_timeout(wait) {
                Ok(FeedItem::Event(raw)) => return Some(Ok(raw)),
                Ok(FeedItem::Error(err)) => {
                    self.finished = true;
                    return Some(Err(err));
                }
                Ok(FeedItem::Timeout) | Err(RecvTimeoutError::Disconnected) => {
                    self.finished = true;
                    return None;
                }
                Err(RecvTimeoutError::Timeout) => {}
            }
        }
    }
}

/// Producer side of an endpoint feed.
#[derive(Debug, Clone)]
pub struct FeedHandle {
    tx: Sender<FeedItem>,
}

impl FeedHandle {
    /// Queues an item.
    pub fn push(&self, item: FeedItem) {
        // The transport owns a receiver for the feed's lifetime.
        let _ = self.tx.send(item);
    }

    /// Queues an envelope.
    pub fn event(&self, event_type: &str, object: Value) {
        self.push(FeedItem::Event(RawEvent::new(event_type, object)));
    }

    /// Queues an `ADDED` envelope.
    pub fn added(&self, object: Value) {
        self.event("ADDED", object);
    }

    /// Queues a `MODIFIED` envelope.
    pub fn modified(&self, object: Value) {
        self.event("MODIFIED", object);
    }

    /// Queues a `DELETED` envelope.
    pub fn deleted(&self, object: Value) {
        self.event("DELETED", object);
    }

    /// Queues a `BOOKMARK` envelope at the given version.
    pub fn bookmark(&self, resource_version: u64) {
        self.event(
            "BOOKMARK",
            json!({"metadata": {"resourceVersion": resource_version.to_string()}}),
        );
    }

    /// Queues a transport failure.
    pub fn fail(&self, status: u16, reason: &str) {
        self.push(FeedItem::Error(TransportError::api(status, reason)));
    }

    /// Queues a "history gone" failure naming `oldest` as the oldest available version.
    pub fn expire(&self, oldest: u64) {
        self.fail(
            STATUS_GONE,
            &format!("Expired: too old resource version: 1 ({oldest})"),
        );
    }

    /// Queues an idle timeout.
    pub fn timeout(&self) {
        self.push(FeedItem::Timeout);
    }
}
