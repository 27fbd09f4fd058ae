//! Streaming transport abstraction.
//!
//! The wire protocol is not part of this crate. A transport opens a watch for a
//! resolved `WatchOperation` and yields raw envelopes until the server-side idle
//! timeout elapses (the iterator ends), a failure occurs (an `Err` item), or the
//! supplied `StopHandle` is signalled. Stopping is cooperative: a transport only
//! needs to notice it at its next wake point.

/// In-memory scripted transport.
pub mod memory;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::TransportError;
use crate::event::RawEvent;
use crate::operation::WatchOperation;
use crate::watch::WatchParams;

pub use memory::{FeedHandle, FeedItem, InMemoryTransport, InMemoryTransportConfig, WatchRequest};

/// Stream of raw envelopes from one open watch.
pub type RawEventStream = Box<dyn Iterator<Item = Result<RawEvent, TransportError>> + Send>;

/// Opens watch streams.
pub trait WatchTransport: Send + Sync {
    /// Opens a watch. The returned stream must end (or yield an error) once `stop`
    /// has been signalled and the transport regains control.
    fn open(
        &self,
        operation: &dyn WatchOperation,
        params: &WatchParams,
        stop: StopHandle,
    ) -> Result<RawEventStream, TransportError>;
}

/// Cooperative cancellation flag shared between a watcher and its open stream.
#[derive(Debug, Clone, Default)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    /// Creates an unsignalled handle.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests the stream to stop. Idempotent.
    pub fn stop(&self) {
        self.0.store(true, Ordering::Release);
    }

    /// Whether a stop has been requested.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}
