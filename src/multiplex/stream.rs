use std::fmt;
use std::time::Duration;

use crossbeam_channel::RecvTimeoutError;

use crate::event::WatchEvent;
use crate::resource::{DynamicResource, WatchResource};

use super::coordinator::MultiplexingWatcher;

/// Merged event iterator, created by `MultiplexingWatcher::stream`.
///
/// Events arrive in the order workers queued them; there is no ordering across
/// members. The iterator ends once the multiplexer is stopped, or once it has no
/// members and nothing is left in the queue.
pub struct MultiplexStream<R = DynamicResource> {
    mux: MultiplexingWatcher<R>,
    poll: Duration,
}

impl<R> fmt::Debug for MultiplexStream<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MultiplexStream")
            .field("mux", &self.mux)
            .field("poll", &self.poll)
            .finish()
    }
}

impl<R: WatchResource> MultiplexStream<R> {
    pub(super) fn new(mux: MultiplexingWatcher<R>, poll: Duration) -> Self {
        Self { mux, poll }
    }

    /// The multiplexer this stream drains.
    #[must_use]
    pub fn multiplexer(&self) -> &MultiplexingWatcher<R> {
        &self.mux
    }
}

impl<R: WatchResource> Iterator for MultiplexStream<R> {
    type Item = WatchEvent<R>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if !self.mux.is_running() {
                return None;
            }
            match self.mux.inner.rx.recv_timeout(self.poll) {
                Ok(event) => return Some(event),
                Err(RecvTimeoutError::Timeout) => {
                    if self.mux.is_empty() {
                        return None;
                    }
                }
                Err(RecvTimeoutError::Disconnected) => return None,
            }
        }
    }
}
