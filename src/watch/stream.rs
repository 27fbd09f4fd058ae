use std::fmt;
use std::iter::FusedIterator;

use tracing::{debug, info, trace};

use crate::error::{TransportError, WatchResult};
use crate::event::{decode_event, DecodedEvent, WatchEvent};
use crate::resource::{DynamicResource, WatchResource};
use crate::transport::RawEventStream;

use super::cursor;
use super::params::StreamOptions;
use super::watcher::Watcher;

enum State {
    /// Cursor discovery still pending.
    Priming,
    /// A transport stream must be (re)opened.
    Reopen,
    /// Reading from an open transport stream.
    Open(RawEventStream),
    Done,
}

/// Iterator of events from one `Watcher`, created by `Watcher::stream`.
///
/// Pulls from the transport on the caller's thread. Yields `Err` at most once, as
/// the final item.
pub struct WatchStream<R = DynamicResource> {
    watcher: Watcher<R>,
    options: StreamOptions,
    session: u64,
    state: State,
}

impl<R> fmt::Debug for WatchStream<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match self.state {
            State::Priming => "priming",
            State::Reopen => "reopen",
            State::Open(_) => "open",
            State::Done => "done",
        };
        f.debug_struct("WatchStream")
            .field("watcher", &self.watcher)
            .field("options", &self.options)
            .field("state", &state)
            .finish()
    }
}

impl<R: WatchResource> WatchStream<R> {
    pub(super) fn new(watcher: Watcher<R>, options: StreamOptions, session: u64) -> Self {
        Self {
            watcher,
            options,
            session,
            state: State::Priming,
        }
    }

    /// The watcher this stream belongs to.
    #[must_use]
    pub fn watcher(&self) -> &Watcher<R> {
        &self.watcher
    }

    /// Options this stream was started with.
    #[must_use]
    pub fn options(&self) -> StreamOptions {
        self.options
    }

    fn is_live(&self) -> bool {
        self.watcher.is_live(self.session)
    }

    /// Handles a transport failure: resyncs the cursor after an expiry when the
    /// cursor is managed, otherwise returns the error that ends the stream.
    fn recover(&mut self, err: TransportError) -> WatchResult<()> {
        if self.options.manage_cursor {
            if let Some(oldest) = cursor::resync_cursor(&err) {
                info!(
                    kind = %self.watcher.kind(),
                    cursor = %oldest,
                    "resource history expired; resuming from oldest available version"
                );
                self.watcher.set_cursor(oldest);
                self.state = State::Reopen;
                return Ok(());
            }
        }
        Err(err.into())
    }
}

impl<R: WatchResource> Iterator for WatchStream<R> {
    type Item = WatchResult<WatchEvent<R>>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match std::mem::replace(&mut self.state, State::Done) {
                State::Done => return None,

                State::Priming => {
                    if self.options.manage_cursor && self.watcher.current_cursor().is_none() {
                        if let Err(err) = self.watcher.prime() {
                            return Some(Err(err));
                        }
                    }
                    self.state = State::Reopen;
                }

                State::Reopen => {
                    if !self.is_live() {
                        return None;
                    }
                    if self.options.manage_cursor {
                        self.watcher.advance_cursor();
                    }
                    let params = self.watcher.params();
                    match self.watcher.open(&params) {
                        Ok(stream) => self.state = State::Open(stream),
                        Err(err) => {
                            if let Err(err) = self.recover(err) {
                                return Some(Err(err));
                            }
                        }
                    }
                }

                State::Open(mut stream) => {
                    if !self.is_live() {
                        return None;
                    }
                    match stream.next() {
                        None => {
                            if !self.is_live() {
                                return None;
                            }
                            if self.options.quit_on_timeout {
                                debug!(kind = %self.watcher.kind(), "watch idled out; ending stream");
                                return None;
                            }
                            trace!(kind = %self.watcher.kind(), "watch idled out; reopening");
                            self.state = State::Reopen;
                        }
                        Some(Ok(raw)) => {
                            if !self.is_live() {
                                return None;
                            }
                            match decode_event::<R>(raw, self.watcher.decode_options()) {
                                Ok(DecodedEvent::Event(event)) => {
                                    if let Some(rv) = event.resource.resource_version() {
                                        self.watcher.observe(rv);
                                    }
                                    trace!(kind = %self.watcher.kind(), etype = %event.etype, "event");
                                    self.state = State::Open(stream);
                                    return Some(Ok(event));
                                }
                                Ok(DecodedEvent::Bookmark(rv)) => {
                                    if let Some(rv) = rv {
                                        self.watcher.observe(rv);
                                    }
                                    self.state = State::Open(stream);
                                }
                                Ok(DecodedEvent::Failure(err)) => {
                                    drop(stream);
                                    if let Err(err) = self.recover(err) {
                                        return Some(Err(err));
                                    }
                                }
                                Err(err) => return Some(Err(err)),
                            }
                        }
                        Some(Err(err)) => {
                            drop(stream);
                            if let Err(err) = self.recover(err) {
                                return Some(Err(err));
                            }
                        }
                    }
                }
            }
        }
    }
}

impl<R: WatchResource> FusedIterator for WatchStream<R> {}
