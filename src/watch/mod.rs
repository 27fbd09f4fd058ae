//! Watch sessions for a single resource kind.
//!
//! A `Watcher` owns one kind's watch configuration and resumption cursor and
//! produces a restartable, potentially infinite `WatchStream` of events. The stream
//! runs on the caller's thread: each `next()` pulls from the transport, reopening it
//! after idle timeouts and resyncing the cursor after "history gone" signals.

mod cursor;
mod params;
mod stream;
mod watcher;

pub use params::{StreamOptions, WatchParams};
pub use stream::WatchStream;
pub use watcher::{Watcher, WatcherBuilder};
