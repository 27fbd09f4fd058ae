//! Multiplexing of several watch sessions into one event stream.
//!
//! A `MultiplexingWatcher` owns at most one `Watcher` per kind and drives each on its
//! own worker thread. Workers push events into a shared unbounded queue; the
//! consumer drains it through `MultiplexStream`. Member failures are contained: by
//! default the failed member is stopped and dropped while the others keep streaming.

mod coordinator;
/// Failure policies for members.
pub mod policy;
mod stream;
mod worker;

pub use coordinator::{MultiplexConfig, MultiplexingWatcher};
pub use policy::{FailureAction, FailurePolicy};
pub use stream::MultiplexStream;
