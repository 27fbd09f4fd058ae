use serde::{Deserialize, Serialize};

use crate::error::WatchError;
use crate::watch::Watcher;

use super::coordinator::MultiplexingWatcher;

/// What the multiplexer does with a member whose stream failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureAction {
    /// Ignore the failure and restart the member's stream.
    Continue,
    /// Stop the member and drop it from the multiplexer.
    Remove,
}

/// Decides the fate of a failed member.
///
/// Called on the member's worker thread. A panicking policy is treated as
/// `FailureAction::Remove`.
pub trait FailurePolicy<R>: Send + Sync {
    /// Called with the multiplexer, the failed member, and the error that ended its stream.
    fn on_failure(
        &self,
        mux: &MultiplexingWatcher<R>,
        watcher: &Watcher<R>,
        error: &WatchError,
    ) -> FailureAction;
}

impl<R, F> FailurePolicy<R> for F
where
    F: Fn(&MultiplexingWatcher<R>, &Watcher<R>, &WatchError) -> FailureAction + Send + Sync,
{
    fn on_failure(
        &self,
        mux: &MultiplexingWatcher<R>,
        watcher: &Watcher<R>,
        error: &WatchError,
    ) -> FailureAction {
        self(mux, watcher, error)
    }
}
