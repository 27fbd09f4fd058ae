use std::thread;

use tracing::{debug, warn};

use crate::resource::WatchResource;
use crate::watch::Watcher;

use super::coordinator::MultiplexingWatcher;
use super::policy::FailureAction;

/// Drives one member until it stops, fails terminally, or the run identified by
/// `epoch` ends.
///
/// Members that end on their own are dropped from membership; members of a stopped
/// or restarted multiplexer are left untouched, since a newer run may own them.
pub(super) fn run_member<R: WatchResource>(
    mux: &MultiplexingWatcher<R>,
    watcher: &Watcher<R>,
    epoch: u64,
) {
    debug!(kind = %watcher.kind(), epoch, "member worker started");

    while let Some(stream) = mux.begin_member_stream(watcher, epoch) {
        let quit_on_timeout = stream.options().quit_on_timeout;
        let mut failure = None;

        for item in stream {
            match item {
                Ok(event) => {
                    if watcher.is_running() && mux.is_current(epoch) {
                        mux.push(event);
                    }
                }
                Err(err) => failure = Some(err),
            }
        }

        match failure {
            None if quit_on_timeout => break,
            None => {}
            Some(err) => match mux.decide(watcher, &err) {
                FailureAction::Continue => {
                    debug!(kind = %watcher.kind(), error = %err, "member failed; restarting");
                    let backoff = mux.restart_backoff();
                    if !backoff.is_zero() {
                        thread::sleep(backoff);
                    }
                }
                FailureAction::Remove => {
                    warn!(kind = %watcher.kind(), error = %err, "member failed; removing");
                    break;
                }
            },
        }

        if !watcher.is_running() {
            break;
        }
    }

    if mux.retire(watcher, epoch) {
        debug!(kind = %watcher.kind(), "member removed");
    }
    debug!(kind = %watcher.kind(), epoch, "member worker finished");
}
