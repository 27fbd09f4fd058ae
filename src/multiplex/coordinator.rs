use std::collections::HashMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{WatchError, WatchResult};
use crate::event::WatchEvent;
use crate::kind::KindId;
use crate::resource::{DynamicResource, WatchResource};
use crate::watch::{StreamOptions, WatchStream, Watcher};

use super::policy::{FailureAction, FailurePolicy};
use super::stream::MultiplexStream;
use super::worker;

/// Multiplexer configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MultiplexConfig {
    /// Bounded wait of each dequeue in `MultiplexStream`; liveness is re-checked
    /// between waits.
    pub poll_interval_ms: u64,
    /// Pause before restarting a member whose failure policy chose `Continue`.
    pub restart_backoff_ms: u64,
    /// Worker threads are named `<prefix>-<kind>`.
    pub thread_name_prefix: String,
}

impl Default for MultiplexConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 100,
            restart_backoff_ms: 100,
            thread_name_prefix: "watchplex".to_string(),
        }
    }
}

pub(super) struct MuxInner<R> {
    pub(super) cfg: MultiplexConfig,
    members: Mutex<HashMap<KindId, Watcher<R>>>,
    tx: Sender<WatchEvent<R>>,
    pub(super) rx: Receiver<WatchEvent<R>>,
    running: AtomicBool,
    /// Bumped on every start so workers of an earlier run stand down.
    epoch: AtomicU64,
    options: Mutex<StreamOptions>,
    failure_policy: Option<Arc<dyn FailurePolicy<R>>>,
}

fn is_registered<R>(members: &HashMap<KindId, Watcher<R>>, watcher: &Watcher<R>) -> bool {
    members
        .get(watcher.kind())
        .is_some_and(|current| current.ptr_eq(watcher))
}

/// Merges the streams of several watchers into one.
///
/// Cheap handle: clones share membership, queue and running state.
pub struct MultiplexingWatcher<R = DynamicResource> {
    pub(super) inner: Arc<MuxInner<R>>,
}

impl<R> Clone for MultiplexingWatcher<R> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<R> fmt::Debug for MultiplexingWatcher<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MultiplexingWatcher")
            .field("members", &self.kinds())
            .field("running", &self.is_running())
            .field("queued", &self.inner.rx.len())
            .field("has_failure_policy", &self.inner.failure_policy.is_some())
            .finish_non_exhaustive()
    }
}

impl<R: WatchResource> Default for MultiplexingWatcher<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R> MultiplexingWatcher<R> {
    /// Whether the multiplexer is streaming.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::Acquire)
    }

    /// Number of registered members.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.members.lock().len()
    }

    /// Returns true if no members are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.members.lock().is_empty()
    }

    /// Whether a member is registered for `kind`.
    #[must_use]
    pub fn contains(&self, kind: &str) -> bool {
        self.inner.members.lock().contains_key(&KindId::from(kind))
    }

    /// The member registered for `kind`.
    #[must_use]
    pub fn member(&self, kind: &str) -> Option<Watcher<R>> {
        self.inner.members.lock().get(&KindId::from(kind)).cloned()
    }

    /// Kinds of all registered members, sorted.
    #[must_use]
    pub fn kinds(&self) -> Vec<KindId> {
        let mut kinds: Vec<KindId> = self.inner.members.lock().keys().cloned().collect();
        kinds.sort();
        kinds
    }

    /// Number of events waiting to be consumed.
    #[must_use]
    pub fn queued(&self) -> usize {
        self.inner.rx.len()
    }

    /// Stops the multiplexer and every registered member. Members stay registered
    /// so a later `stream()` restarts them; already-queued events are not drained.
    pub fn stop(&self) {
        self.inner.running.store(false, Ordering::Release);
        let snapshot: Vec<Watcher<R>> = self.inner.members.lock().values().cloned().collect();
        for watcher in snapshot {
            watcher.stop();
        }
        debug!("multiplexer stopped");
    }

    /// Stops `watcher` and drops it from membership. Idempotent.
    pub fn remove(&self, watcher: &Watcher<R>) {
        // Dropped first so its worker cannot begin another stream in between.
        self.discard(watcher);
        watcher.stop();
    }

    /// Drops `watcher` if it is the registered member for its kind.
    fn discard(&self, watcher: &Watcher<R>) -> bool {
        let mut members = self.inner.members.lock();
        let registered = is_registered(&members, watcher);
        if registered {
            members.remove(watcher.kind());
        }
        registered
    }

    /// Stops and drops `watcher` on behalf of the run `epoch`. Workers of a stopped
    /// or restarted run leave the member alone.
    pub(super) fn retire(&self, watcher: &Watcher<R>, epoch: u64) -> bool {
        let mut members = self.inner.members.lock();
        if !is_registered(&members, watcher) || !self.is_current(epoch) {
            return false;
        }
        watcher.stop();
        members.remove(watcher.kind());
        true
    }

    pub(super) fn is_current(&self, epoch: u64) -> bool {
        self.is_running() && self.inner.epoch.load(Ordering::Acquire) == epoch
    }

    pub(super) fn options(&self) -> StreamOptions {
        *self.inner.options.lock()
    }

    pub(super) fn push(&self, event: WatchEvent<R>) {
        // The receiver lives as long as `inner`, so sending cannot fail here.
        let _ = self.inner.tx.send(event);
    }

    pub(super) fn restart_backoff(&self) -> Duration {
        Duration::from_millis(self.inner.cfg.restart_backoff_ms)
    }

    /// Consults the failure policy; no policy, or a panicking one, means `Remove`.
    pub(super) fn decide(&self, watcher: &Watcher<R>, error: &WatchError) -> FailureAction {
        let Some(policy) = self.inner.failure_policy.as_ref() else {
            return FailureAction::Remove;
        };
        match panic::catch_unwind(AssertUnwindSafe(|| policy.on_failure(self, watcher, error))) {
            Ok(action) => action,
            Err(_) => {
                warn!(kind = %watcher.kind(), "failure policy panicked; removing member");
                FailureAction::Remove
            }
        }
    }
}

impl<R: WatchResource> MultiplexingWatcher<R> {
    /// Creates an empty multiplexer with the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::build(MultiplexConfig::default(), None)
    }

    /// Creates an empty multiplexer.
    #[must_use]
    pub fn with_config(cfg: MultiplexConfig) -> Self {
        Self::build(cfg, None)
    }

    /// Creates an empty multiplexer with a failure policy.
    #[must_use]
    pub fn with_failure_policy(cfg: MultiplexConfig, policy: Arc<dyn FailurePolicy<R>>) -> Self {
        Self::build(cfg, Some(policy))
    }

    /// Creates an empty multiplexer whose failure policy is a closure.
    ///
    /// # Example
    /// ```rust,ignore
    /// let mux = MultiplexingWatcher::with_failure_callback(
    ///     MultiplexConfig::default(),
    ///     |_mux, _watcher, err| {
    ///         if err.is_transport() { FailureAction::Continue } else { FailureAction::Remove }
    ///     },
    /// );
    /// ```
    #[must_use]
    pub fn with_failure_callback<F>(cfg: MultiplexConfig, callback: F) -> Self
    where
        F: Fn(&MultiplexingWatcher<R>, &Watcher<R>, &WatchError) -> FailureAction
            + Send
            + Sync
            + 'static,
    {
        Self::build(cfg, Some(Arc::new(callback)))
    }

    fn build(cfg: MultiplexConfig, failure_policy: Option<Arc<dyn FailurePolicy<R>>>) -> Self {
        let (tx, rx) = unbounded();
        Self {
            inner: Arc::new(MuxInner {
                cfg,
                members: Mutex::new(HashMap::new()),
                tx,
                rx,
                running: AtomicBool::new(false),
                epoch: AtomicU64::new(0),
                options: Mutex::new(StreamOptions::default()),
                failure_policy,
            }),
        }
    }

    /// Registers `watcher`, replacing (and stopping) any member of the same kind.
    /// While streaming, the new member starts immediately.
    pub fn add(&self, watcher: Watcher<R>) -> WatchResult<()> {
        let (previous, epoch) = {
            let mut members = self.inner.members.lock();
            if is_registered(&members, &watcher) {
                return Ok(());
            }
            let previous = members.insert(watcher.kind().clone(), watcher.clone());
            let epoch = self
                .is_running()
                .then(|| self.inner.epoch.load(Ordering::Acquire));
            (previous, epoch)
        };

        if let Some(previous) = previous {
            debug!(kind = %watcher.kind(), "replacing existing member");
            previous.stop();
        }
        if let Some(epoch) = epoch {
            self.spawn_worker(watcher, epoch)?;
        }
        Ok(())
    }

    /// Starts streaming from every member.
    ///
    /// `options` become the shared policy for present and future members. Calling
    /// this while already streaming only updates the policy. If a worker thread
    /// cannot be spawned the multiplexer is stopped and the error returned.
    pub fn stream(&self, options: StreamOptions) -> WatchResult<MultiplexStream<R>> {
        *self.inner.options.lock() = options;

        let (snapshot, epoch): (Vec<Watcher<R>>, u64) = {
            let members = self.inner.members.lock();
            if self.inner.running.swap(true, Ordering::AcqRel) {
                (Vec::new(), self.inner.epoch.load(Ordering::Acquire))
            } else {
                let epoch = self.inner.epoch.fetch_add(1, Ordering::AcqRel) + 1;
                (members.values().cloned().collect(), epoch)
            }
        };

        debug!(
            members = snapshot.len(),
            manage_cursor = options.manage_cursor,
            quit_on_timeout = options.quit_on_timeout,
            "multiplexer streaming"
        );
        for watcher in snapshot {
            if let Err(err) = self.spawn_worker(watcher, epoch) {
                self.stop();
                return Err(err);
            }
        }

        let poll = Duration::from_millis(self.inner.cfg.poll_interval_ms.max(1));
        Ok(MultiplexStream::new(self.clone(), poll))
    }

    /// Starts `watcher`'s stream for the run `epoch`, unless that run has ended or
    /// the watcher is no longer the registered member.
    ///
    /// Runs under the membership lock, which orders it against `add`, `remove`,
    /// `stop` and restarts: a stream begun here is either seen by them or never begun.
    pub(super) fn begin_member_stream(
        &self,
        watcher: &Watcher<R>,
        epoch: u64,
    ) -> Option<WatchStream<R>> {
        let members = self.inner.members.lock();
        if !is_registered(&members, watcher) || !self.is_current(epoch) {
            return None;
        }
        Some(watcher.stream(self.options()))
    }

    fn spawn_worker(&self, watcher: Watcher<R>, epoch: u64) -> WatchResult<()> {
        let name = format!(
            "{}-{}",
            self.inner.cfg.thread_name_prefix,
            watcher.kind().as_str().to_ascii_lowercase()
        );
        let mux = self.clone();
        let member = watcher.clone();

        thread::Builder::new()
            .name(name)
            .spawn(move || worker::run_member(&mux, &member, epoch))
            .map(drop)
            .map_err(|e| {
                self.remove(&watcher);
                WatchError::internal(format!(
                    "failed to spawn watch worker for {}: {e}",
                    watcher.kind()
                ))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::KindCatalog;
    use crate::transport::{InMemoryTransport, WatchTransport};

    fn watcher(kind: &str, transport: &Arc<dyn WatchTransport>) -> Watcher {
        Watcher::builder(kind)
            .build(KindCatalog::shared(), Arc::clone(transport))
            .unwrap()
    }

    #[test]
    fn test_add_replaces_same_kind() {
        let transport: Arc<dyn WatchTransport> = Arc::new(InMemoryTransport::default());
        let mux = MultiplexingWatcher::new();
        let first = watcher("Pod", &transport);
        let second = watcher("PodList", &transport);
        first.start();

        mux.add(first.clone()).unwrap();
        mux.add(second.clone()).unwrap();

        assert_eq!(mux.len(), 1);
        assert!(!first.is_running());
        assert!(mux.member("Pod").unwrap().ptr_eq(&second));
    }

    #[test]
    fn test_readding_same_watcher_is_noop() {
        let transport: Arc<dyn WatchTransport> = Arc::new(InMemoryTransport::default());
        let mux = MultiplexingWatcher::new();
        let pods = watcher("Pod", &transport);
        pods.start();
        mux.add(pods.clone()).unwrap();
        mux.add(pods.clone()).unwrap();
        assert!(pods.is_running());
        assert_eq!(mux.len(), 1);
    }

    #[test]
    fn test_remove_is_idempotent_and_spares_replacement() {
        let transport: Arc<dyn WatchTransport> = Arc::new(InMemoryTransport::default());
        let mux = MultiplexingWatcher::new();
        let old = watcher("Pod", &transport);
        let new = watcher("Pod", &transport);
        mux.add(old.clone()).unwrap();
        mux.add(new.clone()).unwrap();

        mux.remove(&old);
        assert!(mux.contains("Pod"));

        mux.remove(&new);
        mux.remove(&new);
        assert!(mux.is_empty());
    }

    #[test]
    fn test_stop_stops_members_and_keeps_them() {
        let transport: Arc<dyn WatchTransport> = Arc::new(InMemoryTransport::default());
        let mux = MultiplexingWatcher::new();
        let pods = watcher("Pod", &transport);
        let nodes = watcher("Node", &transport);
        pods.start();
        nodes.start();
        mux.add(pods.clone()).unwrap();
        mux.add(nodes.clone()).unwrap();

        mux.stop();
        mux.stop();
        assert!(!mux.is_running());
        assert!(!pods.is_running());
        assert!(!nodes.is_running());
        assert_eq!(mux.kinds(), vec![KindId::from("Node"), KindId::from("Pod")]);
    }

    #[test]
    fn test_no_policy_means_remove() {
        let transport: Arc<dyn WatchTransport> = Arc::new(InMemoryTransport::default());
        let mux: MultiplexingWatcher = MultiplexingWatcher::new();
        let pods = watcher("Pod", &transport);
        let err = WatchError::internal("x");
        assert_eq!(mux.decide(&pods, &err), FailureAction::Remove);
    }

    #[test]
    fn test_panicking_policy_means_remove() {
        let transport: Arc<dyn WatchTransport> = Arc::new(InMemoryTransport::default());
        let mux: MultiplexingWatcher = MultiplexingWatcher::with_failure_callback(
            MultiplexConfig::default(),
            |_mux, _watcher, _err| panic!("policy bug"),
        );
        let pods = watcher("Pod", &transport);
        let err = WatchError::internal("x");
        assert_eq!(mux.decide(&pods, &err), FailureAction::Remove);
    }

    #[test]
    fn test_stale_run_worker_leaves_member_alone() {
        let memory = Arc::new(InMemoryTransport::with_idle_timeout(Duration::from_secs(10)));
        let transport: Arc<dyn WatchTransport> = memory.clone();
        let mux = MultiplexingWatcher::new();
        let pods = watcher("Pod", &transport);
        mux.add(pods.clone()).unwrap();
        let _stream = mux.stream(StreamOptions::default().quit_on_timeout(true)).unwrap();

        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while memory.requests().is_empty() && std::time::Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(memory.requests().len(), 1);

        // A worker carrying an earlier run's epoch must not begin a stream.
        let stale = mux.inner.epoch.load(Ordering::Acquire) - 1;
        mux.spawn_worker(pods.clone(), stale).unwrap();
        thread::sleep(Duration::from_millis(100));

        assert_eq!(memory.requests().len(), 1);
        assert!(pods.is_running());
        assert!(mux.contains("Pod"));
        assert!(mux.begin_member_stream(&pods, stale).is_none());
        assert!(!mux.retire(&pods, stale));
        mux.stop();
    }

    #[test]
    fn test_config_from_json() {
        let cfg: MultiplexConfig = serde_json::from_str(r#"{"poll_interval_ms": 20}"#).unwrap();
        assert_eq!(cfg.poll_interval_ms, 20);
        assert_eq!(cfg.restart_backoff_ms, 100);
        assert_eq!(cfg.thread_name_prefix, "watchplex");
    }
}
