use std::fmt;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info};

use crate::catalog::KindCatalog;
use crate::error::{ConfigurationError, TransportError, WatchError, WatchResult};
use crate::event::{decode_event, DecodeOptions, DecodedEvent};
use crate::kind::{EndpointKey, KindId, ResourceKind, WatchScope};
use crate::operation::WatchOperation;
use crate::resource::{DynamicResource, WatchResource};
use crate::transport::{RawEventStream, StopHandle, WatchTransport};

use super::cursor::{self, PRIMING_CURSOR};
use super::params::{StreamOptions, WatchParams};
use super::stream::WatchStream;

/// Sentinel for "no version observed yet"; real resource versions are positive.
const NOT_OBSERVED: u64 = 0;

struct WatcherInner {
    kind: ResourceKind,
    scope: WatchScope,
    operation: Arc<dyn WatchOperation>,
    transport: Arc<dyn WatchTransport>,
    decode: DecodeOptions,
    params: Mutex<WatchParams>,
    running: AtomicBool,
    session: AtomicU64,
    highest_observed: AtomicU64,
    active_stop: Mutex<Option<StopHandle>>,
}

/// Watch session for one resource kind.
///
/// `Watcher` is a cheap handle: clones share the same cursor, running flag and
/// transport stream, so one clone can `stop()` a stream another is consuming.
pub struct Watcher<R = DynamicResource> {
    inner: Arc<WatcherInner>,
    _resource: PhantomData<fn() -> R>,
}

impl<R> Clone for Watcher<R> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            _resource: PhantomData,
        }
    }
}

impl<R> fmt::Debug for Watcher<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Watcher")
            .field("kind", &self.inner.kind.kind)
            .field("scope", &self.inner.scope)
            .field("params", &*self.inner.params.lock())
            .field("running", &self.is_running())
            .field("highest_observed", &self.highest_observed())
            .finish_non_exhaustive()
    }
}

impl Watcher<DynamicResource> {
    /// Starts building a watcher for `kind` (a kind or its listing kind, e.g. `Pod`
    /// or `PodList`; events always carry the item kind).
    #[must_use]
    pub fn builder(kind: impl Into<String>) -> WatcherBuilder {
        WatcherBuilder::new(kind)
    }
}

impl<R> Watcher<R> {
    /// Kind delivered by this watcher.
    #[must_use]
    pub fn kind(&self) -> &KindId {
        &self.inner.kind.kind
    }

    /// Descriptor of the watched kind.
    #[must_use]
    pub fn descriptor(&self) -> &ResourceKind {
        &self.inner.kind
    }

    /// Scope of the watch.
    #[must_use]
    pub fn scope(&self) -> WatchScope {
        self.inner.scope
    }

    /// Endpoint the watch is opened on.
    #[must_use]
    pub fn endpoint(&self) -> &EndpointKey {
        self.inner.operation.endpoint()
    }

    /// Namespace being watched, if any.
    #[must_use]
    pub fn namespace(&self) -> Option<String> {
        self.inner.params.lock().namespace.clone()
    }

    /// Snapshot of the current request parameters.
    #[must_use]
    pub fn params(&self) -> WatchParams {
        self.inner.params.lock().clone()
    }

    /// Sets the cursor the next request resumes from.
    pub fn update_cursor(&self, resource_version: impl Into<String>) -> WatchResult<()> {
        let rv = resource_version.into();
        if rv.trim().is_empty() {
            return Err(ConfigurationError::EmptyCursor.into());
        }
        self.set_cursor(rv);
        Ok(())
    }

    /// Cursor the next request resumes from; `None` if never set.
    #[must_use]
    pub fn current_cursor(&self) -> Option<String> {
        self.inner.params.lock().resource_version.clone()
    }

    /// Forgets the cursor and the highest observed version.
    pub fn reset_cursor(&self) {
        self.inner.params.lock().resource_version = None;
        self.inner
            .highest_observed
            .store(NOT_OBSERVED, Ordering::Release);
    }

    /// Highest resource version seen in delivered events or bookmarks.
    #[must_use]
    pub fn highest_observed(&self) -> Option<u64> {
        match self.inner.highest_observed.load(Ordering::Acquire) {
            NOT_OBSERVED => None,
            rv => Some(rv),
        }
    }

    /// Marks the watcher as running.
    pub fn start(&self) {
        self.inner.running.store(true, Ordering::Release);
    }

    /// Requests the stream to stop. The in-flight transport call notices at its next
    /// wake point (an event, an idle timeout, or an error). Idempotent.
    pub fn stop(&self) {
        self.inner.running.store(false, Ordering::Release);
        if let Some(stop) = self.inner.active_stop.lock().as_ref() {
            stop.stop();
        }
    }

    /// Whether the watcher is running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::Acquire)
    }

    /// Whether both handles refer to the same watcher.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub(super) fn decode_options(&self) -> DecodeOptions {
        self.inner.decode
    }

    /// Begins a new stream session, superseding any earlier one.
    pub(super) fn begin_session(&self) -> u64 {
        if let Some(stop) = self.inner.active_stop.lock().take() {
            stop.stop();
        }
        self.start();
        self.inner.session.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Whether the given session may keep streaming.
    pub(super) fn is_live(&self, session: u64) -> bool {
        self.is_running() && self.inner.session.load(Ordering::Acquire) == session
    }

    pub(super) fn set_cursor(&self, resource_version: String) {
        self.inner.params.lock().resource_version = Some(resource_version);
    }

    pub(super) fn observe(&self, resource_version: u64) {
        self.inner
            .highest_observed
            .fetch_max(resource_version, Ordering::AcqRel);
    }

    /// Moves the cursor up to the highest observed version when it lags behind.
    pub(super) fn advance_cursor(&self) {
        let Some(highest) = self.highest_observed() else {
            return;
        };
        let mut params = self.inner.params.lock();
        let behind = params
            .resource_version
            .as_deref()
            .is_some_and(|current| cursor::is_behind(current, highest));
        if behind {
            debug!(kind = %self.kind(), cursor = highest, "advancing cursor to highest observed version");
            params.resource_version = Some(highest.to_string());
        }
    }

    /// Opens a transport stream with the given parameters.
    pub(super) fn open(&self, params: &WatchParams) -> Result<RawEventStream, TransportError> {
        let stop = StopHandle::new();
        *self.inner.active_stop.lock() = Some(stop.clone());
        // A stop() racing with the handle swap above must still reach the new stream.
        if !self.is_running() {
            stop.stop();
        }
        debug!(
            kind = %self.kind(),
            endpoint = %self.endpoint(),
            cursor = params.resource_version.as_deref().unwrap_or(""),
            "opening watch"
        );
        self.inner
            .transport
            .open(self.inner.operation.as_ref(), params, stop)
    }
}

impl<R: WatchResource> Watcher<R> {
    /// Starts streaming events.
    ///
    /// The returned iterator yields events until the watcher is stopped, a request
    /// idles out with `quit_on_timeout` set, or an unrecoverable error occurs (yielded
    /// once as the final item). With `manage_cursor`, the watcher resumes from the
    /// highest version it has observed and resyncs after "history gone" signals;
    /// events around a resync boundary may be delivered twice.
    ///
    /// Starting a new stream supersedes any earlier stream of this watcher.
    #[must_use]
    pub fn stream(&self, options: StreamOptions) -> WatchStream<R> {
        let session = self.begin_session();
        WatchStream::new(self.clone(), options, session)
    }

    /// Discovers the oldest available version by requesting one that is certainly
    /// compacted and reading the version named in the expiry.
    pub(super) fn prime(&self) -> WatchResult<()> {
        let mut params = self.params();
        params.resource_version = Some(PRIMING_CURSOR.to_string());

        let first = match self.open(&params) {
            Ok(mut stream) => stream.next(),
            Err(err) => Some(Err(err)),
        };

        match first {
            None => {
                debug!(kind = %self.kind(), "priming request ended without an expiry; cursor left unset");
                Ok(())
            }
            Some(Ok(raw)) => match decode_event::<R>(raw, self.decode_options()) {
                Ok(DecodedEvent::Failure(err)) => self.apply_priming_failure(err),
                Ok(_) | Err(_) => Err(WatchError::Priming {
                    reason: "received an event instead of an expiry".to_string(),
                }),
            },
            Some(Err(err)) => self.apply_priming_failure(err),
        }
    }

    fn apply_priming_failure(&self, err: TransportError) -> WatchResult<()> {
        match cursor::priming_cursor(&err) {
            Some(oldest) => {
                info!(kind = %self.kind(), cursor = %oldest, "discovered oldest available resource version");
                self.set_cursor(oldest);
                Ok(())
            }
            None => Err(err.into()),
        }
    }
}

/// Builder for `Watcher`.
///
/// # Example
/// ```rust,ignore
/// let watcher: Watcher = Watcher::builder("Pod")
///     .namespace("default")
///     .label_selector("app=web")
///     .timeout_seconds(Some(5))
///     .build(KindCatalog::shared(), transport)?;
/// ```
#[derive(Debug, Clone)]
pub struct WatcherBuilder {
    kind: String,
    params: WatchParams,
    decode: DecodeOptions,
}

impl WatcherBuilder {
    /// Creates a builder for `kind` with default parameters.
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            params: WatchParams::default(),
            decode: DecodeOptions::default(),
        }
    }

    /// Watch a single namespace. An empty namespace watches cluster-wide.
    #[must_use]
    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.params.namespace = Some(namespace.into());
        self
    }

    /// Ask for bookmark events.
    #[must_use]
    pub fn allow_bookmarks(mut self, allow: bool) -> Self {
        self.params.allow_bookmarks = Some(allow);
        self
    }

    /// Restrict by field selector.
    #[must_use]
    pub fn field_selector(mut self, selector: impl Into<String>) -> Self {
        self.params.field_selector = Some(selector.into());
        self
    }

    /// Restrict by label selector.
    #[must_use]
    pub fn label_selector(mut self, selector: impl Into<String>) -> Self {
        self.params.label_selector = Some(selector.into());
        self
    }

    /// Initial cursor; only changes after this version are delivered.
    #[must_use]
    pub fn resource_version(mut self, resource_version: impl Into<String>) -> Self {
        self.params.resource_version = Some(resource_version.into());
        self
    }

    /// Per-request idle timeout (default 1 second). `None` or `Some(0)` blocks
    /// until the server closes the stream.
    #[must_use]
    pub fn timeout_seconds(mut self, timeout: Option<u32>) -> Self {
        self.params.timeout_seconds = timeout;
        self
    }

    /// Translate object keys to snake_case before deserializing resources.
    ///
    /// Off by default: resources keep the server's camelCase keys unless this is
    /// set, so typed resources with camelCase renames decode without extra aliases.
    #[must_use]
    pub fn translate(mut self, translate: bool) -> Self {
        self.decode.translate = translate;
        self
    }

    /// Replace all request parameters at once.
    #[must_use]
    pub fn params(mut self, params: WatchParams) -> Self {
        self.params = params;
        self
    }

    /// Resolves the kind and builds the watcher.
    ///
    /// Fails with a `ConfigurationError` if the kind is unknown or does not support
    /// the requested (namespaced or cluster-wide) watch.
    pub fn build<R: WatchResource>(
        self,
        catalog: &KindCatalog,
        transport: Arc<dyn WatchTransport>,
    ) -> WatchResult<Watcher<R>> {
        let mut params = self.params;
        params.namespace = params.namespace.filter(|ns| !ns.is_empty());
        params.resource_version = params.resource_version.filter(|rv| !rv.trim().is_empty());

        let scope = WatchScope::for_namespace(params.namespace.as_deref());
        let resolved = catalog.resolve(&self.kind, scope)?;

        Ok(Watcher {
            inner: Arc::new(WatcherInner {
                kind: resolved.kind,
                scope,
                operation: resolved.operation,
                transport,
                decode: self.decode,
                params: Mutex::new(params),
                running: AtomicBool::new(false),
                session: AtomicU64::new(0),
                highest_observed: AtomicU64::new(NOT_OBSERVED),
                active_stop: Mutex::new(None),
            }),
            _resource: PhantomData,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::InMemoryTransport;

    fn transport() -> Arc<dyn WatchTransport> {
        Arc::new(InMemoryTransport::default())
    }

    #[test]
    fn test_namespaced_watch_on_cluster_kind_fails() {
        let err = Watcher::builder("Namespace")
            .namespace("default")
            .build::<DynamicResource>(KindCatalog::shared(), transport())
            .unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_empty_namespace_means_cluster_wide() {
        let watcher: Watcher = Watcher::builder("Namespace")
            .namespace("")
            .build(KindCatalog::shared(), transport())
            .unwrap();
        assert_eq!(watcher.scope(), WatchScope::Cluster);
        assert_eq!(watcher.namespace(), None);
    }

    #[test]
    fn test_listing_kind_watches_items() {
        let watcher: Watcher = Watcher::builder("DeploymentList")
            .namespace("prod")
            .build(KindCatalog::shared(), transport())
            .unwrap();
        assert_eq!(watcher.kind().as_str(), "Deployment");
        assert_eq!(watcher.scope(), WatchScope::Namespaced);
    }

    #[test]
    fn test_cursor_operations() {
        let watcher: Watcher = Watcher::builder("Pod")
            .build(KindCatalog::shared(), transport())
            .unwrap();
        assert_eq!(watcher.current_cursor(), None);

        assert!(matches!(
            watcher.update_cursor(""),
            Err(WatchError::Configuration(ConfigurationError::EmptyCursor))
        ));
        watcher.update_cursor("100").unwrap();
        assert_eq!(watcher.current_cursor().as_deref(), Some("100"));

        watcher.observe(150);
        watcher.observe(120);
        assert_eq!(watcher.highest_observed(), Some(150));
        watcher.advance_cursor();
        assert_eq!(watcher.current_cursor().as_deref(), Some("150"));

        watcher.reset_cursor();
        assert_eq!(watcher.current_cursor(), None);
        assert_eq!(watcher.highest_observed(), None);
    }

    #[test]
    fn test_advance_never_lowers_cursor() {
        let watcher: Watcher = Watcher::builder("Pod")
            .resource_version("500")
            .build(KindCatalog::shared(), transport())
            .unwrap();
        watcher.observe(300);
        watcher.advance_cursor();
        assert_eq!(watcher.current_cursor().as_deref(), Some("500"));
    }

    #[test]
    fn test_stop_is_idempotent() {
        let watcher: Watcher = Watcher::builder("Pod")
            .build(KindCatalog::shared(), transport())
            .unwrap();
        watcher.start();
        assert!(watcher.is_running());
        watcher.stop();
        watcher.stop();
        assert!(!watcher.is_running());
    }

    #[test]
    fn test_clones_share_state() {
        let a: Watcher = Watcher::builder("Pod")
            .build(KindCatalog::shared(), transport())
            .unwrap();
        let b = a.clone();
        a.update_cursor("7").unwrap();
        assert_eq!(b.current_cursor().as_deref(), Some("7"));
        assert!(a.ptr_eq(&b));
    }
}
