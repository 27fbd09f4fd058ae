use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde_json::{json, Value};

use watchplex::{
    FailureAction, InMemoryTransport, InMemoryTransportConfig, KindCatalog, MultiplexConfig,
    MultiplexingWatcher, StreamOptions, Watcher,
};

fn object(kind: &str, name: &str, rv: u64) -> Value {
    json!({
        "apiVersion": "v1",
        "kind": kind,
        "metadata": {"name": name, "resourceVersion": rv.to_string()}
    })
}

fn transport() -> Arc<InMemoryTransport> {
    Arc::new(InMemoryTransport::with_idle_timeout(Duration::from_millis(30)))
}

fn watcher(kind: &str, transport: &Arc<InMemoryTransport>) -> Watcher {
    Watcher::builder(kind)
        .build(KindCatalog::shared(), transport.clone())
        .unwrap()
}

fn fast_config() -> MultiplexConfig {
    MultiplexConfig {
        poll_interval_ms: 20,
        restart_backoff_ms: 0,
        ..MultiplexConfig::default()
    }
}

fn wait_until(mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    false
}

#[test]
fn merged_output_follows_queue_order() {
    let transport = transport();
    let pods = watcher("Pod", &transport);
    let namespaces = watcher("Namespace", &transport);
    let pod_feed = transport.feed(pods.endpoint());
    let ns_feed = transport.feed(namespaces.endpoint());

    let mux = MultiplexingWatcher::with_config(fast_config());
    mux.add(pods).unwrap();
    mux.add(namespaces).unwrap();
    let mut stream = mux.stream(StreamOptions::default()).unwrap();

    let a = object("Pod", "a", 1);
    let b = object("Namespace", "b", 2);

    ns_feed.added(b);
    let first = stream.next().unwrap();
    pod_feed.added(a);
    let second = stream.next().unwrap();

    assert_eq!(first.resource.kind.as_deref(), Some("Namespace"));
    assert_eq!(second.resource.kind.as_deref(), Some("Pod"));
    mux.stop();
    assert!(stream.next().is_none());
}

#[test]
fn replacing_a_member_keeps_one_stream_per_kind() {
    let transport = transport();
    let cluster_pods = watcher("Pod", &transport);
    let default_pods: Watcher = Watcher::builder("Pod")
        .namespace("default")
        .build(KindCatalog::shared(), transport.clone())
        .unwrap();
    let old_feed = transport.feed(cluster_pods.endpoint());
    let new_feed = transport.feed(default_pods.endpoint());

    let mux = MultiplexingWatcher::with_config(fast_config());
    mux.add(cluster_pods.clone()).unwrap();
    let mut stream = mux.stream(StreamOptions::default()).unwrap();

    mux.add(default_pods.clone()).unwrap();
    assert_eq!(mux.len(), 1);
    assert!(!cluster_pods.is_running());

    old_feed.added(object("Pod", "old", 1));
    new_feed.added(object("Pod", "new", 2));

    let event = stream.next().unwrap();
    assert_eq!(event.resource.metadata.name.as_deref(), Some("new"));
    thread::sleep(Duration::from_millis(100));
    assert_eq!(mux.queued(), 0);
    assert!(mux.member("Pod").unwrap().ptr_eq(&default_pods));
    mux.stop();
}

#[test]
fn failed_member_without_policy_is_removed() {
    let transport = transport();
    let pods = watcher("Pod", &transport);
    let nodes = watcher("Node", &transport);
    let pod_feed = transport.feed(pods.endpoint());
    let node_feed = transport.feed(nodes.endpoint());

    let mux = MultiplexingWatcher::with_config(fast_config());
    mux.add(pods.clone()).unwrap();
    mux.add(nodes).unwrap();
    let mut stream = mux.stream(StreamOptions::default()).unwrap();

    pod_feed.fail(500, "boom");
    assert!(wait_until(|| !mux.contains("Pod")));
    assert!(!pods.is_running());

    node_feed.added(object("Node", "n1", 7));
    let event = stream.next().unwrap();
    assert_eq!(event.resource.kind.as_deref(), Some("Node"));
    assert_eq!(mux.len(), 1);
    mux.stop();
}

#[test]
fn continue_policy_restarts_failing_member() {
    let transport = transport();
    let pods = watcher("Pod", &transport);
    let feed = transport.feed(pods.endpoint());

    let failures = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&failures);
    let mux: MultiplexingWatcher =
        MultiplexingWatcher::with_failure_callback(fast_config(), move |_mux, _watcher, _err| {
            seen.fetch_add(1, Ordering::SeqCst);
            FailureAction::Continue
        });
    mux.add(pods).unwrap();

    feed.fail(500, "first");
    feed.added(object("Pod", "a", 1));
    feed.fail(503, "second");
    feed.added(object("Pod", "b", 2));

    let stream = mux.stream(StreamOptions::default()).unwrap();
    let names: Vec<_> = stream
        .take(2)
        .map(|e| e.resource.metadata.name.unwrap_or_default())
        .collect();

    assert_eq!(names, vec!["a", "b"]);
    assert_eq!(failures.load(Ordering::SeqCst), 2);
    assert!(mux.contains("Pod"));
    mux.stop();
}

#[test]
fn failure_policy_sees_member_and_error() {
    let transport = transport();
    let pods = watcher("Pod", &transport);
    transport.feed(pods.endpoint()).fail(500, "boom");

    let calls: Arc<Mutex<Vec<(String, Option<u16>)>>> = Arc::new(Mutex::new(Vec::new()));
    let log = Arc::clone(&calls);
    let mux: MultiplexingWatcher =
        MultiplexingWatcher::with_failure_callback(fast_config(), move |mux, watcher, err| {
            assert!(mux.contains(watcher.kind().as_str()));
            log.lock().push((watcher.kind().to_string(), err.status()));
            FailureAction::Remove
        });
    mux.add(pods).unwrap();

    let events: Vec<_> = mux.stream(StreamOptions::default()).unwrap().collect();

    assert!(events.is_empty());
    assert!(mux.is_empty());
    assert_eq!(*calls.lock(), vec![("Pod".to_string(), Some(500))]);
}

#[test]
fn quit_on_timeout_drains_every_member() {
    let transport = transport();
    let pods = watcher("Pod", &transport);
    let nodes = watcher("Node", &transport);
    transport.feed(pods.endpoint()).added(object("Pod", "a", 1));
    transport.feed(nodes.endpoint()).added(object("Node", "n", 2));

    let mux = MultiplexingWatcher::with_config(fast_config());
    mux.add(pods).unwrap();
    mux.add(nodes).unwrap();

    let mut kinds: Vec<String> = mux
        .stream(StreamOptions::default().quit_on_timeout(true))
        .unwrap()
        .filter_map(|e| e.resource.kind)
        .collect();
    kinds.sort();

    assert_eq!(kinds, vec!["Node", "Pod"]);
    assert!(mux.is_empty());
}

#[test]
fn stop_ends_stream_and_keeps_members() {
    let transport = transport();
    let pods = watcher("Pod", &transport);

    let mux = MultiplexingWatcher::with_config(fast_config());
    mux.add(pods.clone()).unwrap();
    let mut stream = mux.stream(StreamOptions::default()).unwrap();
    assert!(mux.is_running());

    mux.stop();

    assert!(stream.next().is_none());
    assert!(!mux.is_running());
    assert!(wait_until(|| !pods.is_running()));
    assert!(mux.contains("Pod"));
}

#[test]
fn member_added_while_streaming_starts_immediately() {
    let transport = transport();
    let pods = watcher("Pod", &transport);
    let nodes = watcher("Node", &transport);

    let mux = MultiplexingWatcher::with_config(fast_config());
    mux.add(pods).unwrap();
    let mut stream = mux.stream(StreamOptions::default()).unwrap();

    mux.add(nodes.clone()).unwrap();
    transport.feed(nodes.endpoint()).added(object("Node", "late", 3));

    let event = stream.next().unwrap();
    assert_eq!(event.resource.metadata.name.as_deref(), Some("late"));
    assert!(wait_until(|| nodes.is_running()));
    mux.stop();
}

#[test]
fn restart_after_stop_resumes_members() {
    let transport = transport();
    let pods = watcher("Pod", &transport);
    let feed = transport.feed(pods.endpoint());

    let mux = MultiplexingWatcher::with_config(fast_config());
    mux.add(pods).unwrap();
    let first = mux.stream(StreamOptions::default()).unwrap();
    mux.stop();
    assert_eq!(first.count(), 0);

    thread::sleep(Duration::from_millis(100));
    let mut second = mux.stream(StreamOptions::default()).unwrap();
    feed.added(object("Pod", "again", 5));

    let event = second.next().unwrap();
    assert_eq!(event.resource.metadata.name.as_deref(), Some("again"));
    mux.stop();
}

#[test]
fn immediate_restart_keeps_member_of_new_run() {
    // Slow stop polling keeps the first run's stream blocked across the restart.
    let transport = Arc::new(InMemoryTransport::new(InMemoryTransportConfig {
        idle_timeout_ms: Some(10_000),
        poll_interval_ms: 300,
    }));
    let pods = watcher("Pod", &transport);
    let feed = transport.feed(pods.endpoint());

    let mux = MultiplexingWatcher::with_config(fast_config());
    mux.add(pods.clone()).unwrap();
    let quit = StreamOptions::default().quit_on_timeout(true);
    let first = mux.stream(quit).unwrap();
    assert!(wait_until(|| !transport.requests().is_empty()));

    mux.stop();
    let mut second = mux.stream(quit).unwrap();
    drop(first);
    thread::sleep(Duration::from_millis(800));

    assert!(mux.is_running());
    assert!(mux.contains("Pod"));
    assert!(pods.is_running());

    feed.added(object("Pod", "after-restart", 9));
    let event = second.next().unwrap();
    assert_eq!(event.resource.metadata.name.as_deref(), Some("after-restart"));
    mux.stop();
}

#[test]
fn managed_cursor_policy_applies_to_members() {
    let transport = transport();
    let pods = watcher("Pod", &transport);
    let feed = transport.feed(pods.endpoint());
    feed.expire(40);
    feed.added(object("Pod", "a", 41));

    let mux = MultiplexingWatcher::with_config(fast_config());
    mux.add(pods.clone()).unwrap();
    let mut stream = mux.stream(StreamOptions::managed()).unwrap();

    let event = stream.next().unwrap();
    assert_eq!(event.resource.metadata.name.as_deref(), Some("a"));
    mux.stop();

    let requests = transport.requests_for(pods.endpoint());
    assert_eq!(requests[0].params.resource_version.as_deref(), Some("1"));
    assert_eq!(requests[1].params.resource_version.as_deref(), Some("40"));
    assert_eq!(pods.highest_observed(), Some(41));
}
