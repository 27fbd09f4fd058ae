use serde::{Deserialize, Serialize};

/// Parameters sent with every watch request of a `Watcher`.
///
/// The resource version is the resumption cursor; it is only changed through the
/// watcher's cursor operations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct WatchParams {
    /// Namespace to watch; `None` watches across all namespaces.
    pub namespace: Option<String>,
    /// Ask the server for `BOOKMARK` events. Servers may ignore this.
    pub allow_bookmarks: Option<bool>,
    /// Field selector restricting the watched objects.
    pub field_selector: Option<String>,
    /// Label selector restricting the watched objects.
    pub label_selector: Option<String>,
    /// Only changes after this version are delivered.
    pub resource_version: Option<String>,
    /// Server-side idle timeout per request. `Some(0)` or `None` blocks until the
    /// server closes the stream, which delays how quickly `stop()` is observed.
    pub timeout_seconds: Option<u32>,
}

impl Default for WatchParams {
    fn default() -> Self {
        Self {
            namespace: None,
            allow_bookmarks: None,
            field_selector: None,
            label_selector: None,
            resource_version: None,
            timeout_seconds: Some(1),
        }
    }
}

/// Streaming policy for `Watcher::stream` and `MultiplexingWatcher::stream`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamOptions {
    /// Track the highest observed version and resume from it; discover the oldest
    /// available version when no cursor was supplied.
    pub manage_cursor: bool,
    /// End the stream when a request idles out instead of reopening it.
    pub quit_on_timeout: bool,
}

impl StreamOptions {
    /// Options with cursor management enabled.
    #[must_use]
    pub const fn managed() -> Self {
        Self {
            manage_cursor: true,
            quit_on_timeout: false,
        }
    }

    /// Returns a copy with `quit_on_timeout` set.
    #[must_use]
    pub const fn quit_on_timeout(mut self, quit: bool) -> Self {
        self.quit_on_timeout = quit;
        self
    }
}
