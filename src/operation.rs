//! Watch operations.
//!
//! A `WatchOperation` is the resolved, callable form of "open a watch on this
//! endpoint". Transports receive it together with the current `WatchParams` and use
//! it to build the request they send.

use std::fmt;

use url::form_urlencoded;

use crate::kind::{EndpointKey, WatchScope};
use crate::watch::WatchParams;

/// A resolved watch endpoint.
pub trait WatchOperation: Send + Sync + fmt::Debug {
    /// Cache key of this operation.
    fn endpoint(&self) -> &EndpointKey;

    /// Request target (path and query) for a watch with the given parameters.
    fn request_target(&self, params: &WatchParams) -> String;
}

/// Standard REST layout: `/api/<version>` for the core group, `/apis/<group>/<version>`
/// otherwise, with an optional `/namespaces/<ns>` segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiPathOperation {
    endpoint: EndpointKey,
}

impl ApiPathOperation {
    /// Creates an operation for the given endpoint.
    #[must_use]
    pub const fn new(endpoint: EndpointKey) -> Self {
        Self { endpoint }
    }

    fn base_path(&self) -> String {
        if self.endpoint.group.is_empty() {
            format!("/api/{}", self.endpoint.version)
        } else {
            format!("/apis/{}/{}", self.endpoint.group, self.endpoint.version)
        }
    }
}

/// Percent-encodes one path segment. Form encoding writes spaces as `+`, which a
/// path would read literally, so they are rewritten to `%20`.
fn encode_segment(segment: &str) -> String {
    form_urlencoded::byte_serialize(segment.as_bytes())
        .collect::<String>()
        .replace('+', "%20")
}

impl WatchOperation for ApiPathOperation {
    fn endpoint(&self) -> &EndpointKey {
        &self.endpoint
    }

    fn request_target(&self, params: &WatchParams) -> String {
        let mut path = self.base_path();
        if self.endpoint.scope == WatchScope::Namespaced {
            if let Some(ns) = params.namespace.as_deref() {
                path.push_str("/namespaces/");
                path.push_str(&encode_segment(ns));
            }
        }
        path.push('/');
        path.push_str(&self.endpoint.plural);

        let mut query = form_urlencoded::Serializer::new(String::new());
        query.append_pair("watch", "true");
        if let Some(allow) = params.allow_bookmarks {
            query.append_pair("allowWatchBookmarks", if allow { "true" } else { "false" });
        }
        if let Some(selector) = params.field_selector.as_deref() {
            query.append_pair("fieldSelector", selector);
        }
        if let Some(selector) = params.label_selector.as_deref() {
            query.append_pair("labelSelector", selector);
        }
        if let Some(rv) = params.resource_version.as_deref() {
            query.append_pair("resourceVersion", rv);
        }
        if let Some(timeout) = params.timeout_seconds {
            query.append_pair("timeoutSeconds", &timeout.to_string());
        }

        format!("{path}?{}", query.finish())
    }
}
