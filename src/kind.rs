//! Resource kind descriptors.
//!
//! A `ResourceKind` is the immutable description of a watchable kind: where its
//! endpoint lives and whether it can be watched cluster-wide, per namespace, or both.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Identity of a resource kind, e.g. `Pod` or `ClusterRoleBinding`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KindId(String);

impl KindId {
    /// Wrap a kind name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// The kind name.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for KindId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for KindId {
    fn from(name: &str) -> Self {
        Self(name.to_string())
    }
}

impl From<String> for KindId {
    fn from(name: String) -> Self {
        Self(name)
    }
}

/// Which variant of watch is requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WatchScope {
    /// All objects of the kind, across every namespace.
    Cluster,
    /// Objects of the kind within a single namespace.
    Namespaced,
}

impl WatchScope {
    /// Scope implied by an optional namespace; an empty namespace means cluster-wide.
    #[must_use]
    pub fn for_namespace(namespace: Option<&str>) -> Self {
        match namespace {
            Some(ns) if !ns.is_empty() => Self::Namespaced,
            _ => Self::Cluster,
        }
    }
}

impl fmt::Display for WatchScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cluster => f.write_str("cluster-wide"),
            Self::Namespaced => f.write_str("namespaced"),
        }
    }
}

/// Key under which a resolved watch operation is cached.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EndpointKey {
    /// API group; empty for the core group.
    pub group: String,
    /// API version within the group.
    pub version: String,
    /// Plural resource name used in request paths.
    pub plural: String,
    /// Scope of the endpoint.
    pub scope: WatchScope,
}

impl fmt::Display for EndpointKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let group = if self.group.is_empty() { "core" } else { &self.group };
        match self.scope {
            WatchScope::Cluster => write!(f, "{group}/{}/{}", self.version, self.plural),
            WatchScope::Namespaced => {
                write!(f, "{group}/{}/namespaces/*/{}", self.version, self.plural)
            }
        }
    }
}

/// Descriptor of a watchable resource kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceKind {
    /// Kind delivered in events.
    pub kind: KindId,
    /// Listing kind that resolves to this kind (e.g. `PodList`).
    pub list_kind: KindId,
    /// API group; empty for the core group.
    pub group: String,
    /// API version within the group.
    pub version: String,
    /// Plural resource name.
    pub plural: String,
    /// Supports watching across all namespaces.
    pub cluster_watch: bool,
    /// Supports watching a single namespace.
    pub namespaced_watch: bool,
}

impl ResourceKind {
    /// A namespaced kind; watchable per namespace and across all namespaces.
    #[must_use]
    pub fn namespaced(group: &str, version: &str, kind: &str, plural: &str) -> Self {
        Self {
            kind: KindId::from(kind),
            list_kind: KindId::new(format!("{kind}List")),
            group: group.to_string(),
            version: version.to_string(),
            plural: plural.to_string(),
            cluster_watch: true,
            namespaced_watch: true,
        }
    }

    /// A cluster-scoped kind; only watchable cluster-wide.
    #[must_use]
    pub fn cluster(group: &str, version: &str, kind: &str, plural: &str) -> Self {
        Self {
            namespaced_watch: false,
            ..Self::namespaced(group, version, kind, plural)
        }
    }

    /// `apiVersion` string for this kind, e.g. `v1` or `apps/v1`.
    #[must_use]
    pub fn api_version(&self) -> String {
        if self.group.is_empty() {
            self.version.clone()
        } else {
            format!("{}/{}", self.group, self.version)
        }
    }

    /// Whether the kind supports the given watch scope.
    #[must_use]
    pub const fn supports(&self, scope: WatchScope) -> bool {
        match scope {
            WatchScope::Cluster => self.cluster_watch,
            WatchScope::Namespaced => self.namespaced_watch,
        }
    }

    /// Endpoint key for the given scope, if supported.
    #[must_use]
    pub fn endpoint(&self, scope: WatchScope) -> Option<EndpointKey> {
        self.supports(scope).then(|| EndpointKey {
            group: self.group.clone(),
            version: self.version.clone(),
            plural: self.plural.clone(),
            scope,
        })
    }
}
