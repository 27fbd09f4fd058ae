//! Kind catalog and watch operation resolver.
//!
//! The catalog is a registration table populated at startup: kind identity (or its
//! listing alias) maps to a `ResourceKind`, and a kind plus scope resolves to a
//! `WatchOperation` that is cached by endpoint key.

mod builtin;

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use parking_lot::RwLock;

use crate::error::{ConfigurationError, WatchResult};
use crate::kind::{EndpointKey, KindId, ResourceKind, WatchScope};
use crate::operation::{ApiPathOperation, WatchOperation};

/// A kind resolved for a particular watch scope.
#[derive(Debug, Clone)]
pub struct ResolvedWatch {
    /// Descriptor of the watched (item) kind.
    pub kind: ResourceKind,
    /// Scope the watch was resolved for.
    pub scope: WatchScope,
    /// Operation used to open the watch.
    pub operation: Arc<dyn WatchOperation>,
}

/// Registration table of watchable kinds.
#[derive(Debug, Default)]
pub struct KindCatalog {
    kinds: HashMap<KindId, ResourceKind>,
    list_aliases: HashMap<KindId, KindId>,
    operations: RwLock<HashMap<EndpointKey, Arc<dyn WatchOperation>>>,
}

impl KindCatalog {
    /// Creates an empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a catalog pre-populated with the built-in kinds.
    #[must_use]
    pub fn builtin() -> Self {
        let mut catalog = Self::new();
        for kind in builtin::kinds() {
            catalog.register(kind);
        }
        catalog
    }

    /// Process-wide catalog of the built-in kinds.
    pub fn shared() -> &'static Self {
        static SHARED: OnceLock<KindCatalog> = OnceLock::new();
        SHARED.get_or_init(Self::builtin)
    }

    /// Registers (or replaces) a kind and its listing alias.
    pub fn register(&mut self, kind: ResourceKind) {
        self.list_aliases.insert(kind.list_kind.clone(), kind.kind.clone());
        self.kinds.insert(kind.kind.clone(), kind);
    }

    /// Registers a custom operation, overriding the default path layout for its endpoint.
    pub fn register_operation(&self, operation: Arc<dyn WatchOperation>) {
        self.operations
            .write()
            .insert(operation.endpoint().clone(), operation);
    }

    /// Looks up a kind by identity or listing alias.
    #[must_use]
    pub fn lookup(&self, kind: &str) -> Option<&ResourceKind> {
        let id = KindId::from(kind);
        if let Some(found) = self.kinds.get(&id) {
            return Some(found);
        }
        self.list_aliases
            .get(&id)
            .and_then(|item| self.kinds.get(item))
    }

    /// Number of registered kinds.
    #[must_use]
    pub fn len(&self) -> usize {
        self.kinds.len()
    }

    /// Returns true if no kinds are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty()
    }

    /// Kinds that support the given watch scope, sorted by kind name.
    #[must_use]
    pub fn watchable(&self, scope: WatchScope) -> Vec<&ResourceKind> {
        let mut out: Vec<&ResourceKind> =
            self.kinds.values().filter(|k| k.supports(scope)).collect();
        out.sort_by(|a, b| a.kind.cmp(&b.kind));
        out
    }

    /// Resolves a kind and scope to a cached watch operation.
    pub fn resolve(&self, kind: &str, scope: WatchScope) -> WatchResult<ResolvedWatch> {
        let descriptor = self
            .lookup(kind)
            .ok_or_else(|| ConfigurationError::UnknownKind {
                kind: kind.to_string(),
            })?;

        let endpoint =
            descriptor
                .endpoint(scope)
                .ok_or_else(|| ConfigurationError::UnsupportedWatch {
                    kind: KindId::from(kind),
                    scope,
                })?;

        Ok(ResolvedWatch {
            kind: descriptor.clone(),
            scope,
            operation: self.operation_for(endpoint),
        })
    }

    fn operation_for(&self, endpoint: EndpointKey) -> Arc<dyn WatchOperation> {
        if let Some(op) = self.operations.read().get(&endpoint) {
            return Arc::clone(op);
        }

        // Another thread may have inserted it between the read and the write.
        let mut guard = self.operations.write();
        Arc::clone(
            guard
                .entry(endpoint.clone())
                .or_insert_with(|| Arc::new(ApiPathOperation::new(endpoint))),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::WatchError;
    use crate::watch::WatchParams;

    #[test]
    fn test_list_alias_resolves_item_kind() {
        let catalog = KindCatalog::builtin();
        let resolved = catalog.resolve("PodList", WatchScope::Namespaced).unwrap();
        assert_eq!(resolved.kind.kind.as_str(), "Pod");
    }

    #[test]
    fn test_unknown_kind() {
        let catalog = KindCatalog::builtin();
        let err = catalog.resolve("Gadget", WatchScope::Cluster).unwrap_err();
        assert!(matches!(
            err,
            WatchError::Configuration(ConfigurationError::UnknownKind { .. })
        ));
    }

    #[test]
    fn test_unsupported_scope() {
        let catalog = KindCatalog::builtin();
        let err = catalog.resolve("Namespace", WatchScope::Namespaced).unwrap_err();
        assert!(matches!(
            err,
            WatchError::Configuration(ConfigurationError::UnsupportedWatch {
                scope: WatchScope::Namespaced,
                ..
            })
        ));
    }

    #[test]
    fn test_operations_are_cached_by_endpoint() {
        let catalog = KindCatalog::builtin();
        let a = catalog.resolve("Pod", WatchScope::Cluster).unwrap();
        let b = catalog.resolve("PodList", WatchScope::Cluster).unwrap();
        assert!(Arc::ptr_eq(&a.operation, &b.operation));

        let c = catalog.resolve("Pod", WatchScope::Namespaced).unwrap();
        assert!(!Arc::ptr_eq(&a.operation, &c.operation));
    }

    #[derive(Debug)]
    struct FixedTarget(EndpointKey);

    impl WatchOperation for FixedTarget {
        fn endpoint(&self) -> &EndpointKey {
            &self.0
        }

        fn request_target(&self, _params: &WatchParams) -> String {
            "/custom".to_string()
        }
    }

    #[test]
    fn test_registered_operation_overrides_default() {
        let mut catalog = KindCatalog::new();
        let widget = ResourceKind::namespaced("example.com", "v1", "Widget", "widgets");
        let key = widget.endpoint(WatchScope::Cluster).unwrap();
        catalog.register(widget);
        catalog.register_operation(Arc::new(FixedTarget(key)));

        let resolved = catalog.resolve("Widget", WatchScope::Cluster).unwrap();
        assert_eq!(resolved.operation.request_target(&WatchParams::default()), "/custom");
    }

    #[test]
    fn test_watchable_listing() {
        let catalog = KindCatalog::builtin();
        let namespaced: Vec<&str> = catalog
            .watchable(WatchScope::Namespaced)
            .iter()
            .map(|k| k.kind.as_str())
            .collect();
        assert!(namespaced.contains(&"RoleBinding"));
        assert!(namespaced.contains(&"CSIStorageCapacity"));
        assert!(!namespaced.contains(&"ClusterRole"));

        let cluster: Vec<&str> = catalog
            .watchable(WatchScope::Cluster)
            .iter()
            .map(|k| k.kind.as_str())
            .collect();
        assert!(cluster.contains(&"ClusterRole"));
        assert!(cluster.contains(&"Pod"));
    }
}
