//! Resource objects delivered by watch events.
//!
//! Any type implementing `WatchResource` can be produced by a `Watcher`; the only
//! requirement is access to object metadata so the watcher can track the highest
//! observed `resourceVersion`. `DynamicResource` is the schema-less default.

use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Standard object metadata.
///
/// Field aliases accept snake_case keys so that translated objects deserialize too.
#[allow(missing_docs)]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<String>,
    #[serde(default, alias = "resource_version", skip_serializing_if = "Option::is_none")]
    pub resource_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generation: Option<i64>,
    #[serde(default, alias = "creation_timestamp", skip_serializing_if = "Option::is_none")]
    pub creation_timestamp: Option<String>,
    #[serde(default, alias = "deletion_timestamp", skip_serializing_if = "Option::is_none")]
    pub deletion_timestamp: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
}

impl ObjectMeta {
    /// Numeric resource version, if present and numeric.
    #[must_use]
    pub fn numeric_resource_version(&self) -> Option<u64> {
        self.resource_version
            .as_deref()
            .and_then(|rv| rv.trim().parse().ok())
    }
}

/// A typed resource that can be delivered in a `WatchEvent`.
pub trait WatchResource: DeserializeOwned + Send + 'static {
    /// Object metadata.
    fn metadata(&self) -> &ObjectMeta;

    /// Numeric resource version of this object.
    fn resource_version(&self) -> Option<u64> {
        self.metadata().numeric_resource_version()
    }
}

/// Schema-less resource: typed header, everything else kept as JSON.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DynamicResource {
    /// `apiVersion` of the object.
    #[serde(
        default,
        rename = "apiVersion",
        alias = "api_version",
        skip_serializing_if = "Option::is_none"
    )]
    pub api_version: Option<String>,
    /// `kind` of the object.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    /// Object metadata.
    #[serde(default)]
    pub metadata: ObjectMeta,
    /// Remaining top-level fields (`spec`, `status`, `data`, ...).
    #[serde(flatten)]
    pub body: Map<String, Value>,
}

impl DynamicResource {
    /// Top-level field by name.
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.body.get(name)
    }
}

impl WatchResource for DynamicResource {
    fn metadata(&self) -> &ObjectMeta {
        &self.metadata
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_dynamic_resource_from_object() {
        let obj = json!({
            "apiVersion": "v1",
            "kind": "Pod",
            "metadata": {"name": "web-0", "namespace": "default", "resourceVersion": "1042"},
            "spec": {"nodeName": "n1"}
        });
        let res: DynamicResource = serde_json::from_value(obj).unwrap();
        assert_eq!(res.kind.as_deref(), Some("Pod"));
        assert_eq!(res.metadata.name.as_deref(), Some("web-0"));
        assert_eq!(res.resource_version(), Some(1042));
        assert_eq!(res.field("spec").unwrap()["nodeName"], "n1");
    }

    #[test]
    fn test_non_numeric_resource_version() {
        let meta = ObjectMeta {
            resource_version: Some("abc".to_string()),
            ..ObjectMeta::default()
        };
        assert_eq!(meta.numeric_resource_version(), None);
    }

    #[test]
    fn test_snake_case_metadata_alias() {
        let meta: ObjectMeta =
            serde_json::from_value(json!({"name": "x", "resource_version": "7"})).unwrap();
        assert_eq!(meta.numeric_resource_version(), Some(7));
    }
}
