use crate::kind::ResourceKind;

pub(super) fn kinds() -> Vec<ResourceKind> {
    vec![
        // core/v1
        ResourceKind::namespaced("", "v1", "Pod", "pods"),
        ResourceKind::namespaced("", "v1", "Service", "services"),
        ResourceKind::namespaced("", "v1", "ConfigMap", "configmaps"),
        ResourceKind::namespaced("", "v1", "Secret", "secrets"),
        ResourceKind::namespaced("", "v1", "Endpoints", "endpoints"),
        ResourceKind::namespaced("", "v1", "Event", "events"),
        ResourceKind::namespaced("", "v1", "ServiceAccount", "serviceaccounts"),
        ResourceKind::namespaced("", "v1", "PersistentVolumeClaim", "persistentvolumeclaims"),
        ResourceKind::namespaced("", "v1", "ReplicationController", "replicationcontrollers"),
        ResourceKind::namespaced("", "v1", "LimitRange", "limitranges"),
        ResourceKind::namespaced("", "v1", "ResourceQuota", "resourcequotas"),
        ResourceKind::cluster("", "v1", "Namespace", "namespaces"),
        ResourceKind::cluster("", "v1", "Node", "nodes"),
        ResourceKind::cluster("", "v1", "PersistentVolume", "persistentvolumes"),
        // apps/v1
        ResourceKind::namespaced("apps", "v1", "Deployment", "deployments"),
        ResourceKind::namespaced("apps", "v1", "ReplicaSet", "replicasets"),
        ResourceKind::namespaced("apps", "v1", "StatefulSet", "statefulsets"),
        ResourceKind::namespaced("apps", "v1", "DaemonSet", "daemonsets"),
        // batch/v1
        ResourceKind::namespaced("batch", "v1", "Job", "jobs"),
        ResourceKind::namespaced("batch", "v1", "CronJob", "cronjobs"),
        // rbac.authorization.k8s.io/v1
        ResourceKind::namespaced("rbac.authorization.k8s.io", "v1", "Role", "roles"),
        ResourceKind::namespaced("rbac.authorization.k8s.io", "v1", "RoleBinding", "rolebindings"),
        ResourceKind::cluster("rbac.authorization.k8s.io", "v1", "ClusterRole", "clusterroles"),
        ResourceKind::cluster(
            "rbac.authorization.k8s.io",
            "v1",
            "ClusterRoleBinding",
            "clusterrolebindings",
        ),
        // scheduling / node
        ResourceKind::cluster("scheduling.k8s.io", "v1", "PriorityClass", "priorityclasses"),
        ResourceKind::cluster("node.k8s.io", "v1", "RuntimeClass", "runtimeclasses"),
        // storage
        ResourceKind::cluster("storage.k8s.io", "v1", "StorageClass", "storageclasses"),
        ResourceKind::cluster("storage.k8s.io", "v1", "VolumeAttachment", "volumeattachments"),
        ResourceKind::namespaced(
            "storage.k8s.io",
            "v1beta1",
            "CSIStorageCapacity",
            "csistoragecapacities",
        ),
        // internal.apiserver.k8s.io
        ResourceKind::cluster(
            "internal.apiserver.k8s.io",
            "v1alpha1",
            "StorageVersion",
            "storageversions",
        ),
        // networking / policy / coordination
        ResourceKind::namespaced("networking.k8s.io", "v1", "Ingress", "ingresses"),
        ResourceKind::namespaced("networking.k8s.io", "v1", "NetworkPolicy", "networkpolicies"),
        ResourceKind::namespaced("policy", "v1", "PodDisruptionBudget", "poddisruptionbudgets"),
        ResourceKind::namespaced("coordination.k8s.io", "v1", "Lease", "leases"),
        ResourceKind::namespaced("discovery.k8s.io", "v1", "EndpointSlice", "endpointslices"),
    ]
}
