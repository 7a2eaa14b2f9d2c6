//! Fixtures for capacity tests: stored manifest records and node records.

#![allow(dead_code)]

use std::sync::Arc;

use chrono::Utc;
use kubecap_meta::{
    KvStore, ManifestKey, ManifestRecord, MemoryKvStore, NodeRecord, NodeRole, ResourceKind,
    SnapshotStore,
};
use serde_json::{json, Value};

pub const CLUSTER: &str = "lab";

pub fn record(kind: ResourceKind, ns: &str, name: &str, manifest: Value) -> ManifestRecord {
    ManifestRecord {
        cluster: CLUSTER.into(),
        key: ManifestKey::new(kind, ns, name),
        api_version: kind.api_version().into(),
        fingerprint: format!("{}/{}/{}", kind, ns, name),
        manifest,
        synced_at: Utc::now(),
    }
}

/// Pod spec with one main container.
pub fn pod_spec(requests: (&str, &str), limits: (&str, &str)) -> Value {
    json!({
        "containers": [{
            "name": "app",
            "image": "registry.local/app:1",
            "resources": {
                "requests": {"cpu": requests.0, "memory": requests.1},
                "limits": {"cpu": limits.0, "memory": limits.1}
            }
        }]
    })
}

pub fn deployment(ns: &str, name: &str, replicas: u64, spec: Value) -> ManifestRecord {
    record(
        ResourceKind::Deployment,
        ns,
        name,
        json!({
            "kind": "Deployment",
            "metadata": {"name": name, "namespace": ns},
            "spec": {"replicas": replicas, "template": {"metadata": {"labels": {"app": name}}, "spec": spec}}
        }),
    )
}

pub fn daemonset(ns: &str, name: &str, spec: Value) -> ManifestRecord {
    record(
        ResourceKind::DaemonSet,
        ns,
        name,
        json!({
            "kind": "DaemonSet",
            "metadata": {"name": name, "namespace": ns},
            "spec": {"template": {"spec": spec}}
        }),
    )
}

pub fn configmap(ns: &str, name: &str, data: Value) -> ManifestRecord {
    record(
        ResourceKind::ConfigMap,
        ns,
        name,
        json!({"kind": "ConfigMap", "metadata": {"name": name, "namespace": ns}, "data": data}),
    )
}

pub fn node(name: &str, role: NodeRole, cpu: u64, mem: u64) -> NodeRecord {
    let mut node = NodeRecord {
        cluster: CLUSTER.into(),
        name: name.into(),
        cpu_allocatable_milli: Some(cpu),
        memory_allocatable_mib: Some(mem),
        ..Default::default()
    };
    node.roles.insert(role);
    let role_label = format!("node-role.kubernetes.io/{}", role);
    node.labels.insert(role_label, String::new());
    node
}

pub fn memory_store() -> SnapshotStore {
    let kv: Arc<dyn KvStore> = Arc::new(MemoryKvStore::new());
    SnapshotStore::new(kv, CLUSTER).unwrap()
}
