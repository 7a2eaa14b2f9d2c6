//! Shared fixtures for kubecap-meta integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use chrono::Utc;
use kubecap_meta::{
    KvStore, ManifestKey, ManifestRecord, NodeRecord, NodeRole, PersistentKvStore,
    ResourceKind, SnapshotStore,
};
use serde_json::json;
use tempfile::TempDir;

pub const CLUSTER: &str = "prod";

/// A snapshot store over a file-backed KV store in a fresh temp dir.
pub struct FileBackedStore {
    pub dir: TempDir,
    pub store: SnapshotStore,
}

impl FileBackedStore {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let store = open_in(&dir);
        Self { dir, store }
    }

    /// Drops the current handle and opens the same directory again.
    pub fn reopen(self) -> Self {
        let FileBackedStore { dir, store } = self;
        drop(store);
        let store = open_in(&dir);
        Self { dir, store }
    }
}

fn open_in(dir: &TempDir) -> SnapshotStore {
    let kv: Arc<dyn KvStore> = Arc::new(PersistentKvStore::open(dir.path()).unwrap());
    SnapshotStore::new(kv, CLUSTER).unwrap()
}

pub fn deployment(ns: &str, name: &str, replicas: u64) -> ManifestRecord {
    let manifest = json!({
        "kind": "Deployment",
        "metadata": {"name": name, "namespace": ns},
        "spec": {"replicas": replicas},
    });
    ManifestRecord {
        cluster: CLUSTER.into(),
        key: ManifestKey::new(ResourceKind::Deployment, ns, name),
        api_version: "apps/v1".into(),
        fingerprint: format!("{}-{}-{}", ns, name, replicas),
        manifest,
        synced_at: Utc::now(),
    }
}

pub fn worker(name: &str, cpu: u64, mem: u64) -> NodeRecord {
    let mut node = NodeRecord {
        cluster: CLUSTER.into(),
        name: name.into(),
        cpu_allocatable_milli: Some(cpu),
        memory_allocatable_mib: Some(mem),
        ..Default::default()
    };
    node.roles.insert(NodeRole::Worker);
    node
}

pub fn node_manifest(name: &str) -> ManifestRecord {
    ManifestRecord {
        cluster: CLUSTER.into(),
        key: ManifestKey::new(ResourceKind::Node, "", name),
        api_version: "v1".into(),
        manifest: json!({"kind": "Node", "metadata": {"name": name}}),
        fingerprint: format!("node-{}", name),
        synced_at: Utc::now(),
    }
}
