//! Shared fixtures for kubecap-sync integration tests.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use kubecap_meta::{BatchOp, KvStore, MemoryKvStore, MetaError, MetaResult, SnapshotStore};
use kubecap_sync::{ClusterSyncConfig, StaticConnector, SyncOrchestrator};
use serde_json::{json, Value};

pub const CLUSTER: &str = "prod";

pub struct Harness {
    pub connector: Arc<StaticConnector>,
    pub store: Arc<SnapshotStore>,
    pub orchestrator: SyncOrchestrator,
}

impl Harness {
    pub fn new(connector: StaticConnector) -> Self {
        Self::with_config(connector, ClusterSyncConfig::new(CLUSTER))
    }

    pub fn with_config(connector: StaticConnector, config: ClusterSyncConfig) -> Self {
        Self::with_kv(connector, config, Arc::new(MemoryKvStore::new()))
    }

    pub fn with_kv(connector: StaticConnector, config: ClusterSyncConfig, kv: Arc<dyn KvStore>) -> Self {
        let connector = Arc::new(connector);
        let store = Arc::new(SnapshotStore::new(kv, CLUSTER).unwrap());
        let orchestrator = SyncOrchestrator::new(connector.clone(), Arc::clone(&store), config);
        Self {
            connector,
            store,
            orchestrator,
        }
    }
}

/// In-memory store whose writes fail for keys under the armed prefixes.
#[derive(Default)]
pub struct FailingKvStore {
    inner: MemoryKvStore,
    failing: Mutex<Vec<Vec<u8>>>,
}

impl FailingKvStore {
    pub fn fail_writes_under(&self, prefix: &str) {
        self.failing.lock().unwrap().push(prefix.as_bytes().to_vec());
    }

    fn check(&self, key: &[u8]) -> MetaResult<()> {
        let failing = self.failing.lock().unwrap();
        if failing.iter().any(|p| key.starts_with(p)) {
            return Err(MetaError::KvError(format!(
                "disk full writing {}",
                String::from_utf8_lossy(key)
            )));
        }
        Ok(())
    }
}

impl KvStore for FailingKvStore {
    fn get(&self, key: &[u8]) -> MetaResult<Option<Vec<u8>>> {
        self.inner.get(key)
    }

    fn put(&self, key: Vec<u8>, value: Vec<u8>) -> MetaResult<()> {
        self.check(&key)?;
        self.inner.put(key, value)
    }

    fn delete(&self, key: &[u8]) -> MetaResult<()> {
        self.check(key)?;
        self.inner.delete(key)
    }

    fn scan_prefix(&self, prefix: &[u8]) -> MetaResult<Vec<(Vec<u8>, Vec<u8>)>> {
        self.inner.scan_prefix(prefix)
    }

    fn scan_range(&self, start: &[u8], end: &[u8]) -> MetaResult<Vec<(Vec<u8>, Vec<u8>)>> {
        self.inner.scan_range(start, end)
    }

    fn contains_key(&self, key: &[u8]) -> MetaResult<bool> {
        self.inner.contains_key(key)
    }

    fn write_batch(&self, ops: Vec<BatchOp>) -> MetaResult<()> {
        for op in &ops {
            match op {
                BatchOp::Put { key, .. } | BatchOp::Delete { key } => self.check(key)?,
            }
        }
        self.inner.write_batch(ops)
    }
}

pub fn deployment(ns: &str, name: &str, replicas: u64) -> Value {
    json!({
        "apiVersion": "apps/v1",
        "kind": "Deployment",
        "metadata": {
            "name": name,
            "namespace": ns,
            "resourceVersion": "1",
            "uid": format!("uid-{}", name),
        },
        "spec": {
            "replicas": replicas,
            "template": {"spec": {"containers": [{"name": "app", "image": "nginx"}]}}
        },
        "status": {"readyReplicas": replicas}
    })
}

pub fn statefulset(ns: &str, name: &str) -> Value {
    json!({
        "apiVersion": "apps/v1",
        "kind": "StatefulSet",
        "metadata": {"name": name, "namespace": ns},
        "spec": {"replicas": 1}
    })
}

pub fn node(name: &str, role_label: &str, cpu: &str, memory: &str) -> Value {
    json!({
        "apiVersion": "v1",
        "kind": "Node",
        "metadata": {"name": name, "labels": {role_label: ""}},
        "status": {
            "capacity": {"cpu": cpu, "memory": memory},
            "allocatable": {"cpu": cpu, "memory": memory}
        }
    })
}
