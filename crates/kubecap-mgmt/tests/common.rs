//! Fixture: a storage root plus a directory of kubectl dumps.

#![allow(dead_code)]

use std::path::{Path, PathBuf};

use kubecap_mgmt::{AppConfig, ClusterConfig, LoggingConfig, StorageConfig};
use serde_json::{json, Value};
use tempfile::TempDir;

pub const CLUSTER: &str = "prod";

pub struct Workspace {
    pub dir: TempDir,
    pub config: AppConfig,
}

impl Workspace {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let mut cluster = ClusterConfig::new(CLUSTER);
        cluster.source_dir = Some(dir.path().join("dumps"));
        cluster.include_kinds = vec!["Deployment".into(), "ConfigMap".into(), "Node".into()];
        let config = AppConfig {
            clusters: vec![cluster],
            system_namespaces: vec!["kube-system".into(), "openshift-*".into()],
            storage: StorageConfig {
                base_dir: dir.path().join("clusters"),
                write_manifest_files: true,
            },
            logging: LoggingConfig::default(),
        };
        config.validate().unwrap();
        Self { dir, config }
    }

    pub fn dumps(&self) -> PathBuf {
        self.dir.path().join("dumps")
    }

    pub fn write_dump(&self, file: &str, items: Vec<Value>) {
        let path = self.dumps().join(file);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        let doc = json!({"apiVersion": "v1", "kind": "List", "items": items});
        std::fs::write(path, serde_json::to_vec_pretty(&doc).unwrap()).unwrap();
    }

    pub fn cluster_dir(&self) -> PathBuf {
        self.config.paths(CLUSTER).base_dir
    }
}

pub fn deployment(ns: &str, name: &str, replicas: u64) -> Value {
    json!({
        "apiVersion": "apps/v1",
        "kind": "Deployment",
        "metadata": {
            "name": name,
            "namespace": ns,
            "uid": format!("uid-{}", name),
            "resourceVersion": "42",
        },
        "spec": {
            "replicas": replicas,
            "template": {"spec": {"containers": [{
                "name": "app",
                "resources": {
                    "requests": {"cpu": "500m", "memory": "256Mi"},
                    "limits": {"cpu": "1", "memory": "512Mi"}
                }
            }]}}
        },
        "status": {"readyReplicas": replicas}
    })
}

pub fn worker(name: &str) -> Value {
    json!({
        "apiVersion": "v1",
        "kind": "Node",
        "metadata": {"name": name, "labels": {"node-role.kubernetes.io/worker": ""}},
        "status": {
            "capacity": {"cpu": "4", "memory": "8Gi"},
            "allocatable": {"cpu": "4000m", "memory": "8192Mi"}
        }
    })
}

pub fn read_json(path: &Path) -> Value {
    serde_json::from_slice(&std::fs::read(path).unwrap()).unwrap()
}
