//! Container workload views over stored manifests.

use std::collections::BTreeMap;
use std::fmt;

use kubecap_meta::quantity::{cpu_value_to_milli, mem_value_to_mib};
use kubecap_meta::{ManifestRecord, NodeRecord, ReplicaRule, ResourceKind};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Whether a container runs for the pod's lifetime or before it starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerType {
    /// `spec.containers`
    Main,
    /// `spec.initContainers`
    Init,
}

impl fmt::Display for ContainerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContainerType::Main => f.write_str("main"),
            ContainerType::Init => f.write_str("init"),
        }
    }
}

/// Parsed requests and limits of one container (per replica).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerResources {
    /// CPU request in millicores
    pub cpu_request_milli: Option<u64>,
    /// CPU limit in millicores
    pub cpu_limit_milli: Option<u64>,
    /// Memory request in MiB
    pub memory_request_mib: Option<u64>,
    /// Memory limit in MiB
    pub memory_limit_mib: Option<u64>,
}

impl ContainerResources {
    /// Reads `resources.requests` and `resources.limits` of a container spec.
    pub fn from_container(container: &Value) -> Self {
        let requests = container.pointer("/resources/requests");
        let limits = container.pointer("/resources/limits");
        Self {
            cpu_request_milli: cpu_value_to_milli(requests.and_then(|r| r.get("cpu"))),
            cpu_limit_milli: cpu_value_to_milli(limits.and_then(|l| l.get("cpu"))),
            memory_request_mib: mem_value_to_mib(requests.and_then(|r| r.get("memory"))),
            memory_limit_mib: mem_value_to_mib(limits.and_then(|l| l.get("memory"))),
        }
    }
}

/// One container of a workload.
#[derive(Debug, Clone)]
pub struct Container<'a> {
    /// Container name (`Unknown` when unset)
    pub name: String,
    /// Main or init
    pub container_type: ContainerType,
    /// Raw container spec
    pub spec: &'a Value,
    /// Parsed resources
    pub resources: ContainerResources,
}

fn value_at<'v>(root: &'v Value, path: &[&str]) -> Option<&'v Value> {
    path.iter().try_fold(root, |v, seg| v.get(*seg))
}

fn string_map(value: Option<&Value>) -> BTreeMap<String, String> {
    value
        .and_then(Value::as_object)
        .map(|m| {
            m.iter()
                .map(|(k, v)| {
                    let v = match v {
                        Value::String(s) => s.clone(),
                        other => other.to_string(),
                    };
                    (k.clone(), v)
                })
                .collect()
        })
        .unwrap_or_default()
}

/// True when every selector entry is present with the same value in `labels`.
pub fn selector_matches(selector: &BTreeMap<String, String>, labels: &BTreeMap<String, String>) -> bool {
    selector.iter().all(|(k, v)| labels.get(k) == Some(v))
}

/// A stored manifest that carries a pod template.
#[derive(Debug, Clone, Copy)]
pub struct Workload<'a> {
    /// Underlying stored record
    pub record: &'a ManifestRecord,
    pod_spec: &'a Value,
}

impl<'a> Workload<'a> {
    /// Wraps a record; `None` for kinds without containers or a missing pod spec.
    pub fn from_record(record: &'a ManifestRecord) -> Option<Self> {
        let kind = record.kind();
        if !kind.has_containers() {
            return None;
        }
        let pod_spec = value_at(&record.manifest, kind.pod_spec_path()).filter(|v| v.is_object())?;
        Some(Self { record, pod_spec })
    }

    /// Resource kind.
    pub fn kind(&self) -> ResourceKind {
        self.record.kind()
    }

    /// Namespace.
    pub fn namespace(&self) -> &'a str {
        &self.record.key.namespace
    }

    /// Workload name.
    pub fn name(&self) -> &'a str {
        &self.record.key.name
    }

    /// The pod spec.
    pub fn pod_spec(&self) -> &'a Value {
        self.pod_spec
    }

    /// Main containers followed by init containers.
    pub fn containers(&self) -> Vec<Container<'a>> {
        let list = |field: &str, container_type: ContainerType| -> Vec<Container<'a>> {
            self.pod_spec
                .get(field)
                .and_then(Value::as_array)
                .map(|items| {
                    items
                        .iter()
                        .map(|spec| Container {
                            name: spec
                                .get("name")
                                .and_then(Value::as_str)
                                .unwrap_or("Unknown")
                                .to_string(),
                            container_type,
                            spec,
                            resources: ContainerResources::from_container(spec),
                        })
                        .collect()
                })
                .unwrap_or_default()
        };
        let mut containers = list("containers", ContainerType::Main);
        containers.extend(list("initContainers", ContainerType::Init));
        containers
    }

    /// `nodeSelector` of the pod spec.
    pub fn node_selector(&self) -> BTreeMap<String, String> {
        string_map(self.pod_spec.get("nodeSelector"))
    }

    /// Labels of the pod template (`template.metadata.labels`).
    pub fn pod_labels(&self) -> BTreeMap<String, String> {
        let path = self.kind().pod_spec_path();
        let template = value_at(&self.record.manifest, &path[..path.len() - 1]);
        string_map(template.and_then(|t| t.pointer("/metadata/labels")))
    }

    /// Replica count declared in the manifest; `None` for DaemonSets, whose
    /// count depends on the node set.
    pub fn declared_replicas(&self) -> Option<u64> {
        let manifest = &self.record.manifest;
        match self.kind().replica_rule() {
            ReplicaRule::Declared => Some(
                manifest
                    .pointer("/spec/replicas")
                    .and_then(Value::as_u64)
                    .unwrap_or(1),
            ),
            ReplicaRule::JobParallelism => {
                let job = value_at(manifest, self.kind().job_spec_path());
                Some(
                    job.and_then(|j| j.get("parallelism"))
                        .and_then(Value::as_u64)
                        .or_else(|| job.and_then(|j| j.get("completions")).and_then(Value::as_u64))
                        .unwrap_or(1),
                )
            }
            ReplicaRule::DaemonSetNodes | ReplicaRule::NotApplicable => None,
        }
    }

    /// Worker nodes whose labels satisfy the pod node selector.
    pub fn eligible_workers<'n>(&self, nodes: &'n [NodeRecord]) -> Vec<&'n NodeRecord> {
        let selector = self.node_selector();
        nodes
            .iter()
            .filter(|n| n.is_worker() && selector_matches(&selector, &n.labels))
            .collect()
    }

    /// Replicas used to scale per-container values. DaemonSets count one
    /// replica per eligible worker.
    pub fn effective_replicas(&self, nodes: &[NodeRecord]) -> u64 {
        match self.declared_replicas() {
            Some(replicas) => replicas,
            None => self.eligible_workers(nodes).len() as u64,
        }
    }
}

/// Effective replicas of a stored record; 0 for records without a pod template.
pub fn effective_replicas(record: &ManifestRecord, nodes: &[NodeRecord]) -> u64 {
    Workload::from_record(record)
        .map(|w| w.effective_replicas(nodes))
        .unwrap_or(0)
}
