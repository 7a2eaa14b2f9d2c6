//! Per-container configuration rows graded by a [`RuleSet`].

use std::collections::{BTreeMap, HashMap};

use kubecap_meta::{ManifestRecord, NodeRecord, ResourceKind};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::allocatable::smallest_allocatable;
use crate::rules::{CellValue, Column, RuleContext, RuleSet, Verdict};
use crate::workload::{Container, ContainerType, Workload};

const NOT_CONFIGURED: &str = "Not configured";
const DEFAULT_PULL_POLICY: &str = "IfNotPresent";

/// Configuration facts of one container.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainerConfigRow {
    /// Workload kind
    pub kind: ResourceKind,
    /// Namespace
    pub namespace: String,
    /// Workload name
    pub name: String,
    /// Container name
    pub container: String,
    /// Main or init
    pub container_type: ContainerType,
    /// Effective replicas
    pub replicas: u64,
    /// Millicores per replica
    pub cpu_request_milli: Option<u64>,
    /// Millicores per replica
    pub cpu_limit_milli: Option<u64>,
    /// MiB per replica
    pub memory_request_mib: Option<u64>,
    /// MiB per replica
    pub memory_limit_mib: Option<u64>,
    /// `<timeout>s (initial: <delay>s)` or `Not configured`
    pub readiness_probe: String,
    /// Image pull policy, `IfNotPresent` when unset
    pub image_pull_policy: String,
    /// `k=v, ...` or `None`
    pub node_selectors: String,
    /// `k=v, ...` or `None`
    pub pod_labels: String,
    /// Resolved JVM options or `Not configured`
    pub java_opts: String,
    /// Verdict per graded column
    pub verdicts: BTreeMap<Column, Verdict>,
}

impl ContainerConfigRow {
    /// Cell value of `column` as seen by the rules.
    pub fn cell(&self, column: Column) -> CellValue {
        match column {
            Column::CpuRequest => self.cpu_request_milli.into(),
            Column::CpuLimit => self.cpu_limit_milli.into(),
            Column::MemoryRequest => self.memory_request_mib.into(),
            Column::MemoryLimit => self.memory_limit_mib.into(),
            Column::ReadinessProbe => self.readiness_probe.as_str().into(),
            Column::ImagePullPolicy => self.image_pull_policy.as_str().into(),
            Column::Replicas => Some(self.replicas).into(),
            Column::NodeSelectors => self.node_selectors.as_str().into(),
            Column::PodLabels => self.pod_labels.as_str().into(),
            Column::JavaOpts => self.java_opts.as_str().into(),
        }
    }

    /// Verdict of `column`, `NONE` when ungraded.
    pub fn verdict(&self, column: Column) -> Verdict {
        self.verdicts.get(&column).cloned().unwrap_or_default()
    }
}

const GRADED: [Column; 10] = [
    Column::CpuRequest,
    Column::CpuLimit,
    Column::MemoryRequest,
    Column::MemoryLimit,
    Column::ReadinessProbe,
    Column::ImagePullPolicy,
    Column::Replicas,
    Column::NodeSelectors,
    Column::PodLabels,
    Column::JavaOpts,
];

fn format_pairs(map: &BTreeMap<String, String>) -> String {
    if map.is_empty() {
        return "None".to_string();
    }
    map.iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join(", ")
}

fn scalar(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn readiness_probe(container: &Value) -> String {
    match container.get("readinessProbe").filter(|p| p.as_object().is_some_and(|o| !o.is_empty())) {
        Some(probe) => {
            let timeout = probe.get("timeoutSeconds").and_then(scalar).unwrap_or_else(|| "1".into());
            let delay = probe
                .get("initialDelaySeconds")
                .and_then(scalar)
                .unwrap_or_else(|| "0".into());
            format!("{}s (initial: {}s)", timeout, delay)
        }
        None => NOT_CONFIGURED.to_string(),
    }
}

fn is_java_opts_name(name: &str) -> bool {
    let upper = name.to_uppercase();
    upper.contains("JAVA") && upper.contains("OPT")
}

/// ConfigMap `data` sections by namespace, then name.
struct ConfigMapIndex<'a> {
    data: HashMap<&'a str, HashMap<&'a str, &'a serde_json::Map<String, Value>>>,
}

impl<'a> ConfigMapIndex<'a> {
    fn new(configmaps: &'a [ManifestRecord]) -> Self {
        let mut data: HashMap<&'a str, HashMap<&'a str, _>> = HashMap::new();
        for record in configmaps.iter().filter(|r| r.kind() == ResourceKind::ConfigMap) {
            if let Some(map) = record.manifest.get("data").and_then(Value::as_object) {
                data.entry(record.key.namespace.as_str())
                    .or_default()
                    .insert(record.key.name.as_str(), map);
            }
        }
        Self { data }
    }

    fn get(&self, namespace: &str, name: &str) -> Option<&'a serde_json::Map<String, Value>> {
        self.data.get(namespace)?.get(name).copied()
    }
}

fn non_empty(v: Option<&Value>) -> Option<String> {
    v.and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn env_name(var: &Value) -> &str {
    var.get("name").and_then(Value::as_str).unwrap_or("")
}

fn java_opts(container: &Value, namespace: &str, configmaps: &ConfigMapIndex<'_>) -> String {
    let env: &[Value] = container
        .get("env")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[]);

    let direct = env
        .iter()
        .filter(|var| is_java_opts_name(env_name(var)))
        .find_map(|var| non_empty(var.get("value")));
    if let Some(v) = direct {
        return v;
    }

    let referenced = env
        .iter()
        .filter(|var| is_java_opts_name(env_name(var)))
        .find_map(|var| {
            let cm_ref = var.pointer("/valueFrom/configMapKeyRef")?;
            let cm = cm_ref.get("name").and_then(Value::as_str)?;
            let key = cm_ref.get("key").and_then(Value::as_str)?;
            non_empty(configmaps.get(namespace, cm)?.get(key))
        });
    if let Some(v) = referenced {
        return v;
    }

    container
        .get("envFrom")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(|source| source.pointer("/configMapRef/name").and_then(Value::as_str))
        .filter_map(|cm| configmaps.get(namespace, cm))
        .find_map(|data| {
            data.iter()
                .filter(|(k, _)| is_java_opts_name(k))
                .find_map(|(_, v)| non_empty(Some(v)))
        })
        .unwrap_or_else(|| NOT_CONFIGURED.to_string())
}

fn build_row(
    workload: &Workload<'_>,
    container: &Container<'_>,
    replicas: u64,
    node_selectors: &str,
    pod_labels: &str,
    configmaps: &ConfigMapIndex<'_>,
) -> ContainerConfigRow {
    let r = container.resources;
    ContainerConfigRow {
        kind: workload.kind(),
        namespace: workload.namespace().to_string(),
        name: workload.name().to_string(),
        container: container.name.clone(),
        container_type: container.container_type,
        replicas,
        cpu_request_milli: r.cpu_request_milli,
        cpu_limit_milli: r.cpu_limit_milli,
        memory_request_mib: r.memory_request_mib,
        memory_limit_mib: r.memory_limit_mib,
        readiness_probe: readiness_probe(container.spec),
        image_pull_policy: container
            .spec
            .get("imagePullPolicy")
            .and_then(Value::as_str)
            .unwrap_or(DEFAULT_PULL_POLICY)
            .to_string(),
        node_selectors: node_selectors.to_string(),
        pod_labels: pod_labels.to_string(),
        java_opts: java_opts(container.spec, workload.namespace(), configmaps),
        verdicts: BTreeMap::new(),
    }
}

/// One graded row per container (main and init) of every workload record.
///
/// `configmaps` supplies the ConfigMap records used to resolve JVM options;
/// lookups stay within the workload's namespace.
pub fn container_config_rows(
    manifests: &[ManifestRecord],
    configmaps: &[ManifestRecord],
    nodes: &[NodeRecord],
    rules: &RuleSet,
) -> Vec<ContainerConfigRow> {
    let index = ConfigMapIndex::new(configmaps);
    let mut rows = Vec::new();

    for workload in manifests.iter().filter_map(Workload::from_record) {
        let replicas = workload.effective_replicas(nodes);
        let node_selectors = format_pairs(&workload.node_selector());
        let pod_labels = format_pairs(&workload.pod_labels());
        let smallest = smallest_allocatable(workload.eligible_workers(nodes));

        for container in workload.containers() {
            let mut row = build_row(&workload, &container, replicas, &node_selectors, &pod_labels, &index);
            let ctx = RuleContext {
                cpu_limit_milli: row.cpu_limit_milli,
                memory_limit_mib: row.memory_limit_mib,
                smallest_allocatable: smallest,
            };
            row.verdicts = GRADED
                .iter()
                .map(|&column| (column, rules.evaluate(column, &row.cell(column), &ctx)))
                .collect();
            rows.push(row);
        }
    }
    rows
}
