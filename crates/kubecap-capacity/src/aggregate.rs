//! Namespace and cluster capacity aggregation.
//!
//! Per-container values are multiplied by the workload's effective replicas
//! and summed per namespace. Init containers run before the main containers
//! and release their resources, so they are reported as cluster overhead and
//! never enter namespace totals.

use std::collections::BTreeMap;
use std::fmt;

use kubecap_meta::{ManifestRecord, NodeRecord, ResourceKind, SnapshotStore};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::allocatable::{cluster_allocatable, Allocatable};
use crate::error::CapacityResult;
use crate::workload::{ContainerResources, ContainerType, Workload};

/// Resource dimension of an aggregate row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceType {
    /// Millicores
    Cpu,
    /// MiB
    Memory,
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceType::Cpu => f.write_str("cpu"),
            ResourceType::Memory => f.write_str("memory"),
        }
    }
}

/// Requests and limits of one namespace for one resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateRow {
    /// Cluster name
    pub cluster: String,
    /// Namespace
    pub namespace: String,
    /// Resource dimension
    pub resource: ResourceType,
    /// Summed requests (millicores or MiB)
    pub requests: u64,
    /// Summed limits (millicores or MiB)
    pub limits: u64,
    /// Requests as a percentage of worker allocatable
    pub percent: Option<f64>,
}

/// Per-namespace totals over main containers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NamespaceTotals {
    /// Namespace
    pub namespace: String,
    /// Workloads contributing to the totals
    pub workloads: usize,
    /// CPU requests, millicores
    pub cpu_requests_milli: u64,
    /// CPU limits, millicores
    pub cpu_limits_milli: u64,
    /// Memory requests, MiB
    pub memory_requests_mib: u64,
    /// Memory limits, MiB
    pub memory_limits_mib: u64,
    /// CPU requests / worker allocatable x 100
    pub cpu_percent: Option<f64>,
    /// Memory requests / worker allocatable x 100
    pub memory_percent: Option<f64>,
}

impl NamespaceTotals {
    /// Sum of CPU and memory percentages; unknown counts as 0.
    pub fn combined_percent(&self) -> f64 {
        self.cpu_percent.unwrap_or(0.0) + self.memory_percent.unwrap_or(0.0)
    }
}

/// Cluster-wide totals.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClusterSummary {
    /// Cluster name
    pub cluster: String,
    /// Worker nodes counted in allocatable
    pub worker_nodes: usize,
    /// Sum of worker allocatable
    pub allocatable: Allocatable,
    /// CPU requests over all namespaces, millicores
    pub cpu_requests_milli: u64,
    /// CPU limits over all namespaces, millicores
    pub cpu_limits_milli: u64,
    /// Memory requests over all namespaces, MiB
    pub memory_requests_mib: u64,
    /// Memory limits over all namespaces, MiB
    pub memory_limits_mib: u64,
    /// CPU requests / allocatable x 100
    pub cpu_percent: Option<f64>,
    /// Memory requests / allocatable x 100
    pub memory_percent: Option<f64>,
    /// max(0, allocatable - requests)
    pub free_cpu_milli: u64,
    /// max(0, allocatable - requests)
    pub free_memory_mib: u64,
    /// Init container CPU requests, millicores
    pub init_cpu_requests_milli: u64,
    /// Init container memory requests, MiB
    pub init_memory_requests_mib: u64,
}

/// One container scaled by replicas.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainerCapacityRow {
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
    /// Per-replica values
    pub per_replica: ContainerResources,
    /// CPU request x replicas
    pub total_cpu_request_milli: u64,
    /// CPU limit x replicas
    pub total_cpu_limit_milli: u64,
    /// Memory request x replicas
    pub total_memory_request_mib: u64,
    /// Memory limit x replicas
    pub total_memory_limit_mib: u64,
}

/// Output of one aggregation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapacityReport {
    /// Cluster name
    pub cluster: String,
    /// Namespace totals, highest combined percentage first
    pub namespaces: Vec<NamespaceTotals>,
    /// Cluster totals
    pub summary: ClusterSummary,
    /// Namespace x resource rows, in namespace order
    pub rows: Vec<AggregateRow>,
    /// Container rows, main and init
    pub containers: Vec<ContainerCapacityRow>,
}

fn percent(numerator: u64, denominator: u64) -> Option<f64> {
    if denominator == 0 {
        return None;
    }
    Some(numerator as f64 / denominator as f64 * 100.0)
}

/// Renders a percentage with one decimal, `N/A` when unknown.
pub fn format_percent(value: Option<f64>) -> String {
    match value {
        Some(v) => format!("{:.1}%", v),
        None => "N/A".to_string(),
    }
}

/// Aggregates container workloads of one cluster against its node table.
/// Records of kinds without a pod template are ignored.
pub fn aggregate(cluster: &str, manifests: &[ManifestRecord], nodes: &[NodeRecord]) -> CapacityReport {
    let allocatable = cluster_allocatable(nodes);
    let mut namespaces: BTreeMap<String, NamespaceTotals> = BTreeMap::new();
    let mut containers = Vec::new();
    let mut summary = ClusterSummary {
        cluster: cluster.to_string(),
        worker_nodes: nodes.iter().filter(|n| n.is_worker()).count(),
        allocatable,
        ..Default::default()
    };

    for workload in manifests.iter().filter_map(Workload::from_record) {
        let replicas = workload.effective_replicas(nodes);
        let totals = namespaces
            .entry(workload.namespace().to_string())
            .or_insert_with(|| NamespaceTotals {
                namespace: workload.namespace().to_string(),
                ..Default::default()
            });
        totals.workloads += 1;

        // Quantities saturate at u64::MAX, so every product and sum saturates too.
        for container in workload.containers() {
            let r = container.resources;
            let row = ContainerCapacityRow {
                kind: workload.kind(),
                namespace: workload.namespace().to_string(),
                name: workload.name().to_string(),
                container: container.name,
                container_type: container.container_type,
                replicas,
                per_replica: r,
                total_cpu_request_milli: r.cpu_request_milli.unwrap_or(0).saturating_mul(replicas),
                total_cpu_limit_milli: r.cpu_limit_milli.unwrap_or(0).saturating_mul(replicas),
                total_memory_request_mib: r.memory_request_mib.unwrap_or(0).saturating_mul(replicas),
                total_memory_limit_mib: r.memory_limit_mib.unwrap_or(0).saturating_mul(replicas),
            };
            match row.container_type {
                ContainerType::Main => {
                    totals.cpu_requests_milli =
                        totals.cpu_requests_milli.saturating_add(row.total_cpu_request_milli);
                    totals.cpu_limits_milli =
                        totals.cpu_limits_milli.saturating_add(row.total_cpu_limit_milli);
                    totals.memory_requests_mib =
                        totals.memory_requests_mib.saturating_add(row.total_memory_request_mib);
                    totals.memory_limits_mib =
                        totals.memory_limits_mib.saturating_add(row.total_memory_limit_mib);
                }
                ContainerType::Init => {
                    summary.init_cpu_requests_milli =
                        summary.init_cpu_requests_milli.saturating_add(row.total_cpu_request_milli);
                    summary.init_memory_requests_mib =
                        summary.init_memory_requests_mib.saturating_add(row.total_memory_request_mib);
                }
            }
            containers.push(row);
        }
    }

    let mut namespaces: Vec<NamespaceTotals> = namespaces
        .into_values()
        .map(|mut t| {
            t.cpu_percent = percent(t.cpu_requests_milli, allocatable.cpu_milli);
            t.memory_percent = percent(t.memory_requests_mib, allocatable.memory_mib);
            t
        })
        .collect();
    namespaces.sort_by(|a, b| {
        b.combined_percent()
            .total_cmp(&a.combined_percent())
            .then_with(|| a.namespace.cmp(&b.namespace))
    });

    for t in &namespaces {
        summary.cpu_requests_milli =
            summary.cpu_requests_milli.saturating_add(t.cpu_requests_milli);
        summary.cpu_limits_milli = summary.cpu_limits_milli.saturating_add(t.cpu_limits_milli);
        summary.memory_requests_mib =
            summary.memory_requests_mib.saturating_add(t.memory_requests_mib);
        summary.memory_limits_mib = summary.memory_limits_mib.saturating_add(t.memory_limits_mib);
    }
    summary.cpu_percent = percent(summary.cpu_requests_milli, allocatable.cpu_milli);
    summary.memory_percent = percent(summary.memory_requests_mib, allocatable.memory_mib);
    summary.free_cpu_milli = allocatable.cpu_milli.saturating_sub(summary.cpu_requests_milli);
    summary.free_memory_mib = allocatable.memory_mib.saturating_sub(summary.memory_requests_mib);

    let rows = namespaces
        .iter()
        .flat_map(|t| {
            [
                AggregateRow {
                    cluster: cluster.to_string(),
                    namespace: t.namespace.clone(),
                    resource: ResourceType::Cpu,
                    requests: t.cpu_requests_milli,
                    limits: t.cpu_limits_milli,
                    percent: t.cpu_percent,
                },
                AggregateRow {
                    cluster: cluster.to_string(),
                    namespace: t.namespace.clone(),
                    resource: ResourceType::Memory,
                    requests: t.memory_requests_mib,
                    limits: t.memory_limits_mib,
                    percent: t.memory_percent,
                },
            ]
        })
        .collect();

    debug!(
        cluster,
        namespaces = namespaces.len(),
        containers = containers.len(),
        workers = summary.worker_nodes,
        "capacity aggregated"
    );

    CapacityReport {
        cluster: cluster.to_string(),
        namespaces,
        summary,
        rows,
        containers,
    }
}

impl CapacityReport {
    /// Aggregates everything stored for the store's cluster.
    pub fn from_store(store: &SnapshotStore) -> CapacityResult<Self> {
        let mut manifests = Vec::new();
        for kind in ResourceKind::ALL.into_iter().filter(|k| k.has_containers()) {
            manifests.extend(store.list(kind)?);
        }
        let nodes = store.nodes()?;
        Ok(aggregate(store.cluster(), &manifests, &nodes))
    }

    /// Totals of one namespace.
    pub fn namespace(&self, name: &str) -> Option<&NamespaceTotals> {
        self.namespaces.iter().find(|t| t.namespace == name)
    }
}
