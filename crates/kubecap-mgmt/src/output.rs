//! Report rendering to JSON and CSV.

use std::fmt;

use anyhow::Context;
use clap::ValueEnum;
use kubecap_capacity::{
    container_config_rows, format_percent, node_rows, role_summaries, CapacityReport, Column,
    ContainerConfigRow, RuleSet,
};
use kubecap_meta::{ResourceKind, SnapshotStore};
use serde::Serialize;
use serde_json::json;

/// Available reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReportType {
    /// Namespace totals against worker allocatable
    ClusterCapacity,
    /// Per-container requests and limits scaled by replicas
    ContainerCapacity,
    /// Per-container configuration with rule verdicts
    ContainersConfig,
    /// Node inventory
    Nodes,
    /// Stored object counts
    Summary,
}

impl ReportType {
    /// CLI name, also the report file prefix.
    pub fn as_str(self) -> &'static str {
        match self {
            ReportType::ClusterCapacity => "cluster-capacity",
            ReportType::ContainerCapacity => "container-capacity",
            ReportType::ContainersConfig => "containers-config",
            ReportType::Nodes => "nodes",
            ReportType::Summary => "summary",
        }
    }
}

impl fmt::Display for ReportType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Output encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Pretty JSON
    Json,
    /// CSV with a header row
    Csv,
}

impl OutputFormat {
    /// File extension without the dot.
    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Json => "json",
            OutputFormat::Csv => "csv",
        }
    }
}

fn opt(v: Option<u64>) -> String {
    v.map_or_else(|| "N/A".to_string(), |n| n.to_string())
}

fn to_csv(header: &[&str], rows: Vec<Vec<String>>) -> anyhow::Result<String> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(header)?;
    for row in rows {
        writer.write_record(&row)?;
    }
    let bytes = writer.into_inner().context("flushing csv output")?;
    Ok(String::from_utf8(bytes)?)
}

fn to_json<T: Serialize>(value: &T) -> anyhow::Result<String> {
    Ok(serde_json::to_string_pretty(value)?)
}

fn workloads(store: &SnapshotStore) -> anyhow::Result<Vec<kubecap_meta::ManifestRecord>> {
    let mut records = Vec::new();
    for kind in ResourceKind::ALL.into_iter().filter(|k| k.has_containers()) {
        records.extend(store.list(kind)?);
    }
    Ok(records)
}

const CONFIG_COLUMNS: [Column; 10] = [
    Column::Replicas,
    Column::CpuRequest,
    Column::CpuLimit,
    Column::MemoryRequest,
    Column::MemoryLimit,
    Column::ReadinessProbe,
    Column::ImagePullPolicy,
    Column::NodeSelectors,
    Column::PodLabels,
    Column::JavaOpts,
];

fn config_cell(row: &ContainerConfigRow, column: Column) -> String {
    match column {
        Column::Replicas => row.replicas.to_string(),
        Column::CpuRequest => opt(row.cpu_request_milli),
        Column::CpuLimit => opt(row.cpu_limit_milli),
        Column::MemoryRequest => opt(row.memory_request_mib),
        Column::MemoryLimit => opt(row.memory_limit_mib),
        Column::ReadinessProbe => row.readiness_probe.clone(),
        Column::ImagePullPolicy => row.image_pull_policy.clone(),
        Column::NodeSelectors => row.node_selectors.clone(),
        Column::PodLabels => row.pod_labels.clone(),
        Column::JavaOpts => row.java_opts.clone(),
    }
}

fn containers_config_csv(rows: &[ContainerConfigRow]) -> anyhow::Result<String> {
    let mut header: Vec<String> = ["kind", "namespace", "name", "container", "type"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    for column in CONFIG_COLUMNS {
        header.push(column.to_string());
        header.push(format!("{}_severity", column));
    }
    let header: Vec<&str> = header.iter().map(String::as_str).collect();
    let body = rows
        .iter()
        .map(|row| {
            let mut cells = vec![
                row.kind.to_string(),
                row.namespace.clone(),
                row.name.clone(),
                row.container.clone(),
                row.container_type.to_string(),
            ];
            for column in CONFIG_COLUMNS {
                cells.push(config_cell(row, column));
                cells.push(row.verdict(column).severity.to_string());
            }
            cells
        })
        .collect();
    to_csv(&header, body)
}

/// Renders `report_type` for the store's cluster.
pub fn render_report(
    store: &SnapshotStore,
    report_type: ReportType,
    format: OutputFormat,
    rules: &RuleSet,
) -> anyhow::Result<String> {
    match report_type {
        ReportType::ClusterCapacity => {
            let report = CapacityReport::from_store(store)?;
            match format {
                OutputFormat::Json => to_json(&json!({
                    "cluster": report.cluster,
                    "summary": report.summary,
                    "namespaces": report.namespaces,
                    "rows": report.rows,
                })),
                OutputFormat::Csv => {
                    let mut rows: Vec<Vec<String>> = report
                        .namespaces
                        .iter()
                        .map(|t| {
                            vec![
                                t.namespace.clone(),
                                t.workloads.to_string(),
                                t.cpu_requests_milli.to_string(),
                                t.cpu_limits_milli.to_string(),
                                format_percent(t.cpu_percent),
                                t.memory_requests_mib.to_string(),
                                t.memory_limits_mib.to_string(),
                                format_percent(t.memory_percent),
                            ]
                        })
                        .collect();
                    let s = &report.summary;
                    rows.push(vec![
                        "TOTAL".to_string(),
                        report.namespaces.iter().map(|t| t.workloads).sum::<usize>().to_string(),
                        s.cpu_requests_milli.to_string(),
                        s.cpu_limits_milli.to_string(),
                        format_percent(s.cpu_percent),
                        s.memory_requests_mib.to_string(),
                        s.memory_limits_mib.to_string(),
                        format_percent(s.memory_percent),
                    ]);
                    // Cluster-level figures go in the requests columns.
                    for (label, cpu, memory) in [
                        ("ALLOCATABLE", s.allocatable.cpu_milli, s.allocatable.memory_mib),
                        ("FREE", s.free_cpu_milli, s.free_memory_mib),
                        ("INIT_OVERHEAD", s.init_cpu_requests_milli, s.init_memory_requests_mib),
                    ] {
                        rows.push(vec![
                            label.to_string(),
                            String::new(),
                            cpu.to_string(),
                            String::new(),
                            String::new(),
                            memory.to_string(),
                            String::new(),
                            String::new(),
                        ]);
                    }
                    to_csv(
                        &[
                            "namespace",
                            "workloads",
                            "cpu_requests_m",
                            "cpu_limits_m",
                            "cpu_percent",
                            "memory_requests_mi",
                            "memory_limits_mi",
                            "memory_percent",
                        ],
                        rows,
                    )
                }
            }
        }
        ReportType::ContainerCapacity => {
            let report = CapacityReport::from_store(store)?;
            match format {
                OutputFormat::Json => to_json(&report.containers),
                OutputFormat::Csv => to_csv(
                    &[
                        "kind",
                        "namespace",
                        "name",
                        "container",
                        "type",
                        "replicas",
                        "cpu_request_m",
                        "cpu_limit_m",
                        "memory_request_mi",
                        "memory_limit_mi",
                        "total_cpu_request_m",
                        "total_cpu_limit_m",
                        "total_memory_request_mi",
                        "total_memory_limit_mi",
                    ],
                    report
                        .containers
                        .iter()
                        .map(|c| {
                            vec![
                                c.kind.to_string(),
                                c.namespace.clone(),
                                c.name.clone(),
                                c.container.clone(),
                                c.container_type.to_string(),
                                c.replicas.to_string(),
                                opt(c.per_replica.cpu_request_milli),
                                opt(c.per_replica.cpu_limit_milli),
                                opt(c.per_replica.memory_request_mib),
                                opt(c.per_replica.memory_limit_mib),
                                c.total_cpu_request_milli.to_string(),
                                c.total_cpu_limit_milli.to_string(),
                                c.total_memory_request_mib.to_string(),
                                c.total_memory_limit_mib.to_string(),
                            ]
                        })
                        .collect(),
                ),
            }
        }
        ReportType::ContainersConfig => {
            let configmaps = store.list(ResourceKind::ConfigMap)?;
            let rows = container_config_rows(&workloads(store)?, &configmaps, &store.nodes()?, rules);
            match format {
                OutputFormat::Json => to_json(&rows),
                OutputFormat::Csv => containers_config_csv(&rows),
            }
        }
        ReportType::Nodes => {
            let nodes = store.nodes()?;
            let rows = node_rows(&nodes);
            match format {
                OutputFormat::Json => to_json(&json!({
                    "nodes": rows,
                    "roles": role_summaries(&nodes),
                })),
                OutputFormat::Csv => to_csv(
                    &[
                        "name",
                        "roles",
                        "instance_type",
                        "zone",
                        "cpu_capacity_m",
                        "memory_capacity_mi",
                        "cpu_allocatable_m",
                        "memory_allocatable_mi",
                        "os_image",
                        "kernel_version",
                        "container_runtime",
                    ],
                    rows.into_iter()
                        .map(|n| {
                            vec![
                                n.name,
                                n.roles,
                                n.instance_type,
                                n.zone,
                                opt(n.cpu_capacity_milli),
                                opt(n.memory_capacity_mib),
                                n.allocatable.cpu_milli.to_string(),
                                n.allocatable.memory_mib.to_string(),
                                n.os_image,
                                n.kernel_version,
                                n.container_runtime,
                            ]
                        })
                        .collect(),
                ),
            }
        }
        ReportType::Summary => {
            let summary = store.summary()?;
            match format {
                OutputFormat::Json => to_json(&summary),
                OutputFormat::Csv => {
                    let mut rows: Vec<Vec<String>> = summary
                        .kinds
                        .iter()
                        .map(|(kind, count)| vec![format!("kind:{}", kind), count.to_string()])
                        .collect();
                    rows.extend(
                        summary
                            .nodes_by_role
                            .iter()
                            .map(|(role, count)| vec![format!("role:{}", role), count.to_string()]),
                    );
                    rows.push(vec!["nodes".into(), summary.nodes.to_string()]);
                    rows.push(vec![
                        "last_sync".into(),
                        summary.last_sync.unwrap_or_else(|| "N/A".into()),
                    ]);
                    to_csv(&["item", "value"], rows)
                }
            }
        }
    }
}
