//! Capacity aggregation and configuration grading over a stored snapshot.

mod common;

use common::{configmap, daemonset, deployment, memory_store, node, pod_spec, record, CLUSTER};
use kubecap_capacity::{
    aggregate, container_config_rows, format_percent, CapacityReport, Column, ContainerType,
    RuleSet, Severity,
};
use kubecap_meta::{NodeRole, ResourceKind};
use serde_json::json;

#[test]
fn test_end_to_end_single_namespace() {
    let store = memory_store();
    store
        .commit_kind(
            ResourceKind::Deployment,
            vec![deployment("ns1", "web", 2, pod_spec(("500m", "256Mi"), ("1000m", "512Mi")))],
            Vec::new(),
        )
        .unwrap();
    let node_manifest = record(ResourceKind::Node, "", "w1", json!({"kind": "Node", "metadata": {"name": "w1"}}));
    store
        .commit_kind(
            ResourceKind::Node,
            vec![node_manifest],
            vec![node("w1", NodeRole::Worker, 4000, 8192)],
        )
        .unwrap();

    let report = CapacityReport::from_store(&store).unwrap();
    assert_eq!(report.cluster, CLUSTER);
    let ns1 = report.namespace("ns1").unwrap();
    assert_eq!(ns1.cpu_requests_milli, 1000);
    assert_eq!(ns1.cpu_limits_milli, 2000);
    assert_eq!(ns1.memory_requests_mib, 512);
    assert_eq!(format_percent(ns1.cpu_percent), "25.0%");
    assert_eq!(report.summary.free_cpu_milli, 3000);
    assert_eq!(report.summary.free_memory_mib, 7680);
    assert_eq!(report.summary.worker_nodes, 1);
}

#[test]
fn test_daemonset_scales_with_workers() {
    let spec = pod_spec(("100m", "64Mi"), ("200m", "128Mi"));
    let nodes = vec![
        node("w1", NodeRole::Worker, 4000, 8192),
        node("w2", NodeRole::Worker, 4000, 8192),
        node("w3", NodeRole::Worker, 4000, 8192),
        node("m1", NodeRole::Master, 4000, 8192),
    ];
    let mut master_only = pod_spec(("100m", "64Mi"), ("200m", "128Mi"));
    master_only["nodeSelector"] = json!({"node-role.kubernetes.io/master": ""});

    let manifests = vec![
        daemonset("logging", "fluentd", spec),
        daemonset("ops", "etcd-backup", master_only),
    ];
    let report = aggregate(CLUSTER, &manifests, &nodes);

    let logging = report.namespace("logging").unwrap();
    assert_eq!(logging.cpu_requests_milli, 300);
    let ops = report.namespace("ops").unwrap();
    assert_eq!(ops.cpu_requests_milli, 0);
    assert_eq!(report.summary.allocatable.cpu_milli, 12000);
    assert_eq!(report.namespaces[0].namespace, "logging");
}

#[test]
fn test_config_rows_grade_cells() {
    let mut spec = pod_spec(("100m", "256Mi"), ("8000m", "512Mi"));
    spec["containers"][0]["imagePullPolicy"] = json!("Always");
    spec["containers"][0]["env"] = json!([{
        "name": "JAVA_OPTS",
        "valueFrom": {"configMapKeyRef": {"name": "jvm", "key": "opts"}}
    }]);
    spec["initContainers"] = json!([{"name": "migrate"}]);

    let manifests = vec![deployment("shop", "cart", 3, spec)];
    let configmaps = vec![
        configmap("shop", "jvm", json!({"opts": "-Xmx256m"})),
        configmap("other", "jvm", json!({"opts": "-Xmx4g"})),
    ];
    let nodes = vec![node("w1", NodeRole::Worker, 4000, 8192)];
    let rows = container_config_rows(&manifests, &configmaps, &nodes, &RuleSet::official());
    assert_eq!(rows.len(), 2);

    let main = &rows[0];
    assert_eq!(main.container_type, ContainerType::Main);
    assert_eq!(main.replicas, 3);
    assert_eq!(main.java_opts, "-Xmx256m");
    assert_eq!(main.pod_labels, "app=cart");
    assert_eq!(main.node_selectors, "None");
    assert_eq!(main.readiness_probe, "Not configured");
    assert_eq!(main.verdict(Column::ReadinessProbe).severity, Severity::ErrorMiss);
    assert_eq!(main.verdict(Column::CpuLimit).severity, Severity::ErrorMisconf);
    assert_eq!(
        main.verdict(Column::CpuRequest).rule_id.as_deref(),
        Some("request_below_limit_ratio")
    );
    assert_eq!(main.verdict(Column::MemoryRequest).severity, Severity::None);
    assert_eq!(main.verdict(Column::ImagePullPolicy).severity, Severity::WarningMisconf);

    let init = &rows[1];
    assert_eq!(init.container, "migrate");
    assert_eq!(init.image_pull_policy, "IfNotPresent");
    assert_eq!(init.java_opts, "Not configured");
    assert_eq!(init.verdict(Column::CpuRequest).severity, Severity::ErrorMiss);
    assert_eq!(init.verdict(Column::MemoryLimit).severity, Severity::WarningMiss);
}

#[test]
fn test_env_from_configmap_scan() {
    let mut spec = pod_spec(("1", "1Gi"), ("2", "2Gi"));
    spec["containers"][0]["envFrom"] = json!([{"configMapRef": {"name": "settings"}}]);
    let manifests = vec![deployment("billing", "ledger", 1, spec)];
    let configmaps = vec![configmap(
        "billing",
        "settings",
        json!({"LOG_LEVEL": "info", "JAVA_TOOL_OPTIONS": "-XX:+UseG1GC"}),
    )];
    let rows = container_config_rows(&manifests, &configmaps, &[], &RuleSet::official());
    assert_eq!(rows[0].java_opts, "-XX:+UseG1GC");
}

#[test]
fn test_disabled_rule_does_not_fire() {
    let manifests = vec![deployment("a", "b", 1, json!({"containers": [{"name": "c"}]}))];
    let mut rules = RuleSet::official();
    rules.disable("missing_cpu_request").unwrap();
    let rows = container_config_rows(&manifests, &[], &[], &rules);
    assert_eq!(rows[0].verdict(Column::CpuRequest).severity, Severity::None);
    assert_eq!(rows[0].verdict(Column::MemoryRequest).severity, Severity::ErrorMiss);
}
