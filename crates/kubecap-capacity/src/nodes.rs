//! Node inventory rows and per-role summaries.

use std::collections::BTreeMap;

use kubecap_meta::{NodeRecord, NodeRole};
use serde::{Deserialize, Serialize};

use crate::allocatable::{node_allocatable, Allocatable};

/// One node as reported.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeRow {
    /// Node name
    pub name: String,
    /// Roles, comma separated
    pub roles: String,
    /// Instance type label or `unknown`
    pub instance_type: String,
    /// Zone label or `unknown`
    pub zone: String,
    /// Raw CPU capacity, millicores
    pub cpu_capacity_milli: Option<u64>,
    /// Raw memory capacity, MiB
    pub memory_capacity_mib: Option<u64>,
    /// Effective allocatable after capacity fallback
    pub allocatable: Allocatable,
    /// OS image
    pub os_image: String,
    /// Kernel version
    pub kernel_version: String,
    /// Container runtime version
    pub container_runtime: String,
}

/// Totals for all nodes sharing a primary role.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleSummary {
    /// Primary role, `None` for unlabelled nodes
    pub role: Option<NodeRole>,
    /// Nodes in the group
    pub count: usize,
    /// Summed allocatable
    pub allocatable: Allocatable,
}

/// The role a node is grouped under: master, then infra, then worker.
/// `None` for nodes without any known role.
pub fn primary_role(node: &NodeRecord) -> Option<NodeRole> {
    [NodeRole::Master, NodeRole::Infra, NodeRole::Worker]
        .into_iter()
        .find(|r| node.roles.contains(r))
}

fn or_unknown(v: &Option<String>) -> String {
    v.clone().unwrap_or_else(|| "unknown".to_string())
}

/// Rows for every node, sorted by name.
pub fn node_rows(nodes: &[NodeRecord]) -> Vec<NodeRow> {
    let mut rows: Vec<NodeRow> = nodes
        .iter()
        .map(|n| NodeRow {
            name: n.name.clone(),
            roles: n.roles_display(),
            instance_type: or_unknown(&n.instance_type),
            zone: or_unknown(&n.zone),
            cpu_capacity_milli: n.cpu_capacity_milli,
            memory_capacity_mib: n.memory_capacity_mib,
            allocatable: node_allocatable(n),
            os_image: or_unknown(&n.os_image),
            kernel_version: or_unknown(&n.kernel_version),
            container_runtime: or_unknown(&n.container_runtime),
        })
        .collect();
    rows.sort_by(|a, b| a.name.cmp(&b.name));
    rows
}

/// One summary per primary role, workers first.
pub fn role_summaries(nodes: &[NodeRecord]) -> Vec<RoleSummary> {
    let mut by_role: BTreeMap<Option<NodeRole>, RoleSummary> = BTreeMap::new();
    for node in nodes {
        let role = primary_role(node);
        let entry = by_role.entry(role).or_insert_with(|| RoleSummary {
            role,
            ..Default::default()
        });
        let a = node_allocatable(node);
        entry.count += 1;
        entry.allocatable.cpu_milli += a.cpu_milli;
        entry.allocatable.memory_mib += a.memory_mib;
    }
    // BTreeMap orders None first; workers should lead the report.
    let mut summaries: Vec<RoleSummary> = by_role.into_values().collect();
    summaries.sort_by_key(|s| (s.role.is_none(), s.role));
    summaries
}
