//! Usable node capacity.
//!
//! Per resource, allocatable is preferred when present and positive, then
//! capacity when present and positive, else 0. Only worker nodes contribute
//! to cluster allocatable.

use kubecap_meta::NodeRecord;
use serde::{Deserialize, Serialize};

/// CPU and memory available for scheduling.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Allocatable {
    /// Millicores
    pub cpu_milli: u64,
    /// MiB
    pub memory_mib: u64,
}

fn positive(v: Option<u64>) -> Option<u64> {
    v.filter(|v| *v > 0)
}

/// Usable capacity of one node.
pub fn node_allocatable(node: &NodeRecord) -> Allocatable {
    Allocatable {
        cpu_milli: positive(node.cpu_allocatable_milli)
            .or(positive(node.cpu_capacity_milli))
            .unwrap_or(0),
        memory_mib: positive(node.memory_allocatable_mib)
            .or(positive(node.memory_capacity_mib))
            .unwrap_or(0),
    }
}

/// Sum of allocatable over worker nodes.
pub fn cluster_allocatable<'a, I>(nodes: I) -> Allocatable
where
    I: IntoIterator<Item = &'a NodeRecord>,
{
    nodes
        .into_iter()
        .filter(|n| n.is_worker())
        .map(node_allocatable)
        .fold(Allocatable::default(), |acc, a| Allocatable {
            cpu_milli: acc.cpu_milli.saturating_add(a.cpu_milli),
            memory_mib: acc.memory_mib.saturating_add(a.memory_mib),
        })
}

/// Per-resource minimum allocatable over worker nodes of `nodes`; `None`
/// when the set holds no worker.
pub fn smallest_allocatable<'a, I>(nodes: I) -> Option<Allocatable>
where
    I: IntoIterator<Item = &'a NodeRecord>,
{
    nodes
        .into_iter()
        .filter(|n| n.is_worker())
        .map(node_allocatable)
        .reduce(|acc, a| Allocatable {
            cpu_milli: acc.cpu_milli.min(a.cpu_milli),
            memory_mib: acc.memory_mib.min(a.memory_mib),
        })
}
