#![warn(missing_docs)]

//! kubecap capacity subsystem: derives per-namespace and per-cluster resource
//! totals from a stored snapshot and grades container configuration cells
//! with a severity-ranked rule set.

pub mod aggregate;
pub mod allocatable;
pub mod config_report;
pub mod error;
pub mod nodes;
pub mod rules;
pub mod workload;

pub use aggregate::{
    aggregate, format_percent, AggregateRow, CapacityReport, ClusterSummary,
    ContainerCapacityRow, NamespaceTotals, ResourceType,
};
pub use allocatable::{cluster_allocatable, node_allocatable, smallest_allocatable, Allocatable};
pub use config_report::{container_config_rows, ContainerConfigRow};
pub use error::{CapacityError, CapacityResult};
pub use nodes::{node_rows, role_summaries, NodeRow, RoleSummary};
pub use rules::{CellValue, Column, Rule, RuleContext, RuleSet, Severity, Verdict};
pub use workload::{effective_replicas, ContainerType, Workload};
