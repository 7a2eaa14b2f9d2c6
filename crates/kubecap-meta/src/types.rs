//! Core record types and the metadata error type.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::kind::ResourceKind;

/// Errors produced by the metadata layer.
#[derive(Debug, Error)]
pub enum MetaError {
    /// A kind name did not match any supported resource kind.
    #[error("unknown resource kind: {0}")]
    UnknownKind(String),

    /// Cluster names become key segments and must be plain identifiers.
    #[error("invalid cluster name '{0}'")]
    InvalidClusterName(String),

    /// A record's cluster does not match the store it was written to.
    #[error("record for cluster '{record}' written to store for cluster '{store}'")]
    ClusterMismatch {
        /// Cluster the store was opened for
        store: String,
        /// Cluster named by the record
        record: String,
    },

    /// A stored value or key could not be decoded.
    #[error("corrupt record at '{key}': {reason}")]
    Corrupt {
        /// Raw key, lossily decoded
        key: String,
        /// Decoder message
        reason: String,
    },

    /// An error occurred in the KV store layer.
    #[error("kv store error: {0}")]
    KvError(String),

    /// A lower-level I/O error occurred.
    #[error(transparent)]
    IoError(#[from] std::io::Error),

    /// JSON encoding failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result alias for the metadata layer.
pub type MetaResult<T> = Result<T, MetaError>;

/// Identity of a manifest record inside one cluster.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ManifestKey {
    /// Resource kind
    pub kind: ResourceKind,
    /// Namespace, empty for cluster-scoped kinds
    pub namespace: String,
    /// Object name
    pub name: String,
}

impl ManifestKey {
    /// Creates a key; the namespace is cleared for cluster-scoped kinds.
    pub fn new(kind: ResourceKind, namespace: impl Into<String>, name: impl Into<String>) -> Self {
        let namespace = if kind.is_namespaced() {
            namespace.into()
        } else {
            String::new()
        };
        Self {
            kind,
            namespace,
            name: name.into(),
        }
    }
}

impl fmt::Display for ManifestKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.namespace.is_empty() {
            write!(f, "{}/{}", self.kind, self.name)
        } else {
            write!(f, "{}/{}/{}", self.kind, self.namespace, self.name)
        }
    }
}

/// Normalized manifest as stored in the snapshot store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestRecord {
    /// Cluster the object was fetched from
    pub cluster: String,
    /// Record identity
    pub key: ManifestKey,
    /// `apiVersion` of the fetched object
    pub api_version: String,
    /// Normalized manifest body
    pub manifest: Value,
    /// SHA-256 hex of the canonical manifest JSON
    pub fingerprint: String,
    /// Time of the sync run that last wrote this record
    pub synced_at: DateTime<Utc>,
}

impl ManifestRecord {
    /// Resource kind of the record.
    pub fn kind(&self) -> ResourceKind {
        self.key.kind
    }

    /// Namespace (empty for cluster-scoped kinds).
    pub fn namespace(&self) -> &str {
        &self.key.namespace
    }

    /// Object name.
    pub fn name(&self) -> &str {
        &self.key.name
    }
}

/// Node role as derived from `node-role.kubernetes.io/*` labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeRole {
    /// Runs application workloads
    Worker,
    /// Infrastructure node (router, registry, monitoring)
    Infra,
    /// Control plane node
    Master,
}

impl fmt::Display for NodeRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            NodeRole::Worker => "worker",
            NodeRole::Infra => "infra",
            NodeRole::Master => "master",
        };
        f.write_str(s)
    }
}

/// Capacity facts about one node.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct NodeRecord {
    /// Cluster the node belongs to
    pub cluster: String,
    /// Node name
    pub name: String,
    /// `status.capacity.cpu` in millicores
    pub cpu_capacity_milli: Option<u64>,
    /// `status.capacity.memory` in MiB
    pub memory_capacity_mib: Option<u64>,
    /// `status.allocatable.cpu` in millicores
    pub cpu_allocatable_milli: Option<u64>,
    /// `status.allocatable.memory` in MiB
    pub memory_allocatable_mib: Option<u64>,
    /// Roles derived from labels
    pub roles: BTreeSet<NodeRole>,
    /// `node.kubernetes.io/instance-type`
    pub instance_type: Option<String>,
    /// `topology.kubernetes.io/zone`
    pub zone: Option<String>,
    /// All node labels, used for node-selector matching
    pub labels: BTreeMap<String, String>,
    /// `status.nodeInfo.osImage`
    pub os_image: Option<String>,
    /// `status.nodeInfo.kernelVersion`
    pub kernel_version: Option<String>,
    /// `status.nodeInfo.containerRuntimeVersion`
    pub container_runtime: Option<String>,
}

impl NodeRecord {
    /// A worker node that is not also tagged as infra or control plane.
    pub fn is_worker(&self) -> bool {
        self.roles.contains(&NodeRole::Worker)
            && !self.roles.contains(&NodeRole::Infra)
            && !self.roles.contains(&NodeRole::Master)
    }

    /// Roles joined for display, e.g. `infra,worker`.
    pub fn roles_display(&self) -> String {
        self.roles
            .iter()
            .map(|r| r.to_string())
            .collect::<Vec<_>>()
            .join(",")
    }
}
