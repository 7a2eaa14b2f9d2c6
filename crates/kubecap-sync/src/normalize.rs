//! Manifest normalization and fingerprinting.
//!
//! Normalization removes fields that change without a change of intent
//! (status, bookkeeping metadata, controller annotations). The fingerprint is
//! the SHA-256 of the compact JSON encoding. `serde_json` maps are ordered by
//! key, so equal manifests always encode to identical bytes.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use kubecap_meta::quantity::{cpu_value_to_milli, mem_value_to_mib};
use kubecap_meta::{ManifestKey, ManifestRecord, NodeRecord, NodeRole, ResourceKind};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use crate::error::NormalizationError;

const STRIP_METADATA_FIELDS: [&str; 6] = [
    "managedFields",
    "creationTimestamp",
    "resourceVersion",
    "uid",
    "generation",
    "selfLink",
];

const SYSTEM_ANNOTATION_PREFIXES: [&str; 3] = [
    "kubectl.kubernetes.io/",
    "deployment.kubernetes.io/",
    "openshift.io/generated-by",
];

const LABEL_MASTER: &str = "node-role.kubernetes.io/master";
const LABEL_CONTROL_PLANE: &str = "node-role.kubernetes.io/control-plane";
const LABEL_INFRA: &str = "node-role.kubernetes.io/infra";
const LABEL_INSTANCE_TYPE: &str = "node.kubernetes.io/instance-type";
const LABEL_ZONE: &str = "topology.kubernetes.io/zone";

/// A fetched object after normalization, ready to be committed.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedObject {
    /// Identity within the cluster
    pub key: ManifestKey,
    /// `apiVersion` of the object, or the kind's default
    pub api_version: String,
    /// Normalized manifest body
    pub manifest: Value,
    /// SHA-256 hex of the normalized manifest
    pub fingerprint: String,
    /// Capacity facts, for Node objects only
    pub node: Option<NodeRecord>,
}

impl NormalizedObject {
    /// Converts into a stored record stamped with the run time.
    pub fn into_record(self, cluster: &str, synced_at: DateTime<Utc>) -> (ManifestRecord, Option<NodeRecord>) {
        let record = ManifestRecord {
            cluster: cluster.to_string(),
            key: self.key,
            api_version: self.api_version,
            manifest: self.manifest,
            fingerprint: self.fingerprint,
            synced_at,
        };
        (record, self.node)
    }
}

/// Strips volatile fields from a raw object. Non-map input is returned as is.
pub fn normalize_manifest(raw: &Value) -> Value {
    let mut base = raw.clone();
    let Some(root) = base.as_object_mut() else {
        return base;
    };
    root.remove("status");

    if let Some(meta) = root.get_mut("metadata").and_then(Value::as_object_mut) {
        for field in STRIP_METADATA_FIELDS {
            meta.remove(field);
        }
        let filtered: Option<Map<String, Value>> = meta
            .get("annotations")
            .and_then(Value::as_object)
            .map(|ann| {
                ann.iter()
                    .filter(|(k, _)| !SYSTEM_ANNOTATION_PREFIXES.iter().any(|p| k.starts_with(p)))
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect()
            });
        match filtered {
            Some(ann) if !ann.is_empty() => {
                meta.insert("annotations".to_string(), Value::Object(ann));
            }
            _ => {
                meta.remove("annotations");
            }
        }
    }
    base
}

/// SHA-256 hex digest of the compact JSON encoding of `value`.
///
/// Stable only while serde_json maps are BTreeMap-backed, so keys serialize
/// sorted. Enabling serde_json's `preserve_order` feature anywhere in the
/// build would make fingerprints depend on fetch order.
pub fn fingerprint(value: &Value) -> String {
    let mut hasher = Sha256::new();
    hasher.update(value.to_string().as_bytes());
    hex::encode(hasher.finalize())
}

// Identities become directory and file names on export.
fn is_path_safe(part: &str) -> bool {
    part != "." && part != ".." && !part.contains(['/', '\\'])
}

fn identity(kind: ResourceKind, raw: &Value) -> Result<ManifestKey, NormalizationError> {
    let root = raw.as_object().ok_or(NormalizationError::NotAnObject)?;
    let meta = root.get("metadata").and_then(Value::as_object);
    let name = meta
        .and_then(|m| m.get("name"))
        .and_then(Value::as_str)
        .filter(|n| !n.is_empty())
        .ok_or(NormalizationError::MissingName)?;
    let namespace = match meta.and_then(|m| m.get("namespace")) {
        None | Some(Value::Null) => "",
        Some(Value::String(ns)) => ns.as_str(),
        Some(_) => return Err(NormalizationError::InvalidNamespace(name.to_string())),
    };
    if !is_path_safe(name) || (!namespace.is_empty() && !is_path_safe(namespace)) {
        return Err(NormalizationError::InvalidIdentity(format!("{}/{}", namespace, name)));
    }
    Ok(ManifestKey::new(kind, namespace, name))
}

/// Reads capacity, roles and node info from a raw Node object. Must run on the
/// raw object: normalization strips `status`.
pub fn node_record(cluster: &str, name: &str, raw: &Value) -> NodeRecord {
    let status = raw.get("status");
    let capacity = status.and_then(|s| s.get("capacity"));
    let allocatable = status.and_then(|s| s.get("allocatable"));
    let info = status.and_then(|s| s.get("nodeInfo"));
    let info_str = |field: &str| {
        info.and_then(|i| i.get(field))
            .and_then(Value::as_str)
            .map(str::to_string)
    };

    let labels: BTreeMap<String, String> = raw
        .pointer("/metadata/labels")
        .and_then(Value::as_object)
        .map(|m| {
            m.iter()
                .filter_map(|(k, v)| v.as_str().map(|v| (k.clone(), v.to_string())))
                .collect()
        })
        .unwrap_or_default();

    NodeRecord {
        cluster: cluster.to_string(),
        name: name.to_string(),
        cpu_capacity_milli: cpu_value_to_milli(capacity.and_then(|c| c.get("cpu"))),
        memory_capacity_mib: mem_value_to_mib(capacity.and_then(|c| c.get("memory"))),
        cpu_allocatable_milli: cpu_value_to_milli(allocatable.and_then(|c| c.get("cpu"))),
        memory_allocatable_mib: mem_value_to_mib(allocatable.and_then(|c| c.get("memory"))),
        roles: node_roles(&labels),
        instance_type: labels.get(LABEL_INSTANCE_TYPE).cloned(),
        zone: labels.get(LABEL_ZONE).cloned(),
        labels,
        os_image: info_str("osImage"),
        kernel_version: info_str("kernelVersion"),
        container_runtime: info_str("containerRuntimeVersion"),
    }
}

/// Roles from `node-role.kubernetes.io/*` labels. A node carrying no master,
/// control-plane or infra label is a worker.
pub fn node_roles(labels: &BTreeMap<String, String>) -> BTreeSet<NodeRole> {
    let mut roles = BTreeSet::new();
    if labels.contains_key(LABEL_MASTER) || labels.contains_key(LABEL_CONTROL_PLANE) {
        roles.insert(NodeRole::Master);
    }
    if labels.contains_key(LABEL_INFRA) {
        roles.insert(NodeRole::Infra);
    }
    if roles.is_empty() || labels.contains_key("node-role.kubernetes.io/worker") {
        roles.insert(NodeRole::Worker);
    }
    roles
}

/// Normalizes one raw object of `kind` fetched from `cluster`.
pub fn normalize(cluster: &str, kind: ResourceKind, raw: &Value) -> Result<NormalizedObject, NormalizationError> {
    let key = identity(kind, raw)?;
    let node = (kind == ResourceKind::Node).then(|| node_record(cluster, &key.name, raw));
    let manifest = normalize_manifest(raw);
    let api_version = raw
        .get("apiVersion")
        .and_then(Value::as_str)
        .unwrap_or(kind.api_version())
        .to_string();
    Ok(NormalizedObject {
        key,
        api_version,
        fingerprint: fingerprint(&manifest),
        manifest,
        node,
    })
}
