//! Per-cluster snapshot store on top of a [`KvStore`].
//!
//! Key layout (cluster names are validated so `/` is an unambiguous separator):
//!
//! ```text
//! m/<cluster>/<Kind>/<namespace>/<name>   ManifestRecord (JSON)
//! n/<cluster>/<node>                      NodeRecord (JSON)
//! c/<cluster>/<key>                       cluster metadata string
//! ```
//!
//! Every mutation of a kind goes through one `write_batch`, serialized by a
//! per-(cluster, kind) lock, so readers never see half of a kind commit.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex};

use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::kind::ResourceKind;
use crate::kvstore::{lock_poisoned, BatchOp, KvStore};
use crate::types::{ManifestKey, ManifestRecord, MetaError, MetaResult, NodeRecord, NodeRole};

/// Metadata key stamped with the RFC 3339 time of the last sync run.
pub const LAST_SYNC_KEY: &str = "last_sync";

/// Mutation counts from one kind commit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitStats {
    /// Identities written for the first time
    pub inserted: usize,
    /// Identities whose fingerprint changed
    pub updated: usize,
    /// Identities left untouched
    pub unchanged: usize,
    /// Stored identities absent from the current set
    pub deleted: usize,
}

impl CommitStats {
    /// Total number of writes and deletes performed.
    pub fn mutations(&self) -> usize {
        self.inserted + self.updated + self.deleted
    }
}

/// Counts over the stored state of one cluster.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreSummary {
    /// Cluster name
    pub cluster: String,
    /// Manifest records per kind
    pub kinds: BTreeMap<ResourceKind, usize>,
    /// Total stored nodes
    pub nodes: usize,
    /// Node count per role (a node with several roles counts once per role)
    pub nodes_by_role: BTreeMap<NodeRole, usize>,
    /// Last sync stamp, if any run completed
    pub last_sync: Option<String>,
}

/// Snapshot of one cluster's current state.
pub struct SnapshotStore {
    kv: Arc<dyn KvStore>,
    cluster: String,
    kind_locks: DashMap<(String, ResourceKind), Arc<Mutex<()>>>,
}

/// Cluster names end up inside keys and on-disk paths.
pub fn validate_cluster_name(name: &str) -> MetaResult<()> {
    let valid = !name.is_empty()
        && name != "."
        && name != ".."
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if valid {
        Ok(())
    } else {
        Err(MetaError::InvalidClusterName(name.to_string()))
    }
}

impl SnapshotStore {
    /// Creates a store for `cluster` backed by `kv`.
    pub fn new(kv: Arc<dyn KvStore>, cluster: impl Into<String>) -> MetaResult<Self> {
        let cluster = cluster.into();
        validate_cluster_name(&cluster)?;
        Ok(Self {
            kv,
            cluster,
            kind_locks: DashMap::new(),
        })
    }

    /// Cluster this store holds.
    pub fn cluster(&self) -> &str {
        &self.cluster
    }

    fn kind_prefix(&self, kind: ResourceKind) -> Vec<u8> {
        format!("m/{}/{}/", self.cluster, kind).into_bytes()
    }

    fn manifest_key(&self, key: &ManifestKey) -> Vec<u8> {
        format!("m/{}/{}/{}/{}", self.cluster, key.kind, key.namespace, key.name).into_bytes()
    }

    fn node_prefix(&self) -> Vec<u8> {
        format!("n/{}/", self.cluster).into_bytes()
    }

    fn node_key(&self, name: &str) -> Vec<u8> {
        format!("n/{}/{}", self.cluster, name).into_bytes()
    }

    fn meta_key(&self, key: &str) -> Vec<u8> {
        format!("c/{}/{}", self.cluster, key).into_bytes()
    }

    fn kind_lock(&self, kind: ResourceKind) -> Arc<Mutex<()>> {
        self.kind_locks
            .entry((self.cluster.clone(), kind))
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    fn check_cluster(&self, cluster: &str) -> MetaResult<()> {
        if cluster == self.cluster {
            Ok(())
        } else {
            Err(MetaError::ClusterMismatch {
                store: self.cluster.clone(),
                record: cluster.to_string(),
            })
        }
    }

    fn load_kind(&self, kind: ResourceKind) -> MetaResult<BTreeMap<ManifestKey, ManifestRecord>> {
        let mut out = BTreeMap::new();
        for (k, v) in self.kv.scan_prefix(&self.kind_prefix(kind))? {
            let record: ManifestRecord = decode(&k, &v)?;
            out.insert(record.key.clone(), record);
        }
        Ok(out)
    }

    fn load_nodes(&self) -> MetaResult<BTreeMap<String, NodeRecord>> {
        let mut out = BTreeMap::new();
        for (k, v) in self.kv.scan_prefix(&self.node_prefix())? {
            let node: NodeRecord = decode(&k, &v)?;
            out.insert(node.name.clone(), node);
        }
        Ok(out)
    }

    /// Inserts or overwrites records by identity. Returns the number written.
    pub fn upsert(&self, records: &[ManifestRecord]) -> MetaResult<usize> {
        let mut by_kind: BTreeMap<ResourceKind, Vec<&ManifestRecord>> = BTreeMap::new();
        for record in records {
            self.check_cluster(&record.cluster)?;
            by_kind.entry(record.kind()).or_default().push(record);
        }
        let mut written = 0;
        for (kind, group) in by_kind {
            let lock = self.kind_lock(kind);
            let _guard = lock.lock().map_err(lock_poisoned)?;
            let mut ops = Vec::with_capacity(group.len());
            for record in group {
                ops.push(BatchOp::Put {
                    key: self.manifest_key(&record.key),
                    value: serde_json::to_vec(record)?,
                });
            }
            written += ops.len();
            self.kv.write_batch(ops)?;
        }
        Ok(written)
    }

    /// Deletes stored records of `kind` whose identity is not in `current`.
    /// Returns the number deleted. Other kinds are never touched.
    pub fn replace_kind(&self, kind: ResourceKind, current: &BTreeSet<ManifestKey>) -> MetaResult<usize> {
        let lock = self.kind_lock(kind);
        let _guard = lock.lock().map_err(lock_poisoned)?;
        let ops: Vec<BatchOp> = self
            .load_kind(kind)?
            .into_keys()
            .filter(|key| !current.contains(key))
            .map(|key| BatchOp::Delete {
                key: self.manifest_key(&key),
            })
            .collect();
        let deleted = ops.len();
        self.kv.write_batch(ops)?;
        Ok(deleted)
    }

    /// Replaces the stored set of `kind` with `records` in one atomic batch.
    ///
    /// Records whose fingerprint matches the stored one are left as they are
    /// (including their `synced_at`), so re-committing unchanged state performs
    /// no writes. For [`ResourceKind::Node`], `nodes` replaces the node table in
    /// the same batch; it is ignored for every other kind.
    pub fn commit_kind(
        &self,
        kind: ResourceKind,
        records: Vec<ManifestRecord>,
        nodes: Vec<NodeRecord>,
    ) -> MetaResult<CommitStats> {
        let lock = self.kind_lock(kind);
        let _guard = lock.lock().map_err(lock_poisoned)?;

        let mut stored = self.load_kind(kind)?;
        let mut stats = CommitStats::default();
        let mut ops = Vec::new();

        for record in records {
            self.check_cluster(&record.cluster)?;
            if record.kind() != kind {
                return Err(MetaError::KvError(format!(
                    "record {} committed under kind {}",
                    record.key, kind
                )));
            }
            match stored.remove(&record.key) {
                Some(old) if old.fingerprint == record.fingerprint => {
                    stats.unchanged += 1;
                    continue;
                }
                Some(_) => stats.updated += 1,
                None => stats.inserted += 1,
            }
            ops.push(BatchOp::Put {
                key: self.manifest_key(&record.key),
                value: serde_json::to_vec(&record)?,
            });
        }
        for key in stored.into_keys() {
            stats.deleted += 1;
            ops.push(BatchOp::Delete {
                key: self.manifest_key(&key),
            });
        }

        if kind == ResourceKind::Node {
            let mut stored_nodes = self.load_nodes()?;
            for node in nodes {
                self.check_cluster(&node.cluster)?;
                if stored_nodes.remove(&node.name).as_ref() == Some(&node) {
                    continue;
                }
                ops.push(BatchOp::Put {
                    key: self.node_key(&node.name),
                    value: serde_json::to_vec(&node)?,
                });
            }
            for name in stored_nodes.into_keys() {
                ops.push(BatchOp::Delete {
                    key: self.node_key(&name),
                });
            }
        }

        let mutations = ops.len();
        self.kv.write_batch(ops)?;
        tracing::debug!(
            cluster = %self.cluster,
            kind = %kind,
            inserted = stats.inserted,
            updated = stats.updated,
            unchanged = stats.unchanged,
            deleted = stats.deleted,
            mutations,
            "kind committed"
        );
        Ok(stats)
    }

    /// Looks up one record by identity.
    pub fn get(&self, key: &ManifestKey) -> MetaResult<Option<ManifestRecord>> {
        let raw_key = self.manifest_key(key);
        match self.kv.get(&raw_key)? {
            Some(v) => Ok(Some(decode(&raw_key, &v)?)),
            None => Ok(None),
        }
    }

    /// All stored records of `kind`, ordered by namespace then name.
    pub fn list(&self, kind: ResourceKind) -> MetaResult<Vec<ManifestRecord>> {
        Ok(self.load_kind(kind)?.into_values().collect())
    }

    /// Stored records of `kind` in one namespace.
    pub fn list_namespace(&self, kind: ResourceKind, namespace: &str) -> MetaResult<Vec<ManifestRecord>> {
        let prefix = format!("m/{}/{}/{}/", self.cluster, kind, namespace).into_bytes();
        self.kv
            .scan_prefix(&prefix)?
            .iter()
            .map(|(k, v)| decode(k, v))
            .collect()
    }

    /// All stored nodes, ordered by name.
    pub fn nodes(&self) -> MetaResult<Vec<NodeRecord>> {
        Ok(self.load_nodes()?.into_values().collect())
    }

    /// Kinds that currently have at least one stored record.
    pub fn stored_kinds(&self) -> MetaResult<BTreeSet<ResourceKind>> {
        let mut kinds = BTreeSet::new();
        for kind in ResourceKind::ALL {
            if !self.kv.scan_prefix(&self.kind_prefix(kind))?.is_empty() {
                kinds.insert(kind);
            }
        }
        if !self.kv.scan_prefix(&self.node_prefix())?.is_empty() {
            kinds.insert(ResourceKind::Node);
        }
        Ok(kinds)
    }

    /// Deletes every stored record of the given kinds (and the node table when
    /// `Node` is among them). Returns the number of keys removed.
    pub fn purge_kinds(&self, kinds: &[ResourceKind]) -> MetaResult<usize> {
        let mut removed = 0;
        for &kind in kinds {
            let lock = self.kind_lock(kind);
            let _guard = lock.lock().map_err(lock_poisoned)?;
            let mut ops: Vec<BatchOp> = self
                .kv
                .scan_prefix(&self.kind_prefix(kind))?
                .into_iter()
                .map(|(key, _)| BatchOp::Delete { key })
                .collect();
            if kind == ResourceKind::Node {
                ops.extend(
                    self.kv
                        .scan_prefix(&self.node_prefix())?
                        .into_iter()
                        .map(|(key, _)| BatchOp::Delete { key }),
                );
            }
            removed += ops.len();
            self.kv.write_batch(ops)?;
            tracing::info!(cluster = %self.cluster, kind = %kind, "purged kind");
        }
        Ok(removed)
    }

    /// Stores a cluster metadata value.
    pub fn set_meta(&self, key: &str, value: &str) -> MetaResult<()> {
        self.kv.put(self.meta_key(key), value.as_bytes().to_vec())
    }

    /// Reads a cluster metadata value.
    pub fn get_meta(&self, key: &str) -> MetaResult<Option<String>> {
        let raw_key = self.meta_key(key);
        match self.kv.get(&raw_key)? {
            Some(v) => String::from_utf8(v).map(Some).map_err(|e| MetaError::Corrupt {
                key: String::from_utf8_lossy(&raw_key).into_owned(),
                reason: e.to_string(),
            }),
            None => Ok(None),
        }
    }

    /// Record counts per kind, node counts per role, last sync stamp.
    pub fn summary(&self) -> MetaResult<StoreSummary> {
        let mut summary = StoreSummary {
            cluster: self.cluster.clone(),
            ..Default::default()
        };
        for kind in ResourceKind::ALL {
            let count = self.kv.scan_prefix(&self.kind_prefix(kind))?.len();
            if count > 0 {
                summary.kinds.insert(kind, count);
            }
        }
        for node in self.load_nodes()?.values() {
            summary.nodes += 1;
            for role in &node.roles {
                *summary.nodes_by_role.entry(*role).or_default() += 1;
            }
        }
        summary.last_sync = self.get_meta(LAST_SYNC_KEY)?;
        Ok(summary)
    }
}

fn decode<T: serde::de::DeserializeOwned>(key: &[u8], value: &[u8]) -> MetaResult<T> {
    serde_json::from_slice(value).map_err(|e| MetaError::Corrupt {
        key: String::from_utf8_lossy(key).into_owned(),
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kvstore::MemoryKvStore;
    use chrono::Utc;
    use serde_json::json;

    fn store() -> SnapshotStore {
        SnapshotStore::new(Arc::new(MemoryKvStore::new()), "prod").unwrap()
    }

    fn record(kind: ResourceKind, ns: &str, name: &str, fp: &str) -> ManifestRecord {
        ManifestRecord {
            cluster: "prod".into(),
            key: ManifestKey::new(kind, ns, name),
            api_version: kind.api_version().into(),
            manifest: json!({"metadata": {"name": name}}),
            fingerprint: fp.into(),
            synced_at: Utc::now(),
        }
    }

    #[test]
    fn test_cluster_name_validation() {
        assert!(validate_cluster_name("prod-eu.1").is_ok());
        assert!(validate_cluster_name("").is_err());
        assert!(validate_cluster_name("a/b").is_err());
        assert!(validate_cluster_name("..").is_err());
        assert!(SnapshotStore::new(Arc::new(MemoryKvStore::new()), "bad name").is_err());
    }

    #[test]
    fn test_commit_counts_and_idempotence() {
        let store = store();
        let records = vec![
            record(ResourceKind::Deployment, "a", "web", "f1"),
            record(ResourceKind::Deployment, "b", "api", "f2"),
        ];
        let stats = store
            .commit_kind(ResourceKind::Deployment, records.clone(), Vec::new())
            .unwrap();
        assert_eq!(stats.inserted, 2);

        let again = store
            .commit_kind(ResourceKind::Deployment, records, Vec::new())
            .unwrap();
        assert_eq!(again.mutations(), 0);
        assert_eq!(again.unchanged, 2);
    }

    #[test]
    fn test_commit_updates_and_deletes() {
        let store = store();
        store
            .commit_kind(
                ResourceKind::Deployment,
                vec![
                    record(ResourceKind::Deployment, "a", "web", "f1"),
                    record(ResourceKind::Deployment, "a", "gone", "f9"),
                ],
                Vec::new(),
            )
            .unwrap();
        let stats = store
            .commit_kind(
                ResourceKind::Deployment,
                vec![record(ResourceKind::Deployment, "a", "web", "f1b")],
                Vec::new(),
            )
            .unwrap();
        assert_eq!(stats.updated, 1);
        assert_eq!(stats.deleted, 1);
        let listed = store.list(ResourceKind::Deployment).unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].fingerprint, "f1b");
    }

    #[test]
    fn test_replace_kind_isolated_from_prefix_sibling() {
        let store = store();
        store
            .upsert(&[
                record(ResourceKind::Deployment, "a", "web", "f1"),
                record(ResourceKind::DeploymentConfig, "a", "legacy", "f2"),
            ])
            .unwrap();
        let deleted = store
            .replace_kind(ResourceKind::Deployment, &BTreeSet::new())
            .unwrap();
        assert_eq!(deleted, 1);
        assert!(store.list(ResourceKind::Deployment).unwrap().is_empty());
        assert_eq!(store.list(ResourceKind::DeploymentConfig).unwrap().len(), 1);
    }

    #[test]
    fn test_upsert_rejects_foreign_cluster() {
        let store = store();
        let mut r = record(ResourceKind::Job, "a", "j", "f");
        r.cluster = "dev".into();
        assert!(matches!(
            store.upsert(&[r]),
            Err(MetaError::ClusterMismatch { .. })
        ));
    }

    #[test]
    fn test_list_namespace_and_get() {
        let store = store();
        store
            .upsert(&[
                record(ResourceKind::StatefulSet, "a", "db", "f1"),
                record(ResourceKind::StatefulSet, "ab", "db", "f2"),
            ])
            .unwrap();
        assert_eq!(store.list_namespace(ResourceKind::StatefulSet, "a").unwrap().len(), 1);
        let key = ManifestKey::new(ResourceKind::StatefulSet, "ab", "db");
        assert_eq!(store.get(&key).unwrap().unwrap().fingerprint, "f2");
    }

    #[test]
    fn test_node_table_follows_node_commit() {
        let store = store();
        let mut worker = NodeRecord {
            cluster: "prod".into(),
            name: "w1".into(),
            ..Default::default()
        };
        worker.roles.insert(NodeRole::Worker);
        store
            .commit_kind(
                ResourceKind::Node,
                vec![record(ResourceKind::Node, "", "w1", "n1")],
                vec![worker],
            )
            .unwrap();
        assert_eq!(store.nodes().unwrap().len(), 1);

        store
            .commit_kind(ResourceKind::Node, Vec::new(), Vec::new())
            .unwrap();
        assert!(store.nodes().unwrap().is_empty());
    }

    #[test]
    fn test_summary_and_purge() {
        let store = store();
        store
            .upsert(&[
                record(ResourceKind::Deployment, "a", "web", "f1"),
                record(ResourceKind::CronJob, "a", "nightly", "f2"),
            ])
            .unwrap();
        store.set_meta(LAST_SYNC_KEY, "2026-01-01T00:00:00Z").unwrap();

        let summary = store.summary().unwrap();
        assert_eq!(summary.kinds.get(&ResourceKind::Deployment), Some(&1));
        assert_eq!(summary.last_sync.as_deref(), Some("2026-01-01T00:00:00Z"));

        assert_eq!(store.purge_kinds(&[ResourceKind::CronJob]).unwrap(), 1);
        let kinds = store.stored_kinds().unwrap();
        assert!(kinds.contains(&ResourceKind::Deployment));
        assert!(!kinds.contains(&ResourceKind::CronJob));
    }
}
