#![warn(missing_docs)]

//! kubecap metadata subsystem: resource kinds, snapshot records, quantity
//! parsing and the durable per-cluster snapshot store.

pub mod btree_store;
pub mod kind;
pub mod kvstore;
pub mod quantity;
pub mod snapshot;
pub mod types;

pub use btree_store::PersistentKvStore;
pub use kind::{ReplicaRule, ResourceKind};
pub use kvstore::{BatchOp, KvStore, MemoryKvStore};
pub use snapshot::{validate_cluster_name, CommitStats, SnapshotStore, StoreSummary, LAST_SYNC_KEY};
pub use types::{
    ManifestKey, ManifestRecord, MetaError, MetaResult, NodeRecord, NodeRole,
};
