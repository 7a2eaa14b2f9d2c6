//! Sync orchestrator.
//!
//! One run fans out one task per resource kind under a semaphore sized by the
//! configured parallelism. Each task fetches, filters and normalizes its kind
//! and commits the result as a single replace-set batch. A failed or cancelled
//! kind leaves its stored records untouched and never blocks other kinds.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use kubecap_meta::{CommitStats, ManifestKey, ManifestRecord, NodeRecord, ResourceKind, SnapshotStore, LAST_SYNC_KEY};
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::connector::{raw_namespace, ClusterConnector, NamespaceScope};
use crate::error::{Result, SyncError};
use crate::filter::NamespaceFilter;
use crate::normalize::normalize;

/// Default number of kinds fetched concurrently.
pub const DEFAULT_PARALLELISM: usize = 4;

/// What to do with an object whose identity cannot be read.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MalformedPolicy {
    /// Fail the whole kind and keep its previous state.
    #[default]
    FailKind,
    /// Skip and count the object; commit the rest.
    SkipItem,
}

/// Per-cluster sync settings.
#[derive(Debug, Clone)]
pub struct ClusterSyncConfig {
    /// Cluster name; must match the store's cluster
    pub cluster: String,
    /// Kinds synchronized when no override is given
    pub include_kinds: Vec<ResourceKind>,
    /// Namespaces dropped after fetch
    pub namespace_filter: NamespaceFilter,
    /// Namespaces requested from the connector
    pub scope: NamespaceScope,
    /// Maximum concurrent kind tasks
    pub parallelism: usize,
    /// Malformed object handling
    pub malformed: MalformedPolicy,
}

impl ClusterSyncConfig {
    /// Settings with the default kind list and no exclusions.
    pub fn new(cluster: impl Into<String>) -> Self {
        Self {
            cluster: cluster.into(),
            include_kinds: ResourceKind::DEFAULT_INCLUDE.to_vec(),
            namespace_filter: NamespaceFilter::default(),
            scope: NamespaceScope::All,
            parallelism: DEFAULT_PARALLELISM,
            malformed: MalformedPolicy::default(),
        }
    }
}

/// Outcome of one kind in one run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncResult {
    /// Kind synchronized
    pub kind: ResourceKind,
    /// Objects committed
    pub item_count: usize,
    /// Malformed objects skipped under the lenient policy
    pub skipped: usize,
    /// Objects dropped by the namespace filter
    pub excluded: usize,
    /// Whether the kind committed
    pub success: bool,
    /// Failure detail
    pub error: Option<String>,
    /// Mutation counts of the commit
    pub stats: CommitStats,
    /// Wall time of the kind task
    pub duration_ms: u64,
}

impl SyncResult {
    fn failed(kind: ResourceKind, error: impl ToString, started: Instant) -> Self {
        Self {
            kind,
            item_count: 0,
            skipped: 0,
            excluded: 0,
            success: false,
            error: Some(error.to_string()),
            stats: CommitStats::default(),
            duration_ms: started.elapsed().as_millis() as u64,
        }
    }
}

/// Results of a run, keyed by kind.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SyncReport {
    /// Cluster synchronized
    pub cluster: String,
    /// One entry per requested kind
    pub results: BTreeMap<ResourceKind, SyncResult>,
}

impl SyncReport {
    /// True when every requested kind committed.
    pub fn all_succeeded(&self) -> bool {
        self.results.values().all(|r| r.success)
    }

    /// Kinds that failed this run.
    pub fn failed_kinds(&self) -> Vec<ResourceKind> {
        self.results
            .values()
            .filter(|r| !r.success)
            .map(|r| r.kind)
            .collect()
    }

    /// Kinds that committed this run.
    pub fn succeeded_kinds(&self) -> Vec<ResourceKind> {
        self.results
            .values()
            .filter(|r| r.success)
            .map(|r| r.kind)
            .collect()
    }

    /// Total inserts, updates and deletes across kinds.
    pub fn total_mutations(&self) -> usize {
        self.results.values().map(|r| r.stats.mutations()).sum()
    }
}

/// Drives sync runs for one cluster.
pub struct SyncOrchestrator {
    connector: Arc<dyn ClusterConnector>,
    store: Arc<SnapshotStore>,
    config: ClusterSyncConfig,
}

impl SyncOrchestrator {
    /// Creates an orchestrator. Configuration is checked at the start of each run.
    pub fn new(
        connector: Arc<dyn ClusterConnector>,
        store: Arc<SnapshotStore>,
        config: ClusterSyncConfig,
    ) -> Self {
        Self {
            connector,
            store,
            config,
        }
    }

    /// Cluster this orchestrator syncs.
    pub fn cluster(&self) -> &str {
        &self.config.cluster
    }

    /// Settings in effect.
    pub fn config(&self) -> &ClusterSyncConfig {
        &self.config
    }

    fn effective_kinds(&self, kinds: Option<&[ResourceKind]>) -> Result<Vec<ResourceKind>> {
        if self.config.parallelism == 0 {
            return Err(SyncError::Configuration("parallelism must be greater than 0".into()));
        }
        if self.config.cluster != self.store.cluster() {
            return Err(SyncError::Configuration(format!(
                "orchestrator for cluster '{}' given store for cluster '{}'",
                self.config.cluster,
                self.store.cluster()
            )));
        }
        let requested = kinds.unwrap_or(&self.config.include_kinds);
        let mut seen = BTreeSet::new();
        let effective: Vec<ResourceKind> = requested
            .iter()
            .copied()
            .filter(|k| seen.insert(*k))
            .collect();
        if effective.is_empty() {
            return Err(SyncError::Configuration(format!(
                "no kinds to sync for cluster '{}'",
                self.config.cluster
            )));
        }
        Ok(effective)
    }

    /// Runs one sync. `kinds` overrides the configured inclusion list; kinds
    /// outside the effective set are never touched.
    pub async fn sync(&self, kinds: Option<&[ResourceKind]>) -> Result<SyncReport> {
        self.sync_with_cancel(kinds, CancellationToken::new()).await
    }

    /// Like [`SyncOrchestrator::sync`], stopping kinds that have not yet
    /// committed once `cancel` fires.
    pub async fn sync_with_cancel(
        &self,
        kinds: Option<&[ResourceKind]>,
        cancel: CancellationToken,
    ) -> Result<SyncReport> {
        let kinds = self.effective_kinds(kinds)?;
        let run_started = Instant::now();
        tracing::info!(
            cluster = %self.config.cluster,
            kinds = kinds.len(),
            parallelism = self.config.parallelism,
            "sync started"
        );

        let semaphore = Arc::new(Semaphore::new(self.config.parallelism));
        let filter = Arc::new(self.config.namespace_filter.clone());
        let mut join_set = JoinSet::new();

        for kind in kinds.iter().copied() {
            let task = KindTask {
                kind,
                cluster: self.config.cluster.clone(),
                connector: Arc::clone(&self.connector),
                store: Arc::clone(&self.store),
                filter: Arc::clone(&filter),
                scope: self.config.scope.for_kind(kind),
                policy: self.config.malformed,
                cancel: cancel.clone(),
            };
            let sem = Arc::clone(&semaphore);
            join_set.spawn(async move {
                let started = Instant::now();
                let _permit = match sem.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(e) => return SyncResult::failed(kind, e, started),
                };
                task.run(started).await
            });
        }

        let mut report = SyncReport {
            cluster: self.config.cluster.clone(),
            results: BTreeMap::new(),
        };
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok(result) => {
                    report.results.insert(result.kind, result);
                }
                Err(e) => {
                    tracing::error!(cluster = %self.config.cluster, error = %e, "kind task aborted");
                }
            }
        }
        for kind in &kinds {
            report
                .results
                .entry(*kind)
                .or_insert_with(|| SyncResult::failed(*kind, "kind task aborted", run_started));
        }

        // Every kind already has its result; a failed stamp must not discard them.
        if !report.succeeded_kinds().is_empty() {
            if let Err(e) = self.store.set_meta(LAST_SYNC_KEY, &Utc::now().to_rfc3339()) {
                tracing::warn!(cluster = %self.config.cluster, error = %e, "failed to record last sync time");
            }
        }

        tracing::info!(
            cluster = %self.config.cluster,
            succeeded = report.succeeded_kinds().len(),
            failed = report.failed_kinds().len(),
            mutations = report.total_mutations(),
            elapsed_ms = run_started.elapsed().as_millis() as u64,
            "sync finished"
        );
        Ok(report)
    }
}

struct KindTask {
    kind: ResourceKind,
    cluster: String,
    connector: Arc<dyn ClusterConnector>,
    store: Arc<SnapshotStore>,
    filter: Arc<NamespaceFilter>,
    scope: NamespaceScope,
    policy: MalformedPolicy,
    cancel: CancellationToken,
}

impl KindTask {
    async fn run(self, started: Instant) -> SyncResult {
        let kind = self.kind;
        if self.cancel.is_cancelled() {
            return SyncResult::failed(kind, SyncError::Cancelled, started);
        }

        let fetched = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => {
                return SyncResult::failed(kind, SyncError::Cancelled, started);
            }
            fetched = self.connector.list(kind, &self.scope) => fetched,
        };
        let objects = match fetched {
            Ok(objects) => objects,
            Err(e) => {
                tracing::warn!(cluster = %self.cluster, kind = %kind, error = %e, "fetch failed, keeping stored state");
                return SyncResult::failed(kind, e, started);
            }
        };

        let synced_at = Utc::now();
        let mut records: BTreeMap<ManifestKey, ManifestRecord> = BTreeMap::new();
        let mut nodes: Vec<NodeRecord> = Vec::new();
        let mut skipped = 0;
        let mut excluded = 0;
        for raw in &objects {
            if self.filter.is_excluded(raw_namespace(raw)) {
                excluded += 1;
                continue;
            }
            match normalize(&self.cluster, kind, raw) {
                Ok(normalized) => {
                    let (record, node) = normalized.into_record(&self.cluster, synced_at);
                    if let Some(node) = node {
                        nodes.retain(|n| n.name != node.name);
                        nodes.push(node);
                    }
                    records.insert(record.key.clone(), record);
                }
                Err(e) => match self.policy {
                    MalformedPolicy::FailKind => {
                        tracing::warn!(cluster = %self.cluster, kind = %kind, error = %e, "malformed object, kind not committed");
                        return SyncResult::failed(kind, SyncError::Normalization(e), started);
                    }
                    MalformedPolicy::SkipItem => {
                        tracing::warn!(cluster = %self.cluster, kind = %kind, error = %e, "skipping malformed object");
                        skipped += 1;
                    }
                },
            }
        }

        if self.cancel.is_cancelled() {
            return SyncResult::failed(kind, SyncError::Cancelled, started);
        }

        let item_count = records.len();
        let store = Arc::clone(&self.store);
        let records: Vec<ManifestRecord> = records.into_values().collect();
        let committed = tokio::task::spawn_blocking(move || store.commit_kind(kind, records, nodes)).await;
        let stats = match committed {
            Ok(Ok(stats)) => stats,
            Ok(Err(e)) => {
                tracing::error!(cluster = %self.cluster, kind = %kind, error = %e, "commit failed");
                return SyncResult::failed(kind, SyncError::Store(e), started);
            }
            Err(e) => return SyncResult::failed(kind, e, started),
        };

        let result = SyncResult {
            kind,
            item_count,
            skipped,
            excluded,
            success: true,
            error: None,
            stats,
            duration_ms: started.elapsed().as_millis() as u64,
        };
        tracing::info!(
            cluster = %self.cluster,
            kind = %kind,
            items = item_count,
            skipped,
            excluded,
            inserted = stats.inserted,
            updated = stats.updated,
            deleted = stats.deleted,
            duration_ms = result.duration_ms,
            "kind synced"
        );
        result
    }
}
