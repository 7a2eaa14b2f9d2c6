//! Snapshot store behaviour over the file-backed KV store, across restarts.

mod common;

use std::collections::BTreeSet;

use common::{deployment, node_manifest, worker, FileBackedStore};
use kubecap_meta::{ManifestKey, ResourceKind, LAST_SYNC_KEY};

#[test]
fn test_commit_survives_reopen() {
    let fixture = FileBackedStore::new();
    fixture
        .store
        .commit_kind(
            ResourceKind::Deployment,
            vec![deployment("ns1", "web", 2), deployment("ns2", "api", 1)],
            Vec::new(),
        )
        .unwrap();
    fixture.store.set_meta(LAST_SYNC_KEY, "stamp").unwrap();

    let fixture = fixture.reopen();
    let listed = fixture.store.list(ResourceKind::Deployment).unwrap();
    assert_eq!(listed.len(), 2);
    assert_eq!(listed[0].namespace(), "ns1");
    assert_eq!(fixture.store.get_meta(LAST_SYNC_KEY).unwrap().as_deref(), Some("stamp"));
}

#[test]
fn test_recommit_after_reopen_is_noop() {
    let fixture = FileBackedStore::new();
    let records = vec![deployment("ns1", "web", 2)];
    fixture
        .store
        .commit_kind(ResourceKind::Deployment, records.clone(), Vec::new())
        .unwrap();

    let fixture = fixture.reopen();
    let stats = fixture
        .store
        .commit_kind(ResourceKind::Deployment, records, Vec::new())
        .unwrap();
    assert_eq!(stats.mutations(), 0);
    assert_eq!(stats.unchanged, 1);
}

#[test]
fn test_empty_commit_clears_only_that_kind() {
    let fixture = FileBackedStore::new();
    fixture
        .store
        .commit_kind(ResourceKind::Deployment, vec![deployment("ns1", "web", 2)], Vec::new())
        .unwrap();
    fixture
        .store
        .commit_kind(
            ResourceKind::Node,
            vec![node_manifest("w1")],
            vec![worker("w1", 4000, 8192)],
        )
        .unwrap();

    let stats = fixture
        .store
        .commit_kind(ResourceKind::Deployment, Vec::new(), Vec::new())
        .unwrap();
    assert_eq!(stats.deleted, 1);

    let fixture = fixture.reopen();
    assert!(fixture.store.list(ResourceKind::Deployment).unwrap().is_empty());
    assert_eq!(fixture.store.list(ResourceKind::Node).unwrap().len(), 1);
    assert_eq!(fixture.store.nodes().unwrap()[0].cpu_allocatable_milli, Some(4000));
}

#[test]
fn test_replace_kind_keeps_current_identities() {
    let fixture = FileBackedStore::new();
    fixture
        .store
        .upsert(&[
            deployment("ns1", "a", 1),
            deployment("ns1", "b", 1),
            deployment("ns1", "c", 1),
        ])
        .unwrap();
    let current: BTreeSet<ManifestKey> = ["a", "c"]
        .iter()
        .map(|n| ManifestKey::new(ResourceKind::Deployment, "ns1", *n))
        .collect();
    assert_eq!(
        fixture.store.replace_kind(ResourceKind::Deployment, &current).unwrap(),
        1
    );

    let names: Vec<String> = fixture
        .store
        .list(ResourceKind::Deployment)
        .unwrap()
        .into_iter()
        .map(|r| r.key.name)
        .collect();
    assert_eq!(names, vec!["a", "c"]);
}

#[test]
fn test_summary_counts_roles() {
    let fixture = FileBackedStore::new();
    let mut infra = worker("i1", 2000, 4096);
    infra.roles.insert(kubecap_meta::NodeRole::Infra);
    fixture
        .store
        .commit_kind(
            ResourceKind::Node,
            vec![node_manifest("w1"), node_manifest("i1")],
            vec![worker("w1", 4000, 8192), infra],
        )
        .unwrap();

    let summary = fixture.store.summary().unwrap();
    assert_eq!(summary.nodes, 2);
    assert_eq!(summary.nodes_by_role.get(&kubecap_meta::NodeRole::Worker), Some(&2));
    assert_eq!(summary.nodes_by_role.get(&kubecap_meta::NodeRole::Infra), Some(&1));
    assert_eq!(summary.kinds.get(&ResourceKind::Node), Some(&2));
}
