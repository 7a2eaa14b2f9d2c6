//! Property-based tests for manifest normalization.

use kubecap_meta::ResourceKind;
use kubecap_sync::{fingerprint, normalize, normalize_manifest};
use proptest::prelude::*;
use serde_json::{json, Map, Value};

fn label_map() -> impl Strategy<Value = Vec<(String, String)>> {
    proptest::collection::btree_map("[a-z]{1,8}", "[a-z0-9]{0,8}", 0..8)
        .prop_map(|m| m.into_iter().collect())
}

fn object(labels: &[(String, String)], rv: u32, replicas: u8) -> Value {
    let labels: Map<String, Value> = labels
        .iter()
        .map(|(k, v)| (k.clone(), Value::String(v.clone())))
        .collect();
    json!({
        "apiVersion": "apps/v1",
        "kind": "StatefulSet",
        "metadata": {
            "name": "db",
            "namespace": "data",
            "labels": labels,
            "resourceVersion": rv.to_string(),
            "generation": rv,
        },
        "spec": {"replicas": replicas},
        "status": {"observedGeneration": rv}
    })
}

proptest! {
    /// Label insertion order never changes the fingerprint.
    #[test]
    fn test_fingerprint_ignores_key_order(labels in label_map()) {
        let mut reversed = labels.clone();
        reversed.reverse();
        let a = normalize("c", ResourceKind::StatefulSet, &object(&labels, 1, 1)).unwrap();
        let b = normalize("c", ResourceKind::StatefulSet, &object(&reversed, 1, 1)).unwrap();
        prop_assert_eq!(a.fingerprint, b.fingerprint);
    }

    /// Bookkeeping churn never changes the fingerprint; spec changes always do.
    #[test]
    fn test_fingerprint_tracks_intent(labels in label_map(), rv1 in any::<u32>(), rv2 in any::<u32>(), r in 0u8..100) {
        let a = normalize("c", ResourceKind::StatefulSet, &object(&labels, rv1, r)).unwrap();
        let b = normalize("c", ResourceKind::StatefulSet, &object(&labels, rv2, r)).unwrap();
        prop_assert_eq!(&a.fingerprint, &b.fingerprint);
        let c = normalize("c", ResourceKind::StatefulSet, &object(&labels, rv1, r.wrapping_add(1))).unwrap();
        prop_assert_ne!(&a.fingerprint, &c.fingerprint);
    }

    /// Normalizing twice is the same as normalizing once.
    #[test]
    fn test_normalize_is_idempotent(labels in label_map(), rv in any::<u32>()) {
        let once = normalize_manifest(&object(&labels, rv, 2));
        let twice = normalize_manifest(&once);
        prop_assert_eq!(fingerprint(&once), fingerprint(&twice));
        prop_assert_eq!(once, twice);
    }
}
